//! Ephemeral store, used by tests and one-shot runs

use super::document::StoreDocument;
use super::{NetworkEntry, NewTransferPair, TransferPair, WalletRecord, WalletStore};
use crate::Result;
use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn get_wallet(&self, address: &Address) -> Result<Option<WalletRecord>> {
        Ok(self.doc.read().await.get_wallet(address))
    }

    async fn all_wallets(&self) -> Result<Vec<WalletRecord>> {
        Ok(self.doc.read().await.all_wallets())
    }

    async fn put_wallet(&self, wallet: WalletRecord) -> Result<()> {
        self.doc.write().await.put_wallet(wallet);
        Ok(())
    }

    async fn put_wallets(&self, wallets: Vec<WalletRecord>) -> Result<()> {
        let mut doc = self.doc.write().await;
        for wallet in wallets {
            doc.put_wallet(wallet);
        }
        Ok(())
    }

    async fn delete_wallet(&self, address: &Address) -> Result<bool> {
        Ok(self.doc.write().await.delete_wallet(address))
    }

    async fn transfer_pairs(&self, from: &Address) -> Result<Vec<TransferPair>> {
        Ok(self.doc.read().await.transfer_pairs(from))
    }

    async fn all_transfer_pairs(&self) -> Result<Vec<TransferPair>> {
        Ok(self.doc.read().await.all_transfer_pairs())
    }

    async fn add_transfer_pair(&self, pair: NewTransferPair) -> Result<TransferPair> {
        Ok(self.doc.write().await.add_transfer_pair(pair))
    }

    async fn delete_transfer_pair(&self, id: u64) -> Result<bool> {
        Ok(self.doc.write().await.delete_transfer_pair(id))
    }

    async fn networks(&self) -> Result<Vec<NetworkEntry>> {
        Ok(self.doc.read().await.networks())
    }

    async fn put_network(&self, network: NetworkEntry) -> Result<()> {
        self.doc.write().await.put_network(network);
        Ok(())
    }
}
