//! JSON document store on disk
//!
//! The whole store is one JSON document. Every mutation rewrites it through a
//! temporary file and a rename, so a crash never leaves a half-written store.

use super::document::StoreDocument;
use super::{NetworkEntry, NewTransferPair, TransferPair, WalletRecord, WalletStore};
use crate::vault::is_encrypted;
use crate::{Error, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?
        } else {
            tracing::info!(path = %path.display(), "Creating new wallet store");
            StoreDocument::default()
        };

        for wallet in doc.all_wallets() {
            if let Some(blob) = &wallet.encrypted_private_key {
                if !is_encrypted(blob.as_str()) {
                    tracing::warn!(
                        address = %wallet.address,
                        "Stored key is not an enc1 blob and cannot be decrypted; re-import it"
                    );
                }
            }
        }

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, doc: &StoreDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the document and keep it only once it is
    /// on disk. A failed write leaves memory and file unchanged.
    async fn mutate<T>(&self, change: impl FnOnce(&mut StoreDocument) -> T) -> Result<T> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        let out = change(&mut next);
        self.persist(&next).await?;
        *doc = next;
        Ok(out)
    }
}

#[async_trait]
impl WalletStore for JsonFileStore {
    async fn get_wallet(&self, address: &Address) -> Result<Option<WalletRecord>> {
        Ok(self.doc.lock().await.get_wallet(address))
    }

    async fn all_wallets(&self) -> Result<Vec<WalletRecord>> {
        Ok(self.doc.lock().await.all_wallets())
    }

    async fn put_wallet(&self, wallet: WalletRecord) -> Result<()> {
        self.mutate(|doc| doc.put_wallet(wallet)).await
    }

    async fn put_wallets(&self, wallets: Vec<WalletRecord>) -> Result<()> {
        self.mutate(|doc| {
            for wallet in wallets {
                doc.put_wallet(wallet);
            }
        })
        .await
    }

    async fn delete_wallet(&self, address: &Address) -> Result<bool> {
        self.mutate(|doc| doc.delete_wallet(address)).await
    }

    async fn transfer_pairs(&self, from: &Address) -> Result<Vec<TransferPair>> {
        Ok(self.doc.lock().await.transfer_pairs(from))
    }

    async fn all_transfer_pairs(&self) -> Result<Vec<TransferPair>> {
        Ok(self.doc.lock().await.all_transfer_pairs())
    }

    async fn add_transfer_pair(&self, pair: NewTransferPair) -> Result<TransferPair> {
        self.mutate(|doc| doc.add_transfer_pair(pair)).await
    }

    async fn delete_transfer_pair(&self, id: u64) -> Result<bool> {
        self.mutate(|doc| doc.delete_transfer_pair(id)).await
    }

    async fn networks(&self) -> Result<Vec<NetworkEntry>> {
        Ok(self.doc.lock().await.networks())
    }

    async fn put_network(&self, network: NetworkEntry) -> Result<()> {
        self.mutate(|doc| doc.put_network(network)).await
    }
}
