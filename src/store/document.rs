//! In-memory shape shared by the store implementations

use super::{NetworkEntry, NewTransferPair, TransferPair, WalletRecord};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct StoreDocument {
    #[serde(default)]
    wallets: Vec<WalletRecord>,
    #[serde(default)]
    transfer_pairs: Vec<TransferPair>,
    #[serde(default)]
    networks: Vec<NetworkEntry>,
    #[serde(default)]
    next_pair_id: u64,
}

impl StoreDocument {
    pub(super) fn get_wallet(&self, address: &Address) -> Option<WalletRecord> {
        self.wallets.iter().find(|w| &w.address == address).cloned()
    }

    pub(super) fn all_wallets(&self) -> Vec<WalletRecord> {
        let mut wallets = self.wallets.clone();
        wallets.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.address.cmp(&b.address))
        });
        wallets
    }

    pub(super) fn put_wallet(&mut self, wallet: WalletRecord) {
        match self.wallets.iter_mut().find(|w| w.address == wallet.address) {
            Some(existing) => *existing = wallet,
            None => self.wallets.push(wallet),
        }
    }

    pub(super) fn delete_wallet(&mut self, address: &Address) -> bool {
        let before = self.wallets.len();
        self.wallets.retain(|w| &w.address != address);
        self.wallets.len() != before
    }

    pub(super) fn transfer_pairs(&self, from: &Address) -> Vec<TransferPair> {
        self.transfer_pairs
            .iter()
            .filter(|p| &p.from_address == from)
            .cloned()
            .collect()
    }

    pub(super) fn all_transfer_pairs(&self) -> Vec<TransferPair> {
        self.transfer_pairs.clone()
    }

    pub(super) fn add_transfer_pair(&mut self, pair: NewTransferPair) -> TransferPair {
        self.next_pair_id += 1;
        let stored = TransferPair {
            id: self.next_pair_id,
            from_address: pair.from_address,
            to_address: pair.to_address,
            reserve_eth: pair.reserve_eth,
        };
        self.transfer_pairs.push(stored.clone());
        stored
    }

    pub(super) fn delete_transfer_pair(&mut self, id: u64) -> bool {
        let before = self.transfer_pairs.len();
        self.transfer_pairs.retain(|p| p.id != id);
        self.transfer_pairs.len() != before
    }

    pub(super) fn networks(&self) -> Vec<NetworkEntry> {
        self.networks.clone()
    }

    pub(super) fn put_network(&mut self, network: NetworkEntry) {
        match self
            .networks
            .iter_mut()
            .find(|n| n.chain_id == network.chain_id)
        {
            Some(existing) => *existing = network,
            None => self.networks.push(network),
        }
    }
}
