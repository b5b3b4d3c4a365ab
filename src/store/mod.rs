//! Wallet persistence boundary
//!
//! Stores are explicit handles passed to the flows that need them; there is
//! no process-wide instance. Every store treats `encrypted_private_key` as an
//! opaque string and never sees plaintext key material.

mod document;
mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::config::Network;
use crate::vault::EncryptedBlob;
use crate::Result;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tracked wallet, keyed by address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub address: Address,
    pub name: String,
    /// Present only for wallets imported with a key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<EncryptedBlob>,
    /// Last known native balance per network
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub balances: BTreeMap<Network, U256>,
    /// Display order, unique per import
    pub order_index: u64,
    pub added_time: DateTime<Utc>,
}

impl WalletRecord {
    /// A watch-only record without key material
    pub fn watch_only(address: Address, name: impl Into<String>, order_index: u64) -> Self {
        Self {
            address,
            name: name.into(),
            encrypted_private_key: None,
            balances: BTreeMap::new(),
            order_index,
            added_time: Utc::now(),
        }
    }

    pub fn has_key(&self) -> bool {
        self.encrypted_private_key.is_some()
    }

    /// Last known balance on `network`
    pub fn balance(&self, network: Network) -> Option<U256> {
        self.balances.get(&network).copied()
    }
}

/// A configured sweep from one wallet to a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPair {
    pub id: u64,
    pub from_address: Address,
    pub to_address: Address,
    /// ETH amount to leave behind, e.g. "0.001"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_eth: Option<String>,
}

/// A transfer pair before the store assigned its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransferPair {
    pub from_address: Address,
    pub to_address: Address,
    pub reserve_eth: Option<String>,
}

/// User-configured RPC endpoint for a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
}

/// Key-value store for wallets, transfer pairs and networks
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_wallet(&self, address: &Address) -> Result<Option<WalletRecord>>;

    /// All wallets ordered by `order_index`
    async fn all_wallets(&self) -> Result<Vec<WalletRecord>>;

    /// Insert or replace by address
    async fn put_wallet(&self, wallet: WalletRecord) -> Result<()>;

    async fn put_wallets(&self, wallets: Vec<WalletRecord>) -> Result<()>;

    /// Returns whether a wallet was removed
    async fn delete_wallet(&self, address: &Address) -> Result<bool>;

    /// Pairs whose sender is `from`
    async fn transfer_pairs(&self, from: &Address) -> Result<Vec<TransferPair>>;

    async fn all_transfer_pairs(&self) -> Result<Vec<TransferPair>>;

    /// Assigns the next id and stores the pair
    async fn add_transfer_pair(&self, pair: NewTransferPair) -> Result<TransferPair>;

    async fn delete_transfer_pair(&self, id: u64) -> Result<bool>;

    async fn networks(&self) -> Result<Vec<NetworkEntry>>;

    /// Insert or replace by chain id
    async fn put_network(&self, network: NetworkEntry) -> Result<()>;
}
