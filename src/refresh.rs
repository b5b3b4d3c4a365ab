//! Batch add and batch refresh of tracked addresses
//!
//! Every address becomes one queue task. Tasks write their own row in the
//! shared [`AddressBook`] as they settle, so the book always shows which rows
//! are still pending.

use crate::config::{Config, Network, RpcConfig};
use crate::import::AddressEntry;
use crate::queue::{TaskFailure, TaskQueue};
use crate::retry::{with_retry, with_timeout, RetryPolicy};
use crate::store::{WalletRecord, WalletStore};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// On-chain state of one address at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSnapshot {
    pub network: Network,
    pub balance_wei: U256,
    pub tx_count: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Source of address snapshots for a single network
#[async_trait]
pub trait AddressFetcher: Send + Sync {
    fn network(&self) -> Network;

    async fn fetch(&self, address: Address) -> Result<AddressSnapshot>;
}

/// Fetches balance and nonce over JSON-RPC
#[derive(Debug, Clone)]
pub struct RpcFetcher {
    network: Network,
    url: Url,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RpcFetcher {
    pub fn new(network: Network, rpc: &RpcConfig, config: &Config) -> Result<Self> {
        let raw = rpc
            .get(network.chain_id())
            .ok_or_else(|| Error::Config(format!("No RPC URL configured for {}", network)))?;
        let url = raw
            .parse::<Url>()
            .map_err(|e| Error::Config(format!("Invalid RPC URL {}: {}", raw, e)))?;

        Ok(Self {
            network,
            url,
            policy: RetryPolicy::from(&config.retry),
            timeout: config.fetch_timeout(),
        })
    }

    async fn fetch_once(&self, address: Address) -> Result<AddressSnapshot> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());

        let balance_wei = provider
            .get_balance(address)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get balance: {}", e)))?;
        let tx_count = provider
            .get_transaction_count(address)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get transaction count: {}", e)))?;

        Ok(AddressSnapshot {
            network: self.network,
            balance_wei,
            tx_count,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl AddressFetcher for RpcFetcher {
    fn network(&self) -> Network {
        self.network
    }

    async fn fetch(&self, address: Address) -> Result<AddressSnapshot> {
        with_retry(&self.policy, || {
            with_timeout(self.timeout, self.fetch_once(address))
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum RowStatus {
    Pending,
    Success,
    Error(String),
}

/// One tracked address as shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct AddressRow {
    pub address: Address,
    pub name: Option<String>,
    pub status: RowStatus,
    /// Last successful snapshot, kept across failed refreshes
    pub snapshot: Option<AddressSnapshot>,
}

/// Shared, insertion-ordered table of address rows
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    rows: Arc<Mutex<Vec<AddressRow>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the book from stored wallets. Only balances stored for `network`
    /// are used; rows without one start as pending.
    pub fn from_records(records: &[WalletRecord], network: Network) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                let snapshot = record.balance(network).map(|balance_wei| AddressSnapshot {
                    network,
                    balance_wei,
                    tx_count: 0,
                    fetched_at: record.added_time,
                });
                AddressRow {
                    address: record.address,
                    name: Some(record.name.clone()),
                    status: match snapshot {
                        Some(_) => RowStatus::Success,
                        None => RowStatus::Pending,
                    },
                    snapshot,
                }
            })
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    /// Add a pending row. Returns false when the address is already tracked.
    pub async fn insert_pending(&self, address: Address, name: Option<String>) -> bool {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|r| r.address == address) {
            return false;
        }
        rows.push(AddressRow {
            address,
            name,
            status: RowStatus::Pending,
            snapshot: None,
        });
        true
    }

    /// Reset the given rows to pending. Unknown addresses are ignored.
    pub async fn mark_pending(&self, addresses: &[Address]) {
        let mut rows = self.rows.lock().await;
        for row in rows.iter_mut().filter(|r| addresses.contains(&r.address)) {
            row.status = RowStatus::Pending;
        }
    }

    pub async fn apply_success(&self, address: Address, snapshot: AddressSnapshot) {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|r| r.address == address) {
            row.status = RowStatus::Success;
            row.snapshot = Some(snapshot);
        }
    }

    pub async fn apply_error(&self, address: Address, reason: impl Into<String>) {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|r| r.address == address) {
            row.status = RowStatus::Error(reason.into());
        }
    }

    pub async fn get(&self, address: &Address) -> Option<AddressRow> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|r| &r.address == address)
            .cloned()
    }

    /// Snapshot copy of all rows
    pub async fn rows(&self) -> Vec<AddressRow> {
        self.rows.lock().await.clone()
    }
}

/// Outcome of one address in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub address: Address,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub reports: Vec<RefreshReport>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Track `entries` and fetch their state. Addresses already in the book are
/// refreshed instead of duplicated.
pub async fn batch_add(
    book: &AddressBook,
    fetcher: Arc<dyn AddressFetcher>,
    entries: Vec<AddressEntry>,
    concurrency: usize,
) -> Result<BatchSummary> {
    let queue = progress_queue(concurrency, "add")?;

    let mut addresses = Vec::with_capacity(entries.len());
    for entry in entries {
        if addresses.contains(&entry.address) {
            continue;
        }
        if !book.insert_pending(entry.address, entry.name).await {
            book.mark_pending(&[entry.address]).await;
        }
        addresses.push(entry.address);
    }

    run_fetches(book, fetcher, addresses, &queue).await
}

/// Re-fetch the selected addresses
pub async fn batch_refresh(
    book: &AddressBook,
    fetcher: Arc<dyn AddressFetcher>,
    addresses: &[Address],
    concurrency: usize,
) -> Result<BatchSummary> {
    if addresses.is_empty() {
        return Err(Error::InvalidInput("no addresses selected".to_string()));
    }
    let queue = progress_queue(concurrency, "refresh")?;

    let mut selected: Vec<Address> = Vec::with_capacity(addresses.len());
    for address in addresses {
        if !selected.contains(address) {
            book.insert_pending(*address, None).await;
            selected.push(*address);
        }
    }
    book.mark_pending(&selected).await;

    run_fetches(book, fetcher, selected, &queue).await
}

/// Copy fetched balances into stored wallet records. Returns the number of
/// records updated.
pub async fn sync_balances(book: &AddressBook, store: &dyn WalletStore) -> Result<usize> {
    let mut updated = Vec::new();
    for row in book.rows().await {
        let Some(snapshot) = row.snapshot else {
            continue;
        };
        if let Some(mut record) = store.get_wallet(&row.address).await? {
            if record.balance(snapshot.network) != Some(snapshot.balance_wei) {
                record
                    .balances
                    .insert(snapshot.network, snapshot.balance_wei);
                updated.push(record);
            }
        }
    }

    let count = updated.len();
    if count > 0 {
        store.put_wallets(updated).await?;
    }
    Ok(count)
}

fn progress_queue(concurrency: usize, flow: &'static str) -> Result<TaskQueue> {
    Ok(TaskQueue::new(concurrency)?.with_progress(move |p| {
        tracing::info!(flow, completed = p.completed, total = p.total, "Batch progress");
    }))
}

async fn run_fetches(
    book: &AddressBook,
    fetcher: Arc<dyn AddressFetcher>,
    addresses: Vec<Address>,
    queue: &TaskQueue,
) -> Result<BatchSummary> {
    let tasks: Vec<_> = addresses
        .iter()
        .map(|&address| {
            let book = book.clone();
            let fetcher = fetcher.clone();
            move || async move {
                match fetcher.fetch(address).await {
                    Ok(snapshot) => {
                        book.apply_success(address, snapshot).await;
                        Ok(())
                    }
                    Err(e) => {
                        book.apply_error(address, e.to_string()).await;
                        Err(e)
                    }
                }
            }
        })
        .collect();

    let results = queue.run(tasks).await;

    let mut summary = BatchSummary {
        total: addresses.len(),
        ..Default::default()
    };
    for (address, outcome) in addresses.into_iter().zip(results) {
        let error = match outcome {
            Ok(()) => None,
            Err(TaskFailure::Failed(e)) => Some(e.to_string()),
            Err(failure @ TaskFailure::Panicked(_)) => {
                let reason = failure.to_string();
                book.apply_error(address, reason.clone()).await;
                Some(reason)
            }
        };
        if error.is_none() {
            summary.succeeded += 1;
        } else {
            tracing::warn!(%address, error = ?error, "Address fetch failed");
        }
        summary.reports.push(RefreshReport {
            address,
            success: error.is_none(),
            error,
        });
    }

    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        network = %fetcher.network(),
        "Batch finished"
    );
    Ok(summary)
}
