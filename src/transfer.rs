//! Batch native-token sweeps
//!
//! Each transfer pair sends everything above a reserve (and the gas cost) from
//! a stored hot wallet to a destination. Keys are decrypted inside the task
//! that signs and dropped with it.

use crate::config::{Config, Network, RpcConfig};
use crate::queue::{TaskFailure, TaskQueue};
use crate::retry::{with_retry, with_timeout, RetryPolicy};
use crate::store::{TransferPair, WalletStore};
use crate::vault::decrypt_secret_async;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::network::TransactionBuilder;
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Amounts for a single sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepPlan {
    pub balance: U256,
    pub reserve: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub gas_cost: U256,
    /// Value to send
    pub amount: U256,
}

/// Work out how much can be sent after keeping `reserve` and paying for gas
pub fn plan_sweep(balance: U256, reserve: U256, gas_price: u128, gas_limit: u64) -> Result<SweepPlan> {
    let available = balance
        .checked_sub(reserve)
        .filter(|v| !v.is_zero())
        .ok_or_else(|| Error::Transfer("insufficient balance after reserve".to_string()))?;

    let gas_cost = U256::from(gas_price).saturating_mul(U256::from(gas_limit));
    let amount = available
        .checked_sub(gas_cost)
        .filter(|v| !v.is_zero())
        .ok_or_else(|| Error::Transfer("insufficient balance after gas".to_string()))?;

    Ok(SweepPlan {
        balance,
        reserve,
        gas_price,
        gas_limit,
        gas_cost,
        amount,
    })
}

/// Parse an ether amount like `"0.01"` into wei
pub fn parse_reserve(value: &str) -> Result<U256> {
    parse_ether(value.trim())
        .map_err(|e| Error::InvalidInput(format!("invalid reserve amount {:?}: {}", value, e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// Gas actually paid, `gas_used * effective_gas_price`
    pub gas_cost: U256,
    pub success: bool,
}

/// Chain access needed by a sweep
#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn balance(&self, address: Address) -> Result<U256>;

    async fn gas_price(&self) -> Result<u128>;

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> Result<u64>;

    async fn send(
        &self,
        wallet: &SecureWallet,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<TransferReceipt>;
}

/// JSON-RPC backend for one network
#[derive(Debug, Clone)]
pub struct RpcBackend {
    chain_id: u64,
    url: Url,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RpcBackend {
    pub fn new(network: Network, rpc: &RpcConfig, config: &Config) -> Result<Self> {
        let chain_id = network.chain_id();
        let raw = rpc
            .get(chain_id)
            .ok_or_else(|| Error::Config(format!("No RPC URL configured for {}", network)))?;
        let url = raw
            .parse::<Url>()
            .map_err(|e| Error::Config(format!("Invalid RPC URL {}: {}", raw, e)))?;

        Ok(Self {
            chain_id,
            url,
            policy: RetryPolicy::from(&config.retry),
            timeout: config.fetch_timeout(),
        })
    }
}

#[async_trait]
impl TransferBackend for RpcBackend {
    async fn balance(&self, address: Address) -> Result<U256> {
        with_retry(&self.policy, || {
            with_timeout(self.timeout, async {
                let provider = ProviderBuilder::new().connect_http(self.url.clone());
                provider
                    .get_balance(address)
                    .await
                    .map_err(|e| Error::Rpc(format!("Failed to get balance: {}", e)))
            })
        })
        .await
    }

    async fn gas_price(&self) -> Result<u128> {
        with_retry(&self.policy, || {
            with_timeout(self.timeout, async {
                let provider = ProviderBuilder::new().connect_http(self.url.clone());
                provider
                    .get_gas_price()
                    .await
                    .map_err(|e| Error::Rpc(format!("Failed to get gas price: {}", e)))
            })
        })
        .await
    }

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> Result<u64> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value);

        with_retry(&self.policy, || {
            with_timeout(self.timeout, async {
                let provider = ProviderBuilder::new().connect_http(self.url.clone());
                provider
                    .estimate_gas(tx.clone())
                    .await
                    .map_err(|e| Error::Rpc(format!("Failed to estimate gas: {}", e)))
            })
        })
        .await
    }

    // Never retried: a resend after a lost response could double-spend.
    async fn send(
        &self,
        wallet: &SecureWallet,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<TransferReceipt> {
        let provider = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(self.url.clone());

        let tx = TransactionRequest::default()
            .with_from(wallet.address())
            .with_to(to)
            .with_value(value)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to send transaction: {}", e)))?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(%tx_hash, from = %wallet.address(), %to, "Transaction submitted");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| Error::Transfer(format!("Failed to get receipt for {}: {}", tx_hash, e)))?;

        Ok(TransferReceipt {
            tx_hash,
            block_number: receipt.block_number,
            gas_cost: U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price),
            success: receipt.status(),
        })
    }
}

/// Outcome of one transfer pair
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub pair_id: u64,
    pub from: Address,
    pub to: Address,
    pub amount: Option<U256>,
    pub receipt: Option<TransferReceipt>,
    pub error: Option<String>,
}

impl TransferReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferSummary {
    pub total: usize,
    pub succeeded: usize,
    pub reports: Vec<TransferReport>,
}

/// Sweep every pair through the queue.
///
/// A pair whose sender already appears earlier in the batch fails with
/// "duplicate sender in batch" instead of racing the first one for the nonce.
pub async fn batch_transfer(
    store: Arc<dyn WalletStore>,
    backend: Arc<dyn TransferBackend>,
    pairs: Vec<TransferPair>,
    password: &SecretString,
    default_reserve: U256,
    concurrency: usize,
) -> Result<TransferSummary> {
    if password.expose_secret().is_empty() {
        return Err(Error::InvalidInput("password must not be empty".to_string()));
    }
    let queue = TaskQueue::new(concurrency)?.with_progress(|p| {
        tracing::info!(completed = p.completed, total = p.total, "Transfer progress");
    });

    let password = Arc::new(SecretString::from(password.expose_secret().to_string()));
    let mut seen = HashSet::new();
    let tasks: Vec<_> = pairs
        .iter()
        .map(|pair| {
            let duplicate = !seen.insert(pair.from_address);
            let pair = pair.clone();
            let store = store.clone();
            let backend = backend.clone();
            let password = password.clone();
            move || async move {
                if duplicate {
                    return Err(Error::Transfer("duplicate sender in batch".to_string()));
                }
                sweep_pair(store.as_ref(), backend.as_ref(), &pair, password, default_reserve).await
            }
        })
        .collect();

    let results = queue.run(tasks).await;

    let mut summary = TransferSummary {
        total: pairs.len(),
        ..Default::default()
    };
    for (pair, outcome) in pairs.into_iter().zip(results) {
        let mut report = TransferReport {
            pair_id: pair.id,
            from: pair.from_address,
            to: pair.to_address,
            amount: None,
            receipt: None,
            error: None,
        };
        match outcome {
            Ok((plan, receipt)) => {
                report.amount = Some(plan.amount);
                report.receipt = Some(receipt);
                summary.succeeded += 1;
            }
            Err(failure) => {
                let reason = match failure {
                    TaskFailure::Failed(e) => e.to_string(),
                    panicked => panicked.to_string(),
                };
                tracing::warn!(pair_id = pair.id, from = %pair.from_address, error = %reason, "Transfer failed");
                report.error = Some(reason);
            }
        }
        summary.reports.push(report);
    }

    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        "Batch transfer finished"
    );
    Ok(summary)
}

async fn sweep_pair(
    store: &dyn WalletStore,
    backend: &dyn TransferBackend,
    pair: &TransferPair,
    password: Arc<SecretString>,
    default_reserve: U256,
) -> Result<(SweepPlan, TransferReceipt)> {
    let record = store
        .get_wallet(&pair.from_address)
        .await?
        .ok_or_else(|| Error::Wallet(format!("unknown wallet {}", pair.from_address)))?;
    let blob = record
        .encrypted_private_key
        .as_ref()
        .ok_or_else(|| Error::Wallet(format!("no private key stored for {}", pair.from_address)))?;

    let reserve = match &pair.reserve_eth {
        Some(value) => parse_reserve(value)?,
        None => default_reserve,
    };

    let wallet = {
        let key = decrypt_secret_async(blob.clone(), password).await?;
        SecureWallet::from_secret(&key)?
    };
    if wallet.address() != pair.from_address {
        return Err(Error::Wallet(format!(
            "stored key does not control {}",
            pair.from_address
        )));
    }

    let balance = backend.balance(pair.from_address).await?;
    let gas_price = backend.gas_price().await?;
    let estimate_value = balance.saturating_sub(reserve);
    let gas_limit = backend
        .estimate_gas(pair.from_address, pair.to_address, estimate_value)
        .await?;
    let plan = plan_sweep(balance, reserve, gas_price, gas_limit)?;

    tracing::debug!(
        pair_id = pair.id,
        amount = %plan.amount,
        gas_cost = %plan.gas_cost,
        "Sending sweep"
    );
    let receipt = backend
        .send(&wallet, pair.to_address, plan.amount, plan.gas_limit, plan.gas_price)
        .await?;
    if !receipt.success {
        return Err(Error::Transfer(format!("transaction {} reverted", receipt.tx_hash)));
    }

    Ok((plan, receipt))
}
