//! Configuration for the wallet batch core

pub mod rpc;

use crate::retry::Backoff;
use crate::vault::KdfParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable holding the vault password for non-interactive runs
pub const WALLET_PASSWORD_ENV: &str = "WALLET_PASSWORD";

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Scroll,
    Linea,
    Zksync,
    Base,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Ethereum,
        Network::Scroll,
        Network::Linea,
        Network::Zksync,
        Network::Base,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => rpc::chains::ETHEREUM,
            Network::Scroll => rpc::chains::SCROLL,
            Network::Linea => rpc::chains::LINEA,
            Network::Zksync => rpc::chains::ZKSYNC,
            Network::Base => rpc::chains::BASE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Scroll => "scroll",
            Network::Linea => "linea",
            Network::Zksync => "zksync",
            Network::Base => "base",
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ethereum" | "mainnet" | "eth" => Ok(Network::Ethereum),
            "scroll" => Ok(Network::Scroll),
            "linea" => Ok(Network::Linea),
            "zksync" | "zksync-era" | "era" => Ok(Network::Zksync),
            "base" => Ok(Network::Base),
            _ => Err(Error::InvalidInput(format!("Unknown network: {}", s))),
        }
    }
}

/// Retry settings for on-chain fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay between attempts (milliseconds)
    pub base_delay_ms: u64,
    /// Delay growth between attempts
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff: Backoff::Linear,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of fetches/transfers in flight
    pub concurrency: usize,
    /// Retry settings applied around each fetch
    #[serde(default)]
    pub retry: RetrySettings,
    /// Per-fetch timeout (milliseconds)
    pub fetch_timeout_ms: u64,
    /// Argon2id cost used when encrypting new keys
    #[serde(default)]
    pub kdf: KdfParams,
    /// Path of the wallet store document
    pub store_path: PathBuf,
    /// Network used when a command does not name one
    pub default_network: Network,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 2,
            retry: RetrySettings::default(),
            fetch_timeout_ms: 10_000, // 10 seconds
            kdf: KdfParams::default(),
            store_path: PathBuf::from("wallets.json"),
            default_network: Network::Scroll,
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the batch flows cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::Config("fetch_timeout_ms must be positive".to_string()));
        }
        self.kdf
            .validate()
            .map_err(|e| Error::Config(format!("kdf: {}", e)))?;
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
