//! RPC endpoint configuration
//!
//! Resolution order per chain:
//! 1. Per-chain env vars (ETH_RPC_URL, SCROLL_RPC_URL, ...) - highest priority
//! 2. Public RPC fallbacks - rate limited, for light use only
//!
//! # Examples
//!
//! ```bash
//! export SCROLL_RPC_URL="https://scroll-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! export LINEA_RPC_URL="https://linea-mainnet.infura.io/v3/YOUR_KEY"
//! ```

use std::collections::HashMap;

/// RPC configuration for multiple chains
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID
    urls: HashMap<u64, String>,
}

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const SCROLL: u64 = 534352;
    pub const LINEA: u64 = 59144;
    pub const ZKSYNC: u64 = 324;
    pub const BASE: u64 = 8453;
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const SCROLL_RPC_URL: &str = "SCROLL_RPC_URL";
    pub const LINEA_RPC_URL: &str = "LINEA_RPC_URL";
    pub const ZKSYNC_RPC_URL: &str = "ZKSYNC_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";
}

/// Public RPC endpoints (rate limited)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const SCROLL: &str = "https://rpc.scroll.io";
    pub const LINEA: &str = "https://rpc.linea.build";
    pub const ZKSYNC: &str = "https://mainnet.era.zksync.io";
    pub const BASE: &str = "https://mainnet.base.org";
}

const CHAIN_TABLE: [(u64, &str, &str); 5] = [
    (chains::ETHEREUM, env_vars::ETH_RPC_URL, public_rpcs::ETHEREUM),
    (chains::SCROLL, env_vars::SCROLL_RPC_URL, public_rpcs::SCROLL),
    (chains::LINEA, env_vars::LINEA_RPC_URL, public_rpcs::LINEA),
    (chains::ZKSYNC, env_vars::ZKSYNC_RPC_URL, public_rpcs::ZKSYNC),
    (chains::BASE, env_vars::BASE_RPC_URL, public_rpcs::BASE),
];

impl RpcConfig {
    /// Create RPC config from environment variables, falling back to public RPCs
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        for (chain_id, var, fallback) in CHAIN_TABLE {
            match std::env::var(var) {
                Ok(url) if !url.trim().is_empty() => {
                    tracing::debug!(chain_id, "Using {} for RPC", var);
                    urls.insert(chain_id, url);
                }
                _ => {
                    tracing::debug!(
                        chain_id,
                        "No {} set, using public RPC (rate limited)",
                        var
                    );
                    urls.insert(chain_id, fallback.to_string());
                }
            }
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    /// Check if a chain is configured
    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }

    /// Override the URL of one chain, e.g. from a stored network entry
    pub fn set(&mut self, chain_id: u64, url: impl Into<String>) {
        self.urls.insert(chain_id, url.into());
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_all_chains() {
        let config = RpcConfig::from_env();

        assert!(config.has_chain(chains::ETHEREUM));
        assert!(config.has_chain(chains::SCROLL));
        assert!(config.has_chain(chains::LINEA));
        assert!(config.has_chain(chains::ZKSYNC));
        assert!(config.has_chain(chains::BASE));
    }

    #[test]
    fn test_get_returns_url() {
        let mut urls = HashMap::new();
        urls.insert(1, "https://custom.rpc".to_string());
        let mut config = RpcConfig::with_urls(urls);

        assert_eq!(config.get(1), Some("https://custom.rpc"));
        assert_eq!(config.get(999), None);

        config.set(999, "https://other.rpc");
        assert_eq!(config.get(999), Some("https://other.rpc"));
    }

    #[test]
    fn test_public_rpc_fallbacks() {
        std::env::remove_var(env_vars::LINEA_RPC_URL);

        let config = RpcConfig::from_env();

        assert_eq!(config.get(chains::LINEA), Some(public_rpcs::LINEA));
    }
}
