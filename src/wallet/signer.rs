//! Secure wallet implementation
//!
//! SECURITY: private key material lives only inside alloy's `PrivateKeySigner`.
//! - Keys are never serialized
//! - Keys are never logged (`Debug` is redacted)
//! - The caller's `SecretString` is read once and not copied elsewhere

use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

/// Wallet built from an unlocked private key
pub struct SecureWallet {
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy integration
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from a hex-encoded private key, `0x` prefix optional
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        let signer = parse_signer(key)?;
        let address = signer.address();

        Ok(Self {
            address,
            wallet: EthereumWallet::from(signer),
        })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the address as a checksummed string
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Get a reference to the EthereumWallet for use with alloy providers
    ///
    /// EthereumWallet only exposes signing operations, not the raw key.
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

/// Derive the address a private key controls without keeping the signer
pub fn derive_address(key: &SecretString) -> Result<Address> {
    Ok(parse_signer(key)?.address())
}

fn parse_signer(key: &SecretString) -> Result<PrivateKeySigner> {
    let raw = key.expose_secret().trim();
    let key_hex = raw.strip_prefix("0x").unwrap_or(raw);

    // The parse error text is generic and never echoes the input
    key_hex
        .parse::<PrivateKeySigner>()
        .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
