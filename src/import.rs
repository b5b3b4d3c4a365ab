//! Batch wallet import and address list parsing
//!
//! Bad lines are collected with their line numbers and never abort the batch.
//! Private keys supplied on import are encrypted before anything touches the
//! store.

use crate::store::{WalletRecord, WalletStore};
use crate::vault::{encrypt_secret_async, EncryptedBlob, KdfParams};
use crate::wallet::derive_address;
use crate::{Error, Result};
use alloy::primitives::Address;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A line that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number in the input
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// One `<number> <address> [private_key]` line
#[derive(Debug)]
pub struct WalletLine {
    pub line: usize,
    pub number: String,
    pub address: Address,
    pub private_key: Option<SecretString>,
}

/// One `[name...] <address>` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub name: Option<String>,
    pub address: Address,
}

/// Result of [`import_wallets`]
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<Address>,
    pub errors: Vec<LineError>,
}

/// Parse an address, accepting a missing `0x` prefix
pub fn parse_address(raw: &str) -> Result<Address> {
    let raw = raw.trim();
    let prefixed = if raw.starts_with("0x") || raw.starts_with("0X") {
        raw.to_string()
    } else {
        format!("0x{}", raw)
    };
    if prefixed.len() != 42 {
        return Err(Error::InvalidInput(format!("invalid address: {}", raw)));
    }
    Address::from_str(&prefixed).map_err(|_| Error::InvalidInput(format!("invalid address: {}", raw)))
}

/// Parse wallet import lines: `<number> <address> [private_key]`
pub fn parse_wallet_lines(text: &str) -> (Vec<WalletLine>, Vec<LineError>) {
    let mut lines = Vec::new();
    let mut errors = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 2 || parts.len() > 3 {
            errors.push(LineError {
                line,
                reason: "expected `<number> <address> [private_key]`".to_string(),
            });
            continue;
        }

        match parse_address(parts[1]) {
            Ok(address) => lines.push(WalletLine {
                line,
                number: parts[0].to_string(),
                address,
                private_key: parts.get(2).map(|k| SecretString::from(k.to_string())),
            }),
            Err(e) => errors.push(LineError {
                line,
                reason: e.to_string(),
            }),
        }
    }

    (lines, errors)
}

/// Parse address list lines: `[name...] <address>`; the last token is the address
pub fn parse_address_lines(text: &str) -> (Vec<AddressEntry>, Vec<LineError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let parts: Vec<&str> = raw.split_whitespace().collect();
        let Some((last, rest)) = parts.split_last() else {
            continue;
        };

        match parse_address(last) {
            Ok(address) => entries.push(AddressEntry {
                name: (!rest.is_empty()).then(|| rest.join(" ")),
                address,
            }),
            Err(e) => errors.push(LineError {
                line,
                reason: e.to_string(),
            }),
        }
    }

    (entries, errors)
}

/// Import wallets from `text` into `store`.
///
/// Each supplied key must derive the address on its line; it is encrypted
/// under `password` right away. Existing wallets keep their display order,
/// name, balances and stored key unless the line brings a new key.
pub async fn import_wallets(
    store: &dyn WalletStore,
    text: &str,
    password: &SecretString,
    kdf: &KdfParams,
) -> Result<ImportReport> {
    if password.expose_secret().is_empty() {
        return Err(Error::InvalidInput("password must not be empty".to_string()));
    }

    let password = Arc::new(SecretString::from(password.expose_secret().to_string()));
    let (lines, mut errors) = parse_wallet_lines(text);
    let existing = store.all_wallets().await?;
    let mut next_index = existing
        .iter()
        .map(|w| w.order_index + 1)
        .max()
        .unwrap_or(0);

    let mut records = Vec::with_capacity(lines.len());
    for entry in lines {
        let encrypted = match &entry.private_key {
            None => None,
            Some(key) => match seal_key(key, entry.address, &password, kdf).await {
                Ok(blob) => Some(blob),
                Err(e) => {
                    tracing::warn!(line = entry.line, address = %entry.address, error = %e, "Skipping wallet line");
                    errors.push(LineError {
                        line: entry.line,
                        reason: e.to_string(),
                    });
                    continue;
                }
            },
        };

        let previous = existing.iter().find(|w| w.address == entry.address);
        let order_index = match previous {
            Some(w) => w.order_index,
            None => {
                next_index += 1;
                next_index - 1
            }
        };

        records.push(match previous {
            Some(w) => WalletRecord {
                encrypted_private_key: encrypted.or_else(|| w.encrypted_private_key.clone()),
                ..w.clone()
            },
            None => WalletRecord {
                address: entry.address,
                name: format!("Wallet {}", entry.number),
                encrypted_private_key: encrypted,
                balances: Default::default(),
                order_index,
                added_time: Utc::now(),
            },
        });
    }

    let imported: Vec<Address> = records.iter().map(|r| r.address).collect();
    if !records.is_empty() {
        store.put_wallets(records).await?;
    }

    tracing::info!(
        imported = imported.len(),
        failed = errors.len(),
        "Wallet import finished"
    );

    Ok(ImportReport { imported, errors })
}

async fn seal_key(
    key: &SecretString,
    address: Address,
    password: &Arc<SecretString>,
    kdf: &KdfParams,
) -> Result<EncryptedBlob> {
    let derived = derive_address(key)?;
    if derived != address {
        return Err(Error::InvalidInput(format!(
            "private key does not control {}",
            address
        )));
    }
    let key = SecretString::from(key.expose_secret().to_string());
    encrypt_secret_async(key, Arc::clone(password), *kdf).await
}
