//! Signing handle for unlocked keys
//!
//! A `SecureWallet` only exists while a transfer is being signed. It is built
//! from a key the vault just decrypted and dropped with the task that used it.

mod signer;

pub use signer::{derive_address, SecureWallet};
