//! Multi-chain Wallet Batch Core
//!
//! Batch operations over many EVM addresses and hot wallets:
//! - Bounded-concurrency task queue with per-task outcomes
//! - Password-based encryption of private keys at rest
//! - Batch import, balance refresh and ETH sweeps across supported networks
//!
//! # Security Model
//!
//! - Private keys are stored only as `enc1:` blobs (Argon2id + AES-256-GCM)
//! - Decrypted keys exist only inside the task that signs with them
//! - Wrong passwords and corrupted blobs fail the same way

pub mod config;
pub mod import;
pub mod queue;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod transfer;
pub mod vault;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig, WALLET_PASSWORD_ENV};
pub use error::{Error, Result};
pub use queue::{run_queue, Progress, TaskFailure, TaskQueue, TaskResult};
pub use vault::{decrypt_secret, encrypt_secret, EncryptedBlob};
