//! Wallet Batch CLI
//!
//! Command-line interface for batch wallet import, balance refresh and sweeps.

use alloy::primitives::{utils::format_ether, Address, U256};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wallet_batch::import::{import_wallets, parse_address, parse_address_lines};
use wallet_batch::refresh::{batch_add, batch_refresh, sync_balances, AddressBook, RpcFetcher};
use wallet_batch::store::{JsonFileStore, NetworkEntry, NewTransferPair, WalletRecord, WalletStore};
use wallet_batch::transfer::{batch_transfer, parse_reserve, RpcBackend};
use wallet_batch::{Config, Error, Network, Result, RpcConfig, WALLET_PASSWORD_ENV};

#[derive(Parser)]
#[command(name = "wallet-batch")]
#[command(about = "Batch wallet import, balance refresh and ETH sweeps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import wallets from `<number> <address> [private_key]` lines
    Import {
        /// Input file
        #[arg(short, long)]
        file: PathBuf,

        /// Vault password (defaults to $WALLET_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },

    /// Track addresses from `[name] <address>` lines and fetch their state
    Add {
        /// Input file
        #[arg(short, long)]
        file: PathBuf,

        /// Network (ethereum, scroll, linea, zksync, base)
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// Re-fetch balances of stored wallets
    Refresh {
        /// Addresses to refresh (defaults to every stored wallet)
        #[arg(value_parser = address_arg)]
        addresses: Vec<Address>,

        /// Network (ethereum, scroll, linea, zksync, base)
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// List stored wallets
    List,

    /// Register a sweep from a stored wallet to a destination
    PairAdd {
        #[arg(long, value_parser = address_arg)]
        from: Address,

        #[arg(long, value_parser = address_arg)]
        to: Address,

        /// ETH to leave behind, e.g. 0.001
        #[arg(long)]
        reserve: Option<String>,
    },

    /// Sweep ETH for every registered pair
    Transfer {
        /// Only pairs sending from this address
        #[arg(long, value_parser = address_arg)]
        from: Option<Address>,

        /// Default ETH to leave behind when a pair sets none
        #[arg(long, default_value = "0")]
        reserve: String,

        /// Network (ethereum, scroll, linea, zksync, base)
        #[arg(short, long)]
        network: Option<Network>,

        /// Vault password (defaults to $WALLET_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },

    /// Override the RPC endpoint of a network
    NetworkSet {
        network: Network,

        #[arg(long)]
        url: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load config
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let store = Arc::new(JsonFileStore::open(&config.store_path).await?);
    tracing::debug!(path = %store.path().display(), "Opened wallet store");

    match cli.command {
        Commands::Import { file, password } => {
            let text = read_input(&file).await?;
            let password = resolve_password(password)?;
            let report = import_wallets(store.as_ref(), &text, &password, &config.kdf).await?;

            println!("Imported {} wallet(s)", report.imported.len());
            for error in &report.errors {
                println!("  skipped {}", error);
            }
        }
        Commands::Add { file, network } => {
            let network = network.unwrap_or(config.default_network);
            let text = read_input(&file).await?;
            let (entries, errors) = parse_address_lines(&text);
            for error in &errors {
                println!("  skipped {}", error);
            }

            let mut next_index = next_order_index(store.as_ref()).await?;
            let mut added = Vec::new();
            for entry in &entries {
                if store.get_wallet(&entry.address).await?.is_none() {
                    let name = entry
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Address {}", next_index + 1));
                    added.push(WalletRecord::watch_only(entry.address, name, next_index));
                    next_index += 1;
                }
            }
            if !added.is_empty() {
                store.put_wallets(added).await?;
            }

            let rpc = rpc_config(store.as_ref()).await?;
            let fetcher = Arc::new(RpcFetcher::new(network, &rpc, &config)?);
            let book = AddressBook::from_records(&store.all_wallets().await?, network);
            let summary = batch_add(&book, fetcher, entries, config.concurrency).await?;
            sync_balances(&book, store.as_ref()).await?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Refresh { addresses, network } => {
            let network = network.unwrap_or(config.default_network);
            let records = store.all_wallets().await?;
            let addresses = if addresses.is_empty() {
                records.iter().map(|r| r.address).collect()
            } else {
                addresses
            };

            let rpc = rpc_config(store.as_ref()).await?;
            let fetcher = Arc::new(RpcFetcher::new(network, &rpc, &config)?);
            let book = AddressBook::from_records(&records, network);
            let summary = batch_refresh(&book, fetcher, &addresses, config.concurrency).await?;
            let updated = sync_balances(&book, store.as_ref()).await?;

            println!(
                "Refreshed {}/{} address(es) on {}, {} balance(s) changed",
                summary.succeeded, summary.total, network, updated
            );
            for report in summary.reports.iter().filter(|r| !r.success) {
                println!(
                    "  {} failed: {}",
                    report.address,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::List => {
            for record in store.all_wallets().await? {
                let balance = if record.balances.is_empty() {
                    "-".to_string()
                } else {
                    record
                        .balances
                        .iter()
                        .map(|(network, wei)| format!("{}: {} ETH", network, format_ether(*wei)))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let kind = if record.has_key() { "hot" } else { "watch" };
                println!(
                    "{:>4}  {}  {:<6} {:<20} {}",
                    record.order_index, record.address, kind, record.name, balance
                );
            }
        }
        Commands::PairAdd { from, to, reserve } => {
            if let Some(value) = &reserve {
                parse_reserve(value)?;
            }
            let pair = store
                .add_transfer_pair(NewTransferPair {
                    from_address: from,
                    to_address: to,
                    reserve_eth: reserve,
                })
                .await?;
            println!("Added transfer pair #{}: {} -> {}", pair.id, pair.from_address, pair.to_address);
        }
        Commands::Transfer {
            from,
            reserve,
            network,
            password,
        } => {
            let network = network.unwrap_or(config.default_network);
            let password = resolve_password(password)?;
            let default_reserve = parse_reserve(&reserve)?;
            let pairs = match from {
                Some(address) => store.transfer_pairs(&address).await?,
                None => store.all_transfer_pairs().await?,
            };
            if pairs.is_empty() {
                println!("No transfer pairs configured");
                return Ok(());
            }

            let rpc = rpc_config(store.as_ref()).await?;
            let backend = Arc::new(RpcBackend::new(network, &rpc, &config)?);
            tracing::info!(pairs = pairs.len(), %network, "Starting batch transfer");

            let summary = batch_transfer(
                store.clone(),
                backend,
                pairs,
                &password,
                default_reserve,
                config.concurrency,
            )
            .await?;

            for report in &summary.reports {
                match (&report.receipt, &report.error) {
                    (Some(receipt), _) => println!(
                        "#{} {} -> {}: sent {} ETH in {}",
                        report.pair_id,
                        report.from,
                        report.to,
                        format_ether(report.amount.unwrap_or(U256::ZERO)),
                        receipt.tx_hash
                    ),
                    (None, error) => println!(
                        "#{} {} -> {}: FAILED {}",
                        report.pair_id,
                        report.from,
                        report.to,
                        error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            println!("{}/{} transfer(s) succeeded", summary.succeeded, summary.total);
        }
        Commands::NetworkSet { network, url } => {
            url.parse::<url::Url>()
                .map_err(|e| Error::InvalidInput(format!("Invalid RPC URL {}: {}", url, e)))?;
            store
                .put_network(NetworkEntry {
                    chain_id: network.chain_id(),
                    name: network.name().to_string(),
                    rpc_url: url,
                })
                .await?;
            println!("RPC for {} updated", network);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn address_arg(raw: &str) -> std::result::Result<Address, String> {
    parse_address(raw).map_err(|e| e.to_string())
}

async fn read_input(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))
}

fn resolve_password(flag: Option<String>) -> Result<SecretString> {
    let password = match flag {
        Some(value) => value,
        None => std::env::var(WALLET_PASSWORD_ENV).map_err(|_| {
            Error::InvalidInput(format!("pass --password or set {}", WALLET_PASSWORD_ENV))
        })?,
    };
    Ok(SecretString::from(password))
}

/// Environment RPCs with stored network overrides on top
async fn rpc_config(store: &dyn WalletStore) -> Result<RpcConfig> {
    let mut rpc = RpcConfig::from_env();
    for entry in store.networks().await? {
        tracing::debug!(chain_id = entry.chain_id, name = %entry.name, "Using stored RPC override");
        rpc.set(entry.chain_id, entry.rpc_url);
    }
    Ok(rpc)
}

async fn next_order_index(store: &dyn WalletStore) -> Result<u64> {
    Ok(store
        .all_wallets()
        .await?
        .iter()
        .map(|w| w.order_index + 1)
        .max()
        .unwrap_or(0))
}
