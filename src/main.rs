//! Aegis sentinel.
//!
//! Watches EIP-7702 delegated wallets, audits every transaction they send
//! with a risk oracle, and records the verdict on-chain, freezing the wallet
//! when the verdict is UNSAFE.
//!
//! # Architecture Overview
//!
//! ```text
//!     ┌──────────────────────────────── SENTINEL ────────────────────────────────┐
//!     │                                                                          │
//!     │  ┌──────────┐   tick    ┌──────────┐  classify  ┌──────────┐             │
//!     │  │ monitor  │──────────▶│  state   │            │  oracle  │             │
//!     │  │  worker  │──────────────────────────────────▶│ http/mock│             │
//!     │  └────┬─────┘           └──────────┘            └──────────┘             │
//!     │       │ note / freeze                                ▲                   │
//!     │       ▼                                              │ scan, precheck    │
//!     │  ┌──────────┐   sign    ┌──────────┐          ┌──────┴─────┐             │
//!     │  │contracts │──────────▶│blockchain│◀─────────│   audit    │◀── CLI      │
//!     │  │reg/guard │           │ rpc/codec│          │orchestrator│             │
//!     │  └──────────┘           └────┬─────┘          └────────────┘             │
//!     └──────────────────────────────┼───────────────────────────────────────────┘
//!                                    ▼
//!                               JSON-RPC node
//! ```

use std::path::{Path, PathBuf};

use aegis_sentinel::audit::{ApplyMode, AuditApplyRequest, PrecheckRequest};
use aegis_sentinel::config::loader::read_config;
use aegis_sentinel::config::validation::validate_config;
use aegis_sentinel::config::{ConfigError, SentinelConfig};
use aegis_sentinel::lifecycle::{initialize, wait_for_shutdown_signal, Shutdown};
use aegis_sentinel::observability::{logging, metrics};
use alloy::primitives::{Address, B256};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "aegis-sentinel")]
#[command(about = "EIP-7702 wallet guard: chain monitor and audit orchestrator", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "sentinel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chain monitor until interrupted (default)
    Run,
    /// Classify an implementation and publish the verdict
    Scan {
        #[arg(long)]
        chain_id: u64,
        #[arg(long)]
        impl_address: Address,
    },
    /// Audit a new implementation for a wallet and print the call template
    AuditApply {
        #[arg(long)]
        chain_id: u64,
        #[arg(long)]
        wallet: Address,
        #[arg(long)]
        new_impl: Address,
        #[arg(long, default_value = "swap", value_parser = ["init", "swap"])]
        mode: String,
    },
    /// Assess a pending transaction given as a JSON request
    Precheck {
        #[arg(long)]
        request: String,
    },
    /// Watch a wallet from the next block
    Watch {
        #[arg(long)]
        chain_id: u64,
        #[arg(long)]
        wallet: Address,
    },
    /// Stop watching a wallet
    Unwatch {
        #[arg(long)]
        chain_id: u64,
        #[arg(long)]
        wallet: Address,
    },
    /// List watched wallets
    Watchlist {
        #[arg(long)]
        chain_id: u64,
    },
    /// Read the audit note of a wallet transaction
    TxNote {
        #[arg(long)]
        chain_id: u64,
        #[arg(long)]
        wallet: Address,
        #[arg(long)]
        tx_hash: B256,
    },
}

/// One-shot commands never start the worker, so its chain list is not
/// checked for them.
fn load(path: &Path, worker_enabled: bool) -> Result<SentinelConfig, ConfigError> {
    let mut config = if path.exists() {
        read_config(path)?
    } else {
        SentinelConfig::default()
    };
    config.worker.enabled &= worker_enabled;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    let config = load(&cli.config, matches!(command, Commands::Run))?;
    logging::init(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        chains = ?config.chains.iter().map(|c| c.chain_id).collect::<Vec<_>>(),
        "aegis-sentinel v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let components = initialize(&config)?;
    let orchestrator = components.orchestrator;

    match command {
        Commands::Run => {
            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => {
                        if let Err(e) = metrics::init_metrics(addr) {
                            tracing::error!(error = %e, "Failed to start metrics exporter");
                        }
                    }
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let Some(monitor) = components.monitor else {
                tracing::warn!("Worker disabled; nothing to run");
                return Ok(());
            };

            let shutdown = Shutdown::new();
            let handle = monitor.spawn(&shutdown);

            wait_for_shutdown_signal().await;
            if !handle.stop().await {
                tracing::warn!("Monitor did not stop cleanly");
            }
            tracing::info!("Shutdown complete");
        }
        Commands::Scan { chain_id, impl_address } => {
            print_json(&orchestrator.scan(chain_id, impl_address).await?)?;
        }
        Commands::AuditApply {
            chain_id,
            wallet,
            new_impl,
            mode,
        } => {
            let request = AuditApplyRequest {
                chain_id,
                wallet,
                new_impl_address: new_impl,
                mode: if mode == "init" { ApplyMode::Init } else { ApplyMode::Swap },
            };
            print_json(&orchestrator.audit_apply(&request).await?)?;
        }
        Commands::Precheck { request } => {
            let request: PrecheckRequest = serde_json::from_str(&request)?;
            print_json(&orchestrator.precheck(&request).await?)?;
        }
        Commands::Watch { chain_id, wallet } => {
            print_json(&orchestrator.watch_wallet(chain_id, wallet).await?)?;
        }
        Commands::Unwatch { chain_id, wallet } => {
            let removed = orchestrator.unwatch_wallet(chain_id, wallet)?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Commands::Watchlist { chain_id } => {
            print_json(&orchestrator.list_watch(chain_id)?)?;
        }
        Commands::TxNote {
            chain_id,
            wallet,
            tx_hash,
        } => {
            print_json(&orchestrator.tx_note(chain_id, wallet, tx_hash).await?)?;
        }
    }

    Ok(())
}
