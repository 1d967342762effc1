//! Startup orchestration.
//!
//! # Responsibilities
//! - Build per-chain RPC and contract clients from validated config
//! - Load role keys from the environment
//! - Assemble the chain monitor and the audit orchestrator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A missing publisher key disables registry writes instead of startup
//! - The monitor needs the sentinel key; without it startup fails when the
//!   worker is enabled

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use thiserror::Error;

use crate::audit::AuditOrchestrator;
use crate::blockchain::rpc::RpcClient;
use crate::blockchain::transaction::TxSigner;
use crate::blockchain::types::BlockchainError;
use crate::blockchain::wallet::{KeyRole, Wallet};
use crate::config::schema::{ChainConfig, SentinelConfig};
use crate::contracts::ChainContracts;
use crate::monitor::{ChainMonitor, MonitoredChain};
use crate::oracle::{self, OracleError, RiskOracle};
use crate::state::StateStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Chain {0} is not configured")]
    MissingChain(u64),
}

/// Clients for one configured chain.
pub fn chain_contracts(chain: &ChainConfig) -> Result<ChainContracts, StartupError> {
    let rpc = RpcClient::http(&chain.rpc_url, Duration::from_secs(chain.rpc_timeout_secs))?;
    Ok(ChainContracts::new(
        chain.chain_id,
        rpc,
        chain.registry,
        chain.guard,
        Duration::from_secs(chain.receipt_timeout_secs),
    ))
}

/// Chain monitor over `config.worker.chain_ids`, signing with `sentinel`.
pub fn build_monitor(
    config: &SentinelConfig,
    store: StateStore,
    oracle: Arc<dyn RiskOracle>,
    sentinel: &Wallet,
) -> Result<ChainMonitor, StartupError> {
    let mut chains = Vec::with_capacity(config.worker.chain_ids.len());
    for chain_id in &config.worker.chain_ids {
        let chain = config.chain(*chain_id).ok_or(StartupError::MissingChain(*chain_id))?;
        let contracts = chain_contracts(chain)?;
        if contracts.registry.is_none() {
            tracing::warn!(chain_id, "No registry configured; post-audits run without implementation records");
        }
        let signer = TxSigner::new(
            contracts.rpc.clone(),
            chain.chain_id,
            sentinel.clone(),
            config.signer.clone(),
        );
        chains.push(MonitoredChain {
            contracts,
            confirmations: chain.confirmations(),
            sentinel: signer,
        });
    }

    Ok(ChainMonitor::new(chains, store, oracle)
        .with_interval(Duration::from_secs(config.worker.interval_secs))
        .with_stop_timeout(Duration::from_secs(config.worker.stop_timeout_secs))
        .with_retry_policy(oracle::retry_policy(&config.oracle)))
}

/// Audit orchestrator over every configured chain.
pub fn build_orchestrator(
    config: &SentinelConfig,
    store: StateStore,
    oracle: Arc<dyn RiskOracle>,
    publisher: Option<Wallet>,
    sentinel_address: Address,
) -> Result<AuditOrchestrator, StartupError> {
    let mut orchestrator = AuditOrchestrator::new(store, oracle)
        .with_sentinel_address(sentinel_address)
        .with_signer_config(config.signer.clone())
        .with_retry_policy(oracle::retry_policy(&config.oracle));
    if let Some(wallet) = publisher {
        orchestrator = orchestrator.with_publisher(wallet);
    }
    for chain in &config.chains {
        orchestrator = orchestrator.with_chain(chain_contracts(chain)?);
    }
    Ok(orchestrator)
}

/// Everything `main` runs.
pub struct Components {
    pub orchestrator: AuditOrchestrator,
    /// Absent when the worker is disabled.
    pub monitor: Option<ChainMonitor>,
}

/// Build all components from validated config and the role keys in the
/// environment.
pub fn initialize(config: &SentinelConfig) -> Result<Components, StartupError> {
    let store = StateStore::from_config(&config.state);
    let oracle = oracle::from_config(&config.oracle)?;
    tracing::info!(provider = oracle.name(), "Risk oracle ready");

    let sentinel = if config.worker.enabled {
        Some(Wallet::from_env(KeyRole::Sentinel)?)
    } else {
        Wallet::from_env_optional(KeyRole::Sentinel)?
    };
    let publisher = Wallet::from_env_optional(KeyRole::Publisher)?;
    if publisher.is_none() {
        tracing::warn!(env = KeyRole::Publisher.env_var(), "Publisher key not set; registry writes disabled");
    }

    let sentinel_address = config
        .sentinel_address
        .or_else(|| sentinel.as_ref().map(Wallet::address))
        .unwrap_or(Address::ZERO);

    let orchestrator = build_orchestrator(config, store.clone(), oracle.clone(), publisher, sentinel_address)?;

    let monitor = match &sentinel {
        Some(wallet) if config.worker.enabled => {
            tracing::info!(sentinel = %wallet.address(), "Sentinel key loaded");
            Some(build_monitor(config, store, oracle, wallet)?)
        }
        _ => None,
    };

    Ok(Components { orchestrator, monitor })
}
