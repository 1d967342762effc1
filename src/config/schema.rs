//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sentinel.
//! All types derive Serde traits for deserialization from config files.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::blockchain::types::{LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};

/// One gwei in wei.
pub const GWEI: u64 = 1_000_000_000;

/// Root configuration for the sentinel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Background monitor settings.
    pub worker: WorkerConfig,

    /// Per-chain endpoints and contract addresses.
    pub chains: Vec<ChainConfig>,

    /// Transaction building and submission.
    pub signer: SignerConfig,

    /// Watchlist / cursor files.
    pub state: StateConfig,

    /// Risk oracle provider.
    pub oracle: OracleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Sentinel address placed into `aegis_init` templates. Derived from
    /// `SENTINEL_PK` when absent.
    pub sentinel_address: Option<Address>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            chains: vec![
                ChainConfig::new(LOCAL_CHAIN_ID, "http://127.0.0.1:8545"),
                ChainConfig::new(SEPOLIA_CHAIN_ID, "https://ethereum-sepolia-rpc.publicnode.com"),
            ],
            signer: SignerConfig::default(),
            state: StateConfig::default(),
            oracle: OracleConfig::default(),
            observability: ObservabilityConfig::default(),
            sentinel_address: None,
        }
    }
}

impl SentinelConfig {
    /// Chain section for `chain_id`, if configured.
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// Chain monitor loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run the monitor at all.
    pub enabled: bool,

    /// Seconds slept between complete ticks.
    pub interval_secs: u64,

    /// Chains ticked, in order.
    pub chain_ids: Vec<u64>,

    /// Bounded join when stopping the worker.
    pub stop_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            chain_ids: vec![LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID],
            stop_timeout_secs: 5,
        }
    }
}

/// A single chain the sentinel talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub chain_id: u64,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Blocks withheld from processing. Chain-specific default when absent.
    #[serde(default)]
    pub confirmations: Option<u64>,

    /// Verdict registry contract.
    #[serde(default)]
    pub registry: Option<Address>,

    /// Guard implementation (expected delegate of watched wallets).
    #[serde(default)]
    pub guard: Option<Address>,

    /// Deployment manifest used to fill in `registry` / `guard`.
    #[serde(default)]
    pub deployments_file: Option<PathBuf>,

    /// Per-request RPC timeout.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// How long contract writes wait for a receipt.
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_receipt_timeout() -> u64 {
    180
}

impl ChainConfig {
    /// Minimal section for `chain_id` at `rpc_url`.
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            confirmations: None,
            registry: None,
            guard: None,
            deployments_file: None,
            rpc_timeout_secs: default_rpc_timeout(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }

    /// Effective confirmation depth.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
            .unwrap_or_else(|| default_confirmations(self.chain_id))
    }
}

/// Public chains keep a reorg margin; local chains process the tip.
pub fn default_confirmations(chain_id: u64) -> u64 {
    if chain_id == SEPOLIA_CHAIN_ID {
        2
    } else {
        0
    }
}

/// Transaction building and submission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Chains signed with legacy `gasPrice` transactions.
    pub legacy_chain_ids: Vec<u64>,

    /// Floor and fallback for the EIP-1559 priority fee.
    pub min_priority_fee_wei: u64,

    /// Absolute gas headroom over the estimate.
    pub gas_headroom_abs: u64,

    /// Relative gas headroom over the estimate.
    pub gas_headroom_ratio: f64,

    /// Lookups of the local hash after an ambiguous submission error.
    pub submit_recovery_attempts: u32,

    pub submit_recovery_interval_ms: u64,

    /// Fixed interval between receipt polls.
    pub receipt_poll_interval_ms: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            legacy_chain_ids: vec![LOCAL_CHAIN_ID],
            min_priority_fee_wei: GWEI,
            gas_headroom_abs: 50_000,
            gas_headroom_ratio: 1.2,
            submit_recovery_attempts: 15,
            submit_recovery_interval_ms: 100,
            receipt_poll_interval_ms: 1000,
        }
    }
}

/// Persisted state locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding `watchlist.json` and `cursor.json`.
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("server_state"),
        }
    }
}

impl StateConfig {
    pub fn watchlist_path(&self) -> PathBuf {
        self.dir.join("watchlist.json")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.dir.join("cursor.json")
    }
}

/// Which risk oracle backs classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Remote classification service.
    Http,
    /// Deterministic local classifier.
    #[default]
    Mock,
}

/// Risk oracle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,

    /// Classification endpoint (required for `http`).
    pub endpoint: Option<String>,

    /// Bearer token env var for the endpoint, if any.
    pub api_key_env: Option<String>,

    pub timeout_secs: u64,

    /// Requests per classification before giving up on invalid output.
    pub max_attempts: u32,

    /// Base delay for exponential backoff (milliseconds).
    pub backoff_base_ms: u64,

    /// Maximum backoff delay (milliseconds).
    pub backoff_max_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::Mock,
            endpoint: None,
            api_key_env: None,
            timeout_secs: 60,
            max_attempts: 2,
            backoff_base_ms: 250,
            backoff_max_ms: 4000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter, overridden by `RUST_LOG`.
    pub log_level: String,

    /// `json` or `pretty`.
    pub log_format: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
