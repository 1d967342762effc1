//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::config::schema::SentinelConfig;
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Deployments file {path}: {message}")]
    Deployments { path: PathBuf, message: String },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        "ConfigError"
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a TOML configuration without touching the filesystem further.
///
/// Without an explicit `worker.chain_ids`, the worker watches every
/// configured `[[chains]]` entry.
pub fn parse_config(content: &str) -> Result<SentinelConfig, ConfigError> {
    let raw: toml::Table = content.parse()?;
    let explicit_workers = raw
        .get("worker")
        .and_then(|worker| worker.get("chain_ids"))
        .is_some();
    let mut config: SentinelConfig = raw.try_into()?;
    if !explicit_workers {
        config.worker.chain_ids = config.chains.iter().map(|c| c.chain_id).collect();
    }
    Ok(config)
}

/// Load and fill in deployment addresses. Callers validate once their
/// overrides are applied.
pub fn read_config(path: &Path) -> Result<SentinelConfig, ConfigError> {
    let mut config = parse_config(&read(path)?)?;
    resolve_deployments(&mut config)?;
    Ok(config)
}

/// Load, fill in deployment addresses, and validate.
pub fn load_config(path: &Path) -> Result<SentinelConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Contract addresses published by a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployments {
    pub chain_id: u64,
    pub registry: Address,
    pub guard: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentsFile {
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    contracts: std::collections::HashMap<String, DeployedContract>,
}

#[derive(Deserialize)]
struct DeployedContract {
    #[serde(default)]
    address: Option<Address>,
}

const REGISTRY_CONTRACT: &str = "ImplSafetyRegistry";
const GUARD_CONTRACT: &str = "AegisGuardDelegator";

/// Read a deployment manifest
/// (`{chainId, contracts: {ImplSafetyRegistry: {address}, AegisGuardDelegator: {address}}}`).
/// A manifest without `chainId` is taken to belong to `chain_id`.
pub fn load_deployments(path: &Path, chain_id: u64) -> Result<Deployments, ConfigError> {
    let deployments_error = |message: String| ConfigError::Deployments {
        path: path.to_path_buf(),
        message,
    };

    let file: DeploymentsFile =
        serde_json::from_str(&read(path)?).map_err(|e| deployments_error(e.to_string()))?;

    let address = |name: &str| {
        file.contracts
            .get(name)
            .and_then(|c| c.address)
            .ok_or_else(|| deployments_error(format!("missing contract address for {}", name)))
    };

    Ok(Deployments {
        chain_id: file.chain_id.unwrap_or(chain_id),
        registry: address(REGISTRY_CONTRACT)?,
        guard: address(GUARD_CONTRACT)?,
    })
}

/// Fill `registry` / `guard` of every chain from its deployments file.
/// Addresses set explicitly in the config win.
pub fn resolve_deployments(config: &mut SentinelConfig) -> Result<(), ConfigError> {
    for chain in &mut config.chains {
        let Some(path) = chain.deployments_file.clone() else {
            continue;
        };
        let deployments = load_deployments(&path, chain.chain_id)?;
        if deployments.chain_id != chain.chain_id {
            return Err(ConfigError::Deployments {
                path,
                message: format!(
                    "manifest is for chain {}, configured for chain {}",
                    deployments.chain_id, chain.chain_id
                ),
            });
        }
        chain.registry.get_or_insert(deployments.registry);
        chain.guard.get_or_insert(deployments.guard);
        tracing::debug!(
            chain_id = chain.chain_id,
            registry = ?chain.registry,
            guard = ?chain.guard,
            "Deployment addresses resolved"
        );
    }
    Ok(())
}
