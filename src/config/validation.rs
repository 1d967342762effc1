//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Referential integrity: every worker chain has a `[[chains]]` section
//! - Value ranges: intervals and timeouts > 0, headroom ratio >= 1
//!
//! Returns every problem found, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{OracleProvider, SentinelConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("chain {0} is listed more than once")]
    DuplicateChain(u64),

    #[error("worker chain {0} has no [[chains]] section")]
    MissingChain(u64),

    #[error("{field}: invalid URL {value:?}")]
    InvalidUrl { field: String, value: String },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

fn zero(field: impl Into<String>) -> ValidationError {
    ValidationError::Zero { field: field.into() }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

fn check_url(field: String, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &SentinelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.worker.interval_secs == 0 {
        errors.push(zero("worker.interval_secs"));
    }
    if config.worker.stop_timeout_secs == 0 {
        errors.push(zero("worker.stop_timeout_secs"));
    }

    let mut seen = HashSet::new();
    for chain in &config.chains {
        let prefix = format!("chains[{}]", chain.chain_id);
        if !seen.insert(chain.chain_id) {
            errors.push(ValidationError::DuplicateChain(chain.chain_id));
        }
        if chain.chain_id == 0 {
            errors.push(zero(format!("{}.chain_id", prefix)));
        }
        check_url(format!("{}.rpc_url", prefix), &chain.rpc_url, &mut errors);
        if chain.rpc_timeout_secs == 0 {
            errors.push(zero(format!("{}.rpc_timeout_secs", prefix)));
        }
        if chain.receipt_timeout_secs == 0 {
            errors.push(zero(format!("{}.receipt_timeout_secs", prefix)));
        }
    }

    if config.worker.enabled {
        for chain_id in &config.worker.chain_ids {
            if config.chain(*chain_id).is_none() {
                errors.push(ValidationError::MissingChain(*chain_id));
            }
        }
    }

    let signer = &config.signer;
    if !signer.gas_headroom_ratio.is_finite() || signer.gas_headroom_ratio < 1.0 {
        errors.push(invalid("signer.gas_headroom_ratio", "must be at least 1.0"));
    }
    if signer.receipt_poll_interval_ms == 0 {
        errors.push(zero("signer.receipt_poll_interval_ms"));
    }

    let oracle = &config.oracle;
    if oracle.max_attempts == 0 {
        errors.push(zero("oracle.max_attempts"));
    }
    if oracle.timeout_secs == 0 {
        errors.push(zero("oracle.timeout_secs"));
    }
    if oracle.backoff_base_ms > oracle.backoff_max_ms {
        errors.push(invalid("oracle.backoff_base_ms", "must not exceed oracle.backoff_max_ms"));
    }
    match (&oracle.provider, &oracle.endpoint) {
        (OracleProvider::Http, None) => {
            errors.push(invalid("oracle.endpoint", "required for the http provider"));
        }
        (_, Some(endpoint)) => check_url("oracle.endpoint".into(), endpoint, &mut errors),
        (OracleProvider::Mock, None) => {}
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "json" | "pretty") {
        errors.push(invalid(
            "observability.log_format",
            format!("expected \"json\" or \"pretty\", got {:?}", observability.log_format),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid(
            "observability.metrics_address",
            format!("not a socket address: {:?}", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
