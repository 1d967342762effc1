//! Risk oracle capability.
//!
//! # Data Flow
//! ```text
//! monitor / audit build an OracleContext
//!     → classify_with_retry (validate, re-request within the retry budget)
//!     → RiskOracle::classify (http.rs or mock.rs)
//!     → AuditVerdict
//! ```
//!
//! # Design Decisions
//! - The provider is chosen by configuration, not by type
//! - Malformed or partial verdicts are never acted on
//! - Fallback verdicts (fail-open / fail-closed) are decided by the caller

pub mod http;
pub mod json;
pub mod mock;
pub mod types;

pub use http::HttpOracle;
pub use mock::MockOracle;
pub use types::{classify_with_retry, AuditVerdict, OracleContext, OracleError, RiskLabel, RiskOracle};

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{OracleConfig, OracleProvider};
use crate::resilience::RetryPolicy;

/// Build the configured oracle.
pub fn from_config(config: &OracleConfig) -> Result<Arc<dyn RiskOracle>, OracleError> {
    match config.provider {
        OracleProvider::Mock => Ok(Arc::new(MockOracle)),
        OracleProvider::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| OracleError::Config("oracle.endpoint is required for the http provider".into()))?;
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.trim().is_empty());
            let oracle = HttpOracle::new(endpoint, Duration::from_secs(config.timeout_secs), api_key)?;
            Ok(Arc::new(oracle))
        }
    }
}

/// Retry budget for classification calls.
pub fn retry_policy(config: &OracleConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_attempts, config.backoff_base_ms, config.backoff_max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mock = from_config(&OracleConfig::default()).unwrap();
        assert_eq!(mock.name(), "mock");

        let missing = OracleConfig {
            provider: OracleProvider::Http,
            ..Default::default()
        };
        assert!(matches!(from_config(&missing), Err(OracleError::Config(_))));

        let http = OracleConfig {
            provider: OracleProvider::Http,
            endpoint: Some("http://127.0.0.1:7000/classify".into()),
            ..Default::default()
        };
        assert_eq!(from_config(&http).unwrap().name(), "http");
    }
}
