//! Remote classification service.
//!
//! POSTs the serialized [`OracleContext`] and accepts a verdict object either
//! as the whole body or embedded in free text (see [`extract_json`]).

use async_trait::async_trait;
use std::time::Duration;

use crate::oracle::json::extract_json;
use crate::oracle::types::{AuditVerdict, OracleContext, OracleError, RiskOracle};

#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(endpoint: &str, timeout: Duration, api_key: Option<String>) -> Result<Self, OracleError> {
        let endpoint: url::Url = endpoint
            .parse()
            .map_err(|e| OracleError::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

/// Parse a verdict out of raw service output.
pub fn parse_verdict(body: &str) -> Result<AuditVerdict, OracleError> {
    let object = extract_json(body).ok_or_else(|| {
        let preview: String = body.chars().take(120).collect();
        OracleError::Unparseable(format!("no JSON object in output: {:?}", preview))
    })?;
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| OracleError::Invalid(e.to_string()))
}

#[async_trait]
impl RiskOracle for HttpOracle {
    async fn classify(&self, context: &OracleContext) -> Result<AuditVerdict, OracleError> {
        let mut request = self.client.post(self.endpoint.clone()).json(context);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(OracleError::Transport(format!("HTTP {}: {}", status, body)));
        }

        parse_verdict(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
