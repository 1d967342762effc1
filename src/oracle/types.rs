//! Verdict shape, classification contexts and the oracle capability.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::contracts::{RecordText, TxNote, Verdict};
use crate::observability::metrics;
use crate::resilience::{retry, RetryPolicy};

pub const MAX_REASONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Safe,
    Unsafe,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Safe => "SAFE",
            RiskLabel::Unsafe => "UNSAFE",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classification produced by the risk oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditVerdict {
    pub label: RiskLabel,
    pub confidence: f64,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub matched_patterns: Vec<String>,
}

impl AuditVerdict {
    /// Reject verdicts the sentinel must not act on.
    pub fn validate(&self) -> Result<(), OracleError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(OracleError::Invalid(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.reasons.is_empty() || self.reasons.len() > MAX_REASONS {
            return Err(OracleError::Invalid(format!(
                "expected 1..={} reasons, got {}",
                MAX_REASONS,
                self.reasons.len()
            )));
        }
        if self.reasons.iter().any(|r| r.trim().is_empty()) {
            return Err(OracleError::Invalid("blank reason".into()));
        }
        Ok(())
    }

    pub fn is_safe(&self) -> bool {
        self.label == RiskLabel::Safe
    }

    /// Non-blank reasons, trimmed and joined by newlines.
    pub fn reasons_text(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_label(self.label.as_str())
    }

    pub fn record_text(&self) -> RecordText {
        RecordText {
            name: self.name.clone(),
            summary: self.summary.clone(),
            description: self.description.clone(),
            reasons: self.reasons_text(),
        }
    }

    /// Note written for `tx_hash_hex`; an empty name becomes `tx:<hash prefix>`.
    pub fn tx_note(&self, tx_hash_hex: &str) -> TxNote {
        let name = if self.name.trim().is_empty() {
            format!("tx:{}", tx_hash_hex.get(..10).unwrap_or(tx_hash_hex))
        } else {
            self.name.clone()
        };
        TxNote {
            name,
            summary: self.summary.clone(),
            description: self.description.clone(),
            reasons: self.reasons_text(),
            updated_at: 0,
        }
    }

    /// Reason recorded when freezing.
    pub fn freeze_reason(&self) -> String {
        if self.summary.trim().is_empty() {
            RiskLabel::Unsafe.to_string()
        } else {
            self.summary.clone()
        }
    }

    /// Stand-in when auditing an executed transaction fails: unsafe, so the
    /// wallet is frozen.
    pub fn fail_closed(error: &OracleError) -> Self {
        Self {
            label: RiskLabel::Unsafe,
            confidence: 0.0,
            name: "PostAuditError".into(),
            summary: "Post-audit failed".into(),
            description: "LLM or parser error during post-audit.\n\
                          Wallet was frozen as a precaution.\n\
                          See reasons for details."
                .into(),
            reasons: vec![format!("postaudit error: {}", error)],
            matched_patterns: Vec::new(),
        }
    }

    /// Stand-in when a precheck fails: allowed with zero confidence.
    pub fn fail_open(error: &OracleError) -> Self {
        Self {
            label: RiskLabel::Safe,
            confidence: 0.0,
            name: "PrecheckError".into(),
            summary: "Precheck failed (LLM/service error). Allowing by policy.".into(),
            description: "The precheck service failed to produce a valid result.\n\
                          No deterministic block was applied.\n\
                          Proceed with caution."
                .into(),
            reasons: vec![format!("precheck error: {}", error)],
            matched_patterns: Vec::new(),
        }
    }
}

/// What the oracle is asked to classify.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OracleContext {
    /// Deployed implementation bytecode.
    ImplBytecode {
        chain_id: u64,
        impl_address: Address,
        bytecode: Bytes,
    },
    /// Compatibility of replacing one implementation with another.
    Swap {
        chain_id: u64,
        current_impl_address: Address,
        current_bytecode: Bytes,
        new_impl_address: Address,
        new_bytecode: Bytes,
    },
    /// A transaction the wallet is about to send.
    TxPrecheck {
        chain_id: u64,
        tx: Value,
        impl_record: Value,
    },
    /// A transaction the wallet already executed.
    TxPostaudit {
        chain_id: u64,
        tx: Value,
        receipt: Value,
        impl_record: Value,
    },
}

impl OracleContext {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleContext::ImplBytecode { .. } => "impl_bytecode",
            OracleContext::Swap { .. } => "swap",
            OracleContext::TxPrecheck { .. } => "tx_precheck",
            OracleContext::TxPostaudit { .. } => "tx_postaudit",
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    /// The classification call itself failed.
    #[error("oracle request failed: {0}")]
    Transport(String),

    /// No JSON object could be found in the output.
    #[error("oracle output unparseable: {0}")]
    Unparseable(String),

    /// A JSON object was found but is not an acceptable verdict.
    #[error("oracle verdict invalid: {0}")]
    Invalid(String),

    #[error("oracle misconfigured: {0}")]
    Config(String),
}

impl OracleError {
    pub fn kind(&self) -> &'static str {
        "OracleError"
    }

    /// Label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OracleError::Transport(_) => "transport",
            OracleError::Unparseable(_) => "unparseable",
            OracleError::Invalid(_) => "invalid",
            OracleError::Config(_) => "config",
        }
    }
}

/// Classifies implementations and transactions.
#[async_trait]
pub trait RiskOracle: Send + Sync {
    async fn classify(&self, context: &OracleContext) -> Result<AuditVerdict, OracleError>;

    /// Provider name for logs.
    fn name(&self) -> &'static str;
}

/// Classify, validate, and re-request on failure within `policy`.
pub async fn classify_with_retry(
    oracle: &dyn RiskOracle,
    context: &OracleContext,
    policy: &RetryPolicy,
) -> Result<AuditVerdict, OracleError> {
    retry(
        policy,
        |err: &OracleError| !matches!(err, OracleError::Config(_)),
        |attempt| async move {
            let outcome = oracle.classify(context).await.and_then(|verdict| {
                verdict.validate()?;
                Ok(verdict)
            });
            if let Err(e) = &outcome {
                metrics::record_oracle_failure(e.reason());
                tracing::warn!(
                    oracle = oracle.name(),
                    context = context.kind(),
                    attempt,
                    error = %e,
                    "Classification attempt failed"
                );
            }
            outcome
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn verdict(label: RiskLabel) -> AuditVerdict {
        AuditVerdict {
            label,
            confidence: 0.9,
            name: "Transfer".into(),
            summary: "Plain ETH transfer".into(),
            description: "d".into(),
            reasons: vec!["  first ".into(), "".into(), "second".into()],
            matched_patterns: vec![],
        }
    }

    #[test]
    fn test_parse_rejects_unknown_fields_and_labels() {
        let ok: AuditVerdict = serde_json::from_value(serde_json::json!({
            "label": "SAFE", "confidence": 0.5, "name": "n", "summary": "s",
            "description": "d", "reasons": ["r"]
        }))
        .unwrap();
        assert!(ok.matched_patterns.is_empty());

        let extra = serde_json::from_value::<AuditVerdict>(serde_json::json!({
            "label": "SAFE", "confidence": 0.5, "name": "n", "summary": "s",
            "description": "d", "reasons": ["r"], "extra": true
        }));
        assert!(extra.is_err());

        let bad_label = serde_json::from_value::<AuditVerdict>(serde_json::json!({
            "label": "MAYBE", "confidence": 0.5, "name": "n", "summary": "s",
            "description": "d", "reasons": ["r"]
        }));
        assert!(bad_label.is_err());
    }

    #[test]
    fn test_validate() {
        let mut v = verdict(RiskLabel::Safe);
        v.reasons = vec!["r".into()];
        assert!(v.validate().is_ok());

        v.confidence = 1.5;
        assert!(matches!(v.validate(), Err(OracleError::Invalid(_))));
        v.confidence = f64::NAN;
        assert!(v.validate().is_err());

        v.confidence = 0.1;
        v.reasons = vec![];
        assert!(v.validate().is_err());
        v.reasons = (0..6).map(|i| i.to_string()).collect();
        assert!(v.validate().is_err());
        v.reasons = vec!["  ".into()];
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_reasons_and_note_fields() {
        let v = verdict(RiskLabel::Unsafe);
        assert_eq!(v.reasons_text(), "first\nsecond");
        assert_eq!(v.verdict(), Verdict::Unsafe);
        assert_eq!(v.freeze_reason(), "Plain ETH transfer");

        let mut unnamed = v.clone();
        unnamed.name = String::new();
        unnamed.summary = String::new();
        let note = unnamed.tx_note("0xabcdef0123456789");
        assert_eq!(note.name, "tx:0xabcdef01");
        assert_eq!(note.updated_at, 0);
        assert_eq!(unnamed.freeze_reason(), "UNSAFE");
    }

    #[test]
    fn test_fallback_verdicts() {
        let err = OracleError::Transport("connection refused".into());

        let closed = AuditVerdict::fail_closed(&err);
        assert_eq!(closed.label, RiskLabel::Unsafe);
        assert_eq!(closed.confidence, 0.0);
        assert_eq!(closed.name, "PostAuditError");
        assert!(closed.reasons[0].contains("connection refused"));
        assert!(closed.validate().is_ok());

        let open = AuditVerdict::fail_open(&err);
        assert_eq!(open.label, RiskLabel::Safe);
        assert_eq!(open.confidence, 0.0);
        assert!(open.reasons[0].starts_with("precheck error:"));
        assert!(open.validate().is_ok());
    }

    #[test]
    fn test_context_serialization() {
        let ctx = OracleContext::TxPostaudit {
            chain_id: 31337,
            tx: serde_json::json!({"hash": "0x01"}),
            receipt: serde_json::json!({"status": "0x1"}),
            impl_record: serde_json::json!({}),
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["kind"], "tx_postaudit");
        assert_eq!(json["chainId"], 31337);
        assert_eq!(json["implRecord"], serde_json::json!({}));
        assert_eq!(ctx.kind(), "tx_postaudit");
    }

    struct Flaky {
        calls: AtomicU32,
        good_after: u32,
    }

    #[async_trait]
    impl RiskOracle for Flaky {
        async fn classify(&self, _context: &OracleContext) -> Result<AuditVerdict, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut v = verdict(RiskLabel::Safe);
            v.reasons = if n < self.good_after { vec![] } else { vec!["ok".into()] };
            Ok(v)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_invalid_verdict_is_re_requested() {
        let ctx = OracleContext::TxPrecheck {
            chain_id: 1,
            tx: Value::Null,
            impl_record: Value::Null,
        };

        let oracle = Flaky { calls: AtomicU32::new(0), good_after: 2 };
        let v = classify_with_retry(&oracle, &ctx, &RetryPolicy::new(2, 1, 2)).await.unwrap();
        assert!(v.is_safe());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);

        let oracle = Flaky { calls: AtomicU32::new(0), good_after: 5 };
        let err = classify_with_retry(&oracle, &ctx, &RetryPolicy::new(2, 1, 2)).await.unwrap_err();
        assert!(matches!(err, OracleError::Invalid(_)));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }
}
