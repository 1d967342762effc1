//! Deterministic local classifier for end-to-end runs.
//!
//! Post-audits follow the receipt status (`1` → SAFE 0.65, anything else →
//! UNSAFE 0.95). Implementation, swap and precheck requests are SAFE.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::types::{AuditVerdict, OracleContext, OracleError, RiskLabel, RiskOracle};

#[derive(Debug, Clone, Copy, Default)]
pub struct MockOracle;

/// Receipt status as a number; nodes send hex strings, fixtures sometimes ints.
fn receipt_status(receipt: &Value) -> Option<u64> {
    match receipt.get("status")? {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(digits, 16).ok()
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn mock_verdict(label: RiskLabel, confidence: f64, name: String, summary: String, reason: String) -> AuditVerdict {
    AuditVerdict {
        label,
        confidence,
        name,
        summary,
        description: "Mock analysis result.\nDeterministic, no model involved.\nFor end-to-end testing only.".into(),
        reasons: vec![reason],
        matched_patterns: Vec::new(),
    }
}

#[async_trait]
impl RiskOracle for MockOracle {
    async fn classify(&self, context: &OracleContext) -> Result<AuditVerdict, OracleError> {
        let verdict = match context {
            OracleContext::TxPostaudit { tx, receipt, .. } => {
                let hash = tx.get("hash").and_then(Value::as_str).unwrap_or_default();
                let prefix = hash.get(..10).unwrap_or(hash);
                let status = receipt_status(receipt);
                let (label, confidence, reason) = if status == Some(1) {
                    (RiskLabel::Safe, 0.65, "receipt.status=1 (success)".to_string())
                } else {
                    let shown = receipt.get("status").cloned().unwrap_or(Value::Null);
                    (RiskLabel::Unsafe, 0.95, format!("receipt.status={} (failure)", shown))
                };
                mock_verdict(
                    label,
                    confidence,
                    format!("PostAudit@{}", prefix),
                    format!("Mock postaudit: {}", label),
                    reason,
                )
            }
            OracleContext::ImplBytecode { impl_address, bytecode, .. } => mock_verdict(
                RiskLabel::Safe,
                0.5,
                format!("Impl@{}", impl_address),
                "Mock implementation scan: SAFE".into(),
                format!("bytecode present ({} bytes)", bytecode.len()),
            ),
            OracleContext::Swap { new_impl_address, .. } => mock_verdict(
                RiskLabel::Safe,
                0.5,
                format!("Swap@{}", new_impl_address),
                "Mock swap audit: SAFE".into(),
                "both implementations have code".into(),
            ),
            OracleContext::TxPrecheck { .. } => mock_verdict(
                RiskLabel::Safe,
                0.5,
                "Precheck".into(),
                "Mock precheck: SAFE".into(),
                "no rules applied in mock mode".into(),
            ),
        };
        Ok(verdict)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
