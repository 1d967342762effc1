//! Requests, responses and errors of the audit orchestrator.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::blockchain::types::BlockchainError;
use crate::blockchain::wallet::KeyRole;
use crate::contracts::TxNote;
use crate::oracle::{AuditVerdict, OracleError};
use crate::state::{StoreError, WatchItem};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    State(#[from] StoreError),

    #[error("No code at {what} {address}")]
    NoCode { what: &'static str, address: Address },

    #[error("Failed to read wallet current impl: {0}")]
    WalletRead(BlockchainError),

    #[error("Chain {0} is not configured")]
    UnknownChain(u64),

    #[error("{0} key is not configured")]
    MissingKey(KeyRole),
}

impl AuditError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::Chain(e) | AuditError::WalletRead(e) => e.kind(),
            AuditError::Oracle(e) => e.kind(),
            AuditError::State(e) => e.kind(),
            AuditError::NoCode { .. } | AuditError::UnknownChain(_) => "InvalidInput",
            AuditError::MissingKey(_) => "WalletError",
        }
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub chain_id: u64,
    pub impl_address: Address,
    pub audit: AuditVerdict,
    pub reasons_text: String,
    pub registry_tx_hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// First delegation: the wallet calls `aegis_init`.
    Init,
    /// Replace the current implementation.
    #[default]
    Swap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditApplyRequest {
    pub chain_id: u64,
    pub wallet: Address,
    pub new_impl_address: Address,
    #[serde(default)]
    pub mode: ApplyMode,
}

/// Unsigned self-call for the wallet owner to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxTemplate {
    pub to: Address,
    pub data: Bytes,
    pub value: String,
}

impl TxTemplate {
    pub fn self_call(wallet: Address, data: Bytes) -> Self {
        Self {
            to: wallet,
            data,
            value: "0x0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditApplyResponse {
    pub chain_id: u64,
    pub wallet: Address,
    pub mode: ApplyMode,
    pub current_impl: Option<Address>,
    pub new_impl: Address,
    pub new_impl_audit: AuditVerdict,
    pub new_impl_reasons_text: String,
    pub new_impl_registry_tx_hash: B256,
    pub swap_audit: Option<AuditVerdict>,
    pub swap_reasons_text: Option<String>,
    pub swap_registry_tx_hash: Option<B256>,
    pub allow: bool,
    /// Present only when `allow`.
    pub tx_template: Option<TxTemplate>,
}

fn default_value() -> String {
    "0".to_string()
}

fn default_data() -> String {
    "0x".to_string()
}

/// A transaction the wallet intends to send.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrecheckRequest {
    pub chain_id: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default = "default_value")]
    pub value: String,
    #[serde(default = "default_data")]
    pub data: String,
    #[serde(default)]
    pub tx_type: Option<u64>,
    #[serde(default)]
    pub authorization_list: Option<Vec<Value>>,
}

impl PrecheckRequest {
    pub fn new(chain_id: u64, from: Address) -> Self {
        Self {
            chain_id,
            from,
            to: None,
            value: default_value(),
            data: default_data(),
            tx_type: None,
            authorization_list: None,
        }
    }

    /// First four calldata bytes as lowercase hex, or empty.
    pub fn selector(&self) -> String {
        match self.data.get(..10) {
            Some(prefix) if prefix.starts_with("0x") => prefix.to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Delegation targets named by the authorization list.
    pub fn delegate_targets(&self) -> Vec<String> {
        self.authorization_list
            .iter()
            .flatten()
            .filter_map(delegate_address)
            .collect()
    }
}

const DELEGATE_KEYS: [&str; 5] = ["address", "delegateTo", "delegate_to", "delegate", "target"];

fn delegate_address(auth: &Value) -> Option<String> {
    let auth = auth.as_object()?;
    DELEGATE_KEYS.iter().find_map(|key| {
        auth.get(*key)
            .and_then(Value::as_str)
            .filter(|v| v.starts_with("0x") && v.len() == 42)
            .map(str::to_string)
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResponse {
    pub chain_id: u64,
    pub allow: bool,
    pub audit: AuditVerdict,
    pub reasons_text: String,
    pub wallet_current_impl: Option<Address>,
    pub wallet_current_impl_record: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchListResponse {
    pub chain_id: u64,
    pub items: Vec<WatchItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxNoteResponse {
    pub wallet: Address,
    pub tx_hash: B256,
    pub note: TxNote,
}
