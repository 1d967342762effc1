//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain id of the local development node. Always uses legacy fees.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Chain id of Sepolia.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// The node answered with a JSON-RPC `error` object.
    #[error("RPC error: {message}")]
    Rpc {
        message: String,
        raw: Option<serde_json::Value>,
    },

    /// HTTP-level failure talking to the node.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed hex, ABI payload or RPC result shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Receipt or RPC readiness not observed in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Caller supplied arguments that cannot be encoded.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl BlockchainError {
    /// Taxonomy class surfaced to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            BlockchainError::Rpc { .. } | BlockchainError::Transport(_) => "RpcError",
            BlockchainError::Decode(_) => "DecodeError",
            BlockchainError::Timeout(_) => "TimeoutError",
            BlockchainError::Wallet(_) => "WalletError",
            BlockchainError::InvalidInput(_) => "InvalidInput",
            BlockchainError::ChainMismatch { .. } => "ChainMismatch",
        }
    }

    pub(crate) fn decode(context: &str, err: impl std::fmt::Display) -> Self {
        BlockchainError::Decode(format!("{}: {}", context, err))
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Result of a submission. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTx {
    pub tx_hash: B256,
    pub from_address: Address,
    pub nonce: u64,
}

/// Block tag accepted by state-reading RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        }
    }
}

/// Transaction body as returned inside `eth_getBlockByNumber(n, true)` or by
/// `eth_getTransactionByHash`. Only the fields the sentinel reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    #[serde(default)]
    pub hash: Option<B256>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub input: Option<Bytes>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<U64>,
    #[serde(default)]
    pub nonce: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

impl RpcTransaction {
    /// Bounded view handed to the risk oracle.
    pub fn minimal_view(&self) -> serde_json::Value {
        serde_json::json!({
            "hash": self.hash,
            "from": self.from,
            "to": self.to,
            "value": self.value,
            "input": self.input,
            "type": self.tx_type,
            "nonce": self.nonce,
        })
    }
}

/// Entry of a block's `transactions` array: full body or bare hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransaction {
    Full(RpcTransaction),
    Hash(B256),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(default)]
    pub number: Option<U64>,
    #[serde(default)]
    pub hash: Option<B256>,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

impl RpcBlock {
    /// Full transaction bodies in node order. Hash-only entries are skipped.
    pub fn full_transactions(&self) -> impl Iterator<Item = &RpcTransaction> {
        self.transactions.iter().filter_map(|tx| match tx {
            BlockTransaction::Full(body) => Some(body),
            BlockTransaction::Hash(_) => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs_bloom: Option<Bytes>,
    #[serde(default)]
    pub logs: Option<Vec<serde_json::Value>>,
}

impl RpcReceipt {
    /// `status == 1`.
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::from(1))
    }

    /// Bounded view handed to the risk oracle.
    pub fn minimal_view(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "gasUsed": self.gas_used,
            "effectiveGasPrice": self.effective_gas_price,
            "contractAddress": self.contract_address,
            "logsBloom": self.logs_bloom,
            "logs": self.logs.clone().unwrap_or_default(),
        })
    }
}

/// Parameters for `eth_call` / `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            value: None,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(LOCAL_CHAIN_ID);
        assert_eq!(chain_id.0, 31337);
        assert_eq!(u64::from(chain_id), 31337);
        assert_eq!(chain_id.to_string(), "31337");
    }

    #[test]
    fn test_error_kinds() {
        let err = BlockchainError::Rpc {
            message: "execution reverted".into(),
            raw: None,
        };
        assert_eq!(err.kind(), "RpcError");
        assert_eq!(err.to_string(), "RPC error: execution reverted");
        assert_eq!(BlockchainError::Timeout("x".into()).kind(), "TimeoutError");
        assert_eq!(BlockchainError::Decode("x".into()).kind(), "DecodeError");
    }

    #[test]
    fn test_block_with_full_and_hash_transactions() {
        let json = serde_json::json!({
            "number": "0x65",
            "baseFeePerGas": "0x3b9aca00",
            "transactions": [
                {
                    "hash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                    "from": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
                    "to": null,
                    "value": "0x0",
                    "input": "0x",
                    "nonce": "0x2"
                },
                "0x2222222222222222222222222222222222222222222222222222222222222222"
            ]
        });
        let block: RpcBlock = serde_json::from_value(json).unwrap();
        assert_eq!(block.number, Some(U64::from(101)));
        assert_eq!(block.base_fee_per_gas, Some(U256::from(1_000_000_000u64)));
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.full_transactions().count(), 1);
    }

    #[test]
    fn test_receipt_status() {
        let receipt: RpcReceipt = serde_json::from_value(serde_json::json!({
            "status": "0x1",
            "gasUsed": "0x5208",
            "contractAddress": null,
            "logs": []
        }))
        .unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.minimal_view()["status"], "0x1");

        let reverted = RpcReceipt {
            status: Some(U64::ZERO),
            ..Default::default()
        };
        assert!(!reverted.succeeded());
    }
}
