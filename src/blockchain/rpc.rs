//! JSON-RPC 2.0 client with typed convenience calls.
//!
//! # Responsibilities
//! - Frame requests with monotonically increasing ids
//! - Turn a response `error` object into `BlockchainError::Rpc`
//! - Decode hex quantities and typed block/transaction/receipt views
//!
//! No retries here: different calls need different idempotency treatment,
//! so retry policy lives with the callers.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::types::{
    BlockTag, BlockchainError, BlockchainResult, CallRequest, ChainId, RpcBlock, RpcReceipt,
    RpcTransaction,
};

/// Outgoing JSON-RPC request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Incoming JSON-RPC response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id: Some(json!(id)),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: Value) -> Self {
        Self {
            id: Some(json!(id)),
            result: None,
            error: Some(error),
        }
    }
}

/// Moves one request to a node and returns its raw response.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, request: &JsonRpcRequest) -> BlockchainResult<JsonRpcResponse>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// HTTP POST transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> BlockchainResult<Self> {
        let url: url::Url = url
            .parse()
            .map_err(|e| BlockchainError::Transport(format!("Invalid RPC URL '{}': {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlockchainError::Transport(format!("HTTP client init failed: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> BlockchainResult<JsonRpcResponse> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BlockchainError::Timeout(format!("{} timed out", request.method))
                } else {
                    BlockchainError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlockchainError::Transport(format!(
                "{} returned HTTP {}: {}",
                request.method, status, body
            )));
        }

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| BlockchainError::decode("invalid JSON-RPC response", e))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// JSON-RPC client. Cheap to clone; clones share the id counter.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Client over HTTP with a per-request timeout.
    pub fn http(url: &str, timeout: Duration) -> BlockchainResult<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(url, timeout)?)))
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Issue a call and return the raw `result` (null when absent).
    pub async fn call_raw(&self, method: &str, params: Value) -> BlockchainResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            params,
        };

        let response = self.transport.send(&request).await?;
        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            let detail = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string());
            return Err(BlockchainError::Rpc {
                message: format!("RPC error calling {}: {}", method, detail),
                raw: Some(error),
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Issue a call and deserialize its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> BlockchainResult<T> {
        let result = self.call_raw(method, params).await?;
        serde_json::from_value(result).map_err(|e| BlockchainError::decode(method, e))
    }

    async fn quantity(&self, method: &str, params: Value) -> BlockchainResult<U256> {
        self.call::<U256>(method, params).await
    }

    pub async fn chain_id(&self) -> BlockchainResult<ChainId> {
        let id: U64 = self.call("eth_chainId", json!([])).await?;
        Ok(ChainId(id.to::<u64>()))
    }

    pub async fn block_number(&self) -> BlockchainResult<u64> {
        let n: U64 = self.call("eth_blockNumber", json!([])).await?;
        Ok(n.to::<u64>())
    }

    /// Deployed bytecode at `address` (`0x` when none).
    pub async fn get_code(&self, address: Address, tag: BlockTag) -> BlockchainResult<Bytes> {
        self.call("eth_getCode", json!([address, tag.as_str()])).await
    }

    /// `None` when the node does not know the block yet.
    pub async fn get_block_by_number(
        &self,
        number: u64,
        full_transactions: bool,
    ) -> BlockchainResult<Option<RpcBlock>> {
        self.call(
            "eth_getBlockByNumber",
            json!([format!("{:#x}", number), full_transactions]),
        )
        .await
    }

    /// Latest block header (transaction hashes only).
    pub async fn latest_block(&self) -> BlockchainResult<Option<RpcBlock>> {
        self.call("eth_getBlockByNumber", json!(["latest", false])).await
    }

    pub async fn get_transaction_by_hash(&self, hash: B256) -> BlockchainResult<Option<RpcTransaction>> {
        self.call("eth_getTransactionByHash", json!([hash])).await
    }

    /// `None` means "not yet mined".
    pub async fn get_transaction_receipt(&self, hash: B256) -> BlockchainResult<Option<RpcReceipt>> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }

    /// `eth_call` returning the raw hex result.
    pub async fn eth_call(&self, request: &CallRequest, tag: BlockTag) -> BlockchainResult<String> {
        self.call("eth_call", json!([request, tag.as_str()])).await
    }

    pub async fn gas_price(&self) -> BlockchainResult<u128> {
        let price = self.quantity("eth_gasPrice", json!([])).await?;
        u128::try_from(price).map_err(|_| BlockchainError::Decode(format!("gas price {} overflows", price)))
    }

    pub async fn max_priority_fee_per_gas(&self) -> BlockchainResult<u128> {
        let fee = self.quantity("eth_maxPriorityFeePerGas", json!([])).await?;
        u128::try_from(fee).map_err(|_| BlockchainError::Decode(format!("priority fee {} overflows", fee)))
    }

    pub async fn estimate_gas(&self, request: &CallRequest) -> BlockchainResult<u64> {
        let gas: U64 = self.call("eth_estimateGas", json!([request])).await?;
        Ok(gas.to::<u64>())
    }

    pub async fn get_transaction_count(&self, address: Address, tag: BlockTag) -> BlockchainResult<u64> {
        let count: U64 = self
            .call("eth_getTransactionCount", json!([address, tag.as_str()]))
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<B256> {
        let raw_hex = format!("0x{}", alloy::hex::encode(raw));
        self.call("eth_sendRawTransaction", json!([raw_hex])).await
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.transport.endpoint())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
