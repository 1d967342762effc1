//! HTTP clients against local axum servers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aegis_sentinel::blockchain::rpc::RpcClient;
use aegis_sentinel::blockchain::types::BlockchainError;
use aegis_sentinel::oracle::http::HttpOracle;
use aegis_sentinel::oracle::{OracleContext, OracleError, RiskLabel, RiskOracle};
use alloy::primitives::{Address, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn json_rpc(Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let body = match request["method"].as_str() {
        Some("eth_blockNumber") => json!({ "jsonrpc": "2.0", "id": id, "result": "0x2a" }),
        Some("eth_chainId") => json!({ "jsonrpc": "2.0", "id": id, "result": "0x7a69" }),
        Some("eth_getTransactionReceipt") => json!({ "jsonrpc": "2.0", "id": id, "result": null }),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "the method does not exist" },
        }),
    };
    Json(body)
}

fn rpc(addr: SocketAddr) -> RpcClient {
    RpcClient::http(&format!("http://{}", addr), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_rpc_over_http() {
    let addr = serve(Router::new().route("/", post(json_rpc))).await;
    let client = rpc(addr);

    assert_eq!(client.block_number().await.unwrap(), 42);
    assert_eq!(client.chain_id().await.unwrap().0, 31337);
    assert!(client
        .get_transaction_receipt(Default::default())
        .await
        .unwrap()
        .is_none());
    assert!(client.endpoint().starts_with("http://127.0.0.1:"));
}

#[tokio::test]
async fn test_rpc_error_object() {
    let addr = serve(Router::new().route("/", post(json_rpc))).await;

    let err = rpc(addr).call_raw("eth_unknown", json!([])).await.unwrap_err();

    match &err {
        BlockchainError::Rpc { message, raw } => {
            assert_eq!(message, "RPC error calling eth_unknown: the method does not exist");
            assert_eq!(raw.as_ref().unwrap()["code"], -32601);
        }
        other => panic!("expected an RPC error, got {:?}", other),
    }
    assert_eq!(err.kind(), "RpcError");
}

#[tokio::test]
async fn test_rpc_http_failure_is_transport_error() {
    let app = Router::new().route("/", post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }));
    let addr = serve(app).await;

    let err = rpc(addr).block_number().await.unwrap_err();

    assert!(matches!(err, BlockchainError::Transport(_)));
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_rpc_invalid_url() {
    let err = RpcClient::http("not a url", Duration::from_secs(1)).err().unwrap();
    assert!(matches!(err, BlockchainError::Transport(_)));
}

fn bytecode_context() -> OracleContext {
    OracleContext::ImplBytecode {
        chain_id: 31337,
        impl_address: Address::repeat_byte(0x1e),
        bytecode: Bytes::from(vec![0x60, 0x80]),
    }
}

#[tokio::test]
async fn test_http_oracle_parses_embedded_verdict() {
    let seen: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        "/classify",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                recorder.lock().unwrap().push((auth, body));
                "Here is the verdict:\n```json\n{\"label\":\"UNSAFE\",\"confidence\":0.91,\
                 \"name\":\"Drainer\",\"summary\":\"Sweeps balances\",\"description\":\"\",\
                 \"reasons\":[\"transfers everything to a fixed address\"]}\n```"
            }
        }),
    );
    let addr = serve(app).await;

    let oracle = HttpOracle::new(
        &format!("http://{}/classify", addr),
        Duration::from_secs(2),
        Some("secret".into()),
    )
    .unwrap();
    let verdict = oracle.classify(&bytecode_context()).await.unwrap();

    assert_eq!(verdict.label, RiskLabel::Unsafe);
    assert_eq!(verdict.name, "Drainer");
    assert_eq!(verdict.reasons.len(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0.as_deref(), Some("Bearer secret"));
    assert_eq!(seen[0].1["kind"], "impl_bytecode");
    assert_eq!(seen[0].1["chainId"], 31337);
    assert_eq!(seen[0].1["bytecode"], "0x6080");
}

#[tokio::test]
async fn test_http_oracle_failures() {
    let app = Router::new()
        .route("/down", post(|| async { (StatusCode::BAD_GATEWAY, "upstream gone") }))
        .route("/prose", post(|| async { "I cannot classify this contract." }));
    let addr = serve(app).await;

    let down = HttpOracle::new(&format!("http://{}/down", addr), Duration::from_secs(2), None).unwrap();
    let err = down.classify(&bytecode_context()).await.unwrap_err();
    assert!(matches!(err, OracleError::Transport(_)));
    assert!(err.to_string().contains("502"));

    let prose = HttpOracle::new(&format!("http://{}/prose", addr), Duration::from_secs(2), None).unwrap();
    let err = prose.classify(&bytecode_context()).await.unwrap_err();
    assert!(matches!(err, OracleError::Unparseable(_)));
}
