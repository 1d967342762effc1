//! Shared utilities for integration tests: an in-memory JSON-RPC node that
//! executes guard and registry writes, and a scripted risk oracle.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use aegis_sentinel::blockchain::codec::{decode_params, encode_params, function_selector};
use aegis_sentinel::blockchain::rpc::{JsonRpcRequest, JsonRpcResponse, RpcClient, RpcTransport};
use aegis_sentinel::blockchain::transaction::TxSigner;
use aegis_sentinel::blockchain::types::BlockchainResult;
use aegis_sentinel::blockchain::wallet::{KeyRole, Wallet};
use aegis_sentinel::config::schema::SignerConfig;
use aegis_sentinel::contracts::{guard, registry};
use aegis_sentinel::oracle::{AuditVerdict, OracleContext, OracleError, RiskLabel, RiskOracle};
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const PUBLISHER_PK: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const SENTINEL_PK: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const RECOVERY_PK: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

pub const GWEI: u128 = 1_000_000_000;

pub fn wallet(role: KeyRole) -> Wallet {
    let key = match role {
        KeyRole::Publisher => PUBLISHER_PK,
        KeyRole::Sentinel => SENTINEL_PK,
        KeyRole::Recovery => RECOVERY_PK,
    };
    Wallet::from_private_key(key, role).unwrap()
}

/// Signer settings with millisecond polling.
pub fn fast_signer_config() -> SignerConfig {
    SignerConfig {
        submit_recovery_attempts: 3,
        submit_recovery_interval_ms: 5,
        receipt_poll_interval_ms: 5,
        ..SignerConfig::default()
    }
}

pub fn signer(node: &Arc<MockNode>, role: KeyRole) -> TxSigner {
    TxSigner::new(node.client(), node.chain_id, wallet(role), fast_signer_config())
}

/// What `eth_sendRawTransaction` does with the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Mined immediately with status 1.
    Accept,
    /// Mined with status 1, but the RPC answers with an error.
    ErrorButMined,
    /// Rejected; the node never learns the transaction.
    Reject,
    /// Mined with status 0 and no effect.
    Revert,
    /// Known to the node but never mined.
    Pending,
}

/// A transaction from a watched wallet placed into a block.
#[derive(Debug, Clone)]
pub struct ExternalTx {
    pub hash: B256,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
}

impl ExternalTx {
    pub fn new(from: Address, to: Address, seed: u8) -> Self {
        Self {
            hash: keccak256([seed, from.0[0], to.0[0]]),
            from,
            to,
            input: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, seed]),
        }
    }
}

/// A decoded write submitted by the sentinel.
#[derive(Debug, Clone)]
pub struct Write {
    pub hash: B256,
    pub to: Address,
    pub function: &'static str,
    pub legacy: bool,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub args: Vec<DynSolValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Note {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: String,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub verdict: u8,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: String,
    pub updated_at: u64,
}

pub struct NodeState {
    pub block_number: u64,
    pub base_fee: Option<u128>,
    pub gas_price: u128,
    /// `None` makes `eth_maxPriorityFeePerGas` fail.
    pub priority_fee: Option<u128>,
    pub gas_estimate: u64,
    pub registry: Address,
    pub blocks: HashMap<u64, Vec<ExternalTx>>,
    /// Receipt status by hash; absent means not mined.
    pub receipts: HashMap<B256, u64>,
    pub code: HashMap<Address, Bytes>,
    pub implementations: HashMap<Address, Address>,
    pub frozen: HashMap<Address, String>,
    pub notes: HashMap<(Address, B256), Note>,
    pub records: HashMap<Address, Record>,
    pub swap_records: HashMap<(Address, Address), Record>,
    pub writes: Vec<Write>,
    pub pending: HashSet<B256>,
    pub send_modes: VecDeque<SendMode>,
    pub timestamp: u64,
    pub calls: HashMap<String, usize>,
    /// Methods that fail with a transport-level RPC error.
    pub failing_methods: HashSet<String>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            block_number: 0,
            base_fee: Some(10 * GWEI),
            gas_price: 3 * GWEI,
            priority_fee: Some(2 * GWEI),
            gas_estimate: 60_000,
            registry: Address::repeat_byte(0x5f),
            blocks: HashMap::new(),
            receipts: HashMap::new(),
            code: HashMap::new(),
            implementations: HashMap::new(),
            frozen: HashMap::new(),
            notes: HashMap::new(),
            records: HashMap::new(),
            swap_records: HashMap::new(),
            writes: Vec::new(),
            pending: HashSet::new(),
            send_modes: VecDeque::new(),
            timestamp: 1_700_000_000,
            calls: HashMap::new(),
            failing_methods: HashSet::new(),
        }
    }
}

/// In-memory JSON-RPC node.
pub struct MockNode {
    pub chain_id: u64,
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            state: Mutex::new(NodeState::default()),
        })
    }

    pub fn client(self: &Arc<Self>) -> RpcClient {
        RpcClient::new(self.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    pub fn registry(&self) -> Address {
        self.state().registry
    }

    /// Mine a block holding `txs`, each with a successful receipt unless
    /// listed in `without_receipt`. Returns the block number.
    pub fn mine(&self, txs: Vec<ExternalTx>, without_receipt: &[B256]) -> u64 {
        let mut state = self.state();
        state.block_number += 1;
        let number = state.block_number;
        for tx in &txs {
            if !without_receipt.contains(&tx.hash) {
                state.receipts.insert(tx.hash, 1);
            }
        }
        state.blocks.insert(number, txs);
        number
    }

    /// Mine empty blocks up to `number`.
    pub fn advance_to(&self, number: u64) {
        let mut state = self.state();
        state.block_number = state.block_number.max(number);
    }

    pub fn set_receipt(&self, hash: B256, status: u64) {
        self.state().receipts.insert(hash, status);
    }

    /// Give `wallet` delegated guard code running `implementation`.
    pub fn delegate(&self, wallet: Address, implementation: Address) {
        let mut state = self.state();
        state.implementations.insert(wallet, implementation);
        state.code.entry(implementation).or_insert_with(|| Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
    }

    pub fn deploy(&self, address: Address, code: &[u8]) {
        self.state().code.insert(address, Bytes::copy_from_slice(code));
    }

    pub fn push_send_mode(&self, mode: SendMode) {
        self.state().send_modes.push_back(mode);
    }

    pub fn note(&self, wallet: Address, tx_hash: B256) -> Option<Note> {
        self.state().notes.get(&(wallet, tx_hash)).cloned()
    }

    pub fn is_frozen(&self, wallet: Address) -> bool {
        self.state().frozen.contains_key(&wallet)
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state().writes.clone()
    }

    pub fn writes_of(&self, function: &str) -> Vec<Write> {
        self.writes().into_iter().filter(|w| w.function == function).collect()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, Value> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_default() += 1;
        if state.failing_methods.contains(method) {
            return Err(json!({ "code": -32603, "message": format!("{} unavailable", method) }));
        }

        match method {
            "eth_chainId" => Ok(json!(format!("{:#x}", self.chain_id))),
            "eth_blockNumber" => Ok(json!(format!("{:#x}", state.block_number))),
            "eth_gasPrice" => Ok(json!(format!("{:#x}", state.gas_price))),
            "eth_maxPriorityFeePerGas" => match state.priority_fee {
                Some(fee) => Ok(json!(format!("{:#x}", fee))),
                None => Err(json!({ "code": -32601, "message": "method not found" })),
            },
            "eth_estimateGas" => Ok(json!(format!("{:#x}", state.gas_estimate))),
            "eth_getTransactionCount" => Ok(json!(format!("{:#x}", state.writes.len()))),
            "eth_getCode" => {
                let address: Address = param(params, 0);
                let code = state.code.get(&address).cloned().unwrap_or_default();
                Ok(json!(code))
            }
            "eth_getBlockByNumber" => Ok(block_json(&state, params)),
            "eth_getTransactionReceipt" => {
                let hash: B256 = param(params, 0);
                Ok(match state.receipts.get(&hash) {
                    Some(status) => json!({
                        "transactionHash": hash,
                        "blockNumber": format!("{:#x}", state.block_number),
                        "status": format!("{:#x}", status),
                        "gasUsed": "0x5208",
                        "logs": [],
                    }),
                    None => Value::Null,
                })
            }
            "eth_getTransactionByHash" => {
                let hash: B256 = param(params, 0);
                Ok(transaction_json(&state, hash))
            }
            "eth_call" => {
                let to: Address = serde_json::from_value(params[0]["to"].clone()).unwrap();
                let data: Bytes = serde_json::from_value(params[0]["data"].clone()).unwrap();
                Ok(json!(format!("0x{}", alloy::hex::encode(call(&state, to, &data)))))
            }
            "eth_sendRawTransaction" => {
                let raw: Bytes = param(params, 0);
                send_raw(&mut state, &raw)
            }
            other => Err(json!({ "code": -32601, "message": format!("method {} not found", other) })),
        }
    }
}

#[async_trait]
impl RpcTransport for MockNode {
    async fn send(&self, request: &JsonRpcRequest) -> BlockchainResult<JsonRpcResponse> {
        Ok(match self.handle(&request.method, &request.params) {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        })
    }

    fn endpoint(&self) -> String {
        format!("mock://chain-{}", self.chain_id)
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &Value, index: usize) -> T {
    serde_json::from_value(params[index].clone()).unwrap()
}

fn hex(n: u64) -> String {
    format!("{:#x}", n)
}

fn tx_body(tx: &ExternalTx, block: u64) -> Value {
    json!({
        "hash": tx.hash,
        "from": tx.from,
        "to": tx.to,
        "value": "0x0",
        "input": tx.input,
        "type": "0x2",
        "nonce": "0x0",
        "blockNumber": hex(block),
    })
}

fn block_json(state: &NodeState, params: &Value) -> Value {
    let tag = params[0].as_str().unwrap_or("latest");
    let full = params[1].as_bool().unwrap_or(false);
    let number = if tag == "latest" {
        state.block_number
    } else {
        u64::from_str_radix(tag.trim_start_matches("0x"), 16).unwrap()
    };
    if number > state.block_number {
        return Value::Null;
    }

    let txs = state.blocks.get(&number).cloned().unwrap_or_default();
    let transactions: Vec<Value> = txs
        .iter()
        .map(|tx| if full { tx_body(tx, number) } else { json!(tx.hash) })
        .collect();

    let mut block = json!({
        "number": hex(number),
        "hash": keccak256(number.to_be_bytes()),
        "transactions": transactions,
    });
    if let Some(base_fee) = state.base_fee {
        block["baseFeePerGas"] = json!(format!("{:#x}", base_fee));
    }
    block
}

fn transaction_json(state: &NodeState, hash: B256) -> Value {
    for (number, txs) in &state.blocks {
        if let Some(tx) = txs.iter().find(|tx| tx.hash == hash) {
            return tx_body(tx, *number);
        }
    }
    match state.writes.iter().find(|w| w.hash == hash) {
        Some(write) => json!({ "hash": write.hash, "to": write.to, "nonce": hex(write.nonce) }),
        None => Value::Null,
    }
}

fn selector_matches(data: &[u8], signature: &str) -> bool {
    data.len() >= 4 && data[..4] == function_selector(signature)
}

fn encode(types: &[&str], values: Vec<DynSolValue>) -> Vec<u8> {
    encode_params(types, values).unwrap()
}

fn string(value: &DynSolValue) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn address(value: &DynSolValue) -> Address {
    value.as_address().unwrap()
}

fn bytes32(value: &DynSolValue) -> B256 {
    let (bytes, _) = value.as_fixed_bytes().unwrap();
    B256::from_slice(bytes)
}

fn record_values(record: &Record, codehash: B256) -> Vec<DynSolValue> {
    vec![
        DynSolValue::Uint(U256::from(record.verdict), 8),
        DynSolValue::String(record.name.clone()),
        DynSolValue::String(record.summary.clone()),
        DynSolValue::String(record.description.clone()),
        DynSolValue::String(record.reasons.clone()),
        DynSolValue::Uint(U256::from(record.updated_at), 64),
        DynSolValue::FixedBytes(codehash, 32),
    ]
}

/// Execute a view call.
fn call(state: &NodeState, to: Address, data: &[u8]) -> Vec<u8> {
    let codehash = |address: &Address| {
        state
            .code
            .get(address)
            .map(|code| keccak256(code))
            .unwrap_or_default()
    };

    if to == state.registry {
        if selector_matches(data, registry::GET_RECORD_CURRENT) {
            let args = decode_params(&data[4..], &["address"]).unwrap();
            let implementation = address(&args[0]);
            let record = state.records.get(&implementation).cloned().unwrap_or_default();
            return encode(
                &["uint8", "string", "string", "string", "string", "uint64", "bytes32"],
                record_values(&record, codehash(&implementation)),
            );
        }
        if selector_matches(data, registry::GET_SWAP_RECORD_CURRENT) {
            let args = decode_params(&data[4..], &["address", "address"]).unwrap();
            let (from, to) = (address(&args[0]), address(&args[1]));
            let record = state.swap_records.get(&(from, to)).cloned().unwrap_or_default();
            let mut values = record_values(&record, codehash(&from));
            values.push(DynSolValue::FixedBytes(codehash(&to), 32));
            return encode(
                &["uint8", "string", "string", "string", "string", "uint64", "bytes32", "bytes32"],
                values,
            );
        }
        if selector_matches(data, registry::EXTCODEHASH) {
            let args = decode_params(&data[4..], &["address"]).unwrap();
            return encode(&["bytes32"], vec![DynSolValue::FixedBytes(codehash(&address(&args[0])), 32)]);
        }
        return Vec::new();
    }

    // Undelegated accounts have no code: every call returns empty data.
    let Some(implementation) = state.implementations.get(&to) else {
        return Vec::new();
    };

    if selector_matches(data, guard::GET_IMPLEMENTATION) {
        return encode(&["address"], vec![DynSolValue::Address(*implementation)]);
    }
    if selector_matches(data, guard::IS_FROZEN) {
        return encode(&["bool"], vec![DynSolValue::Bool(state.frozen.contains_key(&to))]);
    }
    if selector_matches(data, guard::GET_TX_NOTE) {
        let args = decode_params(&data[4..], &["bytes32"]).unwrap();
        let note = state.notes.get(&(to, bytes32(&args[0]))).cloned().unwrap_or_default();
        return encode(
            &["string", "string", "string", "string", "uint64"],
            vec![
                DynSolValue::String(note.name),
                DynSolValue::String(note.summary),
                DynSolValue::String(note.description),
                DynSolValue::String(note.reasons),
                DynSolValue::Uint(U256::from(note.updated_at), 64),
            ],
        );
    }
    Vec::new()
}

const WRITES: [(&str, &[&str]); 6] = [
    (guard::SET_TX_NOTE, &["bytes32", "string", "string", "string", "string"]),
    (
        guard::FREEZE_WITH_TX_NOTE,
        &["bytes32", "string", "string", "string", "string", "string"],
    ),
    (guard::UNFREEZE, &[]),
    (guard::FORCE_SET_IMPLEMENTATION, &["address"]),
    (
        registry::SET_RECORD_CURRENT,
        &["address", "uint8", "string", "string", "string", "string"],
    ),
    (
        registry::SET_SWAP_RECORD_CURRENT,
        &["address", "address", "uint8", "string", "string", "string", "string"],
    ),
];

fn send_raw(state: &mut NodeState, raw: &[u8]) -> Result<Value, Value> {
    let mode = state.send_modes.pop_front().unwrap_or(SendMode::Accept);
    let envelope = TxEnvelope::decode_2718(&mut &raw[..])
        .map_err(|e| json!({ "code": -32602, "message": format!("invalid raw transaction: {}", e) }))?;

    if mode == SendMode::Reject {
        return Err(json!({ "code": -32000, "message": "nonce too low" }));
    }

    let hash = *envelope.tx_hash();
    let to = envelope.to().unwrap_or_default();
    let input = envelope.input().clone();
    let (function, types) = WRITES
        .iter()
        .find(|(signature, _)| selector_matches(&input, signature))
        .copied()
        .unwrap_or(("unknown", &[]));
    let args = if input.len() > 4 {
        decode_params(&input[4..], types).unwrap_or_default()
    } else {
        Vec::new()
    };

    let legacy = matches!(envelope, TxEnvelope::Legacy(_));
    state.writes.push(Write {
        hash,
        to,
        function,
        legacy,
        nonce: envelope.nonce(),
        gas_limit: envelope.gas_limit(),
        gas_price: envelope.gas_price(),
        max_fee_per_gas: if legacy { None } else { Some(envelope.max_fee_per_gas()) },
        max_priority_fee_per_gas: envelope.max_priority_fee_per_gas(),
        args: args.clone(),
    });

    match mode {
        SendMode::Pending => {
            state.pending.insert(hash);
        }
        SendMode::Revert => {
            state.receipts.insert(hash, 0);
        }
        SendMode::Accept | SendMode::ErrorButMined => {
            apply_write(state, to, function, &args);
            state.receipts.insert(hash, 1);
        }
        SendMode::Reject => {}
    }

    if mode == SendMode::ErrorButMined {
        return Err(json!({ "code": -32000, "message": "request timed out" }));
    }
    Ok(json!(hash))
}

fn apply_write(state: &mut NodeState, to: Address, function: &str, args: &[DynSolValue]) {
    state.timestamp += 12;
    let now = state.timestamp;
    let note = |offset: usize| Note {
        name: string(&args[offset]),
        summary: string(&args[offset + 1]),
        description: string(&args[offset + 2]),
        reasons: string(&args[offset + 3]),
        updated_at: now,
    };
    let record = |verdict: &DynSolValue, offset: usize| Record {
        verdict: verdict.as_uint().map(|(v, _)| v.to::<u8>()).unwrap_or_default(),
        name: string(&args[offset]),
        summary: string(&args[offset + 1]),
        description: string(&args[offset + 2]),
        reasons: string(&args[offset + 3]),
        updated_at: now,
    };

    let guard_write = [
        guard::SET_TX_NOTE,
        guard::FREEZE_WITH_TX_NOTE,
        guard::UNFREEZE,
        guard::FORCE_SET_IMPLEMENTATION,
    ]
    .contains(&function);
    // A plain account accepts any call and stores nothing.
    if guard_write && !state.implementations.contains_key(&to) {
        return;
    }

    match function {
        f if f == guard::SET_TX_NOTE => {
            state.notes.insert((to, bytes32(&args[0])), note(1));
        }
        f if f == guard::FREEZE_WITH_TX_NOTE => {
            state.frozen.insert(to, string(&args[1]));
            state.notes.insert((to, bytes32(&args[0])), note(2));
        }
        f if f == guard::UNFREEZE => {
            state.frozen.remove(&to);
        }
        f if f == guard::FORCE_SET_IMPLEMENTATION => {
            state.implementations.insert(to, address(&args[0]));
        }
        f if f == registry::SET_RECORD_CURRENT => {
            state.records.insert(address(&args[0]), record(&args[1], 2));
        }
        f if f == registry::SET_SWAP_RECORD_CURRENT => {
            state
                .swap_records
                .insert((address(&args[0]), address(&args[1])), record(&args[2], 3));
        }
        _ => {}
    }
}

pub fn verdict(label: RiskLabel, confidence: f64) -> AuditVerdict {
    AuditVerdict {
        label,
        confidence,
        name: format!("{} verdict", label),
        summary: match label {
            RiskLabel::Safe => "Nothing suspicious".to_string(),
            RiskLabel::Unsafe => "Drains the wallet".to_string(),
        },
        description: "Scripted by the test".to_string(),
        reasons: vec!["scripted".to_string()],
        matched_patterns: Vec::new(),
    }
}

/// Oracle answering from a script, then from a fixed verdict (or failing
/// when there is none).
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<AuditVerdict, OracleError>>>,
    fallback: Mutex<Option<AuditVerdict>>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<OracleContext>>,
}

impl ScriptedOracle {
    pub fn always(verdict: AuditVerdict) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Some(verdict)),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, result: Result<AuditVerdict, OracleError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_fallback(&self, verdict: Option<AuditVerdict>) {
        *self.fallback.lock().unwrap() = verdict;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<OracleContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskOracle for ScriptedOracle {
    async fn classify(&self, context: &OracleContext) -> Result<AuditVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        match self.fallback.lock().unwrap().clone() {
            Some(verdict) => Ok(verdict),
            None => Err(OracleError::Transport("oracle unavailable".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
