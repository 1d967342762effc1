//! On-chain contract clients.
//!
//! # Data Flow
//! ```text
//! Reads:  codec.rs (calldata) → rpc.rs (eth_call) → codec.rs (Decoded)
//! Writes: codec.rs (calldata) → transaction.rs (sign, send) → receipt
//! ```
//!
//! # Design Decisions
//! - Every write returns only once its transaction has a receipt, or fails
//!   with a timeout; whether the receipt reports success is the caller's call
//! - Writes check the signer's key role before building anything
//! - The guard client targets a wallet address, not a fixed contract

pub mod guard;
pub mod registry;

pub use guard::{GuardClient, TxNote, TxNoteStatus};
pub use registry::{ImplRecord, RecordText, RegistryClient, SwapRecord, Verdict};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use std::time::Duration;

use crate::blockchain::codec::{encode_calldata, Decoded};
use crate::blockchain::rpc::RpcClient;
use crate::blockchain::transaction::{TxRequest, TxSigner};
use crate::blockchain::types::{
    BlockTag, BlockchainError, BlockchainResult, CallRequest, RpcReceipt, SentTx,
};
use crate::blockchain::wallet::KeyRole;

/// Default wait for a write's receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Clients for one chain's registry and guarded wallets.
#[derive(Debug, Clone)]
pub struct ChainContracts {
    pub chain_id: u64,
    pub rpc: RpcClient,
    /// Absent when no registry is deployed on the chain.
    pub registry: Option<RegistryClient>,
    pub guard: GuardClient,
    /// Guard implementation watched wallets are expected to delegate to.
    pub guard_address: Option<Address>,
}

impl ChainContracts {
    pub fn new(
        chain_id: u64,
        rpc: RpcClient,
        registry: Option<Address>,
        guard_address: Option<Address>,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            chain_id,
            registry: registry
                .map(|address| RegistryClient::new(rpc.clone(), address).with_receipt_timeout(receipt_timeout)),
            guard: GuardClient::new(rpc.clone()).with_receipt_timeout(receipt_timeout),
            guard_address,
            rpc,
        }
    }

    /// The registry, or an error naming the chain.
    pub fn registry(&self) -> BlockchainResult<&RegistryClient> {
        self.registry.as_ref().ok_or_else(|| {
            BlockchainError::InvalidInput(format!("no registry configured for chain {}", self.chain_id))
        })
    }
}

/// A submitted write together with its receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub sent: SentTx,
    pub receipt: RpcReceipt,
}

impl TxOutcome {
    /// The receipt reports `status == 1`.
    pub fn succeeded(&self) -> bool {
        self.receipt.succeeded()
    }
}

/// `eth_call` a view function and wrap the decoded outputs.
pub(crate) async fn view(
    rpc: &RpcClient,
    to: Address,
    signature: &str,
    arg_types: &[&str],
    args: Vec<DynSolValue>,
    out_types: &[&str],
) -> BlockchainResult<Decoded> {
    let data = encode_calldata(signature, arg_types, args)?;
    let output = rpc.eth_call(&CallRequest::new(to, data), BlockTag::Latest).await?;
    Decoded::from_hex(&output, out_types)
}

/// Encode, sign, submit and wait for the receipt.
pub(crate) async fn transact(
    signer: &TxSigner,
    to: Address,
    signature: &str,
    arg_types: &[&str],
    args: Vec<DynSolValue>,
    receipt_timeout: Duration,
) -> BlockchainResult<TxOutcome> {
    let data = encode_calldata(signature, arg_types, args)?;
    let (sent, receipt) = signer
        .send_and_wait(&TxRequest::call(to, data), receipt_timeout)
        .await?;

    tracing::debug!(
        chain_id = signer.chain_id(),
        to = %to,
        function = signature,
        tx_hash = %sent.tx_hash,
        succeeded = receipt.succeeded(),
        "Contract write mined"
    );

    Ok(TxOutcome { sent, receipt })
}

/// Fail unless `signer` holds one of `allowed`.
pub(crate) fn require_role(signer: &TxSigner, allowed: &[KeyRole], action: &str) -> BlockchainResult<()> {
    let role = signer.wallet().role();
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(BlockchainError::Wallet(format!(
            "{} requires a {} key, got {}",
            action,
            allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            role
        )))
    }
}
