//! Verdict registry client.
//!
//! Records are keyed by implementation address, or by a (from, to) pair for
//! swaps. The contract keeps a "current" version per key; the sentinel only
//! reads it and appends new versions with the publisher key.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, U256};
use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::blockchain::codec::Decoded;
use crate::blockchain::rpc::RpcClient;
use crate::blockchain::transaction::TxSigner;
use crate::blockchain::types::BlockchainResult;
use crate::blockchain::wallet::KeyRole;
use crate::contracts::{require_role, transact, view, TxOutcome, DEFAULT_RECEIPT_TIMEOUT};

pub const GET_RECORD_CURRENT: &str = "getRecordCurrent(address)";
pub const GET_SWAP_RECORD_CURRENT: &str = "getSwapRecordCurrent(address,address)";
pub const SET_RECORD_CURRENT: &str = "setRecordCurrent(address,uint8,string,string,string,string)";
pub const SET_SWAP_RECORD_CURRENT: &str =
    "setSwapRecordCurrent(address,address,uint8,string,string,string,string)";
pub const EXTCODEHASH: &str = "extcodehash(address)";

const RECORD_OUTPUTS: [&str; 7] = ["uint8", "string", "string", "string", "string", "uint64", "bytes32"];
const SWAP_RECORD_OUTPUTS: [&str; 8] = [
    "uint8", "string", "string", "string", "string", "uint64", "bytes32", "bytes32",
];

/// On-chain verdict byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Verdict {
    #[default]
    Unknown = 0,
    Safe = 1,
    Unsafe = 2,
}

impl Verdict {
    /// `SAFE` maps to [`Verdict::Safe`]; every other label is unsafe.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("SAFE") {
            Verdict::Safe
        } else {
            Verdict::Unsafe
        }
    }

    /// Unrecognised bytes read back as [`Verdict::Unknown`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Verdict::Safe,
            2 => Verdict::Unsafe,
            _ => Verdict::Unknown,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Human-readable fields written alongside a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordText {
    pub name: String,
    pub summary: String,
    pub description: String,
    /// Newline-joined reasons.
    pub reasons: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplRecord {
    pub verdict: Verdict,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: String,
    pub updated_at: u64,
    pub codehash: B256,
}

impl ImplRecord {
    fn decode(mut out: Decoded) -> BlockchainResult<Self> {
        Ok(Self {
            verdict: Verdict::from_u8(out.u8()?),
            name: out.string()?,
            summary: out.string()?,
            description: out.string()?,
            reasons: out.string()?,
            updated_at: out.u64()?,
            codehash: out.bytes32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub verdict: Verdict,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: String,
    pub updated_at: u64,
    pub from_codehash: B256,
    pub to_codehash: B256,
}

impl SwapRecord {
    fn decode(mut out: Decoded) -> BlockchainResult<Self> {
        Ok(Self {
            verdict: Verdict::from_u8(out.u8()?),
            name: out.string()?,
            summary: out.string()?,
            description: out.string()?,
            reasons: out.string()?,
            updated_at: out.u64()?,
            from_codehash: out.bytes32()?,
            to_codehash: out.bytes32()?,
        })
    }
}

fn text_args(text: &RecordText) -> [DynSolValue; 4] {
    [
        DynSolValue::String(text.name.clone()),
        DynSolValue::String(text.summary.clone()),
        DynSolValue::String(text.description.clone()),
        DynSolValue::String(text.reasons.clone()),
    ]
}

/// Typed client for the registry contract.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    rpc: RpcClient,
    address: Address,
    receipt_timeout: Duration,
}

impl RegistryClient {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self {
            rpc,
            address,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn extcodehash(&self, target: Address) -> BlockchainResult<B256> {
        let mut out = view(
            &self.rpc,
            self.address,
            EXTCODEHASH,
            &["address"],
            vec![DynSolValue::Address(target)],
            &["bytes32"],
        )
        .await?;
        out.bytes32()
    }

    pub async fn get_record_current(&self, implementation: Address) -> BlockchainResult<ImplRecord> {
        let out = view(
            &self.rpc,
            self.address,
            GET_RECORD_CURRENT,
            &["address"],
            vec![DynSolValue::Address(implementation)],
            &RECORD_OUTPUTS,
        )
        .await?;
        ImplRecord::decode(out)
    }

    pub async fn get_swap_record_current(
        &self,
        from_impl: Address,
        to_impl: Address,
    ) -> BlockchainResult<SwapRecord> {
        let out = view(
            &self.rpc,
            self.address,
            GET_SWAP_RECORD_CURRENT,
            &["address", "address"],
            vec![DynSolValue::Address(from_impl), DynSolValue::Address(to_impl)],
            &SWAP_RECORD_OUTPUTS,
        )
        .await?;
        SwapRecord::decode(out)
    }

    /// Publish a new current record for `implementation`.
    pub async fn set_record_current(
        &self,
        signer: &TxSigner,
        implementation: Address,
        verdict: Verdict,
        text: &RecordText,
    ) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Publisher], "setRecordCurrent")?;

        let mut args = vec![
            DynSolValue::Address(implementation),
            DynSolValue::Uint(U256::from(verdict.as_u8()), 8),
        ];
        args.extend(text_args(text));

        transact(
            signer,
            self.address,
            SET_RECORD_CURRENT,
            &["address", "uint8", "string", "string", "string", "string"],
            args,
            self.receipt_timeout,
        )
        .await
    }

    /// Publish a new current record for the `from_impl → to_impl` swap.
    pub async fn set_swap_record_current(
        &self,
        signer: &TxSigner,
        from_impl: Address,
        to_impl: Address,
        verdict: Verdict,
        text: &RecordText,
    ) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Publisher], "setSwapRecordCurrent")?;

        let mut args = vec![
            DynSolValue::Address(from_impl),
            DynSolValue::Address(to_impl),
            DynSolValue::Uint(U256::from(verdict.as_u8()), 8),
        ];
        args.extend(text_args(text));

        transact(
            signer,
            self.address,
            SET_SWAP_RECORD_CURRENT,
            &["address", "address", "uint8", "string", "string", "string", "string"],
            args,
            self.receipt_timeout,
        )
        .await
    }
}
