//! Guard client for delegated wallets.
//!
//! The guard runs as the delegated code of each watched wallet, so every call
//! goes to the wallet address itself.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use std::time::Duration;

use crate::blockchain::codec::encode_calldata;
use crate::blockchain::rpc::RpcClient;
use crate::blockchain::transaction::TxSigner;
use crate::blockchain::types::BlockchainResult;
use crate::blockchain::wallet::KeyRole;
use crate::contracts::{require_role, transact, view, TxOutcome, DEFAULT_RECEIPT_TIMEOUT};

pub const GET_IMPLEMENTATION: &str = "aegis_getImplementation()";
pub const IS_FROZEN: &str = "aegis_isFrozen()";
pub const GET_TX_NOTE: &str = "aegis_getTxNote(bytes32)";
pub const SET_TX_NOTE: &str = "aegis_setTxNote(bytes32,string,string,string,string)";
pub const FREEZE_WITH_TX_NOTE: &str = "aegis_freezeWithTxNote(bytes32,string,string,string,string,string)";
pub const UNFREEZE: &str = "aegis_unfreeze()";
pub const FORCE_SET_IMPLEMENTATION: &str = "aegis_forceSetImplementation(address)";
pub const SET_IMPLEMENTATION: &str = "aegis_setImplementation(address)";
pub const INIT: &str = "aegis_init(address,address,address)";
pub const DISPATCH: &str = "dispatch((address,uint256,bytes)[])";

/// Audit outcome stored at the wallet for one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxNote {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub reasons: String,
    /// Zero until the note has been written.
    pub updated_at: u64,
}

impl TxNote {
    pub fn status(self) -> TxNoteStatus {
        if self.updated_at > 0 {
            TxNoteStatus::Recorded(self)
        } else {
            TxNoteStatus::Pending
        }
    }

    fn text_args(&self) -> [DynSolValue; 4] {
        [
            DynSolValue::String(self.name.clone()),
            DynSolValue::String(self.summary.clone()),
            DynSolValue::String(self.description.clone()),
            DynSolValue::String(self.reasons.clone()),
        ]
    }
}

/// Whether a transaction still needs auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxNoteStatus {
    Pending,
    Recorded(TxNote),
}

impl TxNoteStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, TxNoteStatus::Recorded(_))
    }
}

/// One entry of a `dispatch` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Calldata for `aegis_setImplementation(new_impl)`.
pub fn set_implementation_calldata(new_impl: Address) -> BlockchainResult<Bytes> {
    encode_calldata(SET_IMPLEMENTATION, &["address"], vec![DynSolValue::Address(new_impl)])
}

/// Calldata for `aegis_init(new_impl, recovery, sentinel)`.
pub fn init_calldata(new_impl: Address, recovery: Address, sentinel: Address) -> BlockchainResult<Bytes> {
    encode_calldata(
        INIT,
        &["address", "address", "address"],
        vec![
            DynSolValue::Address(new_impl),
            DynSolValue::Address(recovery),
            DynSolValue::Address(sentinel),
        ],
    )
}

/// Calldata for `dispatch(calls)`.
pub fn dispatch_calldata(calls: &[Call]) -> BlockchainResult<Bytes> {
    let batch = calls
        .iter()
        .map(|call| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(call.to),
                DynSolValue::Uint(call.value, 256),
                DynSolValue::Bytes(call.data.to_vec()),
            ])
        })
        .collect();
    encode_calldata(DISPATCH, &["(address,uint256,bytes)[]"], vec![DynSolValue::Array(batch)])
}

/// Typed client for guard logic at a wallet address.
#[derive(Debug, Clone)]
pub struct GuardClient {
    rpc: RpcClient,
    receipt_timeout: Duration,
}

impl GuardClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Implementation the wallet currently delegates to.
    pub async fn get_implementation(&self, wallet: Address) -> BlockchainResult<Address> {
        let mut out = view(&self.rpc, wallet, GET_IMPLEMENTATION, &[], vec![], &["address"]).await?;
        out.address()
    }

    pub async fn is_frozen(&self, wallet: Address) -> BlockchainResult<bool> {
        let mut out = view(&self.rpc, wallet, IS_FROZEN, &[], vec![], &["bool"]).await?;
        out.boolean()
    }

    pub async fn get_tx_note(&self, wallet: Address, tx_hash: B256) -> BlockchainResult<TxNote> {
        let mut out = view(
            &self.rpc,
            wallet,
            GET_TX_NOTE,
            &["bytes32"],
            vec![DynSolValue::FixedBytes(tx_hash, 32)],
            &["string", "string", "string", "string", "uint64"],
        )
        .await?;

        Ok(TxNote {
            name: out.string()?,
            summary: out.string()?,
            description: out.string()?,
            reasons: out.string()?,
            updated_at: out.u64()?,
        })
    }

    pub async fn tx_note_status(&self, wallet: Address, tx_hash: B256) -> BlockchainResult<TxNoteStatus> {
        self.get_tx_note(wallet, tx_hash).await.map(TxNote::status)
    }

    /// Record `note` for `tx_hash`. Sentinel key.
    pub async fn set_tx_note(
        &self,
        signer: &TxSigner,
        wallet: Address,
        tx_hash: B256,
        note: &TxNote,
    ) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Sentinel], "setTxNote")?;

        let mut args = vec![DynSolValue::FixedBytes(tx_hash, 32)];
        args.extend(note.text_args());

        transact(
            signer,
            wallet,
            SET_TX_NOTE,
            &["bytes32", "string", "string", "string", "string"],
            args,
            self.receipt_timeout,
        )
        .await
    }

    /// Freeze the wallet and record `note` in one call. Sentinel key.
    pub async fn freeze_with_tx_note(
        &self,
        signer: &TxSigner,
        wallet: Address,
        tx_hash: B256,
        freeze_reason: &str,
        note: &TxNote,
    ) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Sentinel], "freezeWithTxNote")?;

        let mut args = vec![
            DynSolValue::FixedBytes(tx_hash, 32),
            DynSolValue::String(freeze_reason.to_string()),
        ];
        args.extend(note.text_args());

        transact(
            signer,
            wallet,
            FREEZE_WITH_TX_NOTE,
            &["bytes32", "string", "string", "string", "string", "string"],
            args,
            self.receipt_timeout,
        )
        .await
    }

    /// Lift a freeze. Recovery or publisher key.
    pub async fn unfreeze(&self, signer: &TxSigner, wallet: Address) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Recovery, KeyRole::Publisher], "unfreeze")?;
        transact(signer, wallet, UNFREEZE, &[], vec![], self.receipt_timeout).await
    }

    /// Replace the implementation without the owner's consent. Recovery key.
    pub async fn force_set_implementation(
        &self,
        signer: &TxSigner,
        wallet: Address,
        implementation: Address,
    ) -> BlockchainResult<TxOutcome> {
        require_role(signer, &[KeyRole::Recovery], "forceSetImplementation")?;
        transact(
            signer,
            wallet,
            FORCE_SET_IMPLEMENTATION,
            &["address"],
            vec![DynSolValue::Address(implementation)],
            self.receipt_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::codec::{decode_params, function_selector};

    #[test]
    fn test_note_status() {
        assert_eq!(TxNote::default().status(), TxNoteStatus::Pending);

        let note = TxNote {
            name: "Transfer".into(),
            updated_at: 1,
            ..Default::default()
        };
        let status = note.clone().status();
        assert!(status.is_recorded());
        assert_eq!(status, TxNoteStatus::Recorded(note));
    }

    #[test]
    fn test_template_calldata() {
        let new_impl = Address::repeat_byte(0x01);
        let data = set_implementation_calldata(new_impl).unwrap();
        assert_eq!(&data[..4], &function_selector(SET_IMPLEMENTATION));
        assert_eq!(&data[16..36], new_impl.as_slice());

        let data = init_calldata(new_impl, Address::repeat_byte(0x02), Address::repeat_byte(0x03)).unwrap();
        assert_eq!(data.len(), 4 + 3 * 32);
        let args = decode_params(&data[4..], &["address", "address", "address"]).unwrap();
        assert_eq!(args[2].as_address(), Some(Address::repeat_byte(0x03)));
    }

    #[test]
    fn test_dispatch_calldata() {
        let calls = vec![
            Call {
                to: Address::repeat_byte(0xaa),
                value: U256::from(5u64),
                data: Bytes::from_static(&[0x12, 0x34]),
            },
            Call {
                to: Address::repeat_byte(0xbb),
                value: U256::ZERO,
                data: Bytes::new(),
            },
        ];
        let data = dispatch_calldata(&calls).unwrap();
        assert_eq!(&data[..4], &function_selector(DISPATCH));

        let decoded = decode_params(&data[4..], &["(address,uint256,bytes)[]"]).unwrap();
        let batch = decoded[0].as_array().unwrap();
        assert_eq!(batch.len(), 2);
        let first = batch[0].as_tuple().unwrap();
        assert_eq!(first[0].as_address(), Some(Address::repeat_byte(0xaa)));
        assert_eq!(first[2].as_bytes(), Some(&[0x12u8, 0x34][..]));
    }
}
