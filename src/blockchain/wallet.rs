//! Signing keys and their roles.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//! - The `Debug` impl prints the role and address only

use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Which designated key a wallet holds. Each contract write is gated on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Writes verdicts to the registry.
    Publisher,
    /// Writes transaction notes and freezes wallets.
    Sentinel,
    /// Unfreezes wallets and forces implementation changes.
    Recovery,
}

impl KeyRole {
    /// Environment variable holding the hex private key for this role.
    pub fn env_var(&self) -> &'static str {
        match self {
            KeyRole::Publisher => "PUBLISHER_PK",
            KeyRole::Sentinel => "SENTINEL_PK",
            KeyRole::Recovery => "RECOVERY_PK",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyRole::Publisher => "publisher",
            KeyRole::Sentinel => "sentinel",
            KeyRole::Recovery => "recovery",
        };
        f.write_str(name)
    }
}

/// A signed, 2718-encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Bytes,
    /// Locally computed hash; used to recover ambiguous submissions.
    pub hash: B256,
}

/// A private key bound to a role.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    role: KeyRole,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key (with or without `0x`).
    pub fn from_private_key(private_key_hex: &str, role: KeyRole) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid {} private key format: {}", role, e)))?;

        tracing::info!(role = %role, address = %signer.address(), "Wallet initialized");

        Ok(Self { signer, role })
    }

    /// Load the key for `role` from its environment variable.
    pub fn from_env(role: KeyRole) -> BlockchainResult<Self> {
        let private_key = std::env::var(role.env_var()).map_err(|_| {
            BlockchainError::Wallet(format!("Environment variable {} not set", role.env_var()))
        })?;

        Self::from_private_key(&private_key, role)
    }

    /// Like [`Wallet::from_env`] but `None` when the variable is unset.
    pub fn from_env_optional(role: KeyRole) -> BlockchainResult<Option<Self>> {
        match std::env::var(role.env_var()) {
            Ok(key) if !key.trim().is_empty() => Self::from_private_key(&key, role).map(Some),
            _ => Ok(None),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Sign a typed transaction and produce its 2718 envelope bytes.
    pub fn sign<T>(&self, mut tx: T) -> BlockchainResult<SignedTx>
    where
        T: SignableTransaction<alloy::signers::Signature>,
        TxEnvelope: From<alloy::consensus::Signed<T>>,
    {
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))?;

        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw = envelope.encoded_2718();
        // The transaction hash is the keccak of its 2718 encoding.
        let hash = keccak256(&raw);

        Ok(SignedTx { raw: raw.into(), hash })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("role", &self.role)
            .field("address", &self.address())
            .finish()
    }
}
