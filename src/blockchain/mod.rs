//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (publisher / sentinel / recovery keys)
//!     → wallet.rs (key loading)
//!     → codec.rs (selector + ABI params, return decoding)
//!     → rpc.rs (JSON-RPC 2.0 over a pluggable transport)
//!     → transaction.rs (fee strategy, sign, submit, recover, wait for receipt)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - No retries in the RPC layer; callers own retry policy

pub mod codec;
pub mod rpc;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use rpc::{HttpTransport, RpcClient, RpcTransport};
pub use transaction::{FeeStrategy, TxRequest, TxSigner};
pub use types::{BlockchainError, BlockchainResult, ChainId, SentTx};
pub use wallet::{KeyRole, Wallet};
