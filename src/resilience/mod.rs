//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fallible external call (risk oracle):
//!     → retries.rs (bounded attempts, caller-chosen retryable errors)
//!     → backoff.rs (jittered exponential delay between attempts)
//! ```
//!
//! # Design Decisions
//! - RPC calls are not retried here; the tick and the signer own their
//!   retry semantics
//! - Jittered backoff avoids synchronized retries across chains

pub mod backoff;
pub mod retries;

pub use retries::{retry, RetryPolicy};
