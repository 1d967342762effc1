//! Chain monitor subsystem.
//!
//! # Data Flow
//! ```text
//! worker.rs (interval loop, shutdown between ticks)
//!     → tick.rs per chain
//!         → rpc (blocks, receipts)
//!         → state store (watchlist, cursor)
//!         → risk oracle (post-audit)
//!         → guard client (note / freeze)
//! ```
//!
//! # Design Decisions
//! - Chains are ticked sequentially; ticks never overlap
//! - Blocks in increasing order, transactions in node order
//! - Per-transaction and per-chain failures are isolated and retried on a
//!   later tick

pub mod tick;
pub mod worker;

pub use tick::{tick_chain, MonitorError, MonitoredChain, TickContext, TickReport};
pub use worker::{ChainMonitor, MonitorHandle};
