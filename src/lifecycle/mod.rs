//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → RPC + contract clients → oracle → monitor, orchestrator
//!
//! Shutdown (shutdown.rs):
//!     trigger → monitor finishes its tick → bounded join → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
pub use startup::{initialize, Components, StartupError};
