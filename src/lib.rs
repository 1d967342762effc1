//! Aegis sentinel: EIP-7702 wallet guard monitor and audit orchestrator.

pub mod audit;
pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod oracle;
pub mod resilience;
pub mod state;

pub use audit::AuditOrchestrator;
pub use config::schema::SentinelConfig;
pub use lifecycle::Shutdown;
pub use monitor::{ChainMonitor, MonitorHandle};
