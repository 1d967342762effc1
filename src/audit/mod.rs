//! Audit orchestrator.
//!
//! # Data Flow
//! ```text
//! scan:        get_code → oracle (impl bytecode) → registry.setRecordCurrent
//! audit-apply: [swap] guard.getImplementation
//!              → scan of the new implementation
//!              → [swap] oracle (current → new) → registry.setSwapRecordCurrent
//!              → template for the wallet owner when every verdict is SAFE
//! precheck:    guard + registry (best effort) → oracle (pending tx) → allow?
//! watch:       latest block → state store
//! ```

pub mod orchestrator;
pub mod types;

pub use orchestrator::AuditOrchestrator;
pub use types::{
    ApplyMode, AuditApplyRequest, AuditApplyResponse, AuditError, AuditResult, PrecheckRequest,
    PrecheckResponse, ScanResponse, TxNoteResponse, TxTemplate, WatchListResponse,
};
