//! One pass of the monitor over one chain.
//!
//! # Algorithm
//! ```text
//! watchlist empty                      → done
//! to_block = latest - confirmations    (nothing to do while negative)
//! no cursor                            → cursor = min(start_block) - 1
//! for block in cursor+1 ..= to_block:
//!     for tx from a watched wallet at or after its start block:
//!         note already recorded        → skip
//!         receipt missing              → block incomplete, stop scanning it
//!         classify (fail closed)       → freeze or set note
//!         write failed and no note     → block incomplete, keep going
//!         write mined but no note      → wallet left the guard; warn, move on
//!     block incomplete                 → stop; retried next tick
//!     else                             → cursor = block
//! ```
//!
//! The cursor only passes a block once every watched transaction in it has a
//! note on-chain, so delivery is at-least-once and the note check makes
//! replays free.

use std::collections::HashMap;

use alloy::primitives::{Address, B256};
use serde_json::{json, Value};
use thiserror::Error;

use crate::blockchain::transaction::TxSigner;
use crate::blockchain::types::{BlockchainError, RpcReceipt, RpcTransaction};
use crate::contracts::{ChainContracts, GuardClient, RegistryClient, TxNoteStatus, TxOutcome};
use crate::observability::metrics;
use crate::oracle::{classify_with_retry, AuditVerdict, OracleContext, RiskOracle};
use crate::resilience::RetryPolicy;
use crate::state::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    State(#[from] StoreError),
}

impl MonitorError {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Chain(e) => e.kind(),
            MonitorError::State(e) => e.kind(),
        }
    }
}

/// Everything the monitor needs to act on one chain.
#[derive(Debug, Clone)]
pub struct MonitoredChain {
    pub contracts: ChainContracts,
    pub confirmations: u64,
    /// Sentinel-key signer for notes and freezes.
    pub sentinel: TxSigner,
}

impl MonitoredChain {
    pub fn chain_id(&self) -> u64 {
        self.contracts.chain_id
    }
}

/// What a tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub chain_id: u64,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    /// Cursor after the tick.
    pub cursor: Option<u64>,
    pub blocks_completed: u64,
    pub audited: u32,
    pub frozen: u32,
    /// Transactions whose note already existed.
    pub skipped: u32,
    pub write_failures: u32,
    /// Writes that mined without leaving a note (wallet no longer delegated to the guard).
    pub unrecorded: u32,
    /// Block the tick stopped at, if any.
    pub incomplete_block: Option<u64>,
}

/// Per-tick dependencies shared by every block.
pub struct TickContext<'a> {
    pub store: &'a StateStore,
    pub oracle: &'a dyn RiskOracle,
    pub retry: &'a RetryPolicy,
}

enum TxResolution {
    AlreadyRecorded,
    ReceiptMissing,
    Written { frozen: bool },
    Unrecorded,
    WriteFailed,
}

/// Run one tick for `chain`.
pub async fn tick_chain(chain: &MonitoredChain, ctx: &TickContext<'_>) -> Result<TickReport, MonitorError> {
    let chain_id = chain.chain_id();
    let mut report = TickReport {
        chain_id,
        ..Default::default()
    };

    let items = ctx.store.list_watch(chain_id)?;
    if items.is_empty() {
        return Ok(report);
    }

    let latest = chain.contracts.rpc.block_number().await?;
    let Some(to_block) = latest.checked_sub(chain.confirmations) else {
        return Ok(report);
    };

    let cursor = match ctx.store.get_cursor(chain_id)? {
        Some(cursor) => cursor,
        None => {
            let earliest = items.iter().map(|i| i.start_block).min().unwrap_or(0);
            let initial = earliest.saturating_sub(1).min(to_block);
            tracing::info!(chain_id, cursor = initial, "Initializing cursor");
            ctx.store.set_cursor(chain_id, initial)?
        }
    };
    report.cursor = Some(cursor.last_processed_block);

    let from_block = cursor.last_processed_block + 1;
    if from_block > to_block {
        return Ok(report);
    }
    report.from_block = Some(from_block);
    report.to_block = Some(to_block);

    let watched: HashMap<Address, u64> = items.iter().map(|i| (i.wallet, i.start_block)).collect();
    let mut impl_records: HashMap<Address, Value> = HashMap::new();

    tracing::debug!(chain_id, from_block, to_block, watched = watched.len(), "Scanning blocks");

    for block_number in from_block..=to_block {
        let Some(block) = chain.contracts.rpc.get_block_by_number(block_number, true).await? else {
            tracing::warn!(chain_id, block = block_number, "Block not available yet");
            report.incomplete_block = Some(block_number);
            break;
        };

        let mut complete = true;
        for tx in block.full_transactions() {
            let (Some(wallet), Some(tx_hash)) = (tx.from, tx.hash) else {
                continue;
            };
            match watched.get(&wallet) {
                Some(start) if block_number >= *start => {}
                _ => continue,
            }

            match resolve_tx(chain, ctx, &mut impl_records, wallet, tx_hash, tx).await? {
                TxResolution::AlreadyRecorded => report.skipped += 1,
                TxResolution::ReceiptMissing => {
                    tracing::info!(
                        chain_id,
                        block = block_number,
                        tx_hash = %tx_hash,
                        "Receipt not available yet; block will be retried"
                    );
                    complete = false;
                    break;
                }
                TxResolution::Written { frozen } => {
                    report.audited += 1;
                    if frozen {
                        report.frozen += 1;
                    }
                }
                TxResolution::Unrecorded => {
                    report.audited += 1;
                    report.unrecorded += 1;
                }
                TxResolution::WriteFailed => {
                    report.audited += 1;
                    report.write_failures += 1;
                    complete = false;
                }
            }
        }

        if !complete {
            report.incomplete_block = Some(block_number);
            break;
        }

        let cursor = ctx.store.set_cursor(chain_id, block_number)?;
        report.cursor = Some(cursor.last_processed_block);
        report.blocks_completed += 1;
        metrics::record_block_processed(chain_id, block_number);
    }

    Ok(report)
}

async fn resolve_tx(
    chain: &MonitoredChain,
    ctx: &TickContext<'_>,
    impl_records: &mut HashMap<Address, Value>,
    wallet: Address,
    tx_hash: B256,
    tx: &RpcTransaction,
) -> Result<TxResolution, MonitorError> {
    let chain_id = chain.chain_id();

    if note_recorded(chain, wallet, tx_hash).await {
        return Ok(TxResolution::AlreadyRecorded);
    }

    let Some(receipt) = chain.contracts.rpc.get_transaction_receipt(tx_hash).await? else {
        return Ok(TxResolution::ReceiptMissing);
    };

    if !impl_records.contains_key(&wallet) {
        let record = load_impl_record(chain, wallet).await;
        impl_records.insert(wallet, record);
    }
    let impl_record = impl_records.get(&wallet).cloned().unwrap_or(Value::Null);

    let verdict = postaudit(chain_id, ctx, tx, &receipt, impl_record).await;
    let note = verdict.tx_note(&tx_hash.to_string());
    metrics::record_tx_audited(chain_id, verdict.label.as_str());

    let frozen = !verdict.is_safe();
    let write = if frozen {
        chain
            .contracts
            .guard
            .freeze_with_tx_note(&chain.sentinel, wallet, tx_hash, &verdict.freeze_reason(), &note)
            .await
    } else {
        chain.contracts.guard.set_tx_note(&chain.sentinel, wallet, tx_hash, &note).await
    };

    let written = match write {
        Ok(outcome) if outcome.succeeded() => {
            log_written(chain_id, wallet, tx_hash, &verdict, &outcome);
            true
        }
        Ok(outcome) => {
            tracing::warn!(
                chain_id,
                wallet = %wallet,
                tx_hash = %tx_hash,
                write_tx = %outcome.sent.tx_hash,
                "Note write reverted"
            );
            false
        }
        Err(e) => {
            tracing::error!(
                chain_id,
                wallet = %wallet,
                tx_hash = %tx_hash,
                error = %e,
                kind = e.kind(),
                "Note write failed"
            );
            false
        }
    };

    if written {
        // A plain account accepts the call and stores nothing.
        if !note_recorded(chain, wallet, tx_hash).await {
            tracing::warn!(
                chain_id,
                wallet = %wallet,
                tx_hash = %tx_hash,
                frozen,
                "Write mined but no note was recorded; wallet may no longer delegate to the guard"
            );
            metrics::record_note_unrecorded(chain_id);
            return Ok(TxResolution::Unrecorded);
        }
        if frozen {
            metrics::record_wallet_frozen(chain_id);
        }
        return Ok(TxResolution::Written { frozen });
    }

    metrics::record_chain_write_failure(chain_id);
    // A concurrent writer (or an earlier ambiguous submission) may have
    // recorded the note anyway.
    if note_recorded(chain, wallet, tx_hash).await {
        return Ok(TxResolution::Written { frozen });
    }
    Ok(TxResolution::WriteFailed)
}

/// Unreadable notes count as absent; the write path decides.
async fn note_recorded(chain: &MonitoredChain, wallet: Address, tx_hash: B256) -> bool {
    match chain.contracts.guard.tx_note_status(wallet, tx_hash).await {
        Ok(TxNoteStatus::Recorded(_)) => true,
        Ok(TxNoteStatus::Pending) => false,
        Err(e) => {
            tracing::debug!(chain_id = chain.chain_id(), wallet = %wallet, tx_hash = %tx_hash, error = %e, "Note read failed");
            false
        }
    }
}

/// Current implementation record of `wallet`, or the read error.
pub(crate) async fn load_impl_record_json(
    guard: &GuardClient,
    registry: Option<&RegistryClient>,
    wallet: Address,
) -> Value {
    let implementation = match guard.get_implementation(wallet).await {
        Ok(address) => address,
        Err(e) => {
            return json!({
                "error": format!("failed to load current impl record: {}", e),
                "implAddress": Value::Null,
            })
        }
    };

    let Some(registry) = registry else {
        return json!({
            "error": "no registry configured",
            "implAddress": implementation,
        });
    };

    match registry.get_record_current(implementation).await {
        Ok(record) => {
            let mut value = serde_json::to_value(&record).unwrap_or_else(|_| json!({}));
            if let Value::Object(map) = &mut value {
                map.insert("implAddress".into(), json!(implementation));
            }
            value
        }
        Err(e) => json!({
            "error": format!("failed to load current impl record: {}", e),
            "implAddress": implementation,
        }),
    }
}

async fn load_impl_record(chain: &MonitoredChain, wallet: Address) -> Value {
    load_impl_record_json(&chain.contracts.guard, chain.contracts.registry.as_ref(), wallet).await
}

async fn postaudit(
    chain_id: u64,
    ctx: &TickContext<'_>,
    tx: &RpcTransaction,
    receipt: &RpcReceipt,
    impl_record: Value,
) -> AuditVerdict {
    let context = OracleContext::TxPostaudit {
        chain_id,
        tx: tx.minimal_view(),
        receipt: receipt.minimal_view(),
        impl_record,
    };

    match classify_with_retry(ctx.oracle, &context, ctx.retry).await {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::error!(chain_id, tx_hash = ?tx.hash, error = %e, "Post-audit failed; failing closed");
            AuditVerdict::fail_closed(&e)
        }
    }
}

fn log_written(chain_id: u64, wallet: Address, tx_hash: B256, verdict: &AuditVerdict, outcome: &TxOutcome) {
    tracing::info!(
        chain_id,
        wallet = %wallet,
        tx_hash = %tx_hash,
        label = %verdict.label,
        confidence = verdict.confidence,
        write_tx = %outcome.sent.tx_hash,
        "Transaction audited"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failures_keep_their_kind() {
        let err = MonitorError::from(StoreError::Io {
            path: "state/cursor.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        });
        assert_eq!(err.kind(), "StateError");

        let err = MonitorError::from(BlockchainError::Timeout("receipt".into()));
        assert_eq!(err.kind(), "TimeoutError");
    }
}
