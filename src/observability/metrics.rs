//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sentinel_blocks_processed_total` (counter): blocks fully resolved, by chain
//! - `sentinel_cursor_block` (gauge): last processed block, by chain
//! - `sentinel_tx_audited_total` (counter): post-audits, by chain and label
//! - `sentinel_wallets_frozen_total` (counter): freezes written, by chain
//! - `sentinel_chain_write_failures_total` (counter): failed note/freeze writes
//! - `sentinel_notes_unrecorded_total` (counter): writes that mined but left no note
//! - `sentinel_oracle_failures_total` (counter): classification failures, by kind
//! - `sentinel_tick_errors_total` (counter): chain ticks aborted by an error
//! - `sentinel_tx_submitted_total` (counter): submissions, by chain and outcome
//!
//! Without an installed recorder every call is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_block_processed(chain_id: u64, block: u64) {
    let chain = chain_id.to_string();
    ::metrics::counter!("sentinel_blocks_processed_total", "chain" => chain.clone()).increment(1);
    ::metrics::gauge!("sentinel_cursor_block", "chain" => chain).set(block as f64);
}

pub fn record_tx_audited(chain_id: u64, label: &'static str) {
    ::metrics::counter!(
        "sentinel_tx_audited_total",
        "chain" => chain_id.to_string(),
        "label" => label
    )
    .increment(1);
}

pub fn record_wallet_frozen(chain_id: u64) {
    ::metrics::counter!("sentinel_wallets_frozen_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_chain_write_failure(chain_id: u64) {
    ::metrics::counter!("sentinel_chain_write_failures_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_note_unrecorded(chain_id: u64) {
    ::metrics::counter!("sentinel_notes_unrecorded_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_oracle_failure(kind: &'static str) {
    ::metrics::counter!("sentinel_oracle_failures_total", "kind" => kind).increment(1);
}

pub fn record_tick_error(chain_id: u64) {
    ::metrics::counter!("sentinel_tick_errors_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_tx_submitted(chain_id: u64, outcome: &'static str) {
    ::metrics::counter!(
        "sentinel_tx_submitted_total",
        "chain" => chain_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
