//! Background loop ticking every configured chain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::lifecycle::Shutdown;
use crate::monitor::tick::{tick_chain, MonitorError, MonitoredChain, TickContext, TickReport};
use crate::observability::metrics;
use crate::oracle::RiskOracle;
use crate::resilience::RetryPolicy;
use crate::state::StateStore;

/// The chain monitor.
pub struct ChainMonitor {
    chains: Vec<MonitoredChain>,
    store: StateStore,
    oracle: Arc<dyn RiskOracle>,
    retry: RetryPolicy,
    interval: Duration,
    stop_timeout: Duration,
}

impl ChainMonitor {
    pub fn new(chains: Vec<MonitoredChain>, store: StateStore, oracle: Arc<dyn RiskOracle>) -> Self {
        Self {
            chains,
            store,
            oracle,
            retry: RetryPolicy::default(),
            interval: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.iter().map(|c| c.chain_id()).collect()
    }

    /// Tick every chain in order. A failing chain is logged and does not
    /// stop the others.
    pub async fn tick_all(&self) -> Vec<Result<TickReport, MonitorError>> {
        let ctx = TickContext {
            store: &self.store,
            oracle: self.oracle.as_ref(),
            retry: &self.retry,
        };

        let mut results = Vec::with_capacity(self.chains.len());
        for chain in &self.chains {
            let result = tick_chain(chain, &ctx).await;
            match &result {
                Ok(report) if report.audited > 0 || report.incomplete_block.is_some() => {
                    tracing::info!(
                        chain_id = chain.chain_id(),
                        cursor = ?report.cursor,
                        audited = report.audited,
                        frozen = report.frozen,
                        incomplete_block = ?report.incomplete_block,
                        "Chain tick finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    metrics::record_tick_error(chain.chain_id());
                    tracing::error!(chain_id = chain.chain_id(), error = %e, kind = e.kind(), "Chain tick failed");
                }
            }
            results.push(result);
        }
        results
    }

    /// Tick, then sleep, until shutdown. A tick in progress is never
    /// interrupted; shutdown is observed between ticks.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            chains = ?self.chain_ids(),
            interval_secs = self.interval.as_secs(),
            "Chain monitor started"
        );

        loop {
            self.tick_all().await;

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = sleep(self.interval) => {}
            }
        }

        tracing::info!("Chain monitor stopped");
    }

    /// Run on a background task.
    pub fn spawn(self, shutdown: &Shutdown) -> MonitorHandle {
        let receiver = shutdown.subscribe();
        let stop_timeout = self.stop_timeout;
        let task = tokio::spawn(async move { self.run(receiver).await });

        MonitorHandle {
            shutdown: shutdown.clone(),
            task,
            stop_timeout,
        }
    }
}

/// Handle to a spawned monitor.
pub struct MonitorHandle {
    shutdown: Shutdown,
    task: JoinHandle<()>,
    stop_timeout: Duration,
}

impl MonitorHandle {
    /// Request shutdown and wait up to the stop timeout. Returns whether the
    /// task finished in time; a late task is left to finish on its own.
    pub async fn stop(self) -> bool {
        self.shutdown.trigger();
        match timeout(self.stop_timeout, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Chain monitor task failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "Chain monitor did not stop in time"
                );
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
