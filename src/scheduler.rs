//! Ingress entry points and the periodic flush of the pending batch.

use crate::{
    config::RelayConfig,
    services::{gas::GasEstimator, submitter::BatchSubmitter},
    state::batch::BatchAccumulator,
    types::{BatchSnapshot, DeadLetter, Network, PendingEntry, SubmitResponse},
    utils::crypto::{SignatureValidator, TypedDataDomain},
};
use ethers::types::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Skipped,
    Submitted { tx_hash: String, count: usize },
    /// The batch was kept and will be retried on the next tick.
    Failed { reason: String, attempts: u32 },
}

pub struct RelayScheduler {
    accumulator: Arc<BatchAccumulator>,
    submitter: BatchSubmitter,
    period: Duration,
    max_flush_attempts: Option<u32>,
    /// Consecutive failed flushes. Held for a whole flush, so flushes never overlap.
    failed_flushes: Mutex<u32>,
}

impl RelayScheduler {
    pub fn new(
        accumulator: Arc<BatchAccumulator>,
        submitter: BatchSubmitter,
        period: Duration,
    ) -> Self {
        Self {
            accumulator,
            submitter,
            period,
            max_flush_attempts: None,
            failed_flushes: Mutex::new(0),
        }
    }

    /// Evict reverting entries after `attempts` consecutive failed flushes.
    /// `None` retries the same batch forever.
    pub fn with_max_flush_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_flush_attempts = attempts;
        self
    }

    /// Wires validator, estimator, accumulator and submitter over one chain client.
    pub fn from_config(config: &RelayConfig, chain_id: u64, network: Arc<dyn Network>) -> Self {
        let validator = SignatureValidator::new(TypedDataDomain {
            name: config.domain_name.clone(),
            version: config.domain_version.clone(),
            chain_id,
            verifying_contract: config.receiver_address,
        });
        let accumulator = BatchAccumulator::new(
            validator,
            GasEstimator::new(network.clone()),
            config.max_gas_budget,
        );
        let submitter = BatchSubmitter::new(network, config.submit_gas_limit);

        Self::new(Arc::new(accumulator), submitter, config.flush_interval)
            .with_max_flush_attempts(config.max_flush_attempts)
    }

    pub async fn submit(
        &self,
        entry: Option<PendingEntry>,
        signature: Option<Bytes>,
    ) -> SubmitResponse {
        let result = self.accumulator.add(entry.as_ref(), signature.as_ref()).await;
        if let Err(e) = &result {
            info!(reason = %e, "transaction rejected");
        }
        SubmitResponse::from(result)
    }

    pub async fn read_batch(&self) -> BatchSnapshot {
        self.accumulator.snapshot().await
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.accumulator.dead_letters().await
    }

    /// One timer tick: send whatever is pending and drop it once confirmed.
    pub async fn flush(&self) -> FlushOutcome {
        let mut failed_flushes = self.failed_flushes.lock().await;

        let batch = self.accumulator.snapshot().await;
        if batch.is_empty() {
            return FlushOutcome::Skipped;
        }

        let outcome = self.submitter.send(&batch).await;
        if outcome.success {
            self.accumulator.clear_submitted(batch.len()).await;
            *failed_flushes = 0;
            info!(tx = %outcome.info, count = batch.len(), "batch flushed");
            return FlushOutcome::Submitted {
                tx_hash: outcome.info,
                count: batch.len(),
            };
        }

        *failed_flushes += 1;
        let attempts = *failed_flushes;
        error!(
            reason = %outcome.info,
            attempts,
            pending = batch.len(),
            "flush failed, batch kept for next tick"
        );

        if let Some(max) = self.max_flush_attempts {
            if attempts >= max {
                let evicted = self.accumulator.evict_reverting(attempts).await;
                if evicted == 0 {
                    warn!(attempts, "nothing evicted, keeping batch");
                }
                *failed_flushes = 0;
            }
        }

        FlushOutcome::Failed {
            reason: outcome.info,
            attempts,
        }
    }

    /// Starts the flush timer. The first tick fires one period from now;
    /// ticks missed while a flush is in flight are delayed, not bunched up.
    pub fn spawn(self: &Arc<Self>) -> FlushTask {
        let (shutdown, mut stopped) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + scheduler.period, scheduler.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period = ?scheduler.period, "flush timer started");

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        scheduler.flush().await;
                    }
                }
            }
            info!("flush timer stopped");
        });

        FlushTask { shutdown, handle }
    }
}

/// Handle to the running flush timer.
pub struct FlushTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushTask {
    /// Stops the timer. A flush already in flight runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "flush timer task failed");
        }
    }
}
