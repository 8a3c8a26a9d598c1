use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::processor::queue::QueueDepth;
use crate::ranking::SharedRanking;
use crate::rpc::LedgerClient;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// Writes `checkpoint` through `store` on the blocking thread pool.
pub async fn persist_checkpoint(
    store: Arc<dyn CheckpointStore>,
    checkpoint: Checkpoint,
) -> Result<()> {
    tokio::task::spawn_blocking(move || store.save(&checkpoint))
        .await
        .context("checkpoint writer task failed")?
}

/// Everything the periodic snapshot needs to read.
pub struct SnapshotReporter {
    pub ranking: SharedRanking,
    pub telemetry: Arc<Telemetry>,
    pub store: Arc<dyn CheckpointStore>,
    pub client: Arc<dyn LedgerClient>,
    pub work_depth: QueueDepth,
    pub ranking_depth: QueueDepth,
    pub interval: Duration,
}

impl SnapshotReporter {
    /// Spawns the reporter loop. The first report happens one full interval
    /// after start; the loop ends when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut last_blocks = self.telemetry.blocks_scanned();
            let mut last_tick = Instant::now();

            loop {
                select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(target: "holderscan::snapshot", "snapshot reporter shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let blocks = self.telemetry.blocks_scanned();
                        let elapsed = last_tick.elapsed().as_secs_f64();
                        self.report(blocks.saturating_sub(last_blocks), elapsed).await;
                        last_blocks = blocks;
                        last_tick = Instant::now();
                    }
                }
            }
        })
    }

    async fn report(&self, blocks_since_last: u64, elapsed_secs: f64) {
        let checkpoint = self.ranking.checkpoint();
        let snapshot = self.telemetry.snapshot();
        let rate = if elapsed_secs <= f64::EPSILON {
            0.0
        } else {
            blocks_since_last as f64 / elapsed_secs
        };
        let rpc = self.client.rpc_metrics().unwrap_or_default();

        tracing::info!(
            target: "holderscan::snapshot",
            current_block = ?snapshot.current_block,
            last_processed_block = ?checkpoint.last_processed_block,
            blocks_since_last,
            rate = format!("{rate:.2}"),
            holders = checkpoint.holders.len(),
            addresses_queried = snapshot.balance_queries,
            work_queue = self.work_depth.len(),
            ranking_queue = self.ranking_depth.len(),
            rpc_requests = rpc.total_requests,
            rpc_balance_requests = rpc.balance_requests,
            rpc_errors = rpc.total_errors,
            rpc_latency_ms = format!("{:.1}", rpc.average_latency_ms),
            "progress snapshot"
        );

        if let Err(err) = persist_checkpoint(self.store.clone(), checkpoint).await {
            tracing::warn!(
                target: "holderscan::snapshot",
                error = %format!("{err:#}"),
                "failed to persist periodic checkpoint"
            );
        }
    }
}
