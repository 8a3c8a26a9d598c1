//! Holder scan orchestration.
//!
//! `HolderScan` owns every piece of run-scoped state and drives the run
//! through its phases:
//! - `dispatcher` enumerates the block range into the bounded work queue.
//! - `worker_pool` runs the block scanners that feed the ranking queue.
//! - `ranking::maintainer` is the only writer of the top-K set.
//! - `lifecycle` wires the run token, the fatal handler and the reporter.
//!
//! A run always ends with a final checkpoint save, whatever stopped it.

use super::dispatcher::Dispatcher;
use super::lifecycle::LifecycleHandles;
use super::queue;
use super::reporter::{persist_checkpoint, SnapshotReporter};
use super::scanner::ScannerShared;
use super::worker_pool::{WorkerExit, WorkerPool};

use crate::checkpoint::{Checkpoint, CheckpointStore, CsvCheckpointStore};
use crate::ranking::{
    Holder, MaintainerSummary, RankingMaintainer, ScannedBlock, SeenAddressSet, SharedRanking,
    TopKSet,
};
use crate::rpc::{AsyncRpcClient, LedgerClient, RpcMetricsSnapshot};
use crate::runtime::config::{BlockRange, ConfigError, ScanConfig};
use crate::runtime::state::{RunPhase, RunState};
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use anyhow::{anyhow, Context, Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a run left the `Running` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    RangeExhausted,
    Failed,
    Interrupted,
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::RangeExhausted => f.write_str("range exhausted"),
            ScanOutcome::Failed => f.write_str("failed"),
            ScanOutcome::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Final state of a run, produced once draining is complete.
#[derive(Debug)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    pub range: BlockRange,
    /// Watermark written to the final checkpoint.
    pub last_processed_block: Option<u64>,
    /// Highest block any scanner picked up.
    pub current_block: Option<u64>,
    /// Failing block on error, otherwise the current block estimate.
    pub stopping_block: Option<u64>,
    /// Largest balance first.
    pub holders: Vec<Holder>,
    pub enqueued_blocks: u64,
    /// Work-queue entries discarded while draining.
    pub drained_blocks: usize,
    pub maintainer: MaintainerSummary,
    pub telemetry: TelemetrySnapshot,
    pub rpc: Option<RpcMetricsSnapshot>,
    /// The error that stopped a failed run.
    pub error: Option<Error>,
    /// Set when the final checkpoint could not be written.
    pub checkpoint_error: Option<Error>,
}

impl ScanReport {
    pub fn is_success(&self) -> bool {
        self.outcome != ScanOutcome::Failed && self.checkpoint_error.is_none()
    }

    /// Turns a failed run (or a failed final save) into an error.
    pub fn into_result(mut self) -> Result<Self> {
        if self.outcome == ScanOutcome::Failed {
            let error = self
                .error
                .take()
                .unwrap_or_else(|| anyhow!("scan failed without a recorded error"));
            let stopping = self
                .stopping_block
                .map_or_else(|| "unknown".to_string(), |block| block.to_string());
            return Err(error.context(format!(
                "holder scan stopped at block {stopping}; checkpoint covers blocks up to {}",
                self.last_processed_block
                    .map_or_else(|| "none".to_string(), |block| block.to_string())
            )));
        }
        if let Some(error) = self.checkpoint_error.take() {
            return Err(error.context("final checkpoint could not be written"));
        }
        Ok(self)
    }
}

pub struct HolderScan {
    config: ScanConfig,
    client: Arc<dyn LedgerClient>,
    store: Arc<dyn CheckpointStore>,
    shutdown_root: CancellationToken,
    telemetry: Arc<Telemetry>,
    state: RunState,
}

impl HolderScan {
    /// Creates a scan backed by the JSON-RPC client and a CSV checkpoint at
    /// the configured output path.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let client = Arc::new(AsyncRpcClient::from_config(&config)?);
        let store = Arc::new(CsvCheckpointStore::new(config.output_path()));
        Ok(Self::with_parts(config, client, store))
    }

    /// Creates a scan over caller-provided ledger and checkpoint backends.
    pub fn with_parts(
        config: ScanConfig,
        client: Arc<dyn LedgerClient>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            client,
            store,
            shutdown_root: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
            state: RunState::new(),
        }
    }

    /// Replaces the root token so an outer owner (signal handler, test) can
    /// interrupt the run.
    pub fn with_cancellation_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown_root = shutdown;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_root.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs the scan to completion.
    ///
    /// Errors returned here happen before any worker starts (bad range,
    /// unreadable seed checkpoint, unreachable node); nothing is written in
    /// that case. Once running, failures are reported through [`ScanReport`].
    pub async fn run(self) -> Result<ScanReport> {
        let prepared = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(err) => {
                self.state.advance(RunPhase::Finalized);
                return Err(err);
            }
        };
        Ok(self.execute(prepared).await)
    }

    async fn prepare(&self) -> Result<Prepared> {
        let seed = match self.config.seed_checkpoint() {
            Some(path) => {
                self.state.advance(RunPhase::LoadCheckpoint);
                let store = self.store.clone();
                let path = path.to_path_buf();
                let path_label = path.display().to_string();
                let checkpoint = tokio::task::spawn_blocking(move || store.load(&path))
                    .await
                    .context("checkpoint loader task failed")?
                    .with_context(|| format!("failed to load checkpoint {path_label}"))?;
                tracing::info!(
                    path = %path_label,
                    holders = checkpoint.holders.len(),
                    last_processed_block = ?checkpoint.last_processed_block,
                    "loaded seed checkpoint"
                );
                Some(checkpoint)
            }
            None => None,
        };

        let start = match (self.config.start_block(), &seed) {
            (Some(start), _) => start,
            (None, Some(checkpoint)) => checkpoint.next_block(),
            (None, None) => return Err(ConfigError::Missing("start_block").into()),
        };

        let end = match self.config.end_block() {
            Some(end) => end,
            None => {
                let latest = self
                    .client
                    .latest_block_number()
                    .await
                    .context("failed to resolve the latest block number")?;
                tracing::info!(latest, "using latest block as the end of the range");
                latest
            }
        };

        let range = BlockRange::new(start, end)?;
        Ok(Prepared {
            range,
            seed: seed.unwrap_or_default(),
        })
    }

    async fn execute(self, prepared: Prepared) -> ScanReport {
        let Prepared { range, seed } = prepared;
        let config = &self.config;

        let seen = Arc::new(SeenAddressSet::seeded(seed.seen_entries()));
        let top = TopKSet::from_holders(config.top_k(), seed.holders.iter().copied());
        let ranking = SharedRanking::new(top, range.start());

        let (work_tx, work_rx) = queue::bounded::<u64>(config.work_queue_capacity());
        let (ranking_tx, ranking_rx) =
            queue::bounded::<ScannedBlock>(config.ranking_queue_capacity());
        let work_rx = work_rx.into_shared();

        let lifecycle = LifecycleHandles::spawn(
            &self.shutdown_root,
            SnapshotReporter {
                ranking: ranking.clone(),
                telemetry: self.telemetry.clone(),
                store: self.store.clone(),
                client: self.client.clone(),
                work_depth: work_tx.depth(),
                ranking_depth: ranking_tx.depth(),
                interval: config.report_interval(),
            },
        );
        let run_token = lifecycle.run_token.clone();
        let fatal_handler = lifecycle.fatal_handler();

        let maintainer =
            RankingMaintainer::new(ranking.clone(), ranking_rx, self.telemetry.clone()).spawn();

        let pool = WorkerPool::launch(
            config.thread_count(),
            ScannerShared {
                client: self.client.clone(),
                work: work_rx.clone(),
                ranking_tx,
                seen: seen.clone(),
                telemetry: self.telemetry.clone(),
                balance_block: range.end(),
            },
            run_token.clone(),
            fatal_handler.clone(),
        );

        // Room for a full work queue plus one block per scanner, twice over.
        let max_ahead = config
            .work_queue_capacity()
            .saturating_add(config.thread_count())
            .saturating_mul(2) as u64;
        let dispatcher = Dispatcher::new(
            range,
            work_tx,
            ranking.clone(),
            max_ahead,
            run_token.clone(),
        )
        .spawn();

        self.state.advance(RunPhase::Running);
        tracing::info!(
            range = %range,
            top_k = config.top_k(),
            scanners = pool.len(),
            seeded_holders = seed.holders.len(),
            output = %config.output_path().display(),
            "holder scan started"
        );

        let exits = pool.join(&fatal_handler).await;
        let dispatch = match dispatcher.await {
            Ok(summary) => summary,
            Err(err) => {
                fatal_handler.trigger_external("dispatcher task failed", Error::new(err));
                Default::default()
            }
        };

        let outcome = if fatal_handler.is_triggered() {
            ScanOutcome::Failed
        } else if run_token.is_cancelled() {
            ScanOutcome::Interrupted
        } else {
            ScanOutcome::RangeExhausted
        };
        self.state.advance(match outcome {
            ScanOutcome::Failed => RunPhase::Error,
            ScanOutcome::Interrupted => RunPhase::Interrupted,
            ScanOutcome::RangeExhausted => RunPhase::RangeExhausted,
        });
        tracing::info!(
            %outcome,
            enqueued = dispatch.enqueued,
            failed_scanners = exits.iter().filter(|exit| **exit == WorkerExit::Failed).count(),
            "scanners stopped; draining"
        );

        self.state.advance(RunPhase::Draining);
        let drained_blocks = work_rx.close_and_drain().await;
        drop(work_rx);

        let maintainer = match maintainer.await {
            Ok(summary) => summary,
            Err(err) => {
                fatal_handler.trigger_external("ranking maintainer failed", Error::new(err));
                MaintainerSummary::default()
            }
        };
        let error = lifecycle.error();
        lifecycle.shutdown().await;

        let checkpoint: Checkpoint = ranking.checkpoint();
        let checkpoint_error = persist_checkpoint(self.store.clone(), checkpoint.clone())
            .await
            .err();
        match &checkpoint_error {
            None => tracing::info!(
                path = %config.output_path().display(),
                holders = checkpoint.holders.len(),
                last_processed_block = ?checkpoint.last_processed_block,
                "final checkpoint saved"
            ),
            Some(err) => tracing::error!(
                error = %format!("{err:#}"),
                "failed to save final checkpoint"
            ),
        }

        let current_block = self.telemetry.current_block();
        let outcome = if error.is_some() {
            ScanOutcome::Failed
        } else {
            outcome
        };
        let stopping_block = match outcome {
            ScanOutcome::Failed => fatal_handler.failing_block().or(current_block),
            _ => current_block,
        };

        self.state.advance(RunPhase::Finalized);
        let report = ScanReport {
            outcome,
            range,
            last_processed_block: checkpoint.last_processed_block,
            current_block,
            stopping_block,
            holders: checkpoint.holders,
            enqueued_blocks: dispatch.enqueued,
            drained_blocks,
            maintainer,
            telemetry: self.telemetry.snapshot(),
            rpc: self.client.rpc_metrics(),
            error,
            checkpoint_error,
        };

        tracing::info!(
            outcome = %report.outcome,
            last_processed_block = ?report.last_processed_block,
            stopping_block = ?report.stopping_block,
            holders = report.holders.len(),
            drained_blocks = report.drained_blocks,
            discarded_blocks = report.maintainer.blocks_discarded,
            "holder scan finalized"
        );
        report
    }
}

struct Prepared {
    range: BlockRange,
    seed: Checkpoint,
}
