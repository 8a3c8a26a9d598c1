//! Block scanner workers: fetch a block, look up balances for addresses not
//! seen before, and hand the results to the ranking maintainer.

use crate::processor::queue::{QueueSender, SharedReceiver};
use crate::ranking::{Holder, ScannedBlock, SeenAddressSet};
use crate::rpc::LedgerClient;
use crate::runtime::fatal::ScanFailure;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State every scanner in a pool shares.
#[derive(Clone)]
pub struct ScannerShared {
    pub client: Arc<dyn LedgerClient>,
    pub work: SharedReceiver<u64>,
    pub ranking_tx: QueueSender<ScannedBlock>,
    pub seen: Arc<SeenAddressSet>,
    pub telemetry: Arc<Telemetry>,
    /// Height at which every balance is read.
    pub balance_block: u64,
}

/// Why a scanner stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerExit {
    /// The work queue was closed and empty.
    Exhausted,
    Cancelled,
}

enum BlockOutcome {
    Completed,
    Cancelled,
}

/// Outcome of an RPC call raced against the run token.
enum CallDecision<T> {
    Finished(Result<T>),
    Cancelled,
}

pub struct BlockScanner {
    pub id: usize,
    shared: ScannerShared,
    shutdown: CancellationToken,
}

impl BlockScanner {
    pub fn new(id: usize, shared: ScannerShared, shutdown: CancellationToken) -> Self {
        Self {
            id,
            shared,
            shutdown,
        }
    }

    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub async fn run(self) -> Result<ScannerExit, ScanFailure> {
        tracing::debug!("scanner started");

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                block = self.shared.work.recv() => Some(block),
            };

            let block = match next {
                None => break ScannerExit::Cancelled,
                Some(None) => break ScannerExit::Exhausted,
                Some(Some(block)) => block,
            };

            self.shared.telemetry.observe_block(block);
            match self.scan_block(block).await {
                Ok(BlockOutcome::Completed) => {}
                Ok(BlockOutcome::Cancelled) => {
                    tracing::debug!(block, "block abandoned after cancellation");
                    break ScannerExit::Cancelled;
                }
                Err(err) => {
                    self.shared.telemetry.record_rpc_error();
                    return Err(ScanFailure::new(block, err));
                }
            }
        };

        tracing::debug!(?exit, "scanner exited");
        Ok(exit)
    }

    async fn scan_block(&self, block: u64) -> Result<BlockOutcome> {
        let shared = &self.shared;
        let transactions = match self.interruptible(shared.client.block_participants(block)).await
        {
            CallDecision::Finished(result) => result?,
            CallDecision::Cancelled => return Ok(BlockOutcome::Cancelled),
        };

        let mut candidates = Vec::new();
        for transaction in &transactions {
            for participant in [transaction.sender(), transaction.receiver()] {
                let Some(address) = participant else {
                    shared.telemetry.record_empty_participant();
                    continue;
                };

                if !shared.seen.try_reserve(address) {
                    shared.telemetry.record_duplicate_address();
                    continue;
                }

                shared.telemetry.record_balance_query();
                let balance = match self
                    .interruptible(shared.client.balance_at(address, shared.balance_block))
                    .await
                {
                    CallDecision::Finished(result) => result?,
                    CallDecision::Cancelled => return Ok(BlockOutcome::Cancelled),
                };
                shared.seen.record_balance(address, balance);
                candidates.push(Holder::new(address, balance));
            }
        }

        // Emit the block as a unit; a block cut short by cancellation
        // contributes nothing.
        if self.shutdown.is_cancelled() {
            return Ok(BlockOutcome::Cancelled);
        }

        let candidate_count = candidates.len();
        if shared
            .ranking_tx
            .send(ScannedBlock::new(block, candidates))
            .await
            .is_err()
        {
            return Ok(BlockOutcome::Cancelled);
        }

        shared.telemetry.record_block_scanned(transactions.len());
        tracing::trace!(
            block,
            transactions = transactions.len(),
            candidates = candidate_count,
            "block scanned"
        );
        Ok(BlockOutcome::Completed)
    }

    async fn interruptible<T>(&self, call: impl Future<Output = Result<T>>) -> CallDecision<T> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => CallDecision::Cancelled,
            result = call => CallDecision::Finished(result),
        }
    }
}
