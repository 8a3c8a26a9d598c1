use super::holder::Holder;
use super::top_k::{Offer, TopKSet};
use crate::checkpoint::Checkpoint;
use crate::processor::queue::QueueReceiver;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Everything one block contributed, sent by a scanner once the block is
/// fully scanned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedBlock {
    pub block: u64,
    pub candidates: Vec<Holder>,
}

impl ScannedBlock {
    pub fn new(block: u64, candidates: Vec<Holder>) -> Self {
        Self { block, candidates }
    }
}

struct RankingState {
    top: TopKSet,
    progress: ProgressTracker,
    /// Blocks completed past the watermark, candidates not yet ranked.
    held: BTreeMap<u64, Vec<Holder>>,
}

/// The top-K set and the processed-block watermark behind one lock.
///
/// A block's candidates reach the top-K set only once the watermark moves
/// over that block, so a checkpoint never holds data from a block it does
/// not cover.
#[derive(Clone)]
pub struct SharedRanking {
    inner: Arc<RwLock<RankingState>>,
    advanced: Arc<Notify>,
}

impl SharedRanking {
    pub fn new(top: TopKSet, start_block: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RankingState {
                top,
                progress: ProgressTracker::new(start_block),
                held: BTreeMap::new(),
            })),
            advanced: Arc::new(Notify::new()),
        }
    }

    /// Descending holders plus watermark, copied under one read lock.
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.read();
        Checkpoint::new(state.progress.last_processed(), state.top.descending())
    }

    pub fn last_processed(&self) -> Option<u64> {
        self.read().progress.last_processed()
    }

    /// First block not yet covered by the watermark.
    pub fn next_expected(&self) -> u64 {
        self.read().progress.next_expected()
    }

    /// Completed blocks still waiting for an earlier block.
    pub fn held_blocks(&self) -> usize {
        self.read().progress.parked()
    }

    /// Resolves after the next watermark advance. Registers on creation, so
    /// take it before checking [`next_expected`](Self::next_expected).
    pub fn watermark_advanced(&self) -> Notified<'_> {
        self.advanced.notified()
    }

    pub fn len(&self) -> usize {
        self.read().top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().top.is_empty()
    }

    /// Records `scanned` as complete and ranks every held block the
    /// watermark now covers, in block order.
    pub(crate) fn apply(&self, scanned: ScannedBlock) -> Applied {
        let mut state = self.write();
        let previous = state.progress.next_expected();
        if scanned.block < previous {
            tracing::warn!(block = scanned.block, "ignoring block behind the watermark");
            return Applied::default();
        }

        state.held.insert(scanned.block, scanned.candidates);
        state.progress.mark_completed(scanned.block);

        let next = state.progress.next_expected();
        if next == previous {
            return Applied::default();
        }

        let still_held = state.held.split_off(&next);
        let released = std::mem::replace(&mut state.held, still_held);
        let mut applied = Applied {
            released_blocks: released.len(),
            offers: Vec::new(),
        };
        for holder in released.into_values().flatten() {
            applied.offers.push(state.top.offer(holder));
        }
        drop(state);

        self.advanced.notify_waiters();
        applied
    }

    fn read(&self) -> RwLockReadGuard<'_, RankingState> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RankingState> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Applied {
    released_blocks: usize,
    offers: Vec<Offer>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintainerSummary {
    pub blocks_received: u64,
    /// Candidates offered to the top-K set.
    pub candidates_ranked: u64,
    /// Blocks still held behind a gap when the queue closed; their
    /// candidates were dropped.
    pub blocks_discarded: usize,
}

/// Single writer of the ranking. Runs until every sender of the ranking
/// queue is gone and the queue is empty.
pub struct RankingMaintainer {
    ranking: SharedRanking,
    events: QueueReceiver<ScannedBlock>,
    telemetry: Arc<Telemetry>,
}

impl RankingMaintainer {
    pub fn new(
        ranking: SharedRanking,
        events: QueueReceiver<ScannedBlock>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            ranking,
            events,
            telemetry,
        }
    }

    pub fn spawn(self) -> JoinHandle<MaintainerSummary> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> MaintainerSummary {
        let mut summary = MaintainerSummary::default();

        while let Some(scanned) = self.events.recv().await {
            summary.blocks_received += 1;
            let block = scanned.block;
            let applied = self.ranking.apply(scanned);

            for offer in &applied.offers {
                summary.candidates_ranked += 1;
                match offer {
                    Offer::Inserted => self.telemetry.record_inserted(),
                    Offer::Replaced(evicted) => {
                        self.telemetry.record_replaced();
                        tracing::trace!(evicted = %evicted, "evicted ranking minimum");
                    }
                    Offer::Discarded => self.telemetry.record_discarded(),
                }
            }
            if applied.released_blocks > 0 {
                tracing::trace!(
                    block,
                    released = applied.released_blocks,
                    watermark = ?self.ranking.last_processed(),
                    "watermark advanced"
                );
            }
        }

        summary.blocks_discarded = self.ranking.held_blocks();
        tracing::info!(
            blocks = summary.blocks_received,
            candidates = summary.candidates_ranked,
            discarded_blocks = summary.blocks_discarded,
            holders = self.ranking.len(),
            last_processed_block = ?self.ranking.last_processed(),
            "ranking queue drained"
        );
        summary
    }
}
