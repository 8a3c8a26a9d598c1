use crate::processor::queue::QueueSender;
use crate::ranking::SharedRanking;
use crate::runtime::config::BlockRange;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub enqueued: u64,
    /// `true` when every block of the range was enqueued.
    pub completed: bool,
}

/// Feeds the block numbers of a range into the work queue, waiting whenever
/// the queue is full. Dropping the sender at the end closes the queue.
///
/// A block is only enqueued while it lies less than `max_ahead` blocks past
/// the ranking watermark, which bounds how many finished blocks the
/// maintainer holds behind a slow one.
pub struct Dispatcher {
    range: BlockRange,
    work_tx: QueueSender<u64>,
    ranking: SharedRanking,
    max_ahead: u64,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        range: BlockRange,
        work_tx: QueueSender<u64>,
        ranking: SharedRanking,
        max_ahead: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            range,
            work_tx,
            ranking,
            max_ahead: max_ahead.max(1),
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for block in self.range.blocks() {
            if !self.wait_for_window(block).await {
                tracing::info!(
                    next_block = block,
                    enqueued = summary.enqueued,
                    "dispatcher stopped before the end of the range"
                );
                return summary;
            }

            let sent = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => false,
                result = self.work_tx.send(block) => result.is_ok(),
            };
            if !sent {
                tracing::info!(
                    next_block = block,
                    enqueued = summary.enqueued,
                    "dispatcher stopped before the end of the range"
                );
                return summary;
            }
            summary.enqueued += 1;
        }

        summary.completed = true;
        tracing::info!(
            range = %self.range,
            enqueued = summary.enqueued,
            "dispatcher enqueued the full range"
        );
        summary
    }

    /// Waits until `block` fits in the window; `false` on cancellation.
    async fn wait_for_window(&self, block: u64) -> bool {
        loop {
            let advanced = self.ranking.watermark_advanced();
            let next_expected = self.ranking.next_expected();
            if block < next_expected.saturating_add(self.max_ahead) {
                return true;
            }
            tracing::trace!(block, next_expected, "dispatcher waiting for the watermark");
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = advanced => {}
            }
        }
    }
}
