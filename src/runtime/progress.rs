use std::collections::BTreeSet;

/// Tracks the last block below which every block has been fully processed.
///
/// Scanners finish blocks out of order; completions past a gap are parked
/// until the gap closes, so the watermark only ever covers a contiguous
/// prefix of the range.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    next_expected: u64,
    completed_ahead: BTreeSet<u64>,
}

impl ProgressTracker {
    pub fn new(start_block: u64) -> Self {
        Self {
            next_expected: start_block,
            completed_ahead: BTreeSet::new(),
        }
    }

    /// Marks `block` as done and returns the (possibly advanced) watermark.
    pub fn mark_completed(&mut self, block: u64) -> Option<u64> {
        if block >= self.next_expected {
            self.completed_ahead.insert(block);
            while self.completed_ahead.remove(&self.next_expected) {
                self.next_expected = self.next_expected.saturating_add(1);
            }
        }
        self.last_processed()
    }

    /// `None` when nothing at or before the start block has been processed.
    pub fn last_processed(&self) -> Option<u64> {
        self.next_expected.checked_sub(1)
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Blocks completed past the first unfinished block.
    pub fn parked(&self) -> usize {
        self.completed_ahead.len()
    }
}
