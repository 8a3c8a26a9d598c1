//! Persisted snapshots of the ranking used to resume a scan.

pub mod csv_store;

use crate::ranking::Holder;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use std::path::Path;

pub use csv_store::CsvCheckpointStore;

/// The ranking as of the last contiguously processed block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// `None` when no block has been fully processed yet.
    pub last_processed_block: Option<u64>,
    /// Largest balance first.
    pub holders: Vec<Holder>,
}

impl Checkpoint {
    pub fn new(last_processed_block: Option<u64>, holders: Vec<Holder>) -> Self {
        Self {
            last_processed_block,
            holders,
        }
    }

    /// First block a run resumed from this checkpoint should scan.
    pub fn next_block(&self) -> u64 {
        self.last_processed_block
            .map_or(0, |block| block.saturating_add(1))
    }

    /// `(address, balance)` pairs used to seed the seen-address set.
    pub fn seen_entries(&self) -> impl Iterator<Item = (Address, U256)> + '_ {
        self.holders
            .iter()
            .map(|holder| (holder.address, holder.balance))
    }
}

/// Persistence boundary for checkpoints.
///
/// Implementations are called from blocking threads and must be shareable.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Checkpoint>;

    /// Overwrites the store's configured destination.
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}
