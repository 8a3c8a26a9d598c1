use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Run-scoped counters shared by every pipeline stage.
#[derive(Default, Debug)]
pub struct Telemetry {
    blocks_scanned: AtomicU64,
    transactions_seen: AtomicU64,
    empty_participants: AtomicU64,
    duplicate_addresses: AtomicU64,
    balance_queries: AtomicU64,
    candidates_inserted: AtomicU64,
    candidates_replaced: AtomicU64,
    candidates_discarded: AtomicU64,
    rpc_errors: AtomicU64,
    current_block: AtomicU64,
    current_block_set: AtomicBool,
}

impl Telemetry {
    pub fn record_block_scanned(&self, transactions: usize) {
        self.blocks_scanned.fetch_add(1, Ordering::Relaxed);
        self.transactions_seen
            .fetch_add(transactions as u64, Ordering::Relaxed);
    }

    pub fn record_empty_participant(&self) {
        self.empty_participants.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_address(&self) {
        self.duplicate_addresses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_balance_query(&self) {
        self.balance_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inserted(&self) {
        self.candidates_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replaced(&self) {
        self.candidates_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.candidates_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Raises the current block estimate to `block` if it is higher.
    pub fn observe_block(&self, block: u64) {
        self.current_block.fetch_max(block, Ordering::Relaxed);
        self.current_block_set.store(true, Ordering::Relaxed);
    }

    /// Highest block number handed to a scanner so far.
    pub fn current_block(&self) -> Option<u64> {
        if !self.current_block_set.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.current_block.load(Ordering::Relaxed))
    }

    pub fn blocks_scanned(&self) -> u64 {
        self.blocks_scanned.load(Ordering::Relaxed)
    }

    pub fn balance_queries(&self) -> u64 {
        self.balance_queries.load(Ordering::Relaxed)
    }

    pub fn rpc_errors(&self) -> u64 {
        self.rpc_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            blocks_scanned: self.blocks_scanned.load(Ordering::Relaxed),
            transactions_seen: self.transactions_seen.load(Ordering::Relaxed),
            empty_participants: self.empty_participants.load(Ordering::Relaxed),
            duplicate_addresses: self.duplicate_addresses.load(Ordering::Relaxed),
            balance_queries: self.balance_queries.load(Ordering::Relaxed),
            candidates_inserted: self.candidates_inserted.load(Ordering::Relaxed),
            candidates_replaced: self.candidates_replaced.load(Ordering::Relaxed),
            candidates_discarded: self.candidates_discarded.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            current_block: self.current_block(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub blocks_scanned: u64,
    pub transactions_seen: u64,
    pub empty_participants: u64,
    pub duplicate_addresses: u64,
    pub balance_queries: u64,
    pub candidates_inserted: u64,
    pub candidates_replaced: u64,
    pub candidates_discarded: u64,
    pub rpc_errors: u64,
    pub current_block: Option<u64>,
}
