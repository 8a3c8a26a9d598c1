use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Phases of a scan run, in the order they are entered.
///
/// `Error`, `RangeExhausted` and `Interrupted` are the three ways out of
/// `Running`; all of them lead to `Draining` and then `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RunPhase {
    Init = 0,
    LoadCheckpoint = 1,
    Running = 2,
    Error = 3,
    RangeExhausted = 4,
    Interrupted = 5,
    Draining = 6,
    Finalized = 7,
}

impl RunPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunPhase::Init,
            1 => RunPhase::LoadCheckpoint,
            2 => RunPhase::Running,
            3 => RunPhase::Error,
            4 => RunPhase::RangeExhausted,
            5 => RunPhase::Interrupted,
            6 => RunPhase::Draining,
            _ => RunPhase::Finalized,
        }
    }

    fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Init, LoadCheckpoint)
                | (Init, Running)
                | (LoadCheckpoint, Running)
                | (Init, Finalized)
                | (LoadCheckpoint, Finalized)
                | (Running, Error)
                | (Running, RangeExhausted)
                | (Running, Interrupted)
                | (Error, Draining)
                | (RangeExhausted, Draining)
                | (Interrupted, Draining)
                | (Draining, Finalized)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::LoadCheckpoint => "load-checkpoint",
            RunPhase::Running => "running",
            RunPhase::Error => "error",
            RunPhase::RangeExhausted => "range-exhausted",
            RunPhase::Interrupted => "interrupted",
            RunPhase::Draining => "draining",
            RunPhase::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Observable run phase: an atomic for cheap reads plus a watch channel for
/// callers that want to await transitions.
#[derive(Clone)]
pub struct RunState {
    phase: Arc<AtomicU8>,
    tx: Arc<watch::Sender<RunPhase>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunPhase::Init);
        Self {
            phase: Arc::new(AtomicU8::new(RunPhase::Init as u8)),
            tx: Arc::new(tx),
        }
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.tx.subscribe()
    }

    /// Moves to `next` if the transition is legal. Illegal transitions are
    /// logged and ignored.
    pub fn advance(&self, next: RunPhase) -> bool {
        let current = self.phase();
        if !current.can_advance_to(next) {
            tracing::warn!(from = %current, to = %next, "ignoring illegal run phase transition");
            return false;
        }

        self.phase.store(next as u8, Ordering::SeqCst);
        self.tx.send_replace(next);
        tracing::debug!(from = %current, to = %next, "run phase transition");
        true
    }
}
