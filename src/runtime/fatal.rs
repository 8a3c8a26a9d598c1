use anyhow::Error as AnyError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// A scanner error tagged with the block it was working on. Every instance is
/// fatal to the run.
#[derive(Debug)]
pub struct ScanFailure {
    block: u64,
    source: AnyError,
}

impl ScanFailure {
    pub fn new(block: u64, source: AnyError) -> Self {
        Self { block, source }
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn source_error(&self) -> &AnyError {
        &self.source
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan failed at block {}: {}", self.block, self.source)
    }
}

impl std::error::Error for ScanFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Shared supervisor handle. The first trigger wins: it stores the error and
/// the failing block, then cancels the run token so every stage winds down.
#[derive(Clone)]
pub struct FatalErrorHandler {
    inner: Arc<FatalInner>,
}

struct FatalInner {
    triggered: AtomicBool,
    run_shutdown: CancellationToken,
    captured: Mutex<Option<CapturedFatalError>>,
}

#[derive(Clone)]
struct CapturedFatalError {
    inner: Arc<AnyError>,
    block: Option<u64>,
}

impl fmt::Debug for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFatalError")
            .field("error", &self.inner)
            .field("block", &self.block)
            .finish()
    }
}

impl fmt::Display for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for CapturedFatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

impl FatalErrorHandler {
    pub fn new(run_shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(FatalInner {
                triggered: AtomicBool::new(false),
                run_shutdown,
                captured: Mutex::new(None),
            }),
        }
    }

    /// Escalates a scanner failure. Later failures are returned untouched and
    /// do not overwrite the first one.
    pub fn trigger(&self, failure: ScanFailure) -> AnyError {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return failure.into();
        }

        let block = failure.block();
        tracing::error!(
            block,
            error = %failure.source_error(),
            "fatal scan error; initiating shutdown"
        );

        self.capture(failure.into(), Some(block))
    }

    /// Escalates a failure that is not tied to a block (panics, task joins).
    pub fn trigger_external(&self, context: &str, error: AnyError) -> AnyError {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::error!(
            context,
            error = %error,
            "fatal pipeline error; initiating shutdown"
        );

        self.capture(error, None)
    }

    fn capture(&self, error: AnyError, block: Option<u64>) -> AnyError {
        let captured = CapturedFatalError {
            inner: Arc::new(error),
            block,
        };
        {
            let mut slot = self.slot();
            if slot.is_none() {
                *slot = Some(captured.clone());
            }
        }

        self.inner.run_shutdown.cancel();
        captured.into()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// The first captured error, if any.
    pub fn error(&self) -> Option<AnyError> {
        self.slot().as_ref().map(|error| error.clone().into())
    }

    /// Block at which the first scanner failure happened.
    pub fn failing_block(&self) -> Option<u64> {
        self.slot().as_ref().and_then(|error| error.block)
    }

    fn slot(&self) -> MutexGuard<'_, Option<CapturedFatalError>> {
        self.inner
            .captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
