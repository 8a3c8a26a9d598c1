//! Run-scoped tokens and background tasks for a `HolderScan` run.

use crate::processor::reporter::SnapshotReporter;
use crate::runtime::fatal::FatalErrorHandler;
use anyhow::Error;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    /// Child of the root token; cancelled by the fatal handler or by the root.
    pub run_token: CancellationToken,
    reporter_token: CancellationToken,
    fatal_handler: Arc<FatalErrorHandler>,
    reporter_handle: Option<JoinHandle<()>>,
}

impl LifecycleHandles {
    pub(crate) fn spawn(shutdown_root: &CancellationToken, reporter: SnapshotReporter) -> Self {
        let run_token = shutdown_root.child_token();
        let reporter_token = run_token.child_token();
        let fatal_handler = Arc::new(FatalErrorHandler::new(run_token.clone()));
        let reporter_handle = reporter.spawn(reporter_token.clone());

        Self {
            run_token,
            reporter_token,
            fatal_handler,
            reporter_handle: Some(reporter_handle),
        }
    }

    pub(crate) fn fatal_handler(&self) -> Arc<FatalErrorHandler> {
        self.fatal_handler.clone()
    }

    pub(crate) fn error(&self) -> Option<Error> {
        self.fatal_handler.error()
    }

    /// Stops the reporter and waits for it, without touching the run token.
    pub(crate) async fn shutdown(mut self) {
        self.reporter_token.cancel();
        if let Some(handle) = self.reporter_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "snapshot reporter task panicked");
            }
        }
    }
}
