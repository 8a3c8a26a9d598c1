//! Fixed-size pool of block scanners.
//!
//! Each scanner runs on its own task; errors and panics are escalated to the
//! fatal handler so one failing scanner brings the whole run down.

use crate::processor::scanner::{BlockScanner, ScannerExit, ScannerShared};
use crate::runtime::fatal::FatalErrorHandler;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How one scanner task ended, as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Finished(ScannerExit),
    Failed,
    Panicked,
}

pub(crate) struct WorkerPool {
    workers: Vec<JoinHandle<WorkerExit>>,
}

impl WorkerPool {
    /// Spawns `worker_count` scanners. The pool takes ownership of `shared`,
    /// so the ranking queue closes once the last scanner exits.
    pub(crate) fn launch(
        worker_count: usize,
        shared: ScannerShared,
        run_token: CancellationToken,
        fatal_handler: Arc<FatalErrorHandler>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let scanner = BlockScanner::new(worker_id, shared.clone(), run_token.clone());
            let fatal_handler = fatal_handler.clone();

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(scanner.run())
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(exit)) => WorkerExit::Finished(exit),
                    Ok(Err(failure)) => {
                        tracing::error!(
                            worker = worker_id,
                            block = failure.block(),
                            error = %failure.source_error(),
                            "scanner exited with error"
                        );
                        fatal_handler.trigger(failure);
                        WorkerExit::Failed
                    }
                    Err(panic_payload) => {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            worker = worker_id,
                            panic = %panic_msg,
                            "scanner task panicked"
                        );
                        let context = format!("scanner {worker_id} panicked");
                        let panic_error =
                            anyhow::anyhow!("scanner {worker_id} panicked: {panic_msg}");
                        fatal_handler.trigger_external(context.as_str(), panic_error);
                        WorkerExit::Panicked
                    }
                }
            });

            workers.push(handle);
        }

        tracing::info!(workers = worker_count, "scanner pool started");
        Self { workers }
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every scanner to exit.
    pub(crate) async fn join(self, fatal_handler: &FatalErrorHandler) -> Vec<WorkerExit> {
        let mut exits = Vec::with_capacity(self.workers.len());
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(exit) => exits.push(exit),
                Err(err) => {
                    let context = format!("scanner {worker_id} task failed to join");
                    fatal_handler.trigger_external(context.as_str(), anyhow::Error::new(err));
                    exits.push(WorkerExit::Panicked);
                }
            }
        }
        exits
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
