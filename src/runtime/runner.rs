use crate::processor::pipeline::{HolderScan, ScanReport};
use crate::runtime::config::ScanConfig;
use crate::runtime::state::RunState;
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Runs a [`HolderScan`] and turns Ctrl-C (SIGINT) into a graceful stop.
pub struct Runner {
    scan: HolderScan,
    shutdown: CancellationToken,
}

impl Runner {
    /// Creates a runner over a JSON-RPC backed scan.
    pub fn new(config: ScanConfig) -> Result<Self> {
        Ok(Self::from_scan(HolderScan::new(config)?))
    }

    /// Wraps an already-built scan, wiring a fresh root token into it.
    pub fn from_scan(scan: HolderScan) -> Self {
        let shutdown = CancellationToken::new();
        let scan = scan.with_cancellation_token(shutdown.clone());
        Self { scan, shutdown }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> RunState {
        self.scan.state()
    }

    /// Runs until the range is exhausted, the scan fails, or Ctrl-C arrives.
    /// An interrupted scan still drains and saves its final checkpoint.
    pub async fn run_until_ctrl_c(self) -> Result<ScanReport> {
        let Self { scan, shutdown } = self;
        let run = scan.run();
        tokio::pin!(run);

        tokio::select! {
            report = &mut run => return report,
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; stopping holder scan");
                shutdown.cancel();
            }
        }

        run.await
    }
}
