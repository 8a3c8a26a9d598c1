use clap::Parser;
use holderscan::{ScanConfig, ScanConfigBuilder};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "holderscan",
    version,
    about = "Rank the top-K addresses by balance over a block range"
)]
pub struct Cli {
    /// JSON-RPC endpoint of the node
    #[arg(long, env = "HOLDERSCAN_RPC_URL", default_value = holderscan::runtime::config::DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Basic-auth user for the RPC endpoint
    #[arg(long, env = "HOLDERSCAN_RPC_USER")]
    pub rpc_user: Option<String>,

    /// Basic-auth password for the RPC endpoint
    #[arg(long, env = "HOLDERSCAN_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    /// First block to scan (required unless --checkpoint is given)
    #[arg(short, long)]
    pub start: Option<u64>,

    /// Block to stop before; balances are read at this height (default: latest)
    #[arg(short, long)]
    pub end: Option<u64>,

    /// Checkpoint CSV to resume from
    #[arg(short, long)]
    pub checkpoint: Option<PathBuf>,

    /// Output CSV (default: top_addresses_<unix-seconds>.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of holders to keep
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Concurrent block scanners
    #[arg(long)]
    pub threads: Option<usize>,

    /// Seconds between progress snapshots
    #[arg(long)]
    pub report_interval_secs: Option<u64>,

    /// Per-request RPC timeout in seconds
    #[arg(long)]
    pub rpc_timeout_secs: Option<u64>,

    /// Attempts per RPC call for transient failures (1 disables retries)
    #[arg(long)]
    pub rpc_max_attempts: Option<usize>,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<ScanConfig> {
        let mut builder: ScanConfigBuilder = ScanConfig::builder().rpc_url(self.rpc_url);

        if let Some(user) = self.rpc_user {
            builder = builder.rpc_user(user);
        }
        if let Some(password) = self.rpc_password {
            builder = builder.rpc_password(password);
        }
        if let Some(start) = self.start {
            builder = builder.start_block(start);
        }
        if let Some(end) = self.end {
            builder = builder.end_block(end);
        }
        if let Some(path) = self.checkpoint {
            builder = builder.seed_checkpoint(path);
        }
        if let Some(path) = self.output {
            builder = builder.output_path(path);
        }
        if let Some(k) = self.top_k {
            builder = builder.top_k(k);
        }
        if let Some(threads) = self.threads {
            builder = builder.thread_count(threads);
        }
        if let Some(secs) = self.report_interval_secs {
            builder = builder.report_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.rpc_timeout_secs {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(attempts) = self.rpc_max_attempts {
            builder = builder.rpc_max_attempts(attempts);
        }

        builder.build()
    }
}
