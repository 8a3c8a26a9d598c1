use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_TOP_K: usize = 1_000_000;
pub const DEFAULT_THREAD_COUNT: usize = 50;
pub const DEFAULT_WORK_QUEUE_CAPACITY: usize = 1_024;
pub const DEFAULT_RANKING_QUEUE_CAPACITY: usize = 4_096;
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1_800);
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RPC_MAX_ATTEMPTS: usize = 1;

/// Rejected configuration or block range. Raised before any worker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid {
        field: &'static str,
        reason: String,
    },
    EmptyRange {
        start: u64,
        end: u64,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(field) => write!(f, "{field} is required"),
            ConfigError::Invalid { field, reason } => write!(f, "{field} {reason}"),
            ConfigError::EmptyRange { start, end } => write!(
                f,
                "end block ({end}) must be greater than start block ({start})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Half-open block interval `[start, end)`; never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ConfigError> {
        if end <= start {
            return Err(ConfigError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive upper bound. Balances are read at this height.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, block: u64) -> bool {
        (self.start..self.end).contains(&block)
    }

    pub fn blocks(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Runtime configuration for a holder scan.
///
/// All instances must be constructed via [`ScanConfig::builder`] or [`ScanConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    rpc_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    start_block: Option<u64>,
    end_block: Option<u64>,
    top_k: usize,
    thread_count: usize,
    work_queue_capacity: usize,
    ranking_queue_capacity: usize,
    rpc_timeout: Duration,
    rpc_max_attempts: usize,
    report_interval: Duration,
    seed_checkpoint: Option<PathBuf>,
    output_path: PathBuf,
}

pub struct ScanConfigParams {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub top_k: usize,
    pub thread_count: usize,
    pub work_queue_capacity: usize,
    pub ranking_queue_capacity: usize,
    pub rpc_timeout: Duration,
    pub rpc_max_attempts: usize,
    pub report_interval: Duration,
    pub seed_checkpoint: Option<PathBuf>,
    pub output_path: PathBuf,
}

impl ScanConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ScanConfigParams) -> Result<Self> {
        let ScanConfigParams {
            rpc_url,
            rpc_user,
            rpc_password,
            start_block,
            end_block,
            top_k,
            thread_count,
            work_queue_capacity,
            ranking_queue_capacity,
            rpc_timeout,
            rpc_max_attempts,
            report_interval,
            seed_checkpoint,
            output_path,
        } = params;

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            rpc_user: non_empty(rpc_user),
            rpc_password: non_empty(rpc_password),
            start_block,
            end_block,
            top_k,
            thread_count,
            work_queue_capacity,
            ranking_queue_capacity,
            rpc_timeout,
            rpc_max_attempts,
            report_interval,
            seed_checkpoint,
            output_path,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Basic-auth credentials, when both user and password are configured.
    pub fn rpc_credentials(&self) -> Option<(&str, &str)> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Explicit first block. `None` means "resume after the seed checkpoint".
    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    /// Explicit exclusive end block. `None` means "latest height at startup".
    pub fn end_block(&self) -> Option<u64> {
        self.end_block
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of concurrent block scanners.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn work_queue_capacity(&self) -> usize {
        self.work_queue_capacity
    }

    pub fn ranking_queue_capacity(&self) -> usize {
        self.ranking_queue_capacity
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Attempts per RPC call, first try included.
    pub fn rpc_max_attempts(&self) -> usize {
        self.rpc_max_attempts
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }

    pub fn seed_checkpoint(&self) -> Option<&Path> {
        self.seed_checkpoint.as_deref()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "rpc_url",
                "must start with http:// or https://",
            ));
        }

        if self.rpc_user.is_some() != self.rpc_password.is_some() {
            return Err(ConfigError::invalid(
                "rpc_user",
                "and rpc_password must be provided together",
            ));
        }

        if self.start_block.is_none() && self.seed_checkpoint.is_none() {
            return Err(ConfigError::Missing("start_block"));
        }

        if let (Some(start), Some(end)) = (self.start_block, self.end_block) {
            BlockRange::new(start, end)?;
        }

        for (field, value) in [
            ("top_k", self.top_k),
            ("thread_count", self.thread_count),
            ("work_queue_capacity", self.work_queue_capacity),
            ("ranking_queue_capacity", self.ranking_queue_capacity),
            ("rpc_max_attempts", self.rpc_max_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
        }

        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::invalid("rpc_timeout", "must be greater than 0"));
        }

        if self.report_interval.is_zero() {
            return Err(ConfigError::invalid(
                "report_interval",
                "must be greater than 0",
            ));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("output_path", "cannot be empty"));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ScanConfigBuilder {
    rpc_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    start_block: Option<u64>,
    end_block: Option<u64>,
    top_k: Option<usize>,
    thread_count: Option<usize>,
    work_queue_capacity: Option<usize>,
    ranking_queue_capacity: Option<usize>,
    rpc_timeout: Option<Duration>,
    rpc_max_attempts: Option<usize>,
    report_interval: Option<Duration>,
    seed_checkpoint: Option<PathBuf>,
    output_path: Option<PathBuf>,
}

impl ScanConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_user(mut self, user: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self
    }

    pub fn rpc_password(mut self, password: impl Into<String>) -> Self {
        self.rpc_password = Some(password.into());
        self
    }

    pub fn start_block(mut self, block: u64) -> Self {
        self.start_block = Some(block);
        self
    }

    pub fn end_block(mut self, block: u64) -> Self {
        self.end_block = Some(block);
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    pub fn work_queue_capacity(mut self, capacity: usize) -> Self {
        self.work_queue_capacity = Some(capacity);
        self
    }

    pub fn ranking_queue_capacity(mut self, capacity: usize) -> Self {
        self.ranking_queue_capacity = Some(capacity);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn rpc_max_attempts(mut self, attempts: usize) -> Self {
        self.rpc_max_attempts = Some(attempts);
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    pub fn seed_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_checkpoint = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ScanConfig> {
        let params = ScanConfigParams {
            rpc_url: self.rpc_url.unwrap_or_else(|| DEFAULT_RPC_URL.to_owned()),
            rpc_user: self.rpc_user,
            rpc_password: self.rpc_password,
            start_block: self.start_block,
            end_block: self.end_block,
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            thread_count: self.thread_count.unwrap_or(DEFAULT_THREAD_COUNT),
            work_queue_capacity: self
                .work_queue_capacity
                .unwrap_or(DEFAULT_WORK_QUEUE_CAPACITY),
            ranking_queue_capacity: self
                .ranking_queue_capacity
                .unwrap_or(DEFAULT_RANKING_QUEUE_CAPACITY),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            rpc_max_attempts: self.rpc_max_attempts.unwrap_or(DEFAULT_RPC_MAX_ATTEMPTS),
            report_interval: self.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL),
            seed_checkpoint: self.seed_checkpoint,
            output_path: self.output_path.unwrap_or_else(default_output_path),
        };

        ScanConfig::new(params)
    }
}

/// `top_addresses_<unix-seconds>.csv` in the working directory.
pub fn default_output_path() -> PathBuf {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("top_addresses_{seconds}.csv"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
