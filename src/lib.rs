pub mod checkpoint;
pub mod processor;
pub mod ranking;
pub mod rpc;
pub mod runtime;

pub use checkpoint::{Checkpoint, CheckpointStore, CsvCheckpointStore};
pub use processor::pipeline::{HolderScan, ScanOutcome, ScanReport};
pub use ranking::{Holder, SeenAddressSet, TopKSet};
pub use rpc::{AsyncRpcClient, LedgerClient, RpcError, RpcErrorKind, TxParticipants};
pub use runtime::config::{BlockRange, ConfigError, ScanConfig, ScanConfigBuilder, ScanConfigParams};
pub use runtime::fatal::ScanFailure;
pub use runtime::runner::Runner;
pub use runtime::state::{RunPhase, RunState};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
