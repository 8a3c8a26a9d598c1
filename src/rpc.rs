//! JSON-RPC client plumbing for the ledger node: authentication, wire types,
//! metrics, retry policy, and the `LedgerClient` seam used by the scanners.

pub mod auth;
pub mod client;
pub mod metrics;
pub mod options;
pub mod retry;
pub mod types;

pub use client::{AsyncRpcClient, LedgerClient, RpcError, RpcErrorKind};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
pub use types::{RpcBlock, TxParticipants};
