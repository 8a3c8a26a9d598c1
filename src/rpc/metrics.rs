//! Request counters for the ledger client, split by call kind so the
//! snapshot log can tell block fetches from balance lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::client::{GET_BALANCE, GET_BLOCK};

#[derive(Debug, Default)]
struct Counter {
    requests: AtomicU64,
    errors: AtomicU64,
    latency_ns: AtomicU64,
}

impl Counter {
    fn record(&self, latency: Duration, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    fn load(&self) -> (u64, u64, u64) {
        (
            self.requests.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.latency_ns.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct RpcMetrics {
    blocks: Counter,
    balances: Counter,
    other: Counter,
    timeouts: AtomicU64,
    retries: AtomicU64,
}

impl RpcMetrics {
    fn counter(&self, method: &str) -> &Counter {
        match method {
            GET_BLOCK => &self.blocks,
            GET_BALANCE => &self.balances,
            _ => &self.other,
        }
    }

    pub(crate) fn record_success(&self, method: &str, latency: Duration) {
        self.counter(method).record(latency, false);
    }

    pub(crate) fn record_failure(&self, method: &str, latency: Duration) {
        self.counter(method).record(latency, true);
    }

    pub(crate) fn record_timeout(&self, method: &str, latency: Duration) {
        self.record_failure(method, latency);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RpcMetricsSnapshot {
        let (block_requests, block_errors, block_ns) = self.blocks.load();
        let (balance_requests, balance_errors, balance_ns) = self.balances.load();
        let (other_requests, other_errors, other_ns) = self.other.load();

        let total_requests = block_requests + balance_requests + other_requests;
        let total_errors = block_errors + balance_errors + other_errors;
        let total_latency_ns = block_ns + balance_ns + other_ns;

        let (average_latency_ms, error_rate) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            (
                total_latency_ns as f64 / total_requests as f64 / 1_000_000.0,
                total_errors as f64 / total_requests as f64,
            )
        };

        RpcMetricsSnapshot {
            total_requests,
            total_errors,
            block_requests,
            balance_requests,
            average_latency_ms,
            error_rate,
            total_timeouts: self.timeouts.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the client counters. Retried attempts count as
/// separate requests.
#[derive(Debug, Copy, Clone, Default)]
pub struct RpcMetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    /// `eth_getBlockByNumber` attempts.
    pub block_requests: u64,
    /// `eth_getBalance` attempts.
    pub balance_requests: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub total_timeouts: u64,
    pub total_retries: u64,
}
