//! Shared retry context, logging helpers, and canned message templates used by
//! the RPC client to keep instrumentation consistent across ledger calls.

use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(block) = $ctx.block {
            tracing::$level!(
                block = block,
                method = $ctx.messages.method,
                $($rest)*
            );
        } else {
            tracing::$level!(method = $ctx.messages.method, $($rest)*);
        }
    }};
}

/// Logging labels describing how a ledger call reports retries and exhaustion.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) method: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) fatal: &'static str,
}

/// Context passed into the retry loop so callers can attach the block being
/// worked on and reuse consistent log messaging.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    block: Option<u64>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            block: None,
            messages,
        }
    }

    pub(crate) fn with_block(messages: &'a RetryMessages, block: u64) -> Self {
        Self {
            block: Some(block),
            messages,
        }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.messages.method
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        let backoff_ms = duration_to_millis(backoff);
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_fatal(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.fatal);
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Exponential backoff for the given 1-based attempt, capped at `max`.
pub(crate) fn backoff_delay(initial: Duration, max: Duration, attempt: usize) -> Duration {
    if attempt <= 1 {
        return initial.min(max);
    }

    let exponent = attempt.saturating_sub(1).min(16) as u32;
    let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    initial.saturating_mul(multiplier).min(max)
}

pub(crate) const BLOCK_NUMBER_RETRY: RetryMessages = RetryMessages {
    method: "eth_blockNumber",
    retry: "eth_blockNumber failed; retrying",
    exhausted: "eth_blockNumber exhausted retries",
    fatal: "eth_blockNumber failed with a non-retryable error",
};

pub(crate) const GET_BLOCK_RETRY: RetryMessages = RetryMessages {
    method: "eth_getBlockByNumber",
    retry: "eth_getBlockByNumber failed; retrying",
    exhausted: "eth_getBlockByNumber exhausted retries",
    fatal: "eth_getBlockByNumber failed with a non-retryable error",
};

pub(crate) const GET_BALANCE_RETRY: RetryMessages = RetryMessages {
    method: "eth_getBalance",
    retry: "eth_getBalance failed; retrying",
    exhausted: "eth_getBalance exhausted retries",
    fatal: "eth_getBalance failed with a non-retryable error",
};
