//! RPC client implementation and reusable abstractions for reading blocks and
//! balances from an Ethereum-style node over JSON-RPC. Houses the
//! `AsyncRpcClient`, error types, and the `LedgerClient` trait consumed by the
//! scanner workers.

use crate::rpc::auth::build_auth_headers;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{
    backoff_delay, RetryContext, BLOCK_NUMBER_RETRY, GET_BALANCE_RETRY, GET_BLOCK_RETRY,
};
use crate::rpc::types::{RpcBlock, TxParticipants};
use crate::runtime::config::ScanConfig;
use alloy_primitives::{Address, U256, U64};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::{fmt, future::Future, sync::Arc};
use tokio::time::{sleep, timeout, Instant};

pub(crate) const GET_BLOCK_NUMBER: &str = "eth_blockNumber";
pub(crate) const GET_BLOCK: &str = "eth_getBlockByNumber";
pub(crate) const GET_BALANCE: &str = "eth_getBalance";

/// Whether an RPC failure may succeed when repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Network trouble or a timeout.
    Transient,
    /// Malformed or result-less response, or an error object from the node.
    Protocol,
}

#[derive(Debug)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    Transport {
        method: &'static str,
        message: String,
    },
    MissingResult {
        method: &'static str,
    },
    Malformed {
        method: &'static str,
        message: String,
    },
    Call {
        method: &'static str,
        code: i32,
        message: String,
    },
}

impl RpcError {
    pub fn method(&self) -> &'static str {
        match self {
            RpcError::Timeout { method }
            | RpcError::Transport { method, .. }
            | RpcError::MissingResult { method }
            | RpcError::Malformed { method, .. }
            | RpcError::Call { method, .. } => method,
        }
    }

    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Timeout { .. } | RpcError::Transport { .. } => RpcErrorKind::Transient,
            RpcError::MissingResult { .. } | RpcError::Malformed { .. } | RpcError::Call { .. } => {
                RpcErrorKind::Protocol
            }
        }
    }

    /// Classifies an arbitrary error; anything that is not an [`RpcError`] is
    /// treated as a protocol failure and never retried.
    pub fn classify(err: &anyhow::Error) -> RpcErrorKind {
        err.downcast_ref::<RpcError>()
            .map(RpcError::kind)
            .unwrap_or(RpcErrorKind::Protocol)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Transport { method, message } => {
                write!(f, "rpc {method} transport failure: {message}")
            }
            RpcError::MissingResult { method } => {
                write!(f, "rpc {method} response carried no result")
            }
            RpcError::Malformed { method, message } => {
                write!(f, "rpc {method} returned a malformed response: {message}")
            }
            RpcError::Call {
                method,
                code,
                message,
            } => write!(f, "rpc {method} call failed (code={code}, message={message})"),
        }
    }
}

impl std::error::Error for RpcError {}

/// The three ledger reads the scanner needs.
pub trait LedgerClient: Send + Sync {
    fn latest_block_number(&self) -> BoxFuture<'_, Result<u64>>;

    fn block_participants(&self, number: u64) -> BoxFuture<'_, Result<Vec<TxParticipants>>>;

    fn balance_at(&self, address: Address, block: u64) -> BoxFuture<'_, Result<U256>>;

    /// Request counters, for clients that keep them.
    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl LedgerClient for AsyncRpcClient {
    fn latest_block_number(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.get_latest_block_number())
    }

    fn block_participants(&self, number: u64) -> BoxFuture<'_, Result<Vec<TxParticipants>>> {
        Box::pin(self.get_block_participants(number))
    }

    fn balance_at(&self, address: Address, block: u64) -> BoxFuture<'_, Result<U256>> {
        Box::pin(self.get_balance(address, block))
    }

    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

impl AsyncRpcClient {
    pub fn with_options(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let headers = build_auth_headers(credentials)?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(url.into())
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::with_options(
            config.rpc_url(),
            config.rpc_credentials(),
            RpcClientOptions::from(config),
        )
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn get_latest_block_number(&self) -> Result<u64> {
        let height: U64 = self
            .with_retry(RetryContext::new(&BLOCK_NUMBER_RETRY), || {
                self.call(GET_BLOCK_NUMBER, rpc_params![])
            })
            .await?;
        let height = height.to::<u64>();
        tracing::debug!(height, "fetched latest block number");
        Ok(height)
    }

    pub async fn get_block_participants(&self, number: u64) -> Result<Vec<TxParticipants>> {
        // A null block (height past the node's tip) surfaces as MissingResult.
        let block: RpcBlock = self
            .with_retry(RetryContext::with_block(&GET_BLOCK_RETRY, number), || {
                self.call(GET_BLOCK, rpc_params![format!("{number:#x}"), true])
            })
            .await?;

        tracing::trace!(
            block = number,
            transactions = block.transactions.len(),
            "fetched block"
        );
        Ok(block.transactions)
    }

    pub async fn get_balance(&self, address: Address, block: u64) -> Result<U256> {
        self.with_retry(RetryContext::with_block(&GET_BALANCE_RETRY, block), || {
            self.call(GET_BALANCE, rpc_params![address, format!("{block:#x}")])
        })
        .await
    }

    async fn call<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let value: Option<R> = timeout(
            self.options.request_timeout,
            self.client.request(method, params),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_rpc_error(method, err))?;

        value.ok_or_else(|| RpcError::MissingResult { method }.into())
    }

    /// Shared retry/backoff loop. Only transient failures are retried, and
    /// only while `max_attempts` allows; protocol failures return at once.
    async fn with_retry<T, F, Fut>(&self, context: RetryContext<'_>, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            match operation().await {
                Ok(value) => {
                    self.metrics.record_success(context.method(), start.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    if matches!(
                        err.downcast_ref::<RpcError>(),
                        Some(RpcError::Timeout { .. })
                    ) {
                        self.metrics.record_timeout(context.method(), elapsed);
                    } else {
                        self.metrics.record_failure(context.method(), elapsed);
                    }

                    if RpcError::classify(&err) == RpcErrorKind::Protocol {
                        context.log_fatal(attempt, &err);
                        return Err(err);
                    }

                    if attempt >= self.options.max_attempts {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    let backoff = backoff_delay(
                        self.options.initial_backoff,
                        self.options.max_backoff,
                        attempt,
                    );
                    context.log_retry(attempt, backoff, &err);
                    self.metrics.record_retry();
                    sleep(backoff).await;
                }
            }
        }
    }
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    let mapped = match err {
        JsonRpcError::RequestTimeout => RpcError::Timeout { method },
        JsonRpcError::Call(object) => RpcError::Call {
            method,
            code: object.code(),
            message: object.message().to_owned(),
        },
        JsonRpcError::ParseError(parse) => RpcError::Malformed {
            method,
            message: parse.to_string(),
        },
        JsonRpcError::Transport(transport) => RpcError::Transport {
            method,
            message: transport.to_string(),
        },
        other => RpcError::Transport {
            method,
            message: other.to_string(),
        },
    };
    mapped.into()
}
