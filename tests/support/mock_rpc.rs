use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One transaction of a mock block; `to: None` models contract creation.
#[derive(Clone, Copy, Debug)]
pub struct MockTx {
    pub from: Option<Address>,
    pub to: Option<Address>,
}

impl MockTx {
    pub fn transfer(from: Address, to: Address) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn creation(from: Address) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }
}

/// In-memory ledger served by [`MockRpcServer`].
#[derive(Clone, Default)]
pub struct MockLedger {
    inner: Arc<RwLock<MockLedgerInner>>,
    balance_calls: Arc<AtomicUsize>,
    http_failures_left: Arc<AtomicU64>,
}

#[derive(Default)]
struct MockLedgerInner {
    latest: u64,
    blocks: HashMap<u64, Vec<MockTx>>,
    balances: HashMap<Address, U256>,
    calls_by_address: HashMap<Address, usize>,
    balance_tags: HashSet<u64>,
    failing_addresses: HashSet<Address>,
    failing_blocks: HashSet<u64>,
    slow_addresses: HashMap<Address, Duration>,
}

impl MockLedger {
    /// A ledger whose latest block is `latest`; every block starts empty.
    pub fn new(latest: u64) -> Self {
        let ledger = Self::default();
        ledger.write().latest = latest;
        ledger
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockLedgerInner> {
        self.inner.write().expect("mock ledger poisoned")
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockLedgerInner> {
        self.inner.read().expect("mock ledger poisoned")
    }

    pub fn with_block(self, number: u64, txs: Vec<MockTx>) -> Self {
        self.write().blocks.insert(number, txs);
        self
    }

    pub fn with_balance(self, address: Address, wei: u64) -> Self {
        self.write().balances.insert(address, U256::from(wei));
        self
    }

    /// `eth_getBalance` for `address` answers with a JSON-RPC error.
    pub fn fail_balance_of(&self, address: Address) {
        self.write().failing_addresses.insert(address);
    }

    /// `eth_getBalance` for `address` waits `delay` before answering.
    pub fn delay_balance_of(&self, address: Address, delay: Duration) {
        self.write().slow_addresses.insert(address, delay);
    }

    /// `eth_getBlockByNumber` for `number` answers with a JSON-RPC error.
    pub fn fail_block(&self, number: u64) {
        self.write().failing_blocks.insert(number);
    }

    /// The next `count` `eth_getBalance` requests get an HTTP 500.
    pub fn reject_next_balance_requests(&self, count: u64) {
        self.http_failures_left.store(count, Ordering::SeqCst);
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls_for(&self, address: Address) -> usize {
        self.read()
            .calls_by_address
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Every distinct block tag `eth_getBalance` was asked about.
    pub fn balance_tags(&self) -> HashSet<u64> {
        self.read().balance_tags.clone()
    }

    fn balance_delay(&self, call: &Value) -> Option<Duration> {
        if call.get("method").and_then(Value::as_str) != Some("eth_getBalance") {
            return None;
        }
        let address = call
            .get("params")
            .and_then(|params| params.get(0))
            .and_then(Value::as_str)
            .and_then(|raw| Address::from_str(raw).ok())?;
        self.read().slow_addresses.get(&address).copied()
    }

    fn take_http_failure(&self, method: &str) -> bool {
        if method != "eth_getBalance" {
            return false;
        }
        self.http_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(ledger: MockLedger) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let ledger = ledger.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(ledger.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn plain_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

async fn serve_request(ledger: MockLedger, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Unsupported method",
        ));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {err}"),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    let method = payload
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if ledger.take_http_failure(method) {
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "node overloaded",
        ));
    }

    if let Some(delay) = ledger.balance_delay(&payload) {
        tokio::time::sleep(delay).await;
    }

    let response_value = handle_call(&ledger, payload);
    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(ledger: &MockLedger, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match method.as_str() {
        "eth_blockNumber" => success(id, json!(format!("{:#x}", ledger.read().latest))),
        "eth_getBlockByNumber" => {
            let Some(number) = params.first().and_then(parse_quantity) else {
                return error(id, -32602, "invalid block number");
            };
            let inner = ledger.read();
            if inner.failing_blocks.contains(&number) {
                return error(id, -32000, format!("block {number} unavailable"));
            }
            if number > inner.latest {
                return success(id, Value::Null);
            }
            let transactions: Vec<Value> = inner
                .blocks
                .get(&number)
                .map(|txs| txs.iter().map(tx_json).collect())
                .unwrap_or_default();
            success(
                id,
                json!({
                    "number": format!("{number:#x}"),
                    "transactions": transactions,
                }),
            )
        }
        "eth_getBalance" => {
            let address = params
                .first()
                .and_then(Value::as_str)
                .and_then(|raw| Address::from_str(raw).ok());
            let tag = params.get(1).and_then(parse_quantity);
            let (Some(address), Some(tag)) = (address, tag) else {
                return error(id, -32602, "invalid eth_getBalance params");
            };

            ledger.balance_calls.fetch_add(1, Ordering::SeqCst);
            let mut inner = ledger.write();
            *inner.calls_by_address.entry(address).or_default() += 1;
            inner.balance_tags.insert(tag);
            if inner.failing_addresses.contains(&address) {
                return error(id, -32000, format!("state for {address} unavailable"));
            }
            let balance = inner.balances.get(&address).copied().unwrap_or_default();
            success(id, json!(format!("0x{balance:x}")))
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn tx_json(tx: &MockTx) -> Value {
    json!({
        "hash": "0x00",
        "from": tx.from.map(|address| address.to_string()),
        "to": tx.to.map(|address| address.to_string()),
        "value": "0x0",
    })
}

fn parse_quantity(value: &Value) -> Option<u64> {
    let raw = value.as_str()?;
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
