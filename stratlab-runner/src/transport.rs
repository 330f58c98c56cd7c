//! Transport to the strategy job service.
//!
//! The `Transport` trait abstracts over how submit/status calls reach the
//! service so the dispatcher and poller can be driven by in-memory doubles
//! in tests. `JsonRpcClient` is the production implementation: JSON-RPC 2.0
//! over HTTP POST, one blocking round-trip per call, no retries.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use stratlab_core::QueueName;
use thiserror::Error;

use crate::envelope::Envelope;

/// Remote method that enqueues a strategy job.
pub const SUBMIT_METHOD: &str = "Strat.run";
/// Remote method that reports a job's status.
pub const STATUS_METHOD: &str = "Strat.status";

/// Transport-level failures. A job that ran and failed is not one of these;
/// it arrives as a normal envelope with a `failed` status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("service error: {0}")]
    Remote(String),
}

/// Submit/status client bound to one job-service base URL.
pub trait Transport: Send + Sync {
    /// Base URL this client talks to.
    fn endpoint(&self) -> &str;

    /// Enqueue a serialized strategy. Triggers remote job creation.
    fn submit(
        &self,
        payload: &str,
        live: bool,
        simulate_orders: bool,
    ) -> Result<Envelope, TransportError>;

    /// Fetch the current status envelope of a job.
    fn status(&self, job_id: &str, queue: QueueName) -> Result<Envelope, TransportError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// JSON-RPC 2.0 client for the job service.
pub struct JsonRpcClient {
    client: reqwest::blocking::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stratlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call and decode the envelope.
    ///
    /// Some servers answer errors with a non-2xx status *and* an error
    /// envelope; the envelope wins so the remote message reaches the caller.
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Envelope, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        log::debug!("rpc #{id} {method} -> {}", self.url);

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;

        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) if status.is_success() || envelope.error.is_some() => Ok(envelope),
            _ if !status.is_success() => Err(TransportError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            }),
            Ok(envelope) => Ok(envelope),
            Err(e) => Err(TransportError::MalformedEnvelope(format!(
                "{method} response: {e}"
            ))),
        }
    }
}

impl Transport for JsonRpcClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn submit(
        &self,
        payload: &str,
        live: bool,
        simulate_orders: bool,
    ) -> Result<Envelope, TransportError> {
        self.call(
            SUBMIT_METHOD,
            vec![json!(payload), json!(live), json!(simulate_orders)],
        )
    }

    fn status(&self, job_id: &str, queue: QueueName) -> Result<Envelope, TransportError> {
        self.call(STATUS_METHOD, vec![json!(job_id), json!(queue.as_str())])
    }
}
