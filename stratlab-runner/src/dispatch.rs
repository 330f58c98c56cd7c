//! Job dispatcher — turns a strategy into exactly one remote job.
//!
//! Submission is not assumed idempotent: a request that failed half-way may
//! already have enqueued a job, so nothing here retries. The service owns
//! deduplication.

use serde::{Deserialize, Serialize};
use std::fmt;
use stratlab_core::{QueueName, RunMode, SpecError, StrategySpec};
use thiserror::Error;

use crate::envelope::{EnvelopeResult, FormatError};
use crate::transport::{Transport, TransportError};

/// Opaque identifier the service assigns to a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation key for every status query about one remote job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub queue: QueueName,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, queue: QueueName) -> Self {
        Self {
            job_id: JobId::new(job_id),
            queue,
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_id, self.queue)
    }
}

/// Serialized strategy plus the two submission flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRequest {
    pub payload: String,
    pub live: bool,
    pub simulate_orders: bool,
    /// BLAKE3 digest of `payload`, for log correlation.
    pub fingerprint: String,
}

impl SubmissionRequest {
    pub fn new(spec: &StrategySpec, live: bool, simulate_orders: bool) -> Result<Self, SpecError> {
        let payload = spec.serialize()?;
        let fingerprint = stratlab_core::spec::digest(&payload);
        Ok(Self {
            payload,
            live,
            simulate_orders,
            fingerprint,
        })
    }

    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(12)]
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid strategy: {0}")]
    Spec(#[from] SpecError),

    /// The service refused the submission; carries its message verbatim.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("submit failed: {0}")]
    Transport(TransportError),

    #[error("unexpected submit response: {0}")]
    Format(#[from] FormatError),
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Remote(message) => DispatchError::Rejected(message),
            other => DispatchError::Transport(other),
        }
    }
}

/// Submit `spec` once and return the handle of the job it created.
///
/// The spec is validated before any network call; a malformed spec never
/// reaches the service.
pub fn dispatch(
    spec: StrategySpec,
    live: bool,
    simulate_orders: bool,
    transport: &dyn Transport,
) -> Result<JobHandle, DispatchError> {
    let request = SubmissionRequest::new(&spec, live, simulate_orders)?;
    submit(&request, transport)
}

/// [`dispatch`] with the flags derived from a run mode.
pub fn dispatch_mode(
    spec: StrategySpec,
    mode: RunMode,
    transport: &dyn Transport,
) -> Result<JobHandle, DispatchError> {
    let handle = dispatch(spec, mode.live(), mode.simulate_orders(), transport)?;
    if handle.queue != mode.expected_queue() {
        log::debug!(
            "{mode} job {} was routed to queue '{}'",
            handle.job_id,
            handle.queue
        );
    }
    Ok(handle)
}

/// Send an already-built request.
pub fn submit(
    request: &SubmissionRequest,
    transport: &dyn Transport,
) -> Result<JobHandle, DispatchError> {
    log::info!(
        "submitting strategy {} to {} (live={}, simulate_orders={})",
        request.short_fingerprint(),
        transport.endpoint(),
        request.live,
        request.simulate_orders
    );

    let result = transport
        .submit(&request.payload, request.live, request.simulate_orders)?
        .into_result()?;
    let handle = handle_from_result(&result)?;

    log::info!(
        "job {} accepted on queue '{}' (status: {})",
        handle.job_id,
        handle.queue,
        result.status
    );
    Ok(handle)
}

/// Extract the job id (`strat_id`, or `job_id` on newer services) and queue.
fn handle_from_result(result: &EnvelopeResult) -> Result<JobHandle, FormatError> {
    let job_id = match result.data_str("strat_id", "result.data.strat_id") {
        Err(FormatError::MissingField(_)) => result.data_str("job_id", "result.data.strat_id")?,
        other => other?,
    };
    let queue: QueueName = result.data_str("queue", "result.data.queue")?.parse()?;
    Ok(JobHandle::new(job_id, queue))
}
