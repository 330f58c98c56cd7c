//! Status poller — watches one job until it reaches a terminal state.
//!
//! One status query per tick, a fixed sleep between ticks, and a progress
//! callback whenever the job's `meta` object changes. A job that ends in
//! `failed` is returned like any other terminal snapshot; only transport
//! and format problems are errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stratlab_core::json_kind;
use thiserror::Error;

use crate::dispatch::JobHandle;
use crate::envelope::{Envelope, FormatError};
use crate::transport::{Transport, TransportError};

/// Default pause between two status queries.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Lifecycle state reported by the job service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Started,
    Finished,
    Failed,
    /// Any other state string (`queued`, `deferred`, ...). Never terminal.
    Other(String),
}

impl JobState {
    pub fn parse(s: &str) -> Self {
        match s {
            "started" => JobState::Started,
            "finished" => JobState::Finished,
            "failed" => JobState::Failed,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Started => "started",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
            JobState::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        JobState::parse(&s)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a job. Results are only kept for terminal states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub state: JobState,
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
}

impl JobStatusSnapshot {
    /// Decode a status envelope. An error envelope is a transport failure,
    /// a missing or mistyped `result.data.meta` is a format failure.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, PollError> {
        let result = envelope.into_result()?;
        let state = JobState::parse(&result.status);

        let meta = match result.data()?.get("meta") {
            None => return Err(FormatError::MissingField("result.data.meta").into()),
            Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(other) => {
                return Err(FormatError::WrongType {
                    field: "result.data.meta",
                    expected: "an object",
                    found: json_kind(other),
                }
                .into())
            }
        };

        let results = if state.is_terminal() {
            result.strat_results.filter(|v| !v.is_null())
        } else {
            None
        };

        Ok(Self {
            state,
            meta,
            results,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.state == JobState::Failed
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status query failed: {0}")]
    Transport(#[from] TransportError),

    #[error("unexpected status response: {0}")]
    Format(#[from] FormatError),

    #[error("polling cancelled after {queries} status queries")]
    Cancelled { queries: usize },

    #[error("job still running after {queries} status queries")]
    TickLimit { queries: usize },
}

/// Source of the pause between ticks.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Polling loop with an injectable clock, cancel flag and query bound.
pub struct StatusPoller<'a> {
    interval: Duration,
    clock: &'a dyn Clock,
    cancel: Option<&'a AtomicBool>,
    max_queries: Option<usize>,
}

impl<'a> StatusPoller<'a> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            clock: &SYSTEM_CLOCK,
            cancel: None,
            max_queries: None,
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Stop before the next query once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Give up after `max` queries without a terminal state.
    pub fn with_max_queries(mut self, max: usize) -> Self {
        self.max_queries = Some(max);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Query `handle` until it is terminal and return the terminal snapshot.
    ///
    /// `on_progress` runs once per distinct `meta` value, starting with the
    /// first one observed.
    pub fn run(
        &self,
        handle: &JobHandle,
        transport: &dyn Transport,
        on_progress: &mut dyn FnMut(&Map<String, Value>),
    ) -> Result<JobStatusSnapshot, PollError> {
        let mut last_meta: Option<Map<String, Value>> = None;
        let mut last_state: Option<JobState> = None;
        let mut queries: usize = 0;

        loop {
            if self.cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                log::info!("polling of job {handle} cancelled after {queries} queries");
                return Err(PollError::Cancelled { queries });
            }
            if self.max_queries.is_some_and(|max| queries >= max) {
                return Err(PollError::TickLimit { queries });
            }

            let envelope = transport.status(handle.job_id.as_str(), handle.queue)?;
            queries += 1;
            let snapshot = JobStatusSnapshot::from_envelope(envelope)?;
            log::debug!("job {handle} poll #{queries}: {}", snapshot.state);

            if last_state.as_ref() != Some(&snapshot.state) {
                log::info!("job {handle} is {}", snapshot.state);
                last_state = Some(snapshot.state.clone());
            }

            if last_meta.as_ref() != Some(&snapshot.meta) {
                on_progress(&snapshot.meta);
                last_meta = Some(snapshot.meta.clone());
            }

            if snapshot.is_terminal() {
                return Ok(snapshot);
            }

            self.clock.sleep(self.interval);
        }
    }
}

impl Default for StatusPoller<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Poll with the system clock, no cancellation and no query bound.
pub fn poll(
    handle: &JobHandle,
    transport: &dyn Transport,
    interval: Duration,
    on_progress: &mut dyn FnMut(&Map<String, Value>),
) -> Result<JobStatusSnapshot, PollError> {
    StatusPoller::new(interval).run(handle, transport, on_progress)
}
