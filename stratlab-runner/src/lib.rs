//! StratLab Runner — talks to the strategy job service.
//!
//! Provides:
//! - Transport: JSON-RPC client and the typed response envelope
//! - Dispatch: one submission per strategy, yielding a `JobHandle`
//! - Poll: fixed-cadence status polling with cancellation and a query bound
//! - Report: reduction of metrics payloads to backtest values
//! - Engine / session: in-process runs and end-to-end orchestration

pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod poll;
pub mod report;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use dispatch::{dispatch, dispatch_mode, DispatchError, JobHandle, JobId, SubmissionRequest};
pub use engine::{CommandEngine, EngineError, StrategyEngine};
pub use envelope::{Envelope, EnvelopeResult, FormatError, RemoteError};
pub use poll::{
    poll, Clock, JobState, JobStatusSnapshot, PollError, StatusPoller, SystemClock,
    DEFAULT_INTERVAL,
};
pub use report::{render_meta, summarize, ResultSummary};
pub use session::{
    run_local, run_remote, NoProgress, RemoteOutcome, SessionError, SessionProgress,
    StdoutProgress,
};
pub use transport::{JsonRpcClient, Transport, TransportError};
