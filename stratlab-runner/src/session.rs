//! Session orchestration: dispatch → poll → summarize, or a single
//! in-process run.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use stratlab_core::{RunMode, SpecError, StrategySpec};
use thiserror::Error;

use crate::dispatch::{dispatch_mode, DispatchError, JobHandle};
use crate::engine::{EngineError, StrategyEngine};
use crate::envelope::FormatError;
use crate::poll::{JobState, JobStatusSnapshot, PollError, StatusPoller};
use crate::report::{render_meta, summarize, ResultSummary};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("cannot summarize results: {0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Observer for a remote session.
pub trait SessionProgress {
    /// Called once the service has accepted the job.
    fn on_submitted(&mut self, _handle: &JobHandle) {}

    /// Called whenever the job's progress metadata changes.
    fn on_progress(&mut self, _meta: &Map<String, Value>) {}
}

/// Prints submission and progress updates to stdout.
pub struct StdoutProgress;

impl SessionProgress for StdoutProgress {
    fn on_submitted(&mut self, handle: &JobHandle) {
        println!("Submitted job {} to queue '{}'", handle.job_id, handle.queue);
    }

    fn on_progress(&mut self, meta: &Map<String, Value>) {
        if !meta.is_empty() {
            println!("{}", render_meta(meta));
        }
    }
}

/// Ignores every update.
pub struct NoProgress;

impl SessionProgress for NoProgress {}

/// Terminal outcome of a remote session.
#[derive(Debug, Clone)]
pub struct RemoteOutcome {
    pub handle: JobHandle,
    pub snapshot: JobStatusSnapshot,
    /// Present when the job finished with a results payload.
    pub summary: Option<ResultSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RemoteOutcome {
    /// The job ran and failed remotely.
    pub fn is_failed(&self) -> bool {
        self.snapshot.is_failed()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Submit `spec` in `mode`, wait for a terminal state and summarize.
///
/// A finished job must carry results; a failed job is returned without a
/// summary and the caller decides what to do with it.
pub fn run_remote(
    spec: StrategySpec,
    mode: RunMode,
    transport: &dyn Transport,
    poller: &StatusPoller<'_>,
    progress: &mut dyn SessionProgress,
) -> Result<RemoteOutcome, SessionError> {
    let started_at = Utc::now();
    let handle = dispatch_mode(spec, mode, transport)?;
    progress.on_submitted(&handle);

    let snapshot = poller.run(&handle, transport, &mut |meta| progress.on_progress(meta))?;
    let finished_at = Utc::now();

    let summary = match (&snapshot.state, &snapshot.results) {
        (JobState::Finished, Some(results)) => Some(summarize(results)?),
        (JobState::Finished, None) => {
            return Err(FormatError::MissingField("result.strat_results").into())
        }
        _ => {
            log::warn!("job {handle} ended as {}", snapshot.state);
            None
        }
    };

    Ok(RemoteOutcome {
        handle,
        snapshot,
        summary,
        started_at,
        finished_at,
    })
}

/// Run `spec` synchronously through `engine` and summarize its output.
pub fn run_local(
    spec: StrategySpec,
    mode: RunMode,
    engine: &dyn StrategyEngine,
) -> Result<ResultSummary, SessionError> {
    let payload = spec.serialize()?;
    log::info!(
        "running strategy {} in {mode} mode",
        &stratlab_core::spec::digest(&payload)[..12]
    );
    let results = engine.run(&payload, mode.live())?;
    Ok(summarize(&results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, EnvelopeResult};
    use crate::test_support::{status_envelope, RecordingClock, ScriptedTransport};
    use serde_json::json;
    use stratlab_core::QueueName;

    #[derive(Default)]
    struct Recorder {
        submitted: Vec<JobHandle>,
        metas: Vec<Map<String, Value>>,
    }

    impl SessionProgress for Recorder {
        fn on_submitted(&mut self, handle: &JobHandle) {
            self.submitted.push(handle.clone());
        }

        fn on_progress(&mut self, meta: &Map<String, Value>) {
            self.metas.push(meta.clone());
        }
    }

    fn accepted() -> Envelope {
        Envelope::ok(EnvelopeResult {
            status: "started".into(),
            data: json!({"strat_id": "abc123", "queue": "backtest"}).as_object().cloned(),
            strat_results: None,
        })
    }

    fn rsi() -> StrategySpec {
        let mut spec = StrategySpec::new();
        spec.add_market_indicator("RSI").unwrap();
        spec
    }

    #[test]
    fn finished_job_is_summarized() {
        let transport = ScriptedTransport::new()
            .on_submit(Ok(accepted()))
            .on_status(Ok(status_envelope("started", json!({"progress": 50}), None)))
            .on_status(Ok(status_envelope(
                "finished",
                json!({"progress": 100}),
                Some(json!("{\"alpha\": {\"Backtest\": 0.12}}")),
            )));
        let clock = RecordingClock::default();
        let poller = StatusPoller::default().with_clock(&clock);
        let mut recorder = Recorder::default();

        let outcome =
            run_remote(rsi(), RunMode::Backtest, &transport, &poller, &mut recorder).unwrap();

        assert_eq!(outcome.handle, JobHandle::new("abc123", QueueName::Backtest));
        assert!(!outcome.is_failed());
        assert_eq!(outcome.summary.unwrap().get_f64("alpha"), Some(0.12));
        assert_eq!(recorder.submitted, vec![outcome.handle.clone()]);
        assert_eq!(recorder.metas.len(), 2);
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[test]
    fn failed_job_has_no_summary() {
        let transport = ScriptedTransport::new()
            .on_submit(Ok(accepted()))
            .on_status(Ok(status_envelope("failed", json!({"error": "boom"}), None)));
        let clock = RecordingClock::default();
        let poller = StatusPoller::default().with_clock(&clock);

        let outcome =
            run_remote(rsi(), RunMode::Backtest, &transport, &poller, &mut NoProgress).unwrap();

        assert!(outcome.is_failed());
        assert!(outcome.summary.is_none());
    }

    #[test]
    fn finished_without_results_is_a_format_error() {
        let transport = ScriptedTransport::new()
            .on_submit(Ok(accepted()))
            .on_status(Ok(status_envelope("finished", json!({}), None)));
        let clock = RecordingClock::default();
        let poller = StatusPoller::default().with_clock(&clock);

        let err = run_remote(rsi(), RunMode::Backtest, &transport, &poller, &mut NoProgress)
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Format(FormatError::MissingField("result.strat_results"))
        ));
    }

    #[test]
    fn rejected_submission_never_polls() {
        let transport = ScriptedTransport::new().on_submit(Ok(Envelope::error("invalid dataset")));
        let poller = StatusPoller::default();
        let mut recorder = Recorder::default();

        let err = run_remote(rsi(), RunMode::Paper, &transport, &poller, &mut recorder)
            .unwrap_err();

        assert_eq!(err.to_string(), "submission rejected: invalid dataset");
        assert!(transport.status_calls().is_empty());
        assert!(recorder.submitted.is_empty());
    }

    struct FixedEngine(Value);

    impl StrategyEngine for FixedEngine {
        fn run(&self, payload: &str, live: bool) -> Result<Value, EngineError> {
            assert!(StrategySpec::from_json(payload).is_ok());
            assert!(!live);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn local_run_summarizes_engine_output() {
        let engine = FixedEngine(json!({"alpha": {"Backtest": 0.12, "Live": 0.1}}));
        let summary = run_local(rsi(), RunMode::Backtest, &engine).unwrap();
        assert_eq!(summary.get_f64("alpha"), Some(0.12));
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn local_run_validates_before_running() {
        let mut spec = rsi();
        spec.dataset = Some(stratlab_core::DatasetBinding {
            name: "google".into(),
            columns: vec![],
            indicators: vec![stratlab_core::DataIndicator {
                name: "SMA".into(),
                column: 0,
            }],
        });
        let engine = FixedEngine(json!({}));
        assert!(matches!(
            run_local(spec, RunMode::Backtest, &engine),
            Err(SessionError::Spec(SpecError::DataIndicatorOutOfRange { .. }))
        ));
    }
}
