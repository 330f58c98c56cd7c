//! In-memory job service shared by the integration tests.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use stratlab_core::{QueueName, StrategySpec};
use stratlab_runner::{Clock, Envelope, EnvelopeResult, Transport, TransportError};

struct Job {
    queue: QueueName,
    remaining: usize,
    polls: usize,
    fail: bool,
}

/// Accepts every valid strategy and finishes each job after `delay` polls
/// reporting `started`.
pub struct FakeJobService {
    delay: usize,
    fail: bool,
    results: String,
    jobs: Mutex<HashMap<String, Job>>,
    submissions: Mutex<Vec<(StrategySpec, bool, bool)>>,
    status_queries: Mutex<usize>,
}

impl FakeJobService {
    pub fn new(delay: usize) -> Self {
        Self {
            delay,
            fail: false,
            results: r#"{"alpha": {"Backtest": 0.12, "Paper": 0.1}}"#.to_string(),
            jobs: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            status_queries: Mutex::new(0),
        }
    }

    /// Every job ends in `failed` instead of `finished`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_results(mut self, results: &str) -> Self {
        self.results = results.to_string();
        self
    }

    pub fn submissions(&self) -> Vec<(StrategySpec, bool, bool)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn status_queries(&self) -> usize {
        *self.status_queries.lock().unwrap()
    }

    fn reply(status: &str, data: Value, strat_results: Option<Value>) -> Envelope {
        Envelope::ok(EnvelopeResult {
            status: status.to_string(),
            data: data.as_object().cloned(),
            strat_results,
        })
    }
}

impl Transport for FakeJobService {
    fn endpoint(&self) -> &str {
        "memory://job-service"
    }

    fn submit(
        &self,
        payload: &str,
        live: bool,
        simulate_orders: bool,
    ) -> Result<Envelope, TransportError> {
        let spec = match StrategySpec::from_json(payload) {
            Ok(spec) => spec,
            Err(e) => return Ok(Envelope::error(e.to_string())),
        };
        let queue = match (live, simulate_orders) {
            (false, _) => QueueName::Backtest,
            (true, true) => QueueName::Paper,
            (true, false) => QueueName::Live,
        };

        let mut jobs = self.jobs.lock().unwrap();
        let id = if jobs.is_empty() {
            "abc123".to_string()
        } else {
            format!("job-{}", jobs.len())
        };
        jobs.insert(
            id.clone(),
            Job {
                queue,
                remaining: self.delay,
                polls: 0,
                fail: self.fail,
            },
        );
        self.submissions
            .lock()
            .unwrap()
            .push((spec, live, simulate_orders));

        Ok(Self::reply(
            "started",
            json!({"strat_id": id, "queue": queue.as_str()}),
            None,
        ))
    }

    fn status(&self, job_id: &str, queue: QueueName) -> Result<Envelope, TransportError> {
        *self.status_queries.lock().unwrap() += 1;

        let mut jobs = self.jobs.lock().unwrap();
        let job = match jobs.get_mut(job_id) {
            Some(job) if job.queue == queue => job,
            _ => return Ok(Envelope::error(format!("no job {job_id} on {queue}"))),
        };
        job.polls += 1;

        if job.remaining > 0 {
            job.remaining -= 1;
            let progress = job.polls * 100 / (self.delay + 1);
            return Ok(Self::reply(
                "started",
                json!({"meta": {"progress": progress}}),
                None,
            ));
        }
        if job.fail {
            return Ok(Self::reply(
                "failed",
                json!({"meta": {"error": "engine crashed"}}),
                None,
            ));
        }
        Ok(Self::reply(
            "finished",
            json!({"meta": {"progress": 100}}),
            Some(Value::String(self.results.clone())),
        ))
    }
}

/// Clock that never sleeps.
pub struct InstantClock;

impl Clock for InstantClock {
    fn sleep(&self, _duration: Duration) {}
}

pub fn rsi_lstm() -> StrategySpec {
    let mut spec = StrategySpec::new();
    spec.add_market_indicator("RSI").unwrap();
    spec.add_ml_model("LSTM").unwrap();
    spec
}

pub fn progress_values(metas: &[Map<String, Value>]) -> Vec<u64> {
    metas
        .iter()
        .filter_map(|m| m.get("progress").and_then(Value::as_u64))
        .collect()
}
