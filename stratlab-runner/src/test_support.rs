//! In-memory transport and clock doubles for unit tests.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use stratlab_core::QueueName;

use crate::envelope::{Envelope, EnvelopeResult};
use crate::poll::Clock;
use crate::transport::{Transport, TransportError};

type Reply = Result<Envelope, TransportError>;

#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub payload: String,
    pub live: bool,
    pub simulate_orders: bool,
}

/// Transport that replays canned replies in order and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    submit_replies: Mutex<VecDeque<Reply>>,
    status_replies: Mutex<VecDeque<Reply>>,
    submits: Mutex<Vec<SubmitCall>>,
    status_calls: Mutex<Vec<(String, QueueName)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, reply: Reply) -> Self {
        self.submit_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_status(self, reply: Reply) -> Self {
        self.status_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn submits(&self) -> Vec<SubmitCall> {
        self.submits.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<(String, QueueName)> {
        self.status_calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn endpoint(&self) -> &str {
        "scripted://"
    }

    fn submit(&self, payload: &str, live: bool, simulate_orders: bool) -> Reply {
        self.submits.lock().unwrap().push(SubmitCall {
            payload: payload.to_string(),
            live,
            simulate_orders,
        });
        self.submit_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::MalformedEnvelope("no scripted submit reply".into())))
    }

    fn status(&self, job_id: &str, queue: QueueName) -> Reply {
        self.status_calls
            .lock()
            .unwrap()
            .push((job_id.to_string(), queue));
        self.status_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::MalformedEnvelope("no scripted status reply".into())))
    }
}

/// Status envelope with `meta` and optional results.
pub fn status_envelope(state: &str, meta: Value, results: Option<Value>) -> Envelope {
    let mut data = serde_json::Map::new();
    data.insert("meta".into(), meta);
    Envelope::ok(EnvelopeResult {
        status: state.to_string(),
        data: Some(data),
        strat_results: results,
    })
}

/// Clock that records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
