//! Typed response envelope returned by the job service.
//!
//! Every remote call answers with the same wrapper:
//!
//! ```json
//! { "status": "success",
//!   "error": null,
//!   "result": { "status": "started", "data": { ... }, "strat_results": "..." } }
//! ```
//!
//! All fields are optional on the wire. Access to a field the caller needs
//! goes through helpers that fail with a named [`FormatError`] instead of
//! panicking on a missing key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stratlab_core::{json_kind, UnknownQueue};
use thiserror::Error;

use crate::transport::TransportError;

/// Structural problems in a response or results payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` should be {expected}, got {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    UnknownQueue(#[from] UnknownQueue),

    #[error("results payload is not valid JSON: {0}")]
    NotJson(String),

    #[error("results payload should be an object keyed by metric, got {0}")]
    NotAnObject(&'static str),

    #[error("metric '{metric}' should map trading modes to values, got {found}")]
    MetricNotAnObject { metric: String, found: &'static str },

    #[error("metric '{metric}' has no Backtest value")]
    MissingBacktest { metric: String },
}

/// Error member of an envelope. Servers send either a bare message or a
/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteError {
    Message(String),
    Object {
        #[serde(default)]
        code: Option<i64>,
        message: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

impl RemoteError {
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Message(m) => m,
            RemoteError::Object { message, .. } => message,
        }
    }
}

/// `result` member of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeResult {
    pub status: String,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Metrics payload, present once a job has finished. Usually a
    /// JSON-encoded string, sometimes an inline object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strat_results: Option<Value>,
}

impl EnvelopeResult {
    pub fn data(&self) -> Result<&Map<String, Value>, FormatError> {
        self.data
            .as_ref()
            .ok_or(FormatError::MissingField("result.data"))
    }

    /// A string member of `result.data`.
    pub fn data_str(&self, key: &'static str, field: &'static str) -> Result<&str, FormatError> {
        match self.data()?.get(key) {
            None | Some(Value::Null) => Err(FormatError::MissingField(field)),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(FormatError::WrongType {
                field,
                expected: "a string",
                found: json_kind(other),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EnvelopeResult>,
}

impl Envelope {
    pub fn ok(result: EnvelopeResult) -> Self {
        Self {
            status: Some("success".into()),
            error: None,
            result: Some(result),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".into()),
            error: Some(RemoteError::Message(message.into())),
            result: None,
        }
    }

    /// Unwrap the `result` member, turning an error envelope into
    /// [`TransportError::Remote`].
    pub fn into_result(self) -> Result<EnvelopeResult, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Remote(err.message().to_string()));
        }
        if self.status.as_deref() == Some("error") {
            return Err(TransportError::Remote(
                "service reported an error without a message".into(),
            ));
        }
        self.result.ok_or_else(|| {
            TransportError::MalformedEnvelope("envelope has neither result nor error".into())
        })
    }
}
