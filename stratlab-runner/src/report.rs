//! Result reporter — reduces a finished job's metrics to backtest values.
//!
//! The service returns metrics as `{metric: {mode: value, ...}, ...}`,
//! usually JSON-encoded inside a string. Only the `Backtest` column is kept.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use stratlab_core::json_kind;

use crate::envelope::FormatError;

/// Trading-mode key whose value is reported per metric.
pub const BACKTEST_KEY: &str = "Backtest";

/// Metric name → backtest value, in metric-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSummary {
    metrics: BTreeMap<String, Value>,
}

impl ResultSummary {
    pub fn get(&self, metric: &str) -> Option<&Value> {
        self.metrics.get(metric)
    }

    pub fn get_f64(&self, metric: &str) -> Option<f64> {
        self.get(metric).and_then(Value::as_f64)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// One `name: value` line per metric, names padded to a common width.
    pub fn render(&self) -> String {
        let width = self.metrics.keys().map(|k| k.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (name, value) in &self.metrics {
            let shown = match value {
                Value::Number(n) => match n.as_f64() {
                    Some(f) if n.is_f64() => format!("{f:.4}"),
                    _ => n.to_string(),
                },
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(out, "{name:<width$}  {shown}");
        }
        out
    }
}

/// Extract the backtest value of every metric in `payload`.
///
/// Accepts the mapping itself or a JSON string encoding it. Pure: the same
/// payload always yields the same summary.
pub fn summarize(payload: &Value) -> Result<ResultSummary, FormatError> {
    let decoded;
    let payload = match payload {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| FormatError::NotJson(e.to_string()))?;
            &decoded
        }
        other => other,
    };

    let entries = payload
        .as_object()
        .ok_or(FormatError::NotAnObject(json_kind(payload)))?;

    let mut metrics = BTreeMap::new();
    for (metric, modes) in entries {
        let modes = modes
            .as_object()
            .ok_or_else(|| FormatError::MetricNotAnObject {
                metric: metric.clone(),
                found: json_kind(modes),
            })?;
        let value = modes
            .get(BACKTEST_KEY)
            .ok_or_else(|| FormatError::MissingBacktest {
                metric: metric.clone(),
            })?;
        metrics.insert(metric.clone(), value.clone());
    }
    Ok(ResultSummary { metrics })
}

/// Pretty-print progress metadata for display.
pub fn render_meta(meta: &Map<String, Value>) -> String {
    format!("{:#}", Value::Object(meta.clone()))
}
