//! Strategy specification — the serializable description of one strategy.
//!
//! A `StrategySpec` names the market indicators, ML models and (optionally)
//! an external dataset with per-column indicators that make up a strategy,
//! plus a free-form parameter overlay. The execution engine lives elsewhere;
//! this crate only owns the transport-safe JSON contract.
//!
//! Serialization is canonical: struct fields have a fixed order and the
//! parameter overlay is a sorted map, so the same spec always produces the
//! same bytes (and therefore the same fingerprint).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building, loading or validating a strategy.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("data indicator #{index} has no target column ({columns} column(s) declared)")]
    DataIndicatorOutOfRange { index: usize, columns: usize },

    #[error("data indicators require a dataset")]
    DataIndicatorsWithoutDataset,

    #[error("empty {kind} identifier")]
    EmptyIdentifier { kind: &'static str },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse strategy: {0}")]
    Parse(String),

    #[error("parameter overlay must be a JSON object, got {0}")]
    OverlayNotObject(&'static str),

    #[error("failed to encode strategy: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An indicator computed over one column of the bound dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIndicator {
    pub name: String,
    /// Index into [`DatasetBinding::columns`].
    pub column: usize,
}

/// External dataset the strategy consumes, with its target columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetBinding {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<DataIndicator>,
}

impl DatasetBinding {
    /// Column name a data indicator is bound to, if the index is in range.
    pub fn column_of(&self, indicator: &DataIndicator) -> Option<&str> {
        self.columns.get(indicator.column).map(String::as_str)
    }
}

/// Complete, serializable strategy description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Market indicators, in priority order.
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Machine-learning models, in priority order.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetBinding>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl StrategySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a base strategy from a JSON or TOML file (chosen by extension).
    pub fn from_file(path: &Path) -> Result<Self, SpecError> {
        let content = read(path)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let spec: Self = if is_toml {
            toml::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Deserialize a spec produced by [`StrategySpec::serialize`].
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let spec: Self =
            serde_json::from_str(json).map_err(|e| SpecError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn add_market_indicator(&mut self, name: &str) -> Result<(), SpecError> {
        self.indicators.push(normalize(name, "market indicator")?);
        Ok(())
    }

    pub fn add_ml_model(&mut self, name: &str) -> Result<(), SpecError> {
        self.models.push(normalize(name, "model")?);
        Ok(())
    }

    /// Bind a dataset and its target columns. Replaces any previous binding.
    pub fn use_dataset(&mut self, name: &str, columns: &[String]) -> Result<(), SpecError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SpecError::EmptyIdentifier { kind: "dataset" });
        }
        self.dataset = Some(DatasetBinding {
            name: name.to_string(),
            columns: columns.to_vec(),
            indicators: Vec::new(),
        });
        Ok(())
    }

    /// Add an indicator over the dataset column at `column`.
    pub fn add_data_indicator(&mut self, name: &str, column: usize) -> Result<(), SpecError> {
        let name = normalize(name, "data indicator")?;
        let dataset = self
            .dataset
            .as_mut()
            .ok_or(SpecError::DataIndicatorsWithoutDataset)?;
        if column >= dataset.columns.len() {
            return Err(SpecError::DataIndicatorOutOfRange {
                index: column,
                columns: dataset.columns.len(),
            });
        }
        dataset.indicators.push(DataIndicator { name, column });
        Ok(())
    }

    /// Bind `indicators` to the dataset columns positionally: the i-th
    /// indicator targets the i-th declared column.
    pub fn add_data_indicators<S: AsRef<str>>(&mut self, indicators: &[S]) -> Result<(), SpecError> {
        for (i, name) in indicators.iter().enumerate() {
            self.add_data_indicator(name.as_ref(), i)?;
        }
        Ok(())
    }

    /// Deep-merge a JSON object file into the parameter overlay.
    pub fn load_overlay_file(&mut self, path: &Path) -> Result<(), SpecError> {
        let content = read(path)?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?;
        match value {
            Value::Object(map) => {
                self.merge_params(map);
                Ok(())
            }
            other => Err(SpecError::OverlayNotObject(json_kind(&other))),
        }
    }

    /// Deep-merge `overlay` into the parameters. Nested objects merge key by
    /// key; any other value replaces what was there.
    pub fn merge_params(&mut self, overlay: Map<String, Value>) {
        merge_into(&mut self.params, overlay);
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.indicators.iter().any(|s| s.trim().is_empty()) {
            return Err(SpecError::EmptyIdentifier { kind: "market indicator" });
        }
        if self.models.iter().any(|s| s.trim().is_empty()) {
            return Err(SpecError::EmptyIdentifier { kind: "model" });
        }
        if let Some(dataset) = &self.dataset {
            if dataset.name.trim().is_empty() {
                return Err(SpecError::EmptyIdentifier { kind: "dataset" });
            }
            for ind in &dataset.indicators {
                if ind.column >= dataset.columns.len() {
                    return Err(SpecError::DataIndicatorOutOfRange {
                        index: ind.column,
                        columns: dataset.columns.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and encode to the canonical JSON payload.
    pub fn serialize(&self) -> Result<String, SpecError> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// BLAKE3 hex digest of the canonical payload.
    pub fn fingerprint(&self) -> Result<String, SpecError> {
        Ok(digest(&self.serialize()?))
    }
}

/// BLAKE3 hex digest of a serialized payload.
pub fn digest(payload: &str) -> String {
    blake3::hash(payload.as_bytes()).to_hex().to_string()
}

fn read(path: &Path) -> Result<String, SpecError> {
    std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize(name: &str, kind: &'static str) -> Result<String, SpecError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SpecError::EmptyIdentifier { kind });
    }
    Ok(name.to_uppercase())
}

fn merge_into(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// Short human-readable name of a JSON value's type, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
