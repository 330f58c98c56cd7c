//! Job queues and run modes.
//!
//! The job service routes every submission to one of four worker queues.
//! Queue names come back from the service as plain strings; they are parsed
//! into a closed enum here so routing is exhaustively checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Worker queue a remote job was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Paper,
    Live,
    Backtest,
    /// Technical-analysis-only jobs.
    Ta,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Paper,
        QueueName::Live,
        QueueName::Backtest,
        QueueName::Ta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Paper => "paper",
            QueueName::Live => "live",
            QueueName::Backtest => "backtest",
            QueueName::Ta => "ta",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown queue '{0}' (expected one of: paper, live, backtest, ta)")]
pub struct UnknownQueue(pub String);

impl FromStr for QueueName {
    type Err = UnknownQueue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| UnknownQueue(s.to_string()))
    }
}

/// How a strategy should be executed.
///
/// Each mode maps onto the two submission flags the job service understands:
///
/// | mode     | live  | simulate_orders |
/// |----------|-------|-----------------|
/// | backtest | false | true            |
/// | paper    | true  | true            |
/// | live     | true  | false           |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Backtest,
    Paper,
    Live,
}

impl RunMode {
    pub fn live(&self) -> bool {
        !matches!(self, RunMode::Backtest)
    }

    pub fn simulate_orders(&self) -> bool {
        !matches!(self, RunMode::Live)
    }

    /// Queue the service normally routes this mode to. Indicator-only
    /// strategies may still land on [`QueueName::Ta`].
    pub fn expected_queue(&self) -> QueueName {
        match self {
            RunMode::Backtest => QueueName::Backtest,
            RunMode::Paper => QueueName::Paper,
            RunMode::Live => QueueName::Live,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.expected_queue().as_str()
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown run mode '{0}' (expected one of: backtest, paper, live)")]
pub struct UnknownRunMode(pub String);

impl FromStr for RunMode {
    type Err = UnknownRunMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backtest" => Ok(RunMode::Backtest),
            "paper" => Ok(RunMode::Paper),
            "live" => Ok(RunMode::Live),
            _ => Err(UnknownRunMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_parse_and_display() {
        for q in QueueName::ALL {
            assert_eq!(q.as_str().parse::<QueueName>().unwrap(), q);
            assert_eq!(q.to_string(), q.as_str());
        }
    }

    #[test]
    fn unknown_queue_is_rejected() {
        let err = "default".parse::<QueueName>().unwrap_err();
        assert_eq!(err, UnknownQueue("default".into()));
        // Queue names are case-sensitive on the wire
        assert!("Backtest".parse::<QueueName>().is_err());
    }

    #[test]
    fn queue_serde_uses_wire_names() {
        let json = serde_json::to_string(&QueueName::Ta).unwrap();
        assert_eq!(json, "\"ta\"");
        let q: QueueName = serde_json::from_str("\"paper\"").unwrap();
        assert_eq!(q, QueueName::Paper);
    }

    #[test]
    fn run_mode_flags() {
        assert!(!RunMode::Backtest.live());
        assert!(RunMode::Backtest.simulate_orders());
        assert!(RunMode::Paper.live());
        assert!(RunMode::Paper.simulate_orders());
        assert!(RunMode::Live.live());
        assert!(!RunMode::Live.simulate_orders());
    }

    #[test]
    fn run_mode_parse_is_case_insensitive() {
        assert_eq!("PAPER".parse::<RunMode>().unwrap(), RunMode::Paper);
        assert_eq!(RunMode::default(), RunMode::Backtest);
        assert!("sim".parse::<RunMode>().is_err());
    }
}
