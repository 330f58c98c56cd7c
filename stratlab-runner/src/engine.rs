//! In-process execution through an external strategy engine.
//!
//! The engine is a separate executable: it reads the serialized strategy on
//! stdin, learns the mode from `STRATLAB_LIVE`, and prints the metrics
//! payload as JSON on stdout.

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Environment variable carrying the live flag to the engine process.
pub const LIVE_ENV: &str = "STRATLAB_LIVE";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot launch engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited with {}: {stderr}", exit_label(.code))]
    Failed { code: Option<i32>, stderr: String },

    /// The engine exited successfully without consuming the whole strategy.
    #[error("engine did not read the full strategy: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("engine output is not JSON: {0}")]
    InvalidOutput(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// Runs a serialized strategy synchronously and returns its metrics payload.
pub trait StrategyEngine: Send + Sync {
    fn run(&self, payload: &str, live: bool) -> Result<Value, EngineError>;
}

/// Engine backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: &[String]) -> Self {
        Self {
            program: program.into(),
            args: args.to_vec(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl StrategyEngine for CommandEngine {
    fn run(&self, payload: &str, live: bool) -> Result<Value, EngineError> {
        let launch = |source| EngineError::Launch {
            program: self.program.clone(),
            source,
        };

        log::info!("running strategy in-process via '{}'", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(LIVE_ENV, if live { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch)?;

        // Feed stdin from its own thread while stdout and stderr drain here,
        // so neither side can block on a full pipe.
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(payload.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output = output.map_err(launch)?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(EngineError::Stdin)?;

        serde_json::from_slice(&output.stdout).map_err(|e| EngineError::InvalidOutput(e.to_string()))
    }
}
