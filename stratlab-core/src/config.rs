//! Platform configuration — job-service endpoints, polling cadence, engine.
//!
//! Built once at process start and passed by reference to whatever needs it.
//! Layers, lowest precedence first:
//! 1. Built-in defaults (local endpoint depends on whether we run in a container)
//! 2. Optional TOML file named by `STRATLAB_CONFIG`
//! 3. `STRATLAB_*` environment variables

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "STRATLAB_CONFIG";
pub const LOCAL_API_URL_ENV: &str = "STRATLAB_LOCAL_API_URL";
pub const HOSTED_API_URL_ENV: &str = "STRATLAB_HOSTED_API_URL";
pub const POLL_INTERVAL_ENV: &str = "STRATLAB_POLL_INTERVAL_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "STRATLAB_REQUEST_TIMEOUT_SECS";
pub const ENGINE_CMD_ENV: &str = "STRATLAB_ENGINE_CMD";
pub const DATASETS_ENV: &str = "STRATLAB_DATASETS";

const HOST_LOCAL_API_URL: &str = "http://0.0.0.0:5000/api";
const CONTAINER_LOCAL_API_URL: &str = "http://web:5000/api";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{key}: '{value}' is not an http(s) URL")]
    InvalidUrl { key: &'static str, value: String },

    #[error("{key}: '{value}' is not a positive number of seconds")]
    InvalidInterval { key: &'static str, value: String },

    #[error("no hosted API URL configured (set {HOSTED_API_URL_ENV} or hosted_api_url)")]
    MissingHostedUrl,

    #[error("no strategy engine configured (set {ENGINE_CMD_ENV} or engine_command)")]
    MissingEngine,

    #[error("unknown dataset '{name}' (available: {available})")]
    UnknownDataset { name: String, available: String },
}

/// Which job-service deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Local,
    Hosted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConfig {
    pub local_api_url: String,
    pub hosted_api_url: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Program and arguments of the in-process strategy engine.
    pub engine_command: Option<Vec<String>>,
    /// Datasets the job service offers. `None` leaves dataset names to the
    /// service.
    pub datasets: Option<Vec<String>>,
}

/// On-disk shape of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    local_api_url: Option<String>,
    hosted_api_url: Option<String>,
    poll_interval_secs: Option<f64>,
    request_timeout_secs: Option<f64>,
    engine_command: Option<Vec<String>>,
    datasets: Option<Vec<String>>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::for_environment(in_container())
    }
}

impl PlatformConfig {
    /// Defaults for a host or container environment.
    pub fn for_environment(in_container: bool) -> Self {
        let local = if in_container {
            CONTAINER_LOCAL_API_URL
        } else {
            HOST_LOCAL_API_URL
        };
        Self {
            local_api_url: local.to_string(),
            hosted_api_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            engine_command: None,
            datasets: None,
        }
    }

    /// Build the process configuration: defaults, then the file named by
    /// `STRATLAB_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_toml(content)?;
        Ok(config)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_toml(&content)?;
        log::debug!("loaded config from {}", path.display());
        Ok(())
    }

    pub fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(url) = file.local_api_url {
            self.local_api_url = validate_url("local_api_url", url)?;
        }
        if let Some(url) = file.hosted_api_url {
            self.hosted_api_url = Some(validate_url("hosted_api_url", url)?);
        }
        if let Some(secs) = file.poll_interval_secs {
            self.poll_interval = secs_to_duration("poll_interval_secs", secs, &secs.to_string())?;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout =
                secs_to_duration("request_timeout_secs", secs, &secs.to_string())?;
        }
        if let Some(cmd) = file.engine_command {
            self.engine_command = non_empty_command(cmd);
        }
        if let Some(datasets) = file.datasets {
            self.datasets = Some(datasets);
        }
        Ok(())
    }

    /// Apply `STRATLAB_*` overrides read through `lookup`.
    ///
    /// Taking a lookup function keeps this testable without touching the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(LOCAL_API_URL_ENV) {
            self.local_api_url = validate_url(LOCAL_API_URL_ENV, url)?;
        }
        if let Some(url) = lookup(HOSTED_API_URL_ENV) {
            self.hosted_api_url = Some(validate_url(HOSTED_API_URL_ENV, url)?);
        }
        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            self.poll_interval = parse_secs(POLL_INTERVAL_ENV, &raw)?;
        }
        if let Some(raw) = lookup(REQUEST_TIMEOUT_ENV) {
            self.request_timeout = parse_secs(REQUEST_TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(ENGINE_CMD_ENV) {
            self.engine_command =
                non_empty_command(raw.split_whitespace().map(String::from).collect());
        }
        if let Some(raw) = lookup(DATASETS_ENV) {
            self.datasets = Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        Ok(())
    }

    /// Base URL of the job service for `endpoint`.
    pub fn api_url(&self, endpoint: Endpoint) -> Result<&str, ConfigError> {
        match endpoint {
            Endpoint::Local => Ok(&self.local_api_url),
            Endpoint::Hosted => self
                .hosted_api_url
                .as_deref()
                .ok_or(ConfigError::MissingHostedUrl),
        }
    }

    /// Program and arguments of the in-process engine.
    pub fn engine(&self) -> Result<(&str, &[String]), ConfigError> {
        match self.engine_command.as_deref() {
            Some([program, args @ ..]) => Ok((program.as_str(), args)),
            _ => Err(ConfigError::MissingEngine),
        }
    }

    /// Accept `name` if it is one of the configured datasets, or if no list
    /// is configured.
    pub fn check_dataset(&self, name: &str) -> Result<(), ConfigError> {
        match &self.datasets {
            Some(known) if !known.iter().any(|d| d == name.trim()) => {
                Err(ConfigError::UnknownDataset {
                    name: name.to_string(),
                    available: known.join(", "),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Best-effort container detection.
pub fn in_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|cgroup| cgroup.contains("docker") || cgroup.contains("kubepods"))
        .unwrap_or(false)
}

fn validate_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let has_host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| !matches!(c, '/' | '?' | '#'));
    if has_host {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidUrl { key, value })
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidInterval {
        key,
        value: raw.to_string(),
    })?;
    secs_to_duration(key, secs, raw)
}

fn secs_to_duration(key: &'static str, secs: f64, raw: &str) -> Result<Duration, ConfigError> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(ConfigError::InvalidInterval {
            key,
            value: raw.to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidInterval {
        key,
        value: raw.to_string(),
    })
}

fn non_empty_command(cmd: Vec<String>) -> Option<Vec<String>> {
    if cmd.is_empty() {
        None
    } else {
        Some(cmd)
    }
}
