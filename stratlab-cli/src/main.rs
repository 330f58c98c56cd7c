//! StratLab CLI — build a strategy and run it.
//!
//! Commands:
//! - `run` — assemble a strategy from flags and files, then run it in-process
//!   or submit it to the job service and wait for the results
//! - `status` — one-shot status query for an existing job
//! - `summarize` — render a saved results payload

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stratlab_core::{Endpoint, PlatformConfig, QueueName, RunMode, StrategySpec};
use stratlab_runner::{
    run_local, run_remote, summarize, CommandEngine, JobStatusSnapshot, JsonRpcClient,
    RemoteOutcome, ResultSummary, StatusPoller, StdoutProgress, Transport,
};

/// Exit status for a job that ran and failed remotely.
const EXIT_JOB_FAILED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "stratlab",
    version,
    about = "StratLab CLI — run trading strategies in-process or on the job service"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Backtest,
    Paper,
    Live,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Backtest => RunMode::Backtest,
            ModeArg::Paper => RunMode::Paper,
            ModeArg::Live => RunMode::Live,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a strategy and run it.
    Run {
        /// Market indicators (e.g., RSI MACD).
        #[arg(short = 't', long = "market-indicators", num_args = 1..)]
        market_indicators: Vec<String>,

        /// Machine-learning models (e.g., LSTM).
        #[arg(short = 'm', long = "ml-models", num_args = 1..)]
        ml_models: Vec<String>,

        /// Dataset to bind (e.g., quandl, google).
        #[arg(short = 'd', long)]
        dataset: Option<String>,

        /// Dataset columns to target.
        #[arg(short = 'c', long, num_args = 1..)]
        columns: Vec<String>,

        /// Data indicators; the i-th one applies to the i-th column.
        #[arg(short = 'i', long = "data-indicators", num_args = 1..)]
        data_indicators: Vec<String>,

        /// JSON file merged into the strategy parameters.
        #[arg(short = 'f', long = "json-file")]
        json_file: Option<PathBuf>,

        /// Base strategy file (JSON or TOML).
        #[arg(short = 's', long)]
        script: Option<PathBuf>,

        /// Trading mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Backtest, conflicts_with = "paper")]
        mode: ModeArg,

        /// Shorthand for `--mode paper`.
        #[arg(long, default_value_t = false)]
        paper: bool,

        /// Submit to the job service instead of running in-process.
        #[arg(long, default_value_t = false)]
        rpc: bool,

        /// Use the hosted job service instead of the local one.
        #[arg(long, default_value_t = false, requires = "rpc")]
        hosted: bool,

        /// Seconds between status queries. Defaults to the configured interval.
        #[arg(long)]
        interval: Option<f64>,

        /// Give up after this many status queries.
        #[arg(long)]
        max_polls: Option<usize>,
    },
    /// Query the current status of a job once.
    Status {
        /// Job id returned at submission.
        job_id: String,

        /// Queue the job was routed to (paper, live, backtest, ta).
        queue: String,

        /// Query the hosted job service instead of the local one.
        #[arg(long, default_value_t = false)]
        hosted: bool,
    },
    /// Render a saved results payload (JSON object or JSON-encoded string).
    Summarize {
        /// Path to the results file.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            market_indicators,
            ml_models,
            dataset,
            columns,
            data_indicators,
            json_file,
            script,
            mode,
            paper,
            rpc,
            hosted,
            interval,
            max_polls,
        } => {
            let spec = build_spec(
                script.as_deref(),
                &market_indicators,
                &ml_models,
                dataset.as_deref(),
                &columns,
                &data_indicators,
                json_file.as_deref(),
            )?;
            let mode = if paper { RunMode::Paper } else { mode.into() };
            let config = PlatformConfig::load()?;
            if let Some(binding) = &spec.dataset {
                config.check_dataset(&binding.name)?;
            }
            if rpc {
                let endpoint = if hosted { Endpoint::Hosted } else { Endpoint::Local };
                run_rpc_cmd(spec, mode, &config, endpoint, interval, max_polls)
            } else {
                run_local_cmd(spec, mode, &config)
            }
        }
        Commands::Status {
            job_id,
            queue,
            hosted,
        } => {
            let config = PlatformConfig::load()?;
            let endpoint = if hosted { Endpoint::Hosted } else { Endpoint::Local };
            run_status_cmd(&job_id, &queue, &config, endpoint)
        }
        Commands::Summarize { file } => run_summarize_cmd(&file),
    }
}

fn build_spec(
    script: Option<&Path>,
    market_indicators: &[String],
    ml_models: &[String],
    dataset: Option<&str>,
    columns: &[String],
    data_indicators: &[String],
    json_file: Option<&Path>,
) -> Result<StrategySpec> {
    let mut spec = match script {
        Some(path) => StrategySpec::from_file(path)
            .with_context(|| format!("loading strategy from {}", path.display()))?,
        None => StrategySpec::new(),
    };

    for name in market_indicators {
        spec.add_market_indicator(name)?;
    }
    for name in ml_models {
        spec.add_ml_model(name)?;
    }

    match dataset {
        Some(name) => {
            spec.use_dataset(name, columns)?;
            spec.add_data_indicators(data_indicators)?;
        }
        None if !columns.is_empty() || !data_indicators.is_empty() => {
            bail!("--columns and --data-indicators require --dataset");
        }
        None => {}
    }

    if let Some(path) = json_file {
        spec.load_overlay_file(path)
            .with_context(|| format!("loading parameters from {}", path.display()))?;
    }

    spec.validate()?;
    Ok(spec)
}

fn connect(config: &PlatformConfig, endpoint: Endpoint) -> Result<JsonRpcClient> {
    let url = config.api_url(endpoint)?;
    Ok(JsonRpcClient::new(url, config.request_timeout)?)
}

fn run_rpc_cmd(
    spec: StrategySpec,
    mode: RunMode,
    config: &PlatformConfig,
    endpoint: Endpoint,
    interval: Option<f64>,
    max_polls: Option<usize>,
) -> Result<()> {
    let interval = match interval {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(d) if !d.is_zero() => d,
            _ => bail!("--interval must be a positive number of seconds, got {secs}"),
        },
        None => config.poll_interval,
    };

    println!("{}", serde_json::to_string_pretty(&spec)?);

    let client = connect(config, endpoint)?;
    log::info!("using {endpoint:?} job service at {}", client.endpoint());
    let mut poller = StatusPoller::new(interval);
    if let Some(max) = max_polls {
        poller = poller.with_max_queries(max);
    }

    let outcome = run_remote(spec, mode, &client, &poller, &mut StdoutProgress)?;
    print_outcome(&outcome);

    if outcome.is_failed() {
        std::process::exit(EXIT_JOB_FAILED);
    }
    Ok(())
}

fn run_local_cmd(spec: StrategySpec, mode: RunMode, config: &PlatformConfig) -> Result<()> {
    let (program, args) = config.engine()?;
    let engine = CommandEngine::new(program, args);

    println!("{}", serde_json::to_string_pretty(&spec)?);

    let summary = run_local(spec, mode, &engine)?;
    print_summary(&summary);
    Ok(())
}

fn run_status_cmd(
    job_id: &str,
    queue: &str,
    config: &PlatformConfig,
    endpoint: Endpoint,
) -> Result<()> {
    let queue: QueueName = queue.parse()?;
    let client = connect(config, endpoint)?;

    let envelope = client.status(job_id, queue)?;
    let snapshot = JobStatusSnapshot::from_envelope(envelope)?;

    println!("Job {job_id}@{queue}: {}", snapshot.state);
    if !snapshot.meta.is_empty() {
        println!("{}", stratlab_runner::render_meta(&snapshot.meta));
    }
    if let Some(results) = &snapshot.results {
        print_summary(&summarize(results)?);
    }

    if snapshot.is_failed() {
        std::process::exit(EXIT_JOB_FAILED);
    }
    Ok(())
}

fn run_summarize_cmd(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let payload: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not JSON", file.display()))?;
    print_summary(&summarize(&payload)?);
    Ok(())
}

fn print_outcome(outcome: &RemoteOutcome) {
    let elapsed = outcome.elapsed();
    println!(
        "\n=== Job {} ({}) in {}.{:03}s ===",
        outcome.handle,
        outcome.snapshot.state,
        elapsed.num_seconds(),
        elapsed.num_milliseconds() % 1000
    );
    match &outcome.summary {
        Some(summary) => print_summary(summary),
        None => eprintln!("Job failed; no results were produced."),
    }
}

fn print_summary(summary: &ResultSummary) {
    if summary.is_empty() {
        println!("No metrics reported.");
    } else {
        print!("{}", summary.render());
    }
}
