//! Real-time supervisor for interactive AI coding sessions.
//!
//! Wraps a worker CLI in a PTY, streams its output to a reviewing model, and
//! intervenes (inject or interrupt) when the reviewer finds problems.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use overseer::core::policy::Autonomy;
use overseer::io::config::{FocusArea, Mode, SessionConfig, load_config};
use overseer::{logging, session};

#[derive(Parser)]
#[command(
    name = "overseer",
    version,
    about = "Run a worker CLI under real-time review"
)]
struct Cli {
    /// active reviews and intervenes; passive only records findings.
    #[arg(long)]
    mode: Option<Mode>,

    /// Comma-separated focus areas (security, quality, compliance, performance).
    #[arg(long = "focus", value_delimiter = ',')]
    focus_areas: Option<Vec<FocusArea>>,

    /// Model name for the reviewer.
    #[arg(long)]
    reviewer_model: Option<String>,

    /// Audit report path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Live activity log path.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Reviewer spend ceiling in USD.
    #[arg(long)]
    max_budget: Option<f64>,

    /// Periodic chunk flush interval in seconds.
    #[arg(long)]
    chunk_interval: Option<u64>,

    /// full, supervised, or observe.
    #[arg(long)]
    autonomy: Option<Autonomy>,

    #[arg(long)]
    verbose: bool,

    /// Skip the end-of-session report.
    #[arg(long)]
    no_report: bool,

    /// TOML config file; CLI flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker command to run under the PTY.
    #[arg(long)]
    worker: Option<String>,

    /// Arguments passed through to the worker after `--`.
    #[arg(last = true)]
    worker_args: Vec<String>,
}

impl Cli {
    /// Precedence: CLI flag, then config file, then default.
    fn into_config(self) -> Result<SessionConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)?,
            None => SessionConfig::default(),
        };

        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if let Some(areas) = self.focus_areas {
            cfg.focus_areas = areas;
        }
        if let Some(model) = self.reviewer_model {
            cfg.reviewer_model = model;
        }
        if let Some(output) = self.output {
            cfg.output_path = output;
        }
        if let Some(log) = self.log {
            cfg.log_path = Some(log);
        }
        if let Some(budget) = self.max_budget {
            cfg.max_budget_usd = budget;
        }
        if let Some(interval) = self.chunk_interval {
            cfg.chunk_interval_secs = interval;
        }
        if let Some(autonomy) = self.autonomy {
            cfg.autonomy = autonomy;
        }
        if self.verbose {
            cfg.verbose = true;
        }
        if self.no_report {
            cfg.generate_report = false;
        }
        if let Some(worker) = self.worker {
            cfg.worker_command = worker;
        }
        cfg.worker_args = self.worker_args;

        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli.into_config()?;
    logging::init(config.verbose);

    let runtime = tokio::runtime::Runtime::new().context("build tokio runtime")?;
    runtime.block_on(session::run_session(config))
}
