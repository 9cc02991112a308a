//! Session configuration (TOML file plus CLI overrides).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::Autonomy;

/// How chunks are routed to the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Review chunks and intervene per the autonomy level.
    Active,
    /// Review chunks but only record findings.
    Passive,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Passive => "passive",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            other => anyhow::bail!("unknown mode: {other} (expected active or passive)"),
        }
    }
}

/// Review emphasis; each selected area adds an overlay to the reviewer's
/// system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Security,
    Quality,
    Compliance,
    Performance,
}

impl FocusArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Quality => "quality",
            Self::Compliance => "compliance",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for FocusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FocusArea {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "security" => Ok(Self::Security),
            "quality" => Ok(Self::Quality),
            "compliance" => Ok(Self::Compliance),
            "performance" => Ok(Self::Performance),
            other => anyhow::bail!(
                "unknown focus area: {other} (expected security, quality, compliance, or performance)"
            ),
        }
    }
}

/// Session configuration (TOML).
///
/// Missing fields default to sensible values; CLI flags override anything
/// loaded from file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: Mode,

    /// Focus areas layered onto the reviewer's system prompt.
    pub focus_areas: Vec<FocusArea>,

    /// Model name passed to the reviewer CLI.
    pub reviewer_model: String,

    /// Where the end-of-session audit report is written.
    pub output_path: PathBuf,

    /// Supervisor activity log; defaults to a per-process file under /tmp.
    pub log_path: Option<PathBuf>,

    /// Reviewer spend ceiling in USD.
    pub max_budget_usd: f64,

    /// Periodic flush interval for the chunker, in seconds.
    pub chunk_interval_secs: u64,

    pub autonomy: Autonomy,

    pub verbose: bool,

    pub generate_report: bool,

    /// Worker command to run under the PTY.
    pub worker_command: String,

    /// Arguments passed through to the worker command.
    #[serde(skip)]
    pub worker_args: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Active,
            focus_areas: vec![FocusArea::Security, FocusArea::Quality],
            reviewer_model: "sonnet".to_string(),
            output_path: PathBuf::from("./audit-report.md"),
            log_path: None,
            max_budget_usd: 1.0,
            chunk_interval_secs: 30,
            autonomy: Autonomy::Supervised,
            verbose: false,
            generate_report: true,
            worker_command: "claude".to_string(),
            worker_args: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_budget_usd <= 0.0 {
            return Err(anyhow!("max_budget_usd must be > 0"));
        }
        if self.chunk_interval_secs == 0 {
            return Err(anyhow!("chunk_interval_secs must be > 0"));
        }
        if self.reviewer_model.trim().is_empty() {
            return Err(anyhow!("reviewer_model must be non-empty"));
        }
        if self.worker_command.trim().is_empty() {
            return Err(anyhow!("worker_command must be non-empty"));
        }
        Ok(())
    }

    /// Resolved activity-log path.
    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/tmp/overseer-{}.log", std::process::id())))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
