//! Parsing of reviewer replies into structured directives.
//!
//! The reviewer speaks a line-oriented bracket grammar: `[FINDING:SEVERITY]`,
//! at most one `[INJECT]` and one `[INTERRUPT]`, plus the `[RESOLVED]` and
//! `[NO_FINDINGS]` markers. Anything outside those markers is ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Suggestion,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Suggestion => "SUGGESTION",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "WARNING" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            "SUGGESTION" => Ok(Self::Suggestion),
            other => anyhow::bail!("unknown severity: {other}"),
        }
    }
}

/// One issue the reviewer reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything extracted from a single reviewer reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveResult {
    pub findings: Vec<Finding>,
    pub inject: Option<String>,
    pub interrupt: Option<String>,
    pub resolved: bool,
    pub no_findings: bool,
}

static FINDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[FINDING:(CRITICAL|WARNING|INFO|SUGGESTION)\]\s*(.+)$")
        .expect("finding pattern should compile")
});
static INJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[INJECT\]\s*(.+)$").expect("inject pattern should compile"));
static INTERRUPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[INTERRUPT\]\s*(.+)$").expect("interrupt pattern should compile")
});

/// Parse a reviewer reply.
///
/// `[NO_FINDINGS]` anywhere short-circuits the whole reply; only the first
/// `[INJECT]` and first `[INTERRUPT]` line count.
pub fn parse_directives(reply: &str) -> DirectiveResult {
    if reply.contains("[NO_FINDINGS]") {
        return DirectiveResult {
            no_findings: true,
            ..DirectiveResult::default()
        };
    }

    let now = Utc::now();
    let findings = FINDING_RE
        .captures_iter(reply)
        .filter_map(|cap| {
            let severity = cap[1].parse().ok()?;
            Some(Finding {
                severity,
                description: cap[2].trim().to_string(),
                timestamp: now,
            })
        })
        .collect();

    DirectiveResult {
        findings,
        inject: INJECT_RE
            .captures(reply)
            .map(|cap| cap[1].trim().to_string()),
        interrupt: INTERRUPT_RE
            .captures(reply)
            .map(|cap| cap[1].trim().to_string()),
        resolved: reply.contains("[RESOLVED]"),
        no_findings: false,
    }
}
