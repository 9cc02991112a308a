//! Live activity log and the session's finding/action record.
//!
//! The log file backs the side pane (`tail -f`); the in-memory vectors feed
//! the end-of-session report. Log writes are best-effort: a read-only
//! filesystem must not take the session down.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::directive::Finding;

/// A worker intervention that happened (or was suppressed).
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub kind: String,
    pub message: String,
    pub auto_approved: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct Display {
    log_path: PathBuf,
    active: bool,
    findings: Vec<Finding>,
    actions: Vec<ActionRecord>,
}

impl Display {
    /// Create the record keeper and, in active mode, start the log file.
    pub fn new(log_path: PathBuf, active: bool) -> Self {
        if active {
            let header = format!(
                "# Overseer Live Log\n# Started: {}\n\n",
                Utc::now().to_rfc3339()
            );
            if let Err(err) = std::fs::write(&log_path, header) {
                debug!(error = %err, path = %log_path.display(), "could not start live log");
            }
        }
        Self {
            log_path,
            active,
            findings: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn log_finding(&mut self, finding: Finding) {
        self.append(&format!(
            "[{}] [{}] {}",
            clock(),
            finding.severity,
            finding.description
        ));
        self.findings.push(finding);
    }

    pub fn log_action(&mut self, kind: &str, message: &str, auto_approved: bool) {
        self.append(&format!("[{}] [{kind}] {message}", clock()));
        self.actions.push(ActionRecord {
            kind: kind.to_string(),
            message: message.to_string(),
            auto_approved,
            timestamp: Utc::now(),
        });
    }

    pub fn log_line(&mut self, line: &str) {
        self.append(&format!("[{}] {line}", clock()));
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    fn append(&self, line: &str) {
        if !self.active {
            return;
        }
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            debug!(error = %err, "live log append failed");
        }
    }
}

fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::core::directive::Severity;

    fn finding() -> Finding {
        Finding {
            severity: Severity::Warning,
            description: "missing input validation".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn active_display_writes_header_and_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("live.log");

        let mut display = Display::new(path.clone(), true);
        display.log_finding(finding());
        display.log_action("INJECT", "validate inputs", true);

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert!(contents.starts_with("# Overseer Live Log"));
        assert!(contents.contains("[WARNING] missing input validation"));
        assert!(contents.contains("[INJECT] validate inputs"));
    }

    #[test]
    fn passive_display_records_without_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("live.log");

        let mut display = Display::new(path.clone(), false);
        display.log_finding(finding());

        assert!(!path.exists());
        assert_eq!(display.findings().len(), 1);
    }

    #[test]
    fn unwritable_log_path_is_not_fatal() {
        let mut display = Display::new(PathBuf::from("/nonexistent/dir/live.log"), true);
        display.log_finding(finding());
        assert_eq!(display.findings().len(), 1);
    }
}
