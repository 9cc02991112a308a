//! Optional tmux side pane tailing the live log.
//!
//! Pane support is strictly best-effort. Outside tmux, or when any tmux
//! command fails, the session runs without a pane and the user can
//! `tail -f` the log themselves.

use std::path::Path;
use std::process::Command;

use tracing::debug;

pub struct AuditorPane {
    pane_id: String,
}

impl AuditorPane {
    /// Split the current tmux window with a `tail -f` of the log.
    ///
    /// Returns `None` when not inside tmux or when the split fails.
    pub fn open(log_path: &Path) -> Option<Self> {
        if std::env::var_os("TMUX").is_none() {
            return None;
        }

        let tail = format!("tail -f '{}'", log_path.display());
        let output = Command::new("tmux")
            .args(["split-window", "-h", "-d", "-P", "-F", "#{pane_id}", &tail])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("tmux split-window failed");
            return None;
        }

        let pane_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pane_id.is_empty() {
            return None;
        }
        Some(Self { pane_id })
    }

    pub fn close(self) {
        let _ = Command::new("tmux")
            .args(["kill-pane", "-t", &self.pane_id])
            .output();
    }
}
