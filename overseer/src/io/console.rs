//! Supervisor console on stderr.
//!
//! Everything goes to stderr so the PTY relay keeps exclusive use of stdout.
//! Approval prompts read from `/dev/tty` because stdin is already being
//! forwarded to the worker.

use anyhow::{Context, Result};
use chrono::Local;

use crate::core::directive::{Finding, Severity};
use crate::supervisor::{ApprovalDecision, ApprovalKind, ApprovalRequest};

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const MAGENTA: &str = "\x1b[35m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
        Severity::Suggestion => GREEN,
    }
}

fn print_line(msg: &str) {
    let clock = Local::now().format("%H:%M:%S");
    eprintln!("\r{DIM}[{clock}]{RESET} {msg}");
}

pub fn print_finding(finding: &Finding) {
    let color = severity_color(finding.severity);
    print_line(&format!(
        "{color}[{}]{RESET} {}",
        finding.severity, finding.description
    ));
}

pub fn print_state(state: &str) {
    print_line(&format!("{BOLD}[{state}]{RESET}"));
}

pub fn print_inject(message: &str, auto_approved: bool) {
    let tag = if auto_approved { "AUTO-INJECTED" } else { "INJECTED" };
    print_line(&format!("{MAGENTA}[{tag}]{RESET} {}", truncate(message, 120)));
}

pub fn print_interrupt(reason: &str) {
    print_line(&format!("{RED}[INTERRUPTED]{RESET} {reason}"));
}

pub fn print_suppressed_interrupt(reason: &str) {
    print_line(&format!(
        "{YELLOW}[INTERRUPT-SUPPRESSED]{RESET} {}",
        truncate(reason, 120)
    ));
}

pub fn print_recalibrate(turn: u32, message: &str) {
    print_line(&format!(
        "{YELLOW}[RECALIBRATING T{turn}]{RESET} {}",
        truncate(message, 120)
    ));
}

pub fn print_resolved() {
    print_line(&format!("{GREEN}[RESOLVED]{RESET} Worker back on track"));
}

/// Prompt the human on `/dev/tty` and resolve the approval request.
///
/// The blocking read runs on the blocking pool so supervisor events keep
/// flowing while the prompt is open.
pub async fn prompt_approval(request: ApprovalRequest) {
    let label = match request.kind {
        ApprovalKind::Interrupt => format!("{RED}INTERRUPT{RESET}"),
        ApprovalKind::Inject | ApprovalKind::RecalibrateInject => format!("{YELLOW}INJECT{RESET}"),
    };

    eprintln!();
    print_line(&format!("{label} suggested:"));
    eprintln!("  \"{}\"", request.text);
    eprint!("  {BOLD}[S]{RESET}end / {BOLD}[E]{RESET}dit / {BOLD}[I]{RESET}gnore ? > ");

    let answer = tokio::task::spawn_blocking(read_tty_line).await;
    let decision = match answer {
        Ok(Ok(line)) => match line.trim().to_lowercase().as_str() {
            "s" | "send" | "" => ApprovalDecision::Approve { edited: None },
            "e" | "edit" => {
                eprint!("  New text > ");
                match tokio::task::spawn_blocking(read_tty_line).await {
                    Ok(Ok(edited)) if !edited.trim().is_empty() => ApprovalDecision::Approve {
                        edited: Some(edited.trim().to_string()),
                    },
                    _ => ApprovalDecision::Reject,
                }
            }
            _ => ApprovalDecision::Reject,
        },
        _ => ApprovalDecision::Reject,
    };

    let _ = request.decision.send(decision);
}

fn read_tty_line() -> Result<String> {
    use std::io::{BufRead, BufReader};
    let tty = std::fs::File::open("/dev/tty").context("open /dev/tty")?;
    let mut line = String::new();
    BufReader::new(tty).read_line(&mut line).context("read /dev/tty")?;
    Ok(line)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
