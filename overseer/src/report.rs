//! End-of-session audit report (markdown).

use std::time::Duration;

use crate::core::chunk::ChunkStats;
use crate::core::directive::{Finding, Severity};
use crate::io::config::FocusArea;
use crate::io::display::ActionRecord;

pub struct ReportInputs<'a> {
    pub findings: &'a [Finding],
    pub actions: &'a [ActionRecord],
    pub stats: &'a ChunkStats,
    pub reviewer_cost: f64,
    pub reviewer_model: &'a str,
    pub focus_areas: &'a [FocusArea],
    pub duration: Duration,
    pub exit_code: i32,
}

pub fn generate(inputs: &ReportInputs<'_>) -> String {
    let mut out = String::new();
    out.push_str("# Audit Report\n\n");

    out.push_str("## Summary\n\n");
    out.push_str(&format!("{}\n\n", summary_line(inputs.findings)));

    out.push_str("## Findings\n\n");
    if inputs.findings.is_empty() {
        out.push_str("No findings.\n\n");
    } else {
        for severity in [
            Severity::Critical,
            Severity::Warning,
            Severity::Info,
            Severity::Suggestion,
        ] {
            let matching: Vec<&Finding> = inputs
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if matching.is_empty() {
                continue;
            }
            out.push_str(&format!("### {severity}\n\n"));
            for finding in matching {
                out.push_str(&format!(
                    "- {} ({})\n",
                    finding.description,
                    finding.timestamp.format("%H:%M:%S")
                ));
            }
            out.push('\n');
        }
    }

    out.push_str("## Action Log\n\n");
    if inputs.actions.is_empty() {
        out.push_str("No interventions.\n\n");
    } else {
        for action in inputs.actions {
            let approval = if action.auto_approved { " (auto)" } else { "" };
            out.push_str(&format!(
                "- [{}] [{}]{approval} {}\n",
                action.timestamp.format("%H:%M:%S"),
                action.kind,
                action.message
            ));
        }
        out.push('\n');
    }

    out.push_str("## Session Statistics\n\n");
    out.push_str(&format!(
        "- Total chunks analyzed: {}\n",
        inputs.stats.total_chunks
    ));
    out.push_str(&format!("- Total lines: {}\n", inputs.stats.total_lines));
    if !inputs.stats.detected_tools.is_empty() {
        out.push_str("- Detected tool usage:\n");
        for (tool, count) in &inputs.stats.detected_tools {
            out.push_str(&format!("  - {tool}: {count}\n"));
        }
    }
    out.push_str(&format!(
        "- Reviewer cost: ${:.4} ({})\n",
        inputs.reviewer_cost, inputs.reviewer_model
    ));
    let areas: Vec<&str> = inputs.focus_areas.iter().map(|a| a.as_str()).collect();
    out.push_str(&format!("- Focus areas: {}\n", areas.join(", ")));
    out.push_str(&format!(
        "- Session duration: {}\n",
        humanize(inputs.duration)
    ));
    out.push_str(&format!("- Worker exit code: {}\n", inputs.exit_code));

    out
}

fn summary_line(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "Clean session: no findings.".to_string();
    }
    let count_of = |severity| findings.iter().filter(|f| f.severity == severity).count();
    let parts: Vec<String> = [
        (count_of(Severity::Critical), "critical finding"),
        (count_of(Severity::Warning), "warning"),
        (count_of(Severity::Info), "informational note"),
        (count_of(Severity::Suggestion), "suggestion"),
    ]
    .iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, noun)| format!("{count} {noun}{}", if *count == 1 { "" } else { "s" }))
    .collect();
    format!("{}.", join_english(&parts))
}

fn join_english(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}

fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs} seconds")
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{mins} minute{}", if mins == 1 { "" } else { "s" })
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!(
            "{hours} hour{} {mins} minute{}",
            if hours == 1 { "" } else { "s" },
            if mins == 1 { "" } else { "s" }
        )
    }
}
