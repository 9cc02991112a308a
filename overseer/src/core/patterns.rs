//! Data-driven detection tables for the chunker.
//!
//! Kept as ordered tables (not inline conditionals) so boundary, tool, and
//! noise rules can be unit-tested independently of stream feeding.

use std::sync::LazyLock;

use regex::Regex;

/// Lines that likely open a new section of worker output.
///
/// Matched against trimmed lines, in order: horizontal rules, tool-invocation
/// markers, status glyphs, shell prompts, box-drawing borders, and activity
/// markers.
const BOUNDARY_TABLE: &[&str] = &[
    r"^[─═]{3,}",
    r"^(Read|Edit|Write|Bash|Grep|Glob|Task)\s",
    r"^(✓|✗|⚠|❌|✅)",
    r"^[>$#]\s",
    r"^╭─",
    r"^╰─",
    r"^⏺",
];

/// Tool name → invocation pattern.
const TOOL_TABLE: &[(&str, &str)] = &[
    ("Read", r"(?i)\b(Read|Reading)\s+(file|/)"),
    ("Edit", r"(?i)\b(Edit|Editing)\s"),
    ("Write", r"(?i)\b(Write|Writing)\s+(file|to\s+/)"),
    ("Bash", r"(?i)\b(Bash|Running|command)\s"),
    ("Grep", r"(?i)\b(Grep|Searching|Search)\s"),
    ("Glob", r"(?i)\b(Glob|Finding files)\s"),
    ("Task", r"(?i)\b(Task|Agent|Spawning)\s"),
];

/// Lines that never count as substantial content: box interiors, spinner
/// words, and tool-update notices.
const NOISE_TABLE: &[&str] = &[r"^[│┃]", r"^\S+(\.\.\.|…)$", r"(?i)^update available"];

static BOUNDARY_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(BOUNDARY_TABLE));

static TOOL_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    TOOL_TABLE
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).expect("tool pattern should compile")))
        .collect()
});

static NOISE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(NOISE_TABLE));

fn compile(table: &[&str]) -> Vec<Regex> {
    table
        .iter()
        .map(|pattern| Regex::new(pattern).expect("pattern table should compile"))
        .collect()
}

/// True when a trimmed line marks a probable section boundary.
pub fn is_boundary(line: &str) -> bool {
    BOUNDARY_RES.iter().any(|re| re.is_match(line))
}

/// True when a trimmed line is terminal noise.
pub fn is_noise(line: &str) -> bool {
    NOISE_RES.iter().any(|re| re.is_match(line))
}

/// Tool names detected across `lines`, deduplicated, in table order.
pub fn detect_tools<S: AsRef<str>>(lines: &[S]) -> Vec<&'static str> {
    TOOL_RES
        .iter()
        .filter(|(_, re)| lines.iter().any(|line| re.is_match(line.as_ref())))
        .map(|(name, _)| *name)
        .collect()
}
