//! Units of worker output selected for review.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// A bounded, immutable slice of worker terminal output.
///
/// Created by the [`Chunker`](crate::core::chunker::Chunker) on flush and
/// never mutated afterwards; ownership moves with the chunk through the
/// review pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Strictly increasing, gap-free id starting at 1.
    pub id: u64,
    /// Flush time.
    pub timestamp: DateTime<Utc>,
    /// Non-empty lines, already stripped of terminal escape sequences.
    pub lines: Vec<String>,
    /// Tool names detected in this chunk, in detection-table order.
    pub detected_tools: Vec<&'static str>,
}

impl Chunk {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Joined content for prompts and recalibration capture.
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }
}

/// Running totals across a chunker's lifetime.
///
/// Tool counts use a `BTreeMap` so report output stays deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub total_chunks: u64,
    pub total_lines: u64,
    pub detected_tools: BTreeMap<&'static str, u64>,
}
