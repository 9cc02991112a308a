//! Stream segmentation: raw terminal bytes → discrete review chunks.
//!
//! The chunker itself is pure and synchronous; all flush timers (debounce,
//! periodic) live in the async driver in [`crate::session`]. Boundary and
//! size-cap flushes happen inline during [`Chunker::feed`] because they
//! depend only on buffer contents.

use chrono::Utc;
use tracing::debug;

use crate::core::chunk::{Chunk, ChunkStats};
use crate::core::patterns;

/// Force-flush the buffer the instant it reaches this many lines.
pub const SIZE_CAP_LINES: usize = 200;
/// A boundary line only splits the buffer once more than this many lines are
/// pending; below that, the boundary just joins the current chunk.
pub const BOUNDARY_MIN_BUFFERED: usize = 5;
/// A flush is suppressed as noise unless at least one buffered line has this
/// many trimmed characters and is not a known noise line.
const MIN_SUBSTANTIAL_CHARS: usize = 20;

/// Buffers stripped output lines and cuts them into [`Chunk`]s.
#[derive(Debug, Default)]
pub struct Chunker {
    buffer: Vec<String>,
    emitted: u64,
    stats: ChunkStats,
}

impl Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw PTY bytes; returns chunks cut by boundary or size-cap rules.
    ///
    /// Escape sequences are stripped before any pattern matching, and lines
    /// that are empty after trimming are discarded. When a boundary line
    /// arrives on a buffer holding more than [`BOUNDARY_MIN_BUFFERED`] lines,
    /// the pending buffer is flushed first so the boundary opens the next
    /// chunk.
    pub fn feed(&mut self, raw: &[u8]) -> Vec<Chunk> {
        let stripped = strip_ansi_escapes::strip(raw);
        let clean = String::from_utf8_lossy(&stripped);

        let mut out = Vec::new();
        for line in clean.split('\n') {
            let line = line.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if patterns::is_boundary(trimmed) && self.buffer.len() > BOUNDARY_MIN_BUFFERED {
                out.extend(self.cut());
            }

            self.buffer.push(line.to_string());

            if self.buffer.len() >= SIZE_CAP_LINES {
                out.extend(self.cut());
            }
        }
        out
    }

    /// Flush whatever is buffered. Idempotent on an empty buffer.
    pub fn flush(&mut self) -> Option<Chunk> {
        self.cut()
    }

    pub fn stats(&self) -> &ChunkStats {
        &self.stats
    }

    /// Cut the buffer into a chunk, or discard it when it holds only noise.
    ///
    /// Suppressed buffers consume no chunk id: emitted ids stay gap-free.
    fn cut(&mut self) -> Option<Chunk> {
        if self.buffer.is_empty() {
            return None;
        }
        let lines = std::mem::take(&mut self.buffer);
        if !lines.iter().any(|line| is_substantial(line)) {
            debug!(discarded_lines = lines.len(), "discarded noise-only buffer");
            return None;
        }

        let detected_tools = patterns::detect_tools(&lines);
        self.emitted += 1;
        self.stats.total_chunks += 1;
        self.stats.total_lines += lines.len() as u64;
        for tool in &detected_tools {
            *self.stats.detected_tools.entry(tool).or_insert(0) += 1;
        }

        Some(Chunk {
            id: self.emitted,
            timestamp: Utc::now(),
            lines,
            detected_tools,
        })
    }
}

fn is_substantial(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= MIN_SUBSTANTIAL_CHARS && !patterns::is_noise(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(chunker: &mut Chunker, text: &str) -> Vec<Chunk> {
        chunker.feed(text.as_bytes())
    }

    #[test]
    fn manual_flush_emits_buffered_lines() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "Hello world this is a test line\nSecond line of content here\nThird line of real content\n",
        );

        let chunk = chunker.flush().expect("chunk");
        assert_eq!(chunk.id, 1);
        assert_eq!(chunk.line_count(), 3);
        assert!(chunk.content().contains("Hello world"));
    }

    #[test]
    fn ansi_codes_are_stripped_before_matching() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "\x1b[31mRed text with some content\x1b[0m\nAnother line of output here\nThird line for minimum\n",
        );

        let chunk = chunker.flush().expect("chunk");
        assert!(chunk.content().contains("Red text"));
        assert!(!chunk.content().contains("\x1b["));
    }

    #[test]
    fn size_cap_forces_flush_without_explicit_flush() {
        let mut chunker = Chunker::new();
        let lines: String = (1..=250)
            .map(|i| format!("Line {i} with enough content to not be filtered\n"))
            .collect();

        let chunks = feed_str(&mut chunker, &lines);
        assert!(!chunks.is_empty(), "expected a size-cap chunk before flush");
        assert_eq!(chunks[0].line_count(), SIZE_CAP_LINES);
    }

    #[test]
    fn boundary_splits_buffer_and_opens_next_chunk() {
        let mut chunker = Chunker::new();
        let mut chunks = Vec::new();
        for i in 1..=6 {
            chunks.extend(feed_str(
                &mut chunker,
                &format!("Line {i} with content padding out\n"),
            ));
        }
        chunks.extend(feed_str(&mut chunker, "───────────────────\n"));
        chunks.extend(feed_str(
            &mut chunker,
            "After boundary line one extra\nAfter boundary line two extra\nAfter boundary line three extra\n",
        ));
        chunks.extend(chunker.flush());

        assert!(chunks.len() >= 2, "expected at least 2 chunks, got {}", chunks.len());
        assert!(!chunks[0].content().contains('─'));
        assert!(chunks[1].lines[0].contains('─'), "boundary opens the second chunk");
    }

    #[test]
    fn chunk_ids_increment_without_gaps() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "First chunk line one content\nFirst chunk line two content\nFirst chunk line three\n",
        );
        let first = chunker.flush().expect("first");
        feed_str(
            &mut chunker,
            "Second chunk line one content\nSecond chunk line two content\nSecond chunk line three\n",
        );
        let second = chunker.flush().expect("second");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn suppressed_noise_buffers_consume_no_id() {
        let mut chunker = Chunker::new();
        feed_str(&mut chunker, "hi\n");
        assert!(chunker.flush().is_none());

        feed_str(
            &mut chunker,
            "Real content line long enough\nSecond real content line here\nThird real content line here\n",
        );
        assert_eq!(chunker.flush().expect("chunk").id, 1);
    }

    #[test]
    fn flush_on_empty_buffer_emits_nothing() {
        let mut chunker = Chunker::new();
        assert!(chunker.flush().is_none());
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn single_short_line_is_filtered_as_noise() {
        let mut chunker = Chunker::new();
        feed_str(&mut chunker, "hi\n");
        assert!(chunker.flush().is_none());
        assert_eq!(chunker.stats().total_chunks, 0);
    }

    #[test]
    fn terminal_noise_lines_are_filtered() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "Puzzling...\nUpdate available! Run: brew upgrade\n│ some box content\n",
        );
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn tools_are_detected_on_flush() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "  Read file /src/index.js\n  Contents of file here...\n  More file content below it\n",
        );

        let chunk = chunker.flush().expect("chunk");
        assert!(chunk.detected_tools.contains(&"Read"));
    }

    #[test]
    fn stats_accumulate_across_chunks() {
        let mut chunker = Chunker::new();
        feed_str(
            &mut chunker,
            "Line 1 content here padded\nLine 2 content here padded\n  Read file test content now\n",
        );
        chunker.flush().expect("first");
        feed_str(
            &mut chunker,
            "Line 3 content here padded\n  Bash command running now\nLine 4 output content padded\n",
        );
        chunker.flush().expect("second");

        let stats = chunker.stats();
        assert_eq!(stats.total_chunks, 2);
        assert!(stats.total_lines >= 6);
        assert_eq!(stats.detected_tools.get("Read"), Some(&1));
        assert_eq!(stats.detected_tools.get("Bash"), Some(&1));
    }
}
