//! Test doubles shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::io::reviewer::{ReviewBackend, ReviewReply};
use crate::supervisor::WorkerControl;

/// Reviewer that replays a fixed script of replies.
///
/// Once the script runs out it answers `[NO_FINDINGS]`. Each reply may carry
/// a cost for budget tests.
pub struct ScriptedReviewer {
    replies: VecDeque<ReviewReply>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedReviewer {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies
                .into_iter()
                .map(|text| ReviewReply {
                    text: text.into(),
                    cost: None,
                })
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_costs<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            replies: replies
                .into_iter()
                .map(|(text, cost)| ReviewReply {
                    text: text.into(),
                    cost: Some(cost),
                })
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, usable after the reviewer moves into the queue.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ReviewBackend for ScriptedReviewer {
    async fn call(&mut self, _prompt: &str) -> Result<ReviewReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.replies.pop_front().unwrap_or(ReviewReply {
            text: "[NO_FINDINGS]".to_string(),
            cost: None,
        }))
    }
}

/// Reviewer whose every call fails.
pub struct FailingReviewer;

impl ReviewBackend for FailingReviewer {
    async fn call(&mut self, _prompt: &str) -> Result<ReviewReply> {
        anyhow::bail!("reviewer unavailable")
    }
}

/// Everything a [`RecordingWorker`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerWrite {
    Inject(String),
    CancelKey,
}

/// Worker control that records writes instead of touching a PTY.
#[derive(Clone, Default)]
pub struct RecordingWorker {
    writes: Arc<Mutex<Vec<WorkerWrite>>>,
}

impl RecordingWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<WorkerWrite> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn injected_messages(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|write| match write {
                WorkerWrite::Inject(message) => Some(message),
                WorkerWrite::CancelKey => None,
            })
            .collect()
    }
}

impl WorkerControl for RecordingWorker {
    fn inject(&mut self, message: &str) -> Result<()> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(WorkerWrite::Inject(message.to_string()));
        Ok(())
    }

    fn send_cancel_key(&mut self) -> Result<()> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(WorkerWrite::CancelKey);
        Ok(())
    }
}

/// Build a chunk without going through the chunker.
pub fn chunk(id: u64, lines: &[&str]) -> crate::core::chunk::Chunk {
    crate::core::chunk::Chunk {
        id,
        timestamp: chrono::Utc::now(),
        lines: lines.iter().map(|line| (*line).to_string()).collect(),
        detected_tools: Vec::new(),
    }
}
