//! Reviewer process calls and the serialized review queue.
//!
//! The queue is an actor task owning the backend, the prompt engine, and the
//! spend ledger. Jobs are processed strictly FIFO with at most one reviewer
//! call in flight, so directives always arrive in chunk order.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::budget::SpendLedger;
use crate::core::chunk::Chunk;
use crate::core::directive::{DirectiveResult, parse_directives};
use crate::io::prompts::PromptEngine;

/// Wall-clock cap on a single reviewer call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// One reviewer reply: the raw text plus the call's reported cost.
#[derive(Debug, Clone)]
pub struct ReviewReply {
    pub text: String,
    pub cost: Option<f64>,
}

/// A backend that answers one prompt at a time.
///
/// `&mut self` makes serialization structural: the owning queue task cannot
/// start a second call before the first resolves.
pub trait ReviewBackend: Send + 'static {
    fn call(&mut self, prompt: &str) -> impl Future<Output = Result<ReviewReply>> + Send;
}

/// Backend that shells out to the `claude` CLI.
///
/// Every call shares one session id so the reviewer keeps conversational
/// context across chunks.
#[derive(Debug)]
pub struct ClaudeReviewer {
    program: PathBuf,
    model: String,
    session_id: Uuid,
    system_prompt: String,
    timeout: Duration,
}

impl ClaudeReviewer {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("claude"),
            model: model.into(),
            session_id: Uuid::new_v4(),
            system_prompt: system_prompt.into(),
            timeout: CALL_TIMEOUT,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    async fn run_once(&self, prompt: &str) -> Result<ReviewReply> {
        let mut child = Command::new(&self.program)
            .arg("-p")
            .arg(prompt)
            .arg("--session-id")
            .arg(self.session_id.to_string())
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("json")
            .arg("--no-session-persistence")
            .arg("--system-prompt")
            .arg(&self.system_prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn reviewer {}", self.program.display()))?;

        let mut stdout = Vec::new();
        let mut out = child.stdout.take().context("reviewer stdout missing")?;

        let status = tokio::time::timeout(self.timeout, async {
            out.read_to_end(&mut stdout).await?;
            child.wait().await.context("wait for reviewer")
        })
        .await
        .map_err(|_| anyhow::anyhow!("reviewer call exceeded {:?}", self.timeout))??;

        if !status.success() {
            bail!("reviewer exited with {status}");
        }
        Ok(extract_reply(&stdout))
    }
}

impl ReviewBackend for ClaudeReviewer {
    async fn call(&mut self, prompt: &str) -> Result<ReviewReply> {
        self.run_once(prompt).await
    }
}

/// Pull the result text and cost out of the CLI's JSON envelope.
///
/// Non-JSON output is passed through as-is with no cost attributed.
fn extract_reply(stdout: &[u8]) -> ReviewReply {
    let raw = String::from_utf8_lossy(stdout).into_owned();
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return ReviewReply { text: raw, cost: None };
    };

    let cost = json
        .get("cost_usd")
        .or_else(|| json.get("total_cost_usd"))
        .and_then(serde_json::Value::as_f64);
    let text = ["result", "text", "content"]
        .iter()
        .find_map(|key| json.get(*key))
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or(raw);

    ReviewReply { text, cost }
}

/// What a queued job asks the reviewer about.
#[derive(Debug)]
pub enum ReviewPrompt {
    Chunk(Chunk),
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStats {
    pub total_cost: f64,
    pub budget_exceeded: bool,
}

enum Job {
    Analyze {
        prompt: ReviewPrompt,
        reply: oneshot::Sender<Option<DirectiveResult>>,
    },
    Drain(oneshot::Sender<()>),
    Stats(oneshot::Sender<QueueStats>),
}

/// Handle to the review queue actor. Cheap to clone.
#[derive(Clone)]
pub struct ReviewQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl ReviewQueue {
    /// Spawn the queue actor around `backend` with a spend ceiling in USD.
    pub fn spawn<B: ReviewBackend>(backend: B, ceiling: f64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(backend, SpendLedger::new(ceiling), rx));
        Self { tx }
    }

    /// Analyze a chunk. Resolves to `None` when the call failed or the
    /// budget is exhausted.
    pub async fn analyze(&self, chunk: Chunk) -> Option<DirectiveResult> {
        self.submit(ReviewPrompt::Chunk(chunk)).await
    }

    /// Ask whether the worker's recalibration response is back on track.
    pub async fn recalibrate(&self, worker_response: &str) -> Option<DirectiveResult> {
        let engine = PromptEngine::new();
        let prompt = match engine.build_recalibration_prompt(worker_response) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "failed to render recalibration prompt");
                return None;
            }
        };
        self.submit(ReviewPrompt::Raw(prompt)).await
    }

    async fn submit(&self, prompt: ReviewPrompt) -> Option<DirectiveResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job::Analyze {
                prompt,
                reply: reply_tx,
            })
            .ok()?;
        reply_rx.await.ok().flatten()
    }

    /// Wait for every already-queued job to finish.
    pub async fn drain(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Job::Drain(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn stats(&self) -> Option<QueueStats> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Job::Stats(tx)).ok()?;
        rx.await.ok()
    }
}

async fn run_queue<B: ReviewBackend>(
    mut backend: B,
    mut ledger: SpendLedger,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    let engine = PromptEngine::new();

    while let Some(job) = rx.recv().await {
        match job {
            Job::Analyze { prompt, reply } => {
                let result = process(&mut backend, &mut ledger, &engine, prompt).await;
                let _ = reply.send(result);
            }
            Job::Drain(done) => {
                // FIFO ordering means every prior job already finished.
                let _ = done.send(());
            }
            Job::Stats(out) => {
                let _ = out.send(QueueStats {
                    total_cost: ledger.spent(),
                    budget_exceeded: ledger.is_exceeded(),
                });
            }
        }
    }
}

async fn process<B: ReviewBackend>(
    backend: &mut B,
    ledger: &mut SpendLedger,
    engine: &PromptEngine,
    prompt: ReviewPrompt,
) -> Option<DirectiveResult> {
    if ledger.is_exceeded() {
        debug!(spent = ledger.spent(), "budget exhausted, skipping review");
        return None;
    }

    let label;
    let rendered = match prompt {
        ReviewPrompt::Chunk(chunk) => {
            label = format!("chunk #{}", chunk.id);
            match engine.build_chunk_prompt(&chunk) {
                Ok(prompt) => prompt,
                Err(err) => {
                    warn!(error = %err, chunk = chunk.id, "failed to render chunk prompt");
                    return None;
                }
            }
        }
        ReviewPrompt::Raw(text) => {
            label = "recalibration".to_string();
            text
        }
    };

    match backend.call(&rendered).await {
        Ok(reply) => {
            if let Some(cost) = reply.cost
                && ledger.record(cost)
            {
                warn!(
                    spent = format!("{:.2}", ledger.spent()),
                    "review budget reached, further analysis disabled"
                );
            }
            let parsed = parse_directives(&reply.text);
            debug!(
                %label,
                findings = parsed.findings.len(),
                cost = format!("{:.4}", ledger.spent()),
                "review complete"
            );
            Some(parsed)
        }
        Err(err) => {
            warn!(%label, error = %err, "reviewer call failed");
            None
        }
    }
}
