//! Supervisor state machine: turns reviewer directives into worker
//! interventions.
//!
//! Runs as one task consuming the chunk stream. In MONITORING every chunk
//! goes to the review queue; in RECALIBRATE chunks are captured as the
//! worker's response instead, and a settle timer decides when that response
//! is complete enough to send back to the reviewer. While an intervention is
//! in progress (pending approval, idle wait, cancel grace) incoming chunks
//! are dropped rather than queued.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::core::chunk::Chunk;
use crate::core::directive::Finding;
use crate::core::policy::{
    Autonomy, MAX_RECALIBRATION_TURNS, PlannedAction, SupervisorState, plan_action,
};
use crate::io::reviewer::ReviewQueue;
use crate::io::terminal::maybe_sleep;

/// Quiet time after the last recalibration chunk before the captured
/// response is considered complete.
pub const SETTLE_AFTER: Duration = Duration::from_secs(5);
/// How long an interrupt waits for the worker to go idle before pressing
/// cancel anyway.
pub const IDLE_WAIT: Duration = Duration::from_secs(15);
/// Pause between the cancel key and the stop message, so the worker's UI has
/// returned to its input prompt.
pub const CANCEL_GRACE: Duration = Duration::from_millis(500);

const RECALIBRATE_PREVIEW_CHARS: usize = 200;

/// Write access to the worker's input stream.
///
/// The production implementation is the PTY controller; tests substitute a
/// recorder.
pub trait WorkerControl: Send + Sync {
    fn inject(&mut self, message: &str) -> Result<()>;
    fn send_cancel_key(&mut self) -> Result<()>;
}

/// Everything the supervisor announces to the rest of the session.
#[derive(Debug)]
pub enum SupervisorEvent {
    Finding(Finding),
    StateChange {
        from: SupervisorState,
        to: SupervisorState,
    },
    Inject {
        message: String,
        auto_approved: bool,
    },
    Interrupt {
        reason: String,
    },
    SuppressedInterrupt {
        reason: String,
    },
    Recalibrate {
        turn: u32,
        message: String,
    },
    Resolved,
    ApprovalNeeded(ApprovalRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    Inject,
    Interrupt,
    RecalibrateInject,
}

/// A pending intervention awaiting a human decision.
///
/// Dropping the sender counts as a rejection.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub kind: ApprovalKind,
    pub text: String,
    pub decision: oneshot::Sender<ApprovalDecision>,
}

#[derive(Debug)]
pub enum ApprovalDecision {
    Approve { edited: Option<String> },
    Reject,
}

type ChunkRx = mpsc::UnboundedReceiver<Chunk>;

pub struct Supervisor {
    state: SupervisorState,
    autonomy: Autonomy,
    worker: Box<dyn WorkerControl>,
    idle_rx: watch::Receiver<bool>,
    queue: ReviewQueue,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    response_buffer: String,
    recalibration_turn: u32,
    settle_deadline: Option<Instant>,
}

impl Supervisor {
    pub fn new(
        autonomy: Autonomy,
        worker: Box<dyn WorkerControl>,
        idle_rx: watch::Receiver<bool>,
        queue: ReviewQueue,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            state: SupervisorState::Monitoring,
            autonomy,
            worker,
            idle_rx,
            queue,
            events,
            response_buffer: String::new(),
            recalibration_turn: 0,
            settle_deadline: None,
        }
    }

    /// Consume the chunk stream until it closes.
    pub async fn run(mut self, mut chunk_rx: ChunkRx) {
        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    self.process_chunk(chunk, &mut chunk_rx).await;
                }
                () = maybe_sleep(self.settle_deadline) => {
                    self.settle_deadline = None;
                    self.on_response_settled().await;
                }
            }
        }
    }

    async fn process_chunk(&mut self, chunk: Chunk, chunk_rx: &mut ChunkRx) {
        match self.state {
            SupervisorState::Recalibrate => {
                self.response_buffer.push_str(&chunk.content());
                self.response_buffer.push('\n');
                self.settle_deadline = Some(Instant::now() + SETTLE_AFTER);
            }
            SupervisorState::Monitoring => self.review_chunk(chunk, chunk_rx).await,
            state => {
                debug!(%state, chunk = chunk.id, "dropping chunk while intervening");
            }
        }
    }

    async fn review_chunk(&mut self, chunk: Chunk, chunk_rx: &mut ChunkRx) {
        let chunk_id = chunk.id;
        let Some(result) = self.queue.analyze(chunk).await else {
            return;
        };

        for finding in result.findings.clone() {
            self.emit(SupervisorEvent::Finding(finding));
        }

        match plan_action(&result) {
            PlannedAction::Interrupt(reason) => self.do_interrupt(reason, chunk_rx).await,
            PlannedAction::Inject(message) => self.do_inject(message, chunk_rx).await,
            PlannedAction::SuppressedInterrupt(reason) => {
                warn!(chunk = chunk_id, %reason, "interrupt requested without a critical finding");
                self.emit(SupervisorEvent::SuppressedInterrupt { reason });
            }
            PlannedAction::LogOnly => {}
        }
    }

    /// Send guidance without stopping the worker.
    async fn do_inject(&mut self, message: String, chunk_rx: &mut ChunkRx) {
        self.set_state(SupervisorState::Alert);
        if self.autonomy == Autonomy::Observe {
            debug!("observe autonomy, recording inject without sending");
            self.set_state(SupervisorState::Monitoring);
            return;
        }

        let approved = drop_chunks_during(
            chunk_rx,
            SupervisorState::Alert,
            self.approve(ApprovalKind::Inject, &message),
        )
        .await;
        match approved {
            Some(text) => {
                self.set_state(SupervisorState::Inject);
                if let Err(err) = self.worker.inject(&text) {
                    warn!(error = %err, "inject failed");
                } else {
                    self.emit(SupervisorEvent::Inject {
                        message: text,
                        auto_approved: self.autonomy == Autonomy::Full,
                    });
                }
            }
            None => info!("inject rejected"),
        }
        self.set_state(SupervisorState::Monitoring);
    }

    /// Stop the worker and open a recalibration dialogue.
    async fn do_interrupt(&mut self, reason: String, chunk_rx: &mut ChunkRx) {
        self.set_state(SupervisorState::Alert);
        if self.autonomy == Autonomy::Observe {
            debug!("observe autonomy, recording interrupt without acting");
            self.set_state(SupervisorState::Monitoring);
            return;
        }

        let approved = drop_chunks_during(
            chunk_rx,
            SupervisorState::Alert,
            self.approve(ApprovalKind::Interrupt, &reason),
        )
        .await;
        let Some(reason) = approved else {
            info!("interrupt rejected");
            self.set_state(SupervisorState::Monitoring);
            return;
        };

        self.set_state(SupervisorState::Interrupt);
        self.emit(SupervisorEvent::Interrupt {
            reason: reason.clone(),
        });

        // Prefer to cancel at a quiet moment, but never wait forever. Output
        // produced before the cancel lands is stale; drop it.
        let mut idle_rx = self.idle_rx.clone();
        drop_chunks_during(chunk_rx, SupervisorState::Interrupt, async {
            if timeout(IDLE_WAIT, idle_rx.wait_for(|idle| *idle))
                .await
                .is_err()
            {
                debug!("worker never went idle, cancelling anyway");
            }
        })
        .await;

        if let Err(err) = self.worker.send_cancel_key() {
            warn!(error = %err, "cancel key failed");
        }
        drop_chunks_during(
            chunk_rx,
            SupervisorState::Interrupt,
            tokio::time::sleep(CANCEL_GRACE),
        )
        .await;

        let stop = format!(
            "STOP. [Overseer interruption] {reason}. \
             Let me explain what needs to change before you continue."
        );
        if let Err(err) = self.worker.inject(&stop) {
            warn!(error = %err, "stop message failed");
        }

        self.recalibration_turn = 0;
        self.response_buffer.clear();
        self.set_state(SupervisorState::Recalibrate);
        self.settle_deadline = Some(Instant::now() + SETTLE_AFTER);
    }

    /// The worker's recalibration response went quiet; ask the reviewer
    /// whether it is back on track. Chunks arriving while the reviewer is
    /// consulted stay queued: in RECALIBRATE they are response text, not
    /// analysis work.
    async fn on_response_settled(&mut self) {
        if self.state != SupervisorState::Recalibrate {
            return;
        }

        let response = std::mem::take(&mut self.response_buffer);
        if response.trim().is_empty() {
            debug!("empty worker response during recalibration");
            self.settle_deadline = Some(Instant::now() + SETTLE_AFTER);
            return;
        }

        self.recalibration_turn += 1;
        let turn = self.recalibration_turn;
        debug!(turn, "worker responded during recalibration");
        self.emit(SupervisorEvent::Recalibrate {
            turn,
            message: preview(&response),
        });

        let Some(result) = self.queue.recalibrate(&response).await else {
            self.resolve().await;
            return;
        };

        if result.resolved || result.no_findings {
            self.resolve().await;
            return;
        }
        if turn >= MAX_RECALIBRATION_TURNS {
            warn!(turn, "recalibration turn limit reached, resuming monitoring");
            self.resolve().await;
            return;
        }

        if let Some(message) = result.inject {
            let approved = self
                .approve(ApprovalKind::RecalibrateInject, &message)
                .await;
            if let Some(text) = approved {
                if let Err(err) = self.worker.inject(&text) {
                    warn!(error = %err, "recalibration inject failed");
                }
                self.emit(SupervisorEvent::Recalibrate {
                    turn,
                    message: preview(&text),
                });
            }
        }
        self.settle_deadline = Some(Instant::now() + SETTLE_AFTER);
    }

    /// End recalibration and hand the session back to the worker.
    async fn resolve(&mut self) {
        if let Err(err) = self.worker.inject("Good. Continue with the original task.") {
            warn!(error = %err, "resolution message failed");
        }
        self.emit(SupervisorEvent::Resolved);
        self.recalibration_turn = 0;
        self.response_buffer.clear();
        self.settle_deadline = None;
        self.set_state(SupervisorState::Monitoring);
    }

    /// Gate an intervention on the autonomy level. Returns the (possibly
    /// edited) text to act with, or `None` when rejected.
    async fn approve(&self, kind: ApprovalKind, text: &str) -> Option<String> {
        match self.autonomy {
            Autonomy::Full => Some(text.to_string()),
            Autonomy::Observe => None,
            Autonomy::Supervised => {
                let (decision_tx, decision_rx) = oneshot::channel();
                self.emit(SupervisorEvent::ApprovalNeeded(ApprovalRequest {
                    kind,
                    text: text.to_string(),
                    decision: decision_tx,
                }));
                match decision_rx.await {
                    Ok(ApprovalDecision::Approve { edited }) => {
                        Some(edited.unwrap_or_else(|| text.to_string()))
                    }
                    Ok(ApprovalDecision::Reject) | Err(_) => None,
                }
            }
        }
    }

    fn set_state(&mut self, to: SupervisorState) {
        let from = self.state;
        self.state = to;
        debug!(%from, %to, "state change");
        self.emit(SupervisorEvent::StateChange { from, to });
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.events.send(event);
    }
}

/// Run `action` to completion while discarding any chunks that arrive.
///
/// Keeps the intervention backlog bounded: a pending approval or idle wait
/// must not queue analysis work behind it.
async fn drop_chunks_during<T>(
    chunk_rx: &mut ChunkRx,
    state: SupervisorState,
    action: impl Future<Output = T>,
) -> T {
    tokio::pin!(action);
    let mut open = true;
    loop {
        tokio::select! {
            out = &mut action => return out,
            chunk = chunk_rx.recv(), if open => {
                match chunk {
                    Some(chunk) => {
                        debug!(%state, chunk = chunk.id, "dropping chunk while intervening");
                    }
                    // A closed stream just leaves the action to finish.
                    None => open = false,
                }
            }
        }
    }
}

/// First [`RECALIBRATE_PREVIEW_CHARS`] characters, cut on a char boundary.
fn preview(text: &str) -> String {
    match text.char_indices().nth(RECALIBRATE_PREVIEW_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
