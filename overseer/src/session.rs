//! Session orchestration: wires the PTY bridge, chunker, review queue, and
//! supervisor together and owns startup and shutdown.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::core::chunk::Chunk;
use crate::core::chunker::Chunker;
use crate::core::policy::Autonomy;
use crate::io::config::{Mode, SessionConfig};
use crate::io::console;
use crate::io::display::Display;
use crate::io::pane::AuditorPane;
use crate::io::prompts::PromptEngine;
use crate::io::reviewer::{ClaudeReviewer, ReviewQueue};
use crate::io::terminal::{BridgeEvent, TerminalBridge, maybe_sleep};
use crate::report;
use crate::supervisor::{Supervisor, SupervisorEvent};

/// Quiet time after the last output burst before the buffer is flushed.
pub const DEBOUNCE: Duration = Duration::from_secs(2);
/// Cap on waiting for in-flight reviews at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive the chunker's timers: debounce after each output burst, plus a
/// periodic flush rearmed after every flush. Returns the chunker so its
/// stats survive shutdown.
pub async fn run_chunker(
    mut data_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk_tx: mpsc::UnboundedSender<Chunk>,
    interval: Duration,
) -> Chunker {
    let mut chunker = Chunker::new();
    let mut debounce: Option<Instant> = None;
    let mut periodic = Instant::now() + interval;

    loop {
        tokio::select! {
            data = data_rx.recv() => {
                let Some(bytes) = data else { break };
                let mut cut_any = false;
                for chunk in chunker.feed(&bytes) {
                    let _ = chunk_tx.send(chunk);
                    cut_any = true;
                }
                if cut_any {
                    periodic = Instant::now() + interval;
                }
                debounce = Some(Instant::now() + DEBOUNCE);
            }
            () = maybe_sleep(debounce) => {
                debounce = None;
                if let Some(chunk) = chunker.flush() {
                    let _ = chunk_tx.send(chunk);
                }
                periodic = Instant::now() + interval;
            }
            () = sleep_until(periodic) => {
                if let Some(chunk) = chunker.flush() {
                    let _ = chunk_tx.send(chunk);
                }
                debounce = None;
                periodic = Instant::now() + interval;
            }
        }
    }

    if let Some(chunk) = chunker.flush() {
        let _ = chunk_tx.send(chunk);
    }
    chunker
}

/// Route supervisor events to the console and the activity record.
///
/// Owns the [`Display`] for the session and hands it back at shutdown for
/// report generation.
async fn route_events(
    mut events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    mut display: Display,
    active: bool,
) -> Display {
    while let Some(event) = events_rx.recv().await {
        match event {
            SupervisorEvent::Finding(finding) => {
                if active {
                    console::print_finding(&finding);
                }
                display.log_finding(finding);
            }
            SupervisorEvent::StateChange { from, to } => {
                if active && from != to {
                    console::print_state(&to.to_string());
                    display.log_line(&format!("[{to}]"));
                }
            }
            SupervisorEvent::Inject {
                message,
                auto_approved,
            } => {
                if active {
                    console::print_inject(&message, auto_approved);
                }
                display.log_action("INJECT", &message, auto_approved);
            }
            SupervisorEvent::Interrupt { reason } => {
                if active {
                    console::print_interrupt(&reason);
                }
                display.log_action("INTERRUPT", &reason, false);
            }
            SupervisorEvent::SuppressedInterrupt { reason } => {
                if active {
                    console::print_suppressed_interrupt(&reason);
                }
                display.log_action("INTERRUPT-SUPPRESSED", &reason, false);
            }
            SupervisorEvent::Recalibrate { turn, message } => {
                if active {
                    console::print_recalibrate(turn, &message);
                }
                display.log_action("RECALIBRATE", &format!("Turn {turn}: {message}"), false);
            }
            SupervisorEvent::Resolved => {
                if active {
                    console::print_resolved();
                }
                display.log_action("RESOLVED", "Worker back on track", false);
            }
            SupervisorEvent::ApprovalNeeded(request) => {
                if active {
                    console::prompt_approval(request).await;
                } else {
                    // Dropping the sender rejects the intervention.
                    debug!("approval request dropped outside active mode");
                }
            }
        }
    }
    display
}

/// Run the full session. Returns the worker's exit code.
pub async fn run_session(config: SessionConfig) -> Result<i32> {
    config.validate()?;
    let started = std::time::Instant::now();
    let active = config.mode == Mode::Active;
    let log_path = config.log_path();

    let engine = PromptEngine::new();
    let system_prompt = engine.build_system_prompt(&config.focus_areas);

    let display = Display::new(log_path.clone(), active);
    let pane = if active {
        AuditorPane::open(&log_path)
    } else {
        None
    };

    let reviewer = ClaudeReviewer::new(config.reviewer_model.clone(), system_prompt);
    info!(session = %reviewer.session_id(), model = %config.reviewer_model, "review session");
    let queue = ReviewQueue::spawn(reviewer, config.max_budget_usd);

    let (bridge, mut bridge_rx) =
        TerminalBridge::start(&config.worker_command, &config.worker_args)?;

    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let chunker_task = tokio::spawn(run_chunker(
        data_rx,
        chunk_tx,
        Duration::from_secs(config.chunk_interval_secs),
    ));

    // Passive mode reviews but never touches the worker.
    let autonomy = if active { config.autonomy } else { Autonomy::Observe };
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(
        autonomy,
        Box::new(bridge.controller()),
        bridge.idle_watch(),
        queue.clone(),
        events_tx,
    );
    let supervisor_task = tokio::spawn(supervisor.run(chunk_rx));
    let router_task = tokio::spawn(route_events(events_rx, display, active));

    let exit_code = relay_until_exit(bridge, &mut bridge_rx, &data_tx).await?;

    // Shutdown: close the data stream, let the chunker emit its final
    // chunk, then give in-flight reviews a bounded window to finish. A
    // supervisor stuck on an unanswered approval or a slow reviewer call
    // is abandoned rather than allowed to hang teardown.
    drop(data_tx);
    let chunker = chunker_task.await.context("join chunker task")?;
    join_or_abort(supervisor_task, DRAIN_TIMEOUT).await;
    if timeout(DRAIN_TIMEOUT, queue.drain()).await.is_err() {
        warn!("review queue did not drain in time");
    }
    let stats = queue.stats().await.unwrap_or(crate::io::reviewer::QueueStats {
        total_cost: 0.0,
        budget_exceeded: false,
    });
    let display = router_task.await.context("join event router")?;

    if config.generate_report {
        let inputs = report::ReportInputs {
            findings: display.findings(),
            actions: display.actions(),
            stats: chunker.stats(),
            reviewer_cost: stats.total_cost,
            reviewer_model: &config.reviewer_model,
            focus_areas: &config.focus_areas,
            duration: started.elapsed(),
            exit_code,
        };
        let rendered = report::generate(&inputs);
        match std::fs::write(&config.output_path, rendered) {
            Ok(()) => eprintln!("\n[overseer] Report written to {}", config.output_path.display()),
            Err(err) => eprintln!("\n[overseer] Failed to write report: {err}"),
        }
    }

    if let Some(pane) = pane {
        pane.close();
    }
    Ok(exit_code)
}

/// Wait for a task to finish, aborting it once the limit passes.
async fn join_or_abort(mut task: tokio::task::JoinHandle<()>, limit: Duration) {
    if timeout(limit, &mut task).await.is_err() {
        warn!("supervisor did not stop in time, aborting");
        task.abort();
        let _ = task.await;
    }
}

/// Pump bridge events into the chunker until the worker exits.
///
/// The first interrupt signal terminates the worker; a second one gives up
/// on graceful shutdown.
async fn relay_until_exit(
    mut bridge: TerminalBridge,
    bridge_rx: &mut mpsc::UnboundedReceiver<BridgeEvent>,
    data_tx: &mpsc::UnboundedSender<Vec<u8>>,
) -> Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut kill_requested = false;

    loop {
        tokio::select! {
            event = bridge_rx.recv() => {
                match event {
                    Some(BridgeEvent::Output(bytes)) => {
                        let _ = data_tx.send(bytes);
                    }
                    Some(BridgeEvent::Idle) => {}
                    Some(BridgeEvent::Exit { code }) => return Ok(code),
                    None => return Ok(1),
                }
            }
            _ = sigint.recv() => {
                if kill_requested {
                    std::process::exit(130);
                }
                kill_requested = true;
                info!("interrupt received, terminating worker");
                bridge.kill();
            }
            _ = sigterm.recv() => {
                if kill_requested {
                    std::process::exit(143);
                }
                kill_requested = true;
                bridge.kill();
            }
        }
    }
}
