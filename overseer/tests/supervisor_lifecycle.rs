//! Supervisor lifecycle tests: severity gating, the interrupt and
//! recalibration flow, approval handling, and the turn limit.

use overseer::core::policy::{Autonomy, SupervisorState};
use overseer::io::reviewer::ReviewQueue;
use overseer::supervisor::{ApprovalDecision, Supervisor, SupervisorEvent};
use overseer::test_support::{RecordingWorker, ScriptedReviewer, chunk};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct Harness {
    worker: RecordingWorker,
    chunk_tx: mpsc::UnboundedSender<overseer::core::chunk::Chunk>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    idle_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

fn start<I, S>(autonomy: Autonomy, replies: I) -> Harness
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let worker = RecordingWorker::new();
    let queue = ReviewQueue::spawn(ScriptedReviewer::new(replies), 10.0);
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    // Worker idles immediately so interrupts never wait out the idle window.
    let (idle_tx, idle_rx) = watch::channel(true);

    let supervisor = Supervisor::new(
        autonomy,
        Box::new(worker.clone()),
        idle_rx,
        queue,
        events_tx,
    );
    let task = tokio::spawn(supervisor.run(chunk_rx));

    Harness {
        worker,
        chunk_tx,
        events_rx,
        idle_tx,
        task,
    }
}

fn state_sequence(events: &[SupervisorEvent]) -> Vec<SupervisorState> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::StateChange { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

async fn drain_events(mut harness: Harness) -> (RecordingWorker, Vec<SupervisorEvent>) {
    drop(harness.chunk_tx);
    drop(harness.idle_tx);
    harness.task.await.expect("supervisor task");
    let mut events = Vec::new();
    while let Some(event) = harness.events_rx.recv().await {
        events.push(event);
    }
    (harness.worker, events)
}

#[tokio::test(start_paused = true)]
async fn interrupt_without_critical_finding_is_suppressed() {
    let harness = start(
        Autonomy::Full,
        ["[FINDING:WARNING] suspicious refactor\n[INTERRUPT] stop everything"],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["some worker output"]))
        .expect("send");

    let (worker, events) = drain_events(harness).await;

    assert!(worker.writes().is_empty(), "gated interrupt must not act");
    assert!(events
        .iter()
        .any(|e| matches!(e, SupervisorEvent::SuppressedInterrupt { reason } if reason.as_str() == "stop everything")));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SupervisorEvent::Interrupt { .. })));
}

#[tokio::test(start_paused = true)]
async fn warning_finding_gates_inject_through() {
    let harness = start(
        Autonomy::Full,
        ["[FINDING:WARNING] missing validation\n[INJECT] validate the request body first"],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["app.post('/users', handler)"]))
        .expect("send");

    let (worker, events) = drain_events(harness).await;

    assert_eq!(
        worker.injected_messages(),
        vec!["validate the request body first".to_string()]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SupervisorEvent::Inject { auto_approved: true, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn interrupt_runs_cancel_stop_and_recalibration_to_resolution() {
    let harness = start(
        Autonomy::Full,
        [
            "[FINDING:CRITICAL] dropping the production table\n[INTERRUPT] destructive migration",
            "[RESOLVED]",
        ],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["DROP TABLE users;"]))
        .expect("send");

    // Wait for the interrupt before feeding the worker's response.
    let mut events = Vec::new();
    let mut harness = harness;
    loop {
        let event = harness.events_rx.recv().await.expect("event");
        let interrupted = matches!(&event, SupervisorEvent::Interrupt { .. });
        events.push(event);
        if interrupted {
            break;
        }
    }
    harness
        .chunk_tx
        .send(chunk(2, &["You're right, I'll revert the migration."]))
        .expect("send response");

    loop {
        let event = harness.events_rx.recv().await.expect("event");
        let resolved = matches!(&event, SupervisorEvent::Resolved);
        events.push(event);
        if resolved {
            break;
        }
    }

    drop(harness.chunk_tx);
    harness.task.await.expect("supervisor task");
    while let Some(event) = harness.events_rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        state_sequence(&events),
        vec![
            SupervisorState::Alert,
            SupervisorState::Interrupt,
            SupervisorState::Recalibrate,
            SupervisorState::Monitoring,
        ]
    );

    use overseer::test_support::WorkerWrite;
    let writes = harness.worker.writes();
    assert_eq!(writes[0], WorkerWrite::CancelKey);
    let WorkerWrite::Inject(stop) = &writes[1] else {
        panic!("expected stop message after cancel, got {writes:?}");
    };
    assert!(stop.starts_with("STOP."));
    assert!(stop.contains("destructive migration"));
    assert_eq!(
        writes[2],
        WorkerWrite::Inject("Good. Continue with the original task.".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn recalibration_turn_limit_forces_resolution() {
    let mut replies = vec![
        "[FINDING:CRITICAL] wrong storage engine\n[INTERRUPT] rebuild on the agreed stack".to_string(),
    ];
    for _ in 0..5 {
        replies.push("[INJECT] still wrong, keep correcting".to_string());
    }
    let mut harness = start(Autonomy::Full, replies);
    harness
        .chunk_tx
        .send(chunk(1, &["initial worker output"]))
        .expect("send");

    // Every captured response announces its turn; follow-up injects repeat
    // the turn number, so only a new number sends the next response.
    let mut recalibrations: Vec<u32> = Vec::new();
    let mut next_response_id = 2;
    loop {
        match harness.events_rx.recv().await.expect("event") {
            SupervisorEvent::Interrupt { .. } => {
                harness
                    .chunk_tx
                    .send(chunk(next_response_id, &["worker response text"]))
                    .expect("send response");
                next_response_id += 1;
            }
            SupervisorEvent::Recalibrate { turn, .. } => {
                if recalibrations.last() != Some(&turn) {
                    recalibrations.push(turn);
                    harness
                        .chunk_tx
                        .send(chunk(next_response_id, &["worker response text"]))
                        .expect("send response");
                    next_response_id += 1;
                }
            }
            SupervisorEvent::Resolved => break,
            _ => {}
        }
    }

    // Turns 1 through 4 re-inject; turn 5 hits the limit and resolves.
    assert_eq!(recalibrations, vec![1, 2, 3, 4, 5]);
    assert_eq!(
        harness.worker.injected_messages().last().map(String::as_str),
        Some("Good. Continue with the original task.")
    );
}

#[tokio::test(start_paused = true)]
async fn observe_autonomy_records_without_touching_the_worker() {
    let harness = start(
        Autonomy::Observe,
        ["[FINDING:CRITICAL] exposed secret\n[INTERRUPT] stop and rotate the key"],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["AWS_SECRET_ACCESS_KEY=..."]))
        .expect("send");

    let (worker, events) = drain_events(harness).await;

    assert!(worker.writes().is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, SupervisorEvent::Finding(f) if f.description == "exposed secret")));
    // The alert is still visible as a state excursion before standing down.
    assert_eq!(
        state_sequence(&events),
        vec![SupervisorState::Alert, SupervisorState::Monitoring]
    );
}

#[tokio::test(start_paused = true)]
async fn chunks_arriving_during_a_pending_approval_are_dropped() {
    let reviewer = ScriptedReviewer::new([
        "[FINDING:WARNING] leaking connection pool\n[INJECT] close the pool on shutdown",
    ]);
    let calls = reviewer.call_counter();
    let worker = RecordingWorker::new();
    let queue = ReviewQueue::spawn(reviewer, 10.0);
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (_idle_tx, idle_rx) = watch::channel(true);

    let supervisor = Supervisor::new(
        Autonomy::Supervised,
        Box::new(worker.clone()),
        idle_rx,
        queue,
        events_tx,
    );
    let task = tokio::spawn(supervisor.run(chunk_rx));

    chunk_tx.send(chunk(1, &["pool = connect()"])).expect("send");

    let request = loop {
        match events_rx.recv().await.expect("event") {
            SupervisorEvent::ApprovalNeeded(request) => break request,
            _ => {}
        }
    };

    // Output keeps streaming while the human decides.
    chunk_tx.send(chunk(2, &["more worker output"])).expect("send");
    chunk_tx.send(chunk(3, &["even more worker output"])).expect("send");
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    request
        .decision
        .send(ApprovalDecision::Approve { edited: None })
        .expect("send decision");

    drop(chunk_tx);
    task.await.expect("supervisor task");

    assert_eq!(
        calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "chunks sent during the approval must not reach the reviewer"
    );
    assert_eq!(
        worker.injected_messages(),
        vec!["close the pool on shutdown".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn supervised_inject_uses_the_edited_text() {
    let mut harness = start(
        Autonomy::Supervised,
        ["[FINDING:WARNING] sloppy error handling\n[INJECT] add error handling"],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["fs.readFileSync(path)"]))
        .expect("send");

    loop {
        match harness.events_rx.recv().await.expect("event") {
            SupervisorEvent::ApprovalNeeded(request) => {
                request
                    .decision
                    .send(ApprovalDecision::Approve {
                        edited: Some("wrap the read in a try/catch".to_string()),
                    })
                    .expect("send decision");
            }
            SupervisorEvent::Inject { message, auto_approved } => {
                assert_eq!(message, "wrap the read in a try/catch");
                assert!(!auto_approved);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(
        harness.worker.injected_messages(),
        vec!["wrap the read in a try/catch".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn supervised_rejection_leaves_the_worker_alone() {
    let mut harness = start(
        Autonomy::Supervised,
        ["[FINDING:WARNING] questionable rename\n[INJECT] undo the rename"],
    );
    harness
        .chunk_tx
        .send(chunk(1, &["git mv a.rs b.rs"]))
        .expect("send");

    loop {
        match harness.events_rx.recv().await.expect("event") {
            SupervisorEvent::ApprovalNeeded(request) => {
                // Dropping the sender counts as a rejection.
                drop(request);
                break;
            }
            _ => {}
        }
    }

    drop(harness.chunk_tx);
    harness.task.await.expect("supervisor task");
    assert!(harness.worker.writes().is_empty());
}
