//! Review queue tests: FIFO serialization, failure handling, drain, and the
//! budget latch.

use std::sync::atomic::Ordering;

use overseer::core::directive::Severity;
use overseer::io::reviewer::ReviewQueue;
use overseer::test_support::{FailingReviewer, ScriptedReviewer, chunk};

#[tokio::test]
async fn replies_arrive_in_submission_order() {
    let reviewer = ScriptedReviewer::new([
        "[FINDING:CRITICAL] first chunk problem",
        "[FINDING:WARNING] second chunk problem",
        "[NO_FINDINGS]",
    ]);
    let queue = ReviewQueue::spawn(reviewer, 1.0);

    let first = queue
        .analyze(chunk(1, &["line one of the first chunk"]))
        .await
        .expect("first result");
    let second = queue
        .analyze(chunk(2, &["line one of the second chunk"]))
        .await
        .expect("second result");
    let third = queue
        .analyze(chunk(3, &["line one of the third chunk"]))
        .await
        .expect("third result");

    assert_eq!(first.findings[0].severity, Severity::Critical);
    assert_eq!(second.findings[0].severity, Severity::Warning);
    assert!(third.no_findings);
}

#[tokio::test]
async fn backend_failure_resolves_to_none() {
    let queue = ReviewQueue::spawn(FailingReviewer, 1.0);
    assert!(queue.analyze(chunk(1, &["some output"])).await.is_none());

    // The queue stays alive after a failed call.
    assert!(queue.analyze(chunk(2, &["more output"])).await.is_none());
    let stats = queue.stats().await.expect("stats");
    assert!(!stats.budget_exceeded);
}

#[tokio::test]
async fn drain_completes_after_queued_work() {
    let reviewer = ScriptedReviewer::new(["[NO_FINDINGS]", "[NO_FINDINGS]"]);
    let calls = reviewer.call_counter();
    let queue = ReviewQueue::spawn(reviewer, 1.0);

    let q1 = queue.clone();
    let first = tokio::spawn(async move { q1.analyze(chunk(1, &["a line"])).await });
    let q2 = queue.clone();
    let second = tokio::spawn(async move { q2.analyze(chunk(2, &["a line"])).await });

    first.await.expect("join").expect("result");
    second.await.expect("join").expect("result");
    queue.drain().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn budget_latch_stops_reviewer_calls() {
    let reviewer = ScriptedReviewer::with_costs([
        ("[FINDING:INFO] fine", 0.4),
        ("[FINDING:INFO] crosses the ceiling", 0.7),
        ("[FINDING:CRITICAL] never reached", 0.1),
    ]);
    let calls = reviewer.call_counter();
    let queue = ReviewQueue::spawn(reviewer, 1.0);

    assert!(queue.analyze(chunk(1, &["a line"])).await.is_some());
    // This call's cost crosses the ceiling; its result still comes back.
    assert!(queue.analyze(chunk(2, &["a line"])).await.is_some());
    // From here on the queue answers without calling the backend.
    assert!(queue.analyze(chunk(3, &["a line"])).await.is_none());
    assert!(queue.analyze(chunk(4, &["a line"])).await.is_none());

    let stats = queue.stats().await.expect("stats");
    assert!(stats.budget_exceeded);
    assert!((stats.total_cost - 1.1).abs() < 1e-9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn recalibration_uses_the_raw_prompt_path() {
    let reviewer = ScriptedReviewer::new(["[RESOLVED]"]);
    let queue = ReviewQueue::spawn(reviewer, 1.0);

    let result = queue
        .recalibrate("I reverted the schema change and will follow the plan.")
        .await
        .expect("result");
    assert!(result.resolved);
}
