//! End-to-end: heartbeat phases, zombie detection, and pattern mining.

mod common;

use chrono::Duration;
use common::Fixture;
use cortex::domain::models::{
    Environment, FailureCategory, FailureEvent, FailureEventType, HeartbeatPhase,
    HeartbeatThresholds, ResourceSample, Task,
};
use cortex::domain::FakeClock;
use cortex::infrastructure::SpecState;
use cortex::services::spec_builder::{SpecBuilder, SpecRequest};
use cortex::services::{HeartbeatMonitor, PatternDetector, TaskQueueService};

fn spawn_worker(fx: &Fixture, worker_id: &str, task_id: &str) {
    let clock = cortex::domain::SystemClock;
    let queue = TaskQueueService::new(&fx.store, &clock);
    if !queue.exists(task_id).unwrap() {
        queue
            .submit(Task::new(task_id, "bug-fix", "zombie scenario task"))
            .unwrap();
    }
    SpecBuilder::new(&fx.store, &clock, &fx.config)
        .build_and_emit(SpecRequest {
            worker_id: worker_id.into(),
            worker_type: "test".into(),
            created_by: "quality-master".into(),
            task_id: task_id.into(),
            scope: serde_json::json!({}),
            context: serde_json::json!({}),
            token_budget: None,
            timeout_minutes: None,
            max_retries: None,
            deliverables: Vec::new(),
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: Vec::new(),
            approval_id: None,
            audit_trail: false,
        })
        .unwrap();
}

#[test]
fn worker_goes_silent_and_becomes_a_zombie() {
    let fx = Fixture::new();
    let clock = FakeClock::default();
    let monitor = HeartbeatMonitor::new(&fx.store, &clock, HeartbeatThresholds::default());

    spawn_worker(&fx, "worker-test-z1", "tz1");
    monitor.init("worker-test-z1").unwrap();

    // Two heartbeats, then silence
    clock.advance(Duration::seconds(30));
    let hb1 = monitor
        .emit("worker-test-z1", "working", &ResourceSample::default())
        .unwrap();
    clock.advance(Duration::seconds(30));
    let hb2 = monitor
        .emit("worker-test-z1", "working", &ResourceSample::default())
        .unwrap();
    assert_eq!(hb2.sequence, hb1.sequence + 1);

    // t = last + 60: warning, no event
    clock.advance(Duration::seconds(60));
    let check = monitor.check("worker-test-z1").unwrap();
    assert_eq!(check.phase, HeartbeatPhase::Warning);
    assert!(!check.event_emitted);

    // t = last + 120: critical, exactly one heartbeat_critical
    clock.advance(Duration::seconds(60));
    let check = monitor.check("worker-test-z1").unwrap();
    assert_eq!(check.phase, HeartbeatPhase::Critical);
    assert!(check.event_emitted);

    // t = last + 300: zombie, spec moved to failed with a reason
    clock.advance(Duration::seconds(180));
    let check = monitor.check("worker-test-z1").unwrap();
    assert_eq!(check.phase, HeartbeatPhase::Zombie);
    assert!(check.event_emitted);

    let events: Vec<FailureEvent> = fx
        .store
        .read_jsonl(&fx.store.paths().failure_events(Environment::Dev))
        .unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == FailureEventType::HeartbeatCritical)
            .count(),
        1
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == FailureEventType::ZombieDetected)
            .count(),
        1
    );
    assert!(fx
        .store
        .paths()
        .worker_spec(SpecState::Failed, "worker-test-z1")
        .exists());
}

#[test]
fn three_zombies_of_one_type_become_a_pattern() {
    let fx = Fixture::new();
    let clock = FakeClock::default();
    let monitor = HeartbeatMonitor::new(&fx.store, &clock, HeartbeatThresholds::default());

    for (i, worker_id) in ["worker-test-p1", "worker-test-p2", "worker-test-p3"]
        .iter()
        .enumerate()
    {
        spawn_worker(&fx, worker_id, &format!("tp{i}"));
        monitor.init(worker_id).unwrap();
    }

    // All three fall silent past the zombie threshold
    clock.advance(Duration::seconds(301));
    let checks = monitor.check_all().unwrap();
    assert_eq!(checks.len(), 3);
    assert!(checks.iter().all(|c| c.phase == HeartbeatPhase::Zombie));

    let detector = PatternDetector::new(&fx.store, &clock);
    let report = detector.analyze(24).unwrap();
    assert_eq!(report.patterns_created, 1);

    let pattern = &report.patterns[0];
    assert_eq!(pattern.category, FailureCategory::Resource);
    assert_eq!(pattern.pattern_type, "unresponsive");
    assert_eq!(pattern.category_type(), "resource:unresponsive");
    assert_eq!(pattern.signature.worker_type, "test");
    assert!((pattern.confidence - 0.33).abs() < 1e-9);
}
