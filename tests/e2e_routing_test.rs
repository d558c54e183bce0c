//! End-to-end: task intake through routing, allocation, spec emission,
//! and lineage, plus the pre-flight denial path.

mod common;

use common::Fixture;
use cortex::domain::models::{
    LineageEventType, RoutingContext, Task, TaskComplexity, TaskPriority,
};
use cortex::domain::SystemClock;
use cortex::infrastructure::SpecState;
use cortex::services::spec_builder::{SpecBuilder, SpecRequest};
use cortex::services::{Allocator, LineageRecorder, Router, TaskQueueService};

fn security_task() -> Task {
    Task::new("t1", "security-scan", "Scan repo X for OWASP Top 10")
        .with_priority(TaskPriority::High)
}

#[test]
fn happy_path_routing_to_spec_emission() {
    let fx = Fixture::new();
    let clock = SystemClock;

    // Intake
    let queue = TaskQueueService::new(&fx.store, &clock);
    queue.submit(security_task()).unwrap();

    // Allocation: security-scan at high priority lands at medium or
    // above with a budget of at least base * type * priority
    let allocator = Allocator::new(&fx.store, &clock);
    let allocation = allocator.allocate(&security_task()).unwrap();
    assert!(matches!(
        allocation.complexity,
        TaskComplexity::Medium | TaskComplexity::Complex
    ));
    assert!(allocation.token_budget >= 14_400);

    // Routing: the quality-weighted security profile picks the
    // security master over the generalist
    let router = Router::new(&fx.store, &clock);
    let decision = router
        .select(
            &security_task(),
            &[
                "security-master".to_string(),
                "development-master".to_string(),
            ],
            &RoutingContext {
                priority: Some(TaskPriority::High),
                complexity: Some(allocation.complexity),
                deadline: None,
                budget: None,
            },
        )
        .unwrap();
    assert_eq!(decision.selected_master, "security-master");
    assert_eq!(router.decisions().unwrap().len(), 1);

    queue.assign("t1", &decision.selected_master).unwrap();

    // Spec built with a security worker id and emitted to active
    let builder = SpecBuilder::new(&fx.store, &clock, &fx.config);
    let spec = builder
        .build_and_emit(SpecRequest {
            worker_id: "worker-security-a1b2".into(),
            worker_type: "security".into(),
            created_by: decision.selected_master.clone(),
            task_id: "t1".into(),
            scope: serde_json::json!({"repo": "X"}),
            context: serde_json::json!({"framework": "owasp-top-10"}),
            token_budget: Some(allocation.token_budget.min(fx.config.limits.max_tokens_per_worker)),
            timeout_minutes: None,
            max_retries: None,
            deliverables: vec!["scan-report.json".into()],
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: Vec::new(),
            approval_id: None,
            audit_trail: true,
        })
        .unwrap();
    assert!(spec.worker_id.starts_with("worker-security-"));
    assert!(fx
        .store
        .paths()
        .worker_spec(SpecState::Active, &spec.worker_id)
        .exists());

    // Lineage: task_created precedes task_assigned precedes
    // worker_spawned, and the assignment names the selected master
    let recorder = LineageRecorder::new(&fx.store, &clock);
    let events = recorder.by_task("t1").unwrap();
    let kinds: Vec<LineageEventType> = events.iter().map(|e| e.event_type).collect();
    let created_pos = kinds
        .iter()
        .position(|k| *k == LineageEventType::TaskCreated)
        .unwrap();
    let assigned_pos = kinds
        .iter()
        .position(|k| *k == LineageEventType::TaskAssigned)
        .unwrap();
    let spawned_pos = kinds
        .iter()
        .position(|k| *k == LineageEventType::WorkerSpawned)
        .unwrap();
    assert!(created_pos < assigned_pos);
    assert!(assigned_pos < spawned_pos);
    assert_eq!(events[assigned_pos].actor.id, "security-master");
}

#[test]
fn preflight_denies_unauthorized_sensitive_data() {
    let fx = Fixture::new();
    let clock = SystemClock;
    TaskQueueService::new(&fx.store, &clock)
        .submit(Task::new("t2", "implementation", "wire the billing client"))
        .unwrap();

    let builder = SpecBuilder::new(&fx.store, &clock, &fx.config);
    let err = builder
        .build_and_emit(SpecRequest {
            worker_id: "worker-development-x9".into(),
            worker_type: "development".into(),
            created_by: "development-master".into(),
            task_id: "t2".into(),
            scope: serde_json::json!({}),
            context: serde_json::json!({}),
            token_budget: None,
            timeout_minutes: None,
            max_retries: None,
            deliverables: Vec::new(),
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: vec!["credentials".into()],
            approval_id: None,
            audit_trail: false,
        })
        .unwrap_err();
    assert!(matches!(err, cortex::CortexError::PolicyDenied(_)));

    // No spec written; compliance.failed emitted
    assert!(!fx
        .store
        .paths()
        .worker_spec(SpecState::Active, "worker-development-x9")
        .exists());
    let events: Vec<serde_json::Value> = fx
        .store
        .read_jsonl(
            &fx.store
                .paths()
                .compliance_events(cortex::domain::models::Environment::Dev),
        )
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "compliance.failed");
}
