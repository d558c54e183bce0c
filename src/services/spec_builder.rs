//! Worker specification builder.
//!
//! Assembles validated, immutable worker specs with checkpointed
//! sub-goals, then emits them to the active store after the pre-flight
//! compliance gate passes. A duplicate worker id is fatal.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{
    ActorType, Checkpoint, CortexConfig, LineageEventType, VerificationType, WorkerResources,
    WorkerSpec, WorkerStatus,
};
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

use super::compliance::PreflightGate;
use super::lineage::LineageRecorder;
use super::task_queue::TaskQueueService;
use super::validator::{self, SchemaKind};

/// Worker types known to the registry, with their default token budgets.
const WORKER_TYPE_BUDGETS: &[(&str, u64)] = &[
    ("implementation", 8_000),
    ("test", 5_000),
    ("review", 10_000),
    ("refactor", 6_000),
    ("debug", 5_000),
    ("research", 4_000),
    ("integration", 6_000),
    ("docs", 5_000),
];

fn default_budget(worker_type: &str) -> Option<u64> {
    WORKER_TYPE_BUDGETS
        .iter()
        .find(|(t, _)| *t == worker_type)
        .map(|(_, b)| *b)
}

/// A checkpoint declaration passed to the builder; ids and ordering
/// are assigned at build time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckpointCriterion {
    pub verification_type: VerificationType,
    pub success_condition: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub required: bool,
}

/// Inputs to one spec build.
#[derive(Debug, Clone)]
pub struct SpecRequest {
    pub worker_id: String,
    pub worker_type: String,
    pub created_by: String,
    pub task_id: String,
    pub scope: Value,
    pub context: Value,
    pub token_budget: Option<u64>,
    pub timeout_minutes: Option<u64>,
    pub max_retries: Option<u32>,
    pub deliverables: Vec<String>,
    pub checkpoint_criteria: Vec<CheckpointCriterion>,
    pub operations: Vec<String>,
    pub data_access: Vec<String>,
    pub approval_id: Option<String>,
    pub audit_trail: bool,
}

/// Builds and emits worker specs.
pub struct SpecBuilder<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    config: &'a CortexConfig,
}

impl<'a> SpecBuilder<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, config: &'a CortexConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Construct a validated spec without persisting it.
    pub fn build(&self, request: SpecRequest) -> Result<WorkerSpec> {
        if !validator::worker_id_regex().is_match(&request.worker_id) {
            return Err(CortexError::InvalidInput(format!(
                "worker_id {:?} does not match worker-<type>-<id>",
                request.worker_id
            )));
        }

        if default_budget(&request.worker_type).is_none() {
            tracing::warn!(
                worker_type = %request.worker_type,
                "worker type not in registry; continuing with generic defaults"
            );
        }

        let queue = TaskQueueService::new(self.store, self.clock);
        if !queue.exists(&request.task_id)? {
            return Err(CortexError::NotFound(format!(
                "task {} not in queue",
                request.task_id
            )));
        }

        if !request.scope.is_object() {
            return Err(CortexError::InvalidInput("scope must be a JSON object".into()));
        }
        if !request.context.is_object() {
            return Err(CortexError::InvalidInput(
                "context must be a JSON object".into(),
            ));
        }

        let defaults = WorkerResources::default();
        let token_budget = request
            .token_budget
            .or_else(|| default_budget(&request.worker_type))
            .unwrap_or(defaults.token_budget)
            .min(self.config.limits.max_tokens_per_worker);

        let resources = WorkerResources {
            token_budget,
            timeout_minutes: request
                .timeout_minutes
                .unwrap_or(defaults.timeout_minutes)
                .min(self.config.limits.max_timeout_minutes),
            max_retries: request.max_retries.unwrap_or(defaults.max_retries),
        };

        let checkpoint_criteria = request
            .checkpoint_criteria
            .into_iter()
            .enumerate()
            .map(|(idx, criterion)| Checkpoint {
                checkpoint_id: format!("chk-{}", Uuid::new_v4().simple()),
                step: (idx + 1) as u32,
                verification_type: criterion.verification_type,
                success_condition: criterion.success_condition,
                timeout_seconds: criterion.timeout_seconds.unwrap_or(120),
                required: criterion.required,
                validation: None,
            })
            .collect();

        Ok(WorkerSpec {
            worker_id: request.worker_id,
            worker_type: request.worker_type.clone(),
            created_by: request.created_by,
            task_id: request.task_id,
            status: WorkerStatus::Pending,
            scope: request.scope,
            context: request.context,
            resources,
            deliverables: request.deliverables,
            prompt_ref: format!("coordination/prompts/workers/{}.md", request.worker_type),
            execution: Default::default(),
            results: None,
            checkpoint_criteria,
            operations: request.operations,
            data_access: request.data_access,
            approval_id: request.approval_id,
            audit_trail: request.audit_trail,
            created_at: self.clock.now(),
            heartbeat: None,
            failure_reason: None,
        })
    }

    /// Gate and persist a built spec to the active store. The spec is
    /// written only after schema validation and the compliance gate
    /// both pass; a duplicate worker id in any store is fatal.
    pub fn emit(&self, spec: &WorkerSpec) -> Result<()> {
        for state in SpecState::ALL {
            let existing = self.store.paths().worker_spec(state, &spec.worker_id);
            if existing.exists() {
                return Err(CortexError::PreconditionFailed(format!(
                    "duplicate worker_id {} (present in {} store)",
                    spec.worker_id,
                    state.as_str()
                )));
            }
        }

        PreflightGate::new(self.store, self.clock, self.config).check(spec)?;

        let doc = serde_json::to_value(spec)
            .map_err(|e| CortexError::FatalInvariant(format!("spec serialization: {e}")))?;
        let path = self
            .store
            .paths()
            .worker_spec(SpecState::Active, &spec.worker_id);
        validator::safe_write_json(self.store, &path, &doc, SchemaKind::WorkerSpec)?;

        // Mirror checkpoints for external collaborators that poll them.
        for checkpoint in &spec.checkpoint_criteria {
            let cp_path = self.store.paths().checkpoint(&checkpoint.checkpoint_id);
            self.store.write_json_atomic(&cp_path, checkpoint)?;
        }

        LineageRecorder::new(self.store, self.clock).record(
            &spec.task_id,
            LineageEventType::WorkerSpawned,
            ActorType::Master,
            &spec.created_by,
            serde_json::json!({
                "worker_id": spec.worker_id,
                "worker_type": spec.worker_type,
                "token_budget": spec.resources.token_budget,
            }),
            None,
            None,
        )?;
        Ok(())
    }

    /// Convenience: build then emit.
    pub fn build_and_emit(&self, request: SpecRequest) -> Result<WorkerSpec> {
        let spec = self.build(request)?;
        self.emit(&spec)?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Environment, Task};
    use crate::domain::SystemClock;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> (Store, SystemClock, CortexConfig) {
        (
            Store::new(dir.path(), Environment::Dev),
            SystemClock,
            CortexConfig::default(),
        )
    }

    fn request(worker_id: &str, worker_type: &str, task_id: &str) -> SpecRequest {
        SpecRequest {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
            created_by: "development-master".into(),
            task_id: task_id.into(),
            scope: serde_json::json!({"paths": ["src/"]}),
            context: serde_json::json!({"summary": "test"}),
            token_budget: None,
            timeout_minutes: None,
            max_retries: None,
            deliverables: vec!["patch".into()],
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: Vec::new(),
            approval_id: None,
            audit_trail: false,
        }
    }

    fn seed_task(store: &Store, clock: &SystemClock, task_id: &str) {
        TaskQueueService::new(store, clock)
            .submit(Task::new(task_id, "bug-fix", "builder test task"))
            .unwrap();
    }

    #[test]
    fn test_build_applies_type_default_budget() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        let spec = builder.build(request("worker-review-a1", "review", "t1")).unwrap();
        assert_eq!(spec.resources.token_budget, 10_000);
        assert_eq!(spec.prompt_ref, "coordination/prompts/workers/review.md");
        assert_eq!(spec.status, WorkerStatus::Pending);

        let spec = builder
            .build(request("worker-research-a1", "research", "t1"))
            .unwrap();
        assert_eq!(spec.resources.token_budget, 4_000);
    }

    #[test]
    fn test_explicit_budget_capped_at_global_max() {
        let dir = TempDir::new().unwrap();
        let (store, clock, mut config) = fixture(&dir);
        config.limits.max_tokens_per_worker = 9_000;
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        let mut req = request("worker-review-a1", "review", "t1");
        req.token_budget = Some(50_000);
        let spec = builder.build(req).unwrap();
        assert_eq!(spec.resources.token_budget, 9_000);
    }

    #[test]
    fn test_bad_worker_id_rejected() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        let builder = SpecBuilder::new(&store, &clock, &config);
        let err = builder
            .build(request("Worker-review-a1", "review", "t1"))
            .unwrap_err();
        assert!(matches!(err, CortexError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_task_rejected() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        let builder = SpecBuilder::new(&store, &clock, &config);
        let err = builder
            .build(request("worker-review-a1", "review", "ghost"))
            .unwrap_err();
        assert!(matches!(err, CortexError::NotFound(_)));
    }

    #[test]
    fn test_non_object_scope_rejected() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);
        let mut req = request("worker-review-a1", "review", "t1");
        req.scope = serde_json::json!("src/");
        let err = builder.build(req).unwrap_err();
        assert!(matches!(err, CortexError::InvalidInput(_)));
    }

    #[test]
    fn test_checkpoints_keep_declared_order() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        let mut req = request("worker-test-a1", "test", "t1");
        req.checkpoint_criteria = vec![
            CheckpointCriterion {
                verification_type: VerificationType::FileExists,
                success_condition: "reports/unit.xml".into(),
                timeout_seconds: None,
                required: true,
            },
            CheckpointCriterion {
                verification_type: VerificationType::JsonField,
                success_condition: "summary.failed=0".into(),
                timeout_seconds: Some(60),
                required: true,
            },
        ];
        let spec = builder.build(req).unwrap();
        assert_eq!(spec.checkpoint_criteria.len(), 2);
        assert_eq!(spec.checkpoint_criteria[0].step, 1);
        assert_eq!(
            spec.checkpoint_criteria[0].verification_type,
            VerificationType::FileExists
        );
        assert_eq!(spec.checkpoint_criteria[1].step, 2);
        assert_eq!(spec.checkpoint_criteria[1].timeout_seconds, 60);
    }

    #[test]
    fn test_emit_writes_active_and_mirrors_checkpoints() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        let mut req = request("worker-test-a1", "test", "t1");
        req.checkpoint_criteria = vec![CheckpointCriterion {
            verification_type: VerificationType::FileExists,
            success_condition: "reports/unit.xml".into(),
            timeout_seconds: None,
            required: true,
        }];
        let spec = builder.build_and_emit(req).unwrap();

        let active = store.paths().worker_spec(SpecState::Active, &spec.worker_id);
        assert!(active.exists());
        let cp = store
            .paths()
            .checkpoint(&spec.checkpoint_criteria[0].checkpoint_id);
        assert!(cp.exists());
    }

    #[test]
    fn test_duplicate_worker_id_fatal() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        builder
            .build_and_emit(request("worker-test-a1", "test", "t1"))
            .unwrap();
        let err = builder
            .build_and_emit(request("worker-test-a1", "test", "t1"))
            .unwrap_err();
        assert!(matches!(err, CortexError::PreconditionFailed(_)));
    }

    #[test]
    fn test_gate_denial_leaves_no_spec() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        seed_task(&store, &clock, "t1");
        let builder = SpecBuilder::new(&store, &clock, &config);

        let mut req = request("worker-implementation-a1", "implementation", "t1");
        req.data_access = vec!["credentials".into()];
        let err = builder.build_and_emit(req).unwrap_err();
        assert!(matches!(err, CortexError::PolicyDenied(_)));

        let active = store
            .paths()
            .worker_spec(SpecState::Active, "worker-implementation-a1");
        assert!(!active.exists());
    }
}
