//! Pre-flight compliance gate for worker spawn.
//!
//! Runs the full check sequence before a spec may be written to the
//! active store and a worker spawned externally. Any violation is fatal
//! to the spawn: a `compliance.failed` event is emitted and the spec is
//! never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{CortexConfig, WorkerSpec};
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

use super::task_queue::TaskQueueService;
use super::validator;

/// A single failed pre-flight check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub check: String,
    pub detail: String,
}

/// Event appended to the compliance stream on denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub event_type: String,
    pub worker_id: String,
    pub task_id: String,
    pub violations: Vec<Violation>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_reason: Option<String>,
}

/// Approval record referenced by specs whose operations require one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approval_id: String,
    pub approved: bool,
    pub approved_by: String,
    pub approved_at: chrono::DateTime<chrono::Utc>,
}

/// The pre-flight gate.
pub struct PreflightGate<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    config: &'a CortexConfig,
}

impl<'a> PreflightGate<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, config: &'a CortexConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Whether governance is on: GOVERNANCE_ENABLED overrides config.
    fn governance_enabled(&self) -> bool {
        match std::env::var("GOVERNANCE_ENABLED") {
            Ok(raw) => raw == "true" || raw == "1",
            Err(_) => self.config.governance.enabled,
        }
    }

    /// Run every check. On violation, emits `compliance.failed` and
    /// returns `PolicyDenied`/`ValidationFailure` without side effects
    /// on the spec stores.
    pub fn check(&self, spec: &WorkerSpec) -> Result<()> {
        if !self.governance_enabled() {
            return Ok(());
        }

        if let Some(reason) = self.bypass_reason()? {
            self.audit_bypass(spec, &reason)?;
            return Ok(());
        }

        let mut violations = Vec::new();

        // 1. Spec schema
        let doc = serde_json::to_value(spec)
            .map_err(|e| CortexError::FatalInvariant(format!("spec serialization: {e}")))?;
        if let Err(err) = validator::validate_worker_spec(&doc) {
            violations.push(Violation {
                check: "spec_schema".into(),
                detail: err.to_string(),
            });
        }

        // 2. Referenced task exists
        let queue = TaskQueueService::new(self.store, self.clock);
        if !queue.exists(&spec.task_id)? {
            violations.push(Violation {
                check: "task_exists".into(),
                detail: format!("task {} not in queue", spec.task_id),
            });
        }

        // 3. Global resource maxima
        if spec.resources.token_budget > self.config.limits.max_tokens_per_worker {
            violations.push(Violation {
                check: "token_budget_max".into(),
                detail: format!(
                    "token_budget {} exceeds max {}",
                    spec.resources.token_budget, self.config.limits.max_tokens_per_worker
                ),
            });
        }
        if spec.resources.timeout_minutes > self.config.limits.max_timeout_minutes {
            violations.push(Violation {
                check: "time_limit_max".into(),
                detail: format!(
                    "timeout_minutes {} exceeds max {}",
                    spec.resources.timeout_minutes, self.config.limits.max_timeout_minutes
                ),
            });
        }

        // 4. Restricted operations
        for op in &spec.operations {
            if self.config.governance.restricted_operations.contains(op) {
                violations.push(Violation {
                    check: "restricted_operation".into(),
                    detail: format!("operation {op:?} is restricted"),
                });
            }
        }

        // 5. Sensitive-data authorization
        for category in &spec.data_access {
            if let Some(allowed) = self.config.governance.sensitive_data_access.get(category) {
                if !allowed.iter().any(|t| t == &spec.worker_type) {
                    violations.push(Violation {
                        check: "sensitive_data".into(),
                        detail: format!(
                            "worker_type {:?} not authorized for {category:?} data",
                            spec.worker_type
                        ),
                    });
                }
            }
        }

        // 6. Audit-required task types
        if let Ok(task) = queue.get(&spec.task_id) {
            if self
                .config
                .governance
                .audit_required_task_types
                .contains(&task.task_type)
                && !spec.audit_trail
            {
                violations.push(Violation {
                    check: "audit_trail".into(),
                    detail: format!(
                        "task type {:?} requires the audit trail enabled",
                        task.task_type
                    ),
                });
            }
        }

        // 7. Approval-required operations
        let needs_approval = spec.operations.iter().any(|op| {
            self.config
                .governance
                .approval_required_operations
                .contains(op)
        });
        if needs_approval && !self.approval_is_valid(spec)? {
            violations.push(Violation {
                check: "approval".into(),
                detail: "operation requires an approved approval record".into(),
            });
        }

        // 8. Concurrent-worker limit per type
        let active = self.active_count(&spec.worker_type)?;
        if active >= self.config.limits.max_concurrent_per_type {
            violations.push(Violation {
                check: "concurrency_cap".into(),
                detail: format!(
                    "{} active {:?} workers at cap {}",
                    active, spec.worker_type, self.config.limits.max_concurrent_per_type
                ),
            });
        }

        if violations.is_empty() {
            return Ok(());
        }

        let detail = violations
            .iter()
            .map(|v| format!("{}: {}", v.check, v.detail))
            .collect::<Vec<_>>()
            .join("; ");
        self.emit_failed(spec, violations, None)?;
        Err(CortexError::PolicyDenied(detail))
    }

    /// GOVERNANCE_BYPASS requires BYPASS_REASON; a bypass with no
    /// reason is itself a policy violation.
    fn bypass_reason(&self) -> Result<Option<String>> {
        let bypass = std::env::var("GOVERNANCE_BYPASS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if !bypass {
            return Ok(None);
        }
        match std::env::var("BYPASS_REASON") {
            Ok(reason) if !reason.trim().is_empty() => Ok(Some(reason)),
            _ => Err(CortexError::PolicyDenied(
                "GOVERNANCE_BYPASS set without BYPASS_REASON".into(),
            )),
        }
    }

    fn audit_bypass(&self, spec: &WorkerSpec, reason: &str) -> Result<()> {
        let event = ComplianceEvent {
            event_type: "compliance.bypassed".into(),
            worker_id: spec.worker_id.clone(),
            task_id: spec.task_id.clone(),
            violations: Vec::new(),
            timestamp: self.clock.now(),
            bypass_reason: Some(reason.to_string()),
        };
        self.store
            .append_jsonl(&self.store.paths().audit_log(), &event)
    }

    fn emit_failed(
        &self,
        spec: &WorkerSpec,
        violations: Vec<Violation>,
        bypass_reason: Option<String>,
    ) -> Result<()> {
        let event = ComplianceEvent {
            event_type: "compliance.failed".into(),
            worker_id: spec.worker_id.clone(),
            task_id: spec.task_id.clone(),
            violations,
            timestamp: self.clock.now(),
            bypass_reason,
        };
        let path = self.store.paths().compliance_events(self.store.env());
        self.store.append_jsonl(&path, &event)?;
        self.store
            .append_jsonl(&self.store.paths().audit_log(), &event)
    }

    fn approval_is_valid(&self, spec: &WorkerSpec) -> Result<bool> {
        let Some(approval_id) = &spec.approval_id else {
            return Ok(false);
        };
        let path = self.store.paths().remediation_approval(approval_id);
        match self.store.read_json::<ApprovalRecord>(&path) {
            Ok(record) => Ok(record.approved),
            Err(CortexError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn active_count(&self, worker_type: &str) -> Result<usize> {
        let dir = self
            .store
            .paths()
            .worker_spec(SpecState::Active, "probe")
            .parent()
            .map(std::path::Path::to_path_buf)
            .ok_or_else(|| CortexError::FatalInvariant("active store has no parent".into()))?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let doc: Value = self.store.read_json(&path)?;
            if doc["worker_type"].as_str() == Some(worker_type) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Environment, Task, WorkerResources, WorkerStatus};
    use crate::domain::SystemClock;
    use chrono::Utc;
    use tempfile::TempDir;

    fn spec(worker_type: &str, task_id: &str) -> WorkerSpec {
        WorkerSpec {
            worker_id: format!("worker-{worker_type}-abc123"),
            worker_type: worker_type.into(),
            created_by: "development-master".into(),
            task_id: task_id.into(),
            status: WorkerStatus::Pending,
            scope: serde_json::json!({}),
            context: serde_json::json!({}),
            resources: WorkerResources::default(),
            deliverables: Vec::new(),
            prompt_ref: format!("coordination/prompts/workers/{worker_type}.md"),
            execution: Default::default(),
            results: None,
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: Vec::new(),
            approval_id: None,
            audit_trail: false,
            created_at: Utc::now(),
            heartbeat: None,
            failure_reason: None,
        }
    }

    fn fixture(dir: &TempDir) -> (Store, SystemClock, CortexConfig) {
        let store = Store::new(dir.path(), Environment::Dev);
        let config = CortexConfig::default();
        (store, SystemClock, config)
    }

    fn queue_task(store: &Store, clock: &SystemClock, task_id: &str, task_type: &str) {
        TaskQueueService::new(store, clock)
            .submit(Task::new(task_id, task_type, "gate test task"))
            .unwrap();
    }

    #[test]
    fn test_clean_spec_passes() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);
        gate.check(&spec("development", "t1")).unwrap();
    }

    #[test]
    fn test_missing_task_denied() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        let gate = PreflightGate::new(&store, &clock, &config);
        let err = gate.check(&spec("development", "ghost")).unwrap_err();
        assert!(matches!(err, CortexError::PolicyDenied(_)));
        assert!(err.to_string().contains("task_exists"));
    }

    #[test]
    fn test_sensitive_data_denied_and_event_emitted() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("development", "t1");
        s.data_access = vec!["credentials".into()];
        let err = gate.check(&s).unwrap_err();
        assert!(err.to_string().contains("sensitive_data"));

        let events: Vec<ComplianceEvent> = store
            .read_jsonl(&store.paths().compliance_events(Environment::Dev))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "compliance.failed");
        assert_eq!(events[0].violations[0].check, "sensitive_data");
    }

    #[test]
    fn test_allowed_worker_type_reads_sensitive_data() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("security", "t1");
        s.data_access = vec!["credentials".into()];
        gate.check(&s).unwrap();
    }

    #[test]
    fn test_restricted_operation_denied() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("development", "t1");
        s.operations = vec!["modify_secrets".into()];
        let err = gate.check(&s).unwrap_err();
        assert!(err.to_string().contains("restricted_operation"));
    }

    #[test]
    fn test_budget_over_global_max_denied() {
        let dir = TempDir::new().unwrap();
        let (store, clock, mut config) = fixture(&dir);
        config.limits.max_tokens_per_worker = 6_000;
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("development", "t1");
        s.resources.token_budget = 8_000;
        let err = gate.check(&s).unwrap_err();
        assert!(err.to_string().contains("token_budget_max"));
    }

    #[test]
    fn test_audit_required_task_type() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "security-scan");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("security", "t1");
        s.audit_trail = false;
        let err = gate.check(&s).unwrap_err();
        assert!(err.to_string().contains("audit_trail"));

        s.audit_trail = true;
        gate.check(&s).unwrap();
    }

    #[test]
    fn test_approval_required_operation() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        let mut s = spec("development", "t1");
        s.operations = vec!["production_deploy".into()];
        let err = gate.check(&s).unwrap_err();
        assert!(err.to_string().contains("approval"));

        // Approved record unlocks the gate
        let approval = ApprovalRecord {
            approval_id: "appr-1".into(),
            approved: true,
            approved_by: "release-lead".into(),
            approved_at: Utc::now(),
        };
        store
            .write_json_atomic(&store.paths().remediation_approval("appr-1"), &approval)
            .unwrap();
        s.approval_id = Some("appr-1".into());
        gate.check(&s).unwrap();
    }

    #[test]
    fn test_concurrency_cap() {
        let dir = TempDir::new().unwrap();
        let (store, clock, mut config) = fixture(&dir);
        config.limits.max_concurrent_per_type = 2;
        queue_task(&store, &clock, "t1", "bug-fix");
        let gate = PreflightGate::new(&store, &clock, &config);

        for i in 0..2 {
            let mut active = spec("development", "t1");
            active.worker_id = format!("worker-development-cap{i}");
            store
                .write_json_atomic(
                    &store.paths().worker_spec(SpecState::Active, &active.worker_id),
                    &active,
                )
                .unwrap();
        }

        let err = gate.check(&spec("development", "t1")).unwrap_err();
        assert!(err.to_string().contains("concurrency_cap"));
    }

    #[test]
    fn test_bypass_requires_reason_and_audits() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        let gate = PreflightGate::new(&store, &clock, &config);
        let s = spec("development", "ghost");

        temp_env::with_vars(
            [("GOVERNANCE_BYPASS", Some("true")), ("BYPASS_REASON", None)],
            || {
                let err = gate.check(&s).unwrap_err();
                assert!(err.to_string().contains("BYPASS_REASON"));
            },
        );

        temp_env::with_vars(
            [
                ("GOVERNANCE_BYPASS", Some("true")),
                ("BYPASS_REASON", Some("incident drill")),
            ],
            || {
                gate.check(&s).unwrap();
            },
        );

        let audit: Vec<ComplianceEvent> = store.read_jsonl(&store.paths().audit_log()).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, "compliance.bypassed");
        assert_eq!(audit[0].bypass_reason.as_deref(), Some("incident drill"));
    }

    #[test]
    fn test_governance_disabled_skips_checks() {
        let dir = TempDir::new().unwrap();
        let (store, clock, mut config) = fixture(&dir);
        config.governance.enabled = false;
        let gate = PreflightGate::new(&store, &clock, &config);
        // Task does not exist, but the gate is off
        gate.check(&spec("development", "ghost")).unwrap();
    }

    #[test]
    fn test_governance_env_overrides_config() {
        let dir = TempDir::new().unwrap();
        let (store, clock, config) = fixture(&dir);
        let gate = PreflightGate::new(&store, &clock, &config);
        temp_env::with_var("GOVERNANCE_ENABLED", Some("false"), || {
            gate.check(&spec("development", "ghost")).unwrap();
        });
    }
}
