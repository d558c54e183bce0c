//! Remediation: playbook matching, gated execution, validation, and
//! rollback.
//!
//! Steps run in declared order with per-step `on_failure` semantics.
//! Every invocation produces an append-only execution record; playbooks
//! with `auto_execute = false` produce a pending approval instead of
//! acting. Validation runs after the fact and can trigger rollback.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::playbook::{
    CleanupScope, ConfigOp, ExecutionStatus, OnFailure, Playbook, PlaybookAction, RollbackTrigger,
    StepOutcome, StepResult, ValidationOutcome, ValidationSpec, ValidationType,
};
use crate::domain::models::{
    FailureEvent, HealthStatus, PatternSeverity, RemediationExecution, TaskStatus, WorkerSpec,
};
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

use super::checkpoints::lookup_dot_path;
use super::pattern_detector::PatternDetector;
use super::task_queue::TaskQueue;

/// The playbook registry snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookIndex {
    #[serde(default)]
    pub playbooks: Vec<Playbook>,
}

/// Record appended to the dashboard/restart event streams by actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActionEvent {
    event_type: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    data: Value,
}

/// Pause marker written by `pause_queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseMarker {
    pub paused_at: chrono::DateTime<chrono::Utc>,
    pub resume_at: chrono::DateTime<chrono::Utc>,
}

/// Pending approval for a non-auto-executable playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: String,
    pub playbook_id: String,
    pub context: Value,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub approved: bool,
    #[serde(default)]
    pub approved_by: String,
}

/// The remediation service.
pub struct Remediator<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> Remediator<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    fn index(&self) -> Result<PlaybookIndex> {
        self.store
            .read_json_or_default(&self.store.paths().playbook_index())
    }

    fn playbook(&self, playbook_id: &str) -> Result<Playbook> {
        self.index()?
            .playbooks
            .into_iter()
            .find(|p| p.playbook_id == playbook_id)
            .ok_or_else(|| CortexError::NotFound(format!("playbook {playbook_id}")))
    }

    /// Enabled playbooks triggered by a pattern at the given severity.
    pub fn matching_playbooks(
        &self,
        pattern_key: &str,
        severity: PatternSeverity,
    ) -> Result<Vec<Playbook>> {
        Ok(self
            .index()?
            .playbooks
            .into_iter()
            .filter(|p| p.matches(pattern_key, severity))
            .collect())
    }

    /// Remediate a detected pattern: run every matching playbook
    /// through the gate. Gating failures on one playbook do not block
    /// the others.
    pub fn remediate(&self, pattern_id: &str, context: Value) -> Result<Vec<RemediationExecution>> {
        let detector = PatternDetector::new(self.store, self.clock);
        let pattern = detector
            .get(pattern_id)?
            .ok_or_else(|| CortexError::NotFound(format!("pattern {pattern_id}")))?;

        let mut executions = Vec::new();
        for playbook in self.matching_playbooks(&pattern.category_type(), pattern.severity)? {
            let mut ctx = context.clone();
            if let Value::Object(map) = &mut ctx {
                map.insert("pattern_id".into(), json!(pattern_id));
                map.insert(
                    "worker_type".into(),
                    json!(pattern.signature.worker_type.clone()),
                );
            }
            match self.execute(&playbook.playbook_id, ctx, false) {
                Ok(execution) => executions.push(execution),
                Err(err) => {
                    tracing::warn!(
                        playbook_id = %playbook.playbook_id,
                        error = %err,
                        "playbook skipped during remediation"
                    );
                }
            }
        }
        Ok(executions)
    }

    /// Execute one playbook. `dry_run` records the plan without acting.
    pub fn execute(
        &self,
        playbook_id: &str,
        context: Value,
        dry_run: bool,
    ) -> Result<RemediationExecution> {
        let playbook = self.playbook(playbook_id)?;
        if !playbook.enabled {
            return Err(CortexError::PreconditionFailed(format!(
                "playbook {playbook_id} is disabled"
            )));
        }

        if !playbook.auto_execute && !dry_run {
            return self.create_pending_approval(&playbook, context);
        }

        if !dry_run {
            self.check_cooling_period(&playbook)?;
        }

        let execution_id = format!("rem-{}", Uuid::new_v4().simple());
        let started_at = self.clock.now();
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut status = ExecutionStatus::Success;

        for step in &playbook.actions {
            if dry_run {
                step_results.push(StepResult {
                    step: step.name.clone(),
                    action: step.action.kind().to_string(),
                    result: StepOutcome::Skipped,
                    message: Some("dry run".into()),
                    previous_value: None,
                    duration_ms: 0,
                });
                continue;
            }

            let timer = Instant::now();
            let outcome = self.run_action(&step.action, &context);
            let duration_ms = timer.elapsed().as_millis() as u64;
            let timed_out = duration_ms > step.timeout_seconds * 1000;

            match outcome {
                Ok(previous_value) if !timed_out => {
                    step_results.push(StepResult {
                        step: step.name.clone(),
                        action: step.action.kind().to_string(),
                        result: StepOutcome::Succeeded,
                        message: None,
                        previous_value,
                        duration_ms,
                    });
                }
                result => {
                    let message = match result {
                        Err(err) => err.to_string(),
                        Ok(_) => format!("step exceeded {}s timeout", step.timeout_seconds),
                    };
                    step_results.push(StepResult {
                        step: step.name.clone(),
                        action: step.action.kind().to_string(),
                        result: StepOutcome::Failed,
                        message: Some(message),
                        previous_value: None,
                        duration_ms,
                    });

                    match step.on_failure {
                        OnFailure::Abort => {
                            status = ExecutionStatus::Aborted;
                            break;
                        }
                        OnFailure::Rollback => {
                            self.rollback_steps(&step_results);
                            status = ExecutionStatus::RolledBack;
                            break;
                        }
                        OnFailure::Alert => {
                            self.emit_remediation_event(
                                "remediation.step_alert",
                                json!({
                                    "playbook_id": playbook.playbook_id,
                                    "step": step.name,
                                }),
                            )?;
                            status = ExecutionStatus::Partial;
                        }
                        OnFailure::Continue => {}
                    }
                }
            }
        }

        let execution = RemediationExecution {
            execution_id: execution_id.clone(),
            playbook_id: playbook.playbook_id.clone(),
            context,
            started_at,
            completed_at: Some(self.clock.now()),
            status,
            step_results,
            validation: None,
            dry_run,
        };

        self.persist_execution(&execution)?;
        Ok(execution)
    }

    /// Check a completed execution's declared validation and append the
    /// outcome. A failed validation triggers rollback when the playbook
    /// declares `rollback.trigger = validation_failure`.
    pub fn validate(&self, execution_id: &str) -> Result<RemediationExecution> {
        let path = self.store.paths().remediation_execution(execution_id);
        let mut execution: RemediationExecution = self.store.read_json(&path)?;
        let playbook = self.playbook(&execution.playbook_id)?;

        let Some(validation_spec) = &playbook.validation else {
            return Err(CortexError::PreconditionFailed(format!(
                "playbook {} declares no validation",
                playbook.playbook_id
            )));
        };

        let (passed, detail) = self.run_validation(validation_spec, &execution)?;
        execution.validation = Some(ValidationOutcome {
            validation_type: validation_spec.validation_type,
            passed,
            detail,
            checked_at: self.clock.now(),
        });

        if !passed {
            let rollback_declared = playbook
                .rollback
                .as_ref()
                .map_or(false, |r| r.enabled && r.trigger == RollbackTrigger::ValidationFailure);
            if rollback_declared {
                self.rollback_steps(&execution.step_results);
                execution.status = ExecutionStatus::RolledBack;
                self.emit_remediation_event(
                    "remediation.rolled_back",
                    json!({
                        "execution_id": execution.execution_id,
                        "playbook_id": execution.playbook_id,
                        "reason": "validation_failure",
                    }),
                )?;
            }
        }

        self.store.write_json_atomic(&path, &execution)?;
        self.store
            .append_jsonl(&self.store.paths().remediation_history(), &execution)?;
        Ok(execution)
    }

    // -- gating ------------------------------------------------------

    fn create_pending_approval(
        &self,
        playbook: &Playbook,
        context: Value,
    ) -> Result<RemediationExecution> {
        let approval = PendingApproval {
            approval_id: format!("appr-{}", Uuid::new_v4().simple()),
            playbook_id: playbook.playbook_id.clone(),
            context: context.clone(),
            requested_at: self.clock.now(),
            approved: false,
            approved_by: String::new(),
        };
        self.store.write_json_atomic(
            &self.store.paths().remediation_approval(&approval.approval_id),
            &approval,
        )?;

        let execution = RemediationExecution {
            execution_id: format!("rem-{}", Uuid::new_v4().simple()),
            playbook_id: playbook.playbook_id.clone(),
            context,
            started_at: self.clock.now(),
            completed_at: None,
            status: ExecutionStatus::PendingApproval,
            step_results: Vec::new(),
            validation: None,
            dry_run: false,
        };
        self.persist_execution(&execution)?;
        Ok(execution)
    }

    fn check_cooling_period(&self, playbook: &Playbook) -> Result<()> {
        let Some(minutes) = playbook.prerequisites.min_cooling_period_minutes else {
            return Ok(());
        };
        let history: Vec<RemediationExecution> = self
            .store
            .read_jsonl(&self.store.paths().remediation_history())?;
        let last_completed = history
            .iter()
            .filter(|e| e.playbook_id == playbook.playbook_id && !e.dry_run)
            .filter_map(|e| e.completed_at)
            .max();
        if let Some(completed_at) = last_completed {
            let elapsed = self.clock.now() - completed_at;
            if elapsed < Duration::minutes(minutes as i64) {
                return Err(CortexError::PreconditionFailed(format!(
                    "cooling period: {} ran {}m ago, requires {}m",
                    playbook.playbook_id,
                    elapsed.num_minutes(),
                    minutes
                )));
            }
        }
        Ok(())
    }

    // -- actions -----------------------------------------------------

    /// Run one action. Returns the previous value for reversible
    /// mutations so rollback can restore it.
    fn run_action(&self, action: &PlaybookAction, context: &Value) -> Result<Option<Value>> {
        let paths = self.store.paths();
        let env = self.store.env();
        match action {
            PlaybookAction::ModifyConfig {
                file,
                field,
                op,
                value,
                max_value,
            } => {
                let target = paths.env_root(env).join(file);
                let mut doc: Value = self.store.read_json(&target)?;
                let current = lookup_dot_path(&doc, field)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        CortexError::NotFound(format!("numeric field {field} in {file}"))
                    })?;
                let mut next = match op {
                    ConfigOp::Multiply => current * value,
                    ConfigOp::Add => current + value,
                    ConfigOp::Set => *value,
                };
                if let Some(max) = max_value {
                    next = next.min(*max);
                }
                set_dot_path(&mut doc, field, json!(next))?;
                self.store.write_json_atomic(&target, &doc)?;
                Ok(Some(json!({"file": file, "field": field, "value": current})))
            }
            PlaybookAction::ResetCircuitBreaker { worker_type } => {
                let target = paths.circuit_breakers(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                let previous = doc
                    .as_object_mut()
                    .and_then(|map| map.remove(worker_type));
                self.store.write_json_atomic(&target, &doc)?;
                Ok(previous.map(|p| json!({"worker_type": worker_type, "entry": p})))
            }
            PlaybookAction::CleanupState { scopes } => {
                let mut removed = 0u64;
                for scope in scopes {
                    let dir = match scope {
                        CleanupScope::Locks => paths.locks(env),
                        CleanupScope::TempFiles => paths.temp(env),
                    };
                    removed += remove_dir_files(&dir)?;
                }
                Ok(Some(json!({"removed": removed})))
            }
            PlaybookAction::RestartWorker { worker_id } => {
                let event = ActionEvent {
                    event_type: "worker_restart_requested".into(),
                    timestamp: self.clock.now(),
                    data: json!({"worker_id": worker_id, "context": context}),
                };
                self.store.append_jsonl(&paths.restart_events(env), &event)?;
                Ok(None)
            }
            PlaybookAction::EmitEvent {
                event_type,
                payload,
            } => {
                let event = ActionEvent {
                    event_type: event_type.clone(),
                    timestamp: self.clock.now(),
                    data: payload.clone(),
                };
                self.store
                    .append_jsonl(&paths.dashboard_events(env), &event)?;
                Ok(None)
            }
            PlaybookAction::PauseQueue { duration_minutes } => {
                let now = self.clock.now();
                let marker = PauseMarker {
                    paused_at: now,
                    resume_at: now + Duration::minutes(*duration_minutes as i64),
                };
                self.store
                    .write_json_atomic(&paths.queue_pause_marker(env), &marker)?;
                Ok(None)
            }
            PlaybookAction::ResumeQueue => {
                self.store.remove(&paths.queue_pause_marker(env))?;
                Ok(None)
            }
            PlaybookAction::ScaleWorkers {
                factor,
                max_workers,
            } => {
                let target = paths.worker_pool(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                let current = doc.get("max_workers").and_then(Value::as_f64).unwrap_or(4.0);
                let next = (current * factor).min(*max_workers as f64).round();
                doc["max_workers"] = json!(next as u64);
                self.store.write_json_atomic(&target, &doc)?;
                Ok(Some(json!({"max_workers": current as u64})))
            }
            PlaybookAction::RecalculateBudget { reserve_percent } => {
                let target = paths.token_budget(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                let previous = doc.get("reserve_percent").cloned();
                doc["reserve_percent"] = json!(reserve_percent);
                self.store.write_json_atomic(&target, &doc)?;
                Ok(previous.map(|p| json!({"reserve_percent": p})))
            }
            PlaybookAction::RequeueTask { task_id } => {
                let target = paths.task_queue(env);
                let mut queue: TaskQueue = self.store.read_json_or_default(&target)?;
                let task = queue
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == *task_id)
                    .ok_or_else(|| CortexError::NotFound(format!("task {task_id}")))?;
                if task.status.is_terminal() {
                    return Err(CortexError::PreconditionFailed(format!(
                        "task {task_id} is terminal"
                    )));
                }
                let previous = task.status;
                task.status = TaskStatus::Pending;
                task.assigned_master = None;
                self.store.write_json_atomic(&target, &queue)?;
                Ok(Some(json!({"task_id": task_id, "status": previous})))
            }
        }
    }

    /// Restore the previous values recorded by succeeded steps, in
    /// reverse order. Best-effort: rollback of one step never blocks
    /// the others.
    fn rollback_steps(&self, step_results: &[StepResult]) {
        for result in step_results.iter().rev() {
            if result.result != StepOutcome::Succeeded {
                continue;
            }
            let Some(previous) = &result.previous_value else {
                continue;
            };
            if let Err(err) = self.restore_previous(&result.action, previous) {
                tracing::warn!(step = %result.step, error = %err, "rollback step failed");
            }
        }
    }

    fn restore_previous(&self, action_kind: &str, previous: &Value) -> Result<()> {
        let paths = self.store.paths();
        let env = self.store.env();
        match action_kind {
            "modify_config" => {
                let file = previous["file"].as_str().unwrap_or_default();
                let field = previous["field"].as_str().unwrap_or_default();
                let target = paths.env_root(env).join(file);
                let mut doc: Value = self.store.read_json(&target)?;
                set_dot_path(&mut doc, field, previous["value"].clone())?;
                self.store.write_json_atomic(&target, &doc)
            }
            "scale_workers" => {
                let target = paths.worker_pool(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                doc["max_workers"] = previous["max_workers"].clone();
                self.store.write_json_atomic(&target, &doc)
            }
            "recalculate_budget" => {
                let target = paths.token_budget(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                doc["reserve_percent"] = previous["reserve_percent"].clone();
                self.store.write_json_atomic(&target, &doc)
            }
            "reset_circuit_breaker" => {
                let target = paths.circuit_breakers(env);
                let mut doc: Value = self.store.read_json_or_default(&target)?;
                if let (Some(worker_type), Some(entry)) = (
                    previous["worker_type"].as_str(),
                    previous.get("entry"),
                ) {
                    doc[worker_type] = entry.clone();
                }
                self.store.write_json_atomic(&target, &doc)
            }
            _ => Ok(()),
        }
    }

    // -- validation --------------------------------------------------

    fn run_validation(
        &self,
        spec: &ValidationSpec,
        execution: &RemediationExecution,
    ) -> Result<(bool, String)> {
        match spec.validation_type {
            ValidationType::PatternReduction => {
                let Some(pattern_id) = execution.context.get("pattern_id").and_then(Value::as_str)
                else {
                    return Ok((false, "execution context has no pattern_id".into()));
                };
                let detector = PatternDetector::new(self.store, self.clock);
                let Some(pattern) = detector.get(pattern_id)? else {
                    return Ok((false, format!("pattern {pattern_id} vanished")));
                };
                let completed = execution.completed_at.unwrap_or(execution.started_at);
                let events: Vec<FailureEvent> = self
                    .store
                    .read_jsonl(&self.store.paths().failure_events(self.store.env()))?;
                let window = Duration::hours(24);
                let after = events
                    .iter()
                    .filter(|e| e.timestamp > completed && e.worker_type == pattern.signature.worker_type)
                    .count();
                let before = events
                    .iter()
                    .filter(|e| {
                        e.timestamp <= completed
                            && e.timestamp > completed - window
                            && e.worker_type == pattern.signature.worker_type
                    })
                    .count();
                let passed = after < before;
                Ok((
                    passed,
                    format!("{before} matching events before execution, {after} after"),
                ))
            }
            ValidationType::SuccessRateImprovement => {
                // Needs outcome telemetry on both sides of the run.
                let threshold = spec.threshold.unwrap_or(0.0);
                let completed = execution.completed_at.unwrap_or(execution.started_at);
                let history: Vec<crate::domain::models::AllocationOutcome> = self
                    .store
                    .read_jsonl(&self.store.paths().allocation_history(self.store.env()))?;
                let rate = |records: &[&crate::domain::models::AllocationOutcome]| {
                    if records.is_empty() {
                        return 0.0;
                    }
                    records
                        .iter()
                        .filter(|o| o.outcome == crate::domain::models::OutcomeKind::Success)
                        .count() as f64
                        / records.len() as f64
                };
                let before: Vec<_> = history.iter().filter(|o| o.recorded_at <= completed).collect();
                let after: Vec<_> = history.iter().filter(|o| o.recorded_at > completed).collect();
                if after.is_empty() {
                    return Ok((false, "no outcomes recorded since execution".into()));
                }
                let delta = rate(&after) - rate(&before);
                Ok((
                    delta > threshold,
                    format!("success rate delta {delta:.3} (threshold {threshold})"),
                ))
            }
            ValidationType::NoImmediateRetrip => {
                let worker_type = execution
                    .context
                    .get("worker_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let doc: Value = self
                    .store
                    .read_json_or_default(&self.store.paths().circuit_breakers(self.store.env()))?;
                let tripped = doc.get(worker_type).is_some();
                Ok((
                    !tripped,
                    if tripped {
                        format!("breaker re-tripped for {worker_type}")
                    } else {
                        format!("no breaker entry for {worker_type}")
                    },
                ))
            }
            ValidationType::WorkerHealthy => {
                let Some(worker_id) = execution.context.get("worker_id").and_then(Value::as_str)
                else {
                    return Ok((false, "execution context has no worker_id".into()));
                };
                let path = self
                    .store
                    .paths()
                    .worker_spec(SpecState::Active, worker_id);
                match self.store.read_json::<WorkerSpec>(&path) {
                    Ok(spec) => {
                        let healthy = spec
                            .heartbeat
                            .map_or(false, |hb| hb.health.status == HealthStatus::Healthy);
                        Ok((healthy, format!("worker {worker_id} healthy: {healthy}")))
                    }
                    Err(CortexError::NotFound(_)) => {
                        Ok((false, format!("worker {worker_id} not active")))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    // -- persistence -------------------------------------------------

    fn persist_execution(&self, execution: &RemediationExecution) -> Result<()> {
        self.store.write_json_atomic(
            &self.store.paths().remediation_execution(&execution.execution_id),
            execution,
        )?;
        self.store
            .append_jsonl(&self.store.paths().remediation_history(), execution)
    }

    fn emit_remediation_event(&self, event_type: &str, data: Value) -> Result<()> {
        let event = ActionEvent {
            event_type: event_type.to_string(),
            timestamp: self.clock.now(),
            data,
        };
        self.store
            .append_jsonl(&self.store.paths().dashboard_events(self.store.env()), &event)
    }
}

/// Set a dot-path in a JSON document, creating intermediate objects.
fn set_dot_path(doc: &mut Value, path: &str, new_value: Value) -> Result<()> {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (idx, segment) in segments.iter().enumerate() {
        if idx == segments.len() - 1 {
            match current {
                Value::Object(map) => {
                    map.insert((*segment).to_string(), new_value);
                    return Ok(());
                }
                _ => {
                    return Err(CortexError::InvalidInput(format!(
                        "cannot set {path}: parent is not an object"
                    )))
                }
            }
        }
        current = match current {
            Value::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| json!({})),
            _ => {
                return Err(CortexError::InvalidInput(format!(
                    "cannot traverse {path}: {segment} is not an object"
                )))
            }
        };
    }
    Ok(())
}

fn remove_dir_files(dir: &std::path::Path) -> Result<u64> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::playbook::{PlaybookStep, Prerequisites, RollbackSpec};
    use crate::domain::models::Environment;
    use crate::domain::FakeClock;
    use tempfile::TempDir;

    fn save_playbooks(store: &Store, playbooks: Vec<Playbook>) {
        store
            .write_json_atomic(&store.paths().playbook_index(), &PlaybookIndex { playbooks })
            .unwrap();
    }

    fn step(name: &str, action: PlaybookAction, on_failure: OnFailure) -> PlaybookStep {
        PlaybookStep {
            name: name.into(),
            action,
            on_failure,
            timeout_seconds: 300,
        }
    }

    fn breaker_reset_playbook(cooling_minutes: Option<u64>) -> Playbook {
        Playbook {
            playbook_id: "pb-circuit-breaker-reset".into(),
            version: "1.0.0".into(),
            description: "Reset a tripped breaker".into(),
            trigger_patterns: vec!["systemic:recurring_failure".into()],
            severity_threshold: PatternSeverity::Medium,
            actions: vec![step(
                "reset",
                PlaybookAction::ResetCircuitBreaker {
                    worker_type: "test".into(),
                },
                OnFailure::Abort,
            )],
            prerequisites: Prerequisites {
                min_cooling_period_minutes: cooling_minutes,
            },
            validation: Some(ValidationSpec {
                validation_type: ValidationType::NoImmediateRetrip,
                threshold: None,
                delay_minutes: 30,
            }),
            rollback: None,
            auto_execute: true,
            enabled: true,
        }
    }

    fn fixture(dir: &TempDir) -> (Store, FakeClock) {
        (Store::new(dir.path(), Environment::Dev), FakeClock::default())
    }

    #[test]
    fn test_execute_reset_circuit_breaker() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        save_playbooks(&store, vec![breaker_reset_playbook(None)]);

        store
            .write_json_atomic(
                &store.paths().circuit_breakers(Environment::Dev),
                &json!({"test": {"tripped_at": "2025-06-01T00:00:00Z"}}),
            )
            .unwrap();

        let remediator = Remediator::new(&store, &clock);
        let execution = remediator
            .execute("pb-circuit-breaker-reset", json!({"worker_type": "test"}), false)
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.step_results.len(), 1);
        assert_eq!(execution.step_results[0].result, StepOutcome::Succeeded);

        let breakers: Value = store
            .read_json(&store.paths().circuit_breakers(Environment::Dev))
            .unwrap();
        assert!(breakers.get("test").is_none());
    }

    #[test]
    fn test_cooling_period_gate() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        save_playbooks(&store, vec![breaker_reset_playbook(Some(30))]);
        let remediator = Remediator::new(&store, &clock);
        let ctx = json!({"worker_type": "test"});

        // 00:00 first run succeeds
        remediator
            .execute("pb-circuit-breaker-reset", ctx.clone(), false)
            .unwrap();

        // 00:20 refused
        clock.advance(Duration::minutes(20));
        let err = remediator
            .execute("pb-circuit-breaker-reset", ctx.clone(), false)
            .unwrap_err();
        assert!(matches!(err, CortexError::PreconditionFailed(_)));

        // 00:31 succeeds again
        clock.advance(Duration::minutes(11));
        remediator
            .execute("pb-circuit-breaker-reset", ctx, false)
            .unwrap();

        let history: Vec<RemediationExecution> = store
            .read_jsonl(&store.paths().remediation_history())
            .unwrap();
        let successes = history
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success)
            .count();
        assert_eq!(successes, 2);
    }

    #[test]
    fn test_manual_playbook_creates_pending_approval() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        let mut pb = breaker_reset_playbook(None);
        pb.auto_execute = false;
        save_playbooks(&store, vec![pb]);

        store
            .write_json_atomic(
                &store.paths().circuit_breakers(Environment::Dev),
                &json!({"test": {}}),
            )
            .unwrap();

        let remediator = Remediator::new(&store, &clock);
        let execution = remediator
            .execute("pb-circuit-breaker-reset", json!({}), false)
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::PendingApproval);
        assert!(execution.step_results.is_empty());

        // No action was taken
        let breakers: Value = store
            .read_json(&store.paths().circuit_breakers(Environment::Dev))
            .unwrap();
        assert!(breakers.get("test").is_some());
    }

    #[test]
    fn test_modify_config_rollback_on_validation_failure() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);

        let config_path = store
            .paths()
            .env_root(Environment::Dev)
            .join("metrics/worker-config.json");
        store
            .write_json_atomic(&config_path, &json!({"timeout_minutes": 30.0}))
            .unwrap();

        let playbook = Playbook {
            playbook_id: "pb-timeout-increase".into(),
            version: "1.0.0".into(),
            description: "Double the worker timeout".into(),
            trigger_patterns: vec!["resource:timeout".into()],
            severity_threshold: PatternSeverity::Medium,
            actions: vec![step(
                "double-timeout",
                PlaybookAction::ModifyConfig {
                    file: "metrics/worker-config.json".into(),
                    field: "timeout_minutes".into(),
                    op: ConfigOp::Multiply,
                    value: 2.0,
                    max_value: Some(120.0),
                },
                OnFailure::Abort,
            )],
            prerequisites: Prerequisites::default(),
            validation: Some(ValidationSpec {
                validation_type: ValidationType::PatternReduction,
                threshold: None,
                delay_minutes: 1440,
            }),
            rollback: Some(RollbackSpec {
                enabled: true,
                trigger: RollbackTrigger::ValidationFailure,
            }),
            auto_execute: true,
            enabled: true,
        };
        save_playbooks(&store, vec![playbook]);

        let remediator = Remediator::new(&store, &clock);
        let execution = remediator
            .execute("pb-timeout-increase", json!({"pattern_id": "pat-missing"}), false)
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);

        let doc: Value = store.read_json(&config_path).unwrap();
        assert_eq!(doc["timeout_minutes"], json!(60.0));

        // Pattern vanished -> validation fails -> rollback restores 30
        clock.advance(Duration::hours(24));
        let validated = remediator.validate(&execution.execution_id).unwrap();
        assert_eq!(validated.status, ExecutionStatus::RolledBack);
        assert!(!validated.validation.as_ref().unwrap().passed);

        let doc: Value = store.read_json(&config_path).unwrap();
        assert_eq!(doc["timeout_minutes"], json!(30.0));

        let events: Vec<ActionEvent> = store
            .read_jsonl(&store.paths().dashboard_events(Environment::Dev))
            .unwrap();
        assert!(events.iter().any(|e| e.event_type == "remediation.rolled_back"));
    }

    #[test]
    fn test_on_failure_semantics() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);

        // modify_config against a missing file fails the step
        let failing = PlaybookAction::ModifyConfig {
            file: "metrics/absent.json".into(),
            field: "x".into(),
            op: ConfigOp::Set,
            value: 1.0,
            max_value: None,
        };
        let emit = PlaybookAction::EmitEvent {
            event_type: "marker".into(),
            payload: json!({}),
        };

        let mk = |id: &str, on_failure: OnFailure| Playbook {
            playbook_id: id.into(),
            version: "1.0.0".into(),
            description: String::new(),
            trigger_patterns: vec![],
            severity_threshold: PatternSeverity::Low,
            actions: vec![
                step("fails", failing.clone(), on_failure),
                step("after", emit.clone(), OnFailure::Continue),
            ],
            prerequisites: Prerequisites::default(),
            validation: None,
            rollback: None,
            auto_execute: true,
            enabled: true,
        };
        save_playbooks(
            &store,
            vec![
                mk("pb-abort", OnFailure::Abort),
                mk("pb-alert", OnFailure::Alert),
                mk("pb-continue", OnFailure::Continue),
            ],
        );
        let remediator = Remediator::new(&store, &clock);

        let aborted = remediator.execute("pb-abort", json!({}), false).unwrap();
        assert_eq!(aborted.status, ExecutionStatus::Aborted);
        assert_eq!(aborted.step_results.len(), 1);

        let alerted = remediator.execute("pb-alert", json!({}), false).unwrap();
        assert_eq!(alerted.status, ExecutionStatus::Partial);
        assert_eq!(alerted.step_results.len(), 2);

        let continued = remediator.execute("pb-continue", json!({}), false).unwrap();
        assert_eq!(continued.status, ExecutionStatus::Success);
        assert_eq!(continued.step_results[0].result, StepOutcome::Failed);
        assert_eq!(continued.step_results[1].result, StepOutcome::Succeeded);
    }

    #[test]
    fn test_rollback_on_step_failure() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        let config_path = store
            .paths()
            .env_root(Environment::Dev)
            .join("metrics/worker-config.json");
        store
            .write_json_atomic(&config_path, &json!({"timeout_minutes": 30.0}))
            .unwrap();

        let playbook = Playbook {
            playbook_id: "pb-two-step".into(),
            version: "1.0.0".into(),
            description: String::new(),
            trigger_patterns: vec![],
            severity_threshold: PatternSeverity::Low,
            actions: vec![
                step(
                    "bump",
                    PlaybookAction::ModifyConfig {
                        file: "metrics/worker-config.json".into(),
                        field: "timeout_minutes".into(),
                        op: ConfigOp::Multiply,
                        value: 2.0,
                        max_value: None,
                    },
                    OnFailure::Abort,
                ),
                step(
                    "broken",
                    PlaybookAction::ModifyConfig {
                        file: "metrics/absent.json".into(),
                        field: "x".into(),
                        op: ConfigOp::Set,
                        value: 1.0,
                        max_value: None,
                    },
                    OnFailure::Rollback,
                ),
            ],
            prerequisites: Prerequisites::default(),
            validation: None,
            rollback: Some(RollbackSpec {
                enabled: true,
                trigger: RollbackTrigger::StepFailure,
            }),
            auto_execute: true,
            enabled: true,
        };
        save_playbooks(&store, vec![playbook]);

        let remediator = Remediator::new(&store, &clock);
        let execution = remediator.execute("pb-two-step", json!({}), false).unwrap();
        assert_eq!(execution.status, ExecutionStatus::RolledBack);

        // The first step's mutation was restored
        let doc: Value = store.read_json(&config_path).unwrap();
        assert_eq!(doc["timeout_minutes"], json!(30.0));

        // The failed step carries on_failure=rollback in the record
        let failed = execution
            .step_results
            .iter()
            .find(|s| s.result == StepOutcome::Failed)
            .unwrap();
        assert_eq!(failed.step, "broken");
    }

    #[test]
    fn test_pause_and_resume_queue() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        let playbook = Playbook {
            playbook_id: "pb-pause".into(),
            version: "1.0.0".into(),
            description: String::new(),
            trigger_patterns: vec![],
            severity_threshold: PatternSeverity::Low,
            actions: vec![step(
                "pause",
                PlaybookAction::PauseQueue {
                    duration_minutes: 15,
                },
                OnFailure::Abort,
            )],
            prerequisites: Prerequisites::default(),
            validation: None,
            rollback: None,
            auto_execute: true,
            enabled: true,
        };
        let mut resume = playbook.clone();
        resume.playbook_id = "pb-resume".into();
        resume.actions = vec![step("resume", PlaybookAction::ResumeQueue, OnFailure::Abort)];
        save_playbooks(&store, vec![playbook, resume]);

        let remediator = Remediator::new(&store, &clock);
        remediator.execute("pb-pause", json!({}), false).unwrap();
        let marker_path = store.paths().queue_pause_marker(Environment::Dev);
        let marker: PauseMarker = store.read_json(&marker_path).unwrap();
        assert_eq!(marker.resume_at - marker.paused_at, Duration::minutes(15));

        remediator.execute("pb-resume", json!({}), false).unwrap();
        assert!(!marker_path.exists());
    }

    #[test]
    fn test_cleanup_state_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        let locks = store.paths().locks(Environment::Dev);
        std::fs::create_dir_all(&locks).unwrap();
        std::fs::write(locks.join("stale.lock"), "1").unwrap();

        let playbook = Playbook {
            playbook_id: "pb-clean".into(),
            version: "1.0.0".into(),
            description: String::new(),
            trigger_patterns: vec![],
            severity_threshold: PatternSeverity::Low,
            actions: vec![step(
                "clean",
                PlaybookAction::CleanupState {
                    scopes: vec![CleanupScope::Locks, CleanupScope::TempFiles],
                },
                OnFailure::Abort,
            )],
            prerequisites: Prerequisites::default(),
            validation: None,
            rollback: None,
            auto_execute: true,
            enabled: true,
        };
        save_playbooks(&store, vec![playbook]);
        let remediator = Remediator::new(&store, &clock);

        let first = remediator.execute("pb-clean", json!({}), false).unwrap();
        assert_eq!(first.status, ExecutionStatus::Success);
        assert!(!locks.join("stale.lock").exists());

        // Re-execution on already-clean state succeeds identically
        let second = remediator.execute("pb-clean", json!({}), false).unwrap();
        assert_eq!(second.status, ExecutionStatus::Success);
    }

    #[test]
    fn test_dry_run_skips_every_step() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        save_playbooks(&store, vec![breaker_reset_playbook(Some(30))]);
        store
            .write_json_atomic(
                &store.paths().circuit_breakers(Environment::Dev),
                &json!({"test": {}}),
            )
            .unwrap();

        let remediator = Remediator::new(&store, &clock);
        let execution = remediator
            .execute("pb-circuit-breaker-reset", json!({}), true)
            .unwrap();
        assert!(execution.dry_run);
        assert!(execution
            .step_results
            .iter()
            .all(|s| s.result == StepOutcome::Skipped));

        // Breaker untouched; cooling period not consumed
        let breakers: Value = store
            .read_json(&store.paths().circuit_breakers(Environment::Dev))
            .unwrap();
        assert!(breakers.get("test").is_some());
        remediator
            .execute("pb-circuit-breaker-reset", json!({}), false)
            .unwrap();
    }

    #[test]
    fn test_unknown_playbook_not_found() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = fixture(&dir);
        let remediator = Remediator::new(&store, &clock);
        let err = remediator.execute("pb-ghost", json!({}), false).unwrap_err();
        assert!(matches!(err, CortexError::NotFound(_)));
    }
}
