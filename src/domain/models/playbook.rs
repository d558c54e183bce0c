//! Remediation playbooks and execution records.
//!
//! A playbook is a static, versioned recipe of typed steps. Executions
//! are append-only records of one invocation, including per-step results
//! and the validation outcome checked after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::failure::PatternSeverity;

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Stop; execution status becomes `aborted`.
    Abort,
    /// Run the playbook's rollback; status becomes `rolled_back`.
    Rollback,
    /// Continue; execution status becomes `partial`.
    Alert,
    /// Continue; the step alone is marked failed.
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Abort
    }
}

/// How a config field is mutated by `modify_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOp {
    Multiply,
    Add,
    Set,
}

/// Typed remediation action. Each carries exactly the data its effect
/// needs; actions are idempotent where the effect allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybookAction {
    /// Read a JSON field, apply the operation, clamp, atomic rewrite.
    ModifyConfig {
        /// Path relative to the environment subtree.
        file: String,
        /// Dot-path into the JSON document.
        field: String,
        op: ConfigOp,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<f64>,
    },
    /// Delete the breaker entry for a worker type.
    ResetCircuitBreaker { worker_type: String },
    /// Remove enumerated scoped paths.
    CleanupState {
        #[serde(default)]
        scopes: Vec<CleanupScope>,
    },
    /// Emit a restart intent event; the actual spawn is external.
    RestartWorker { worker_id: String },
    /// Append to the dashboard events log.
    EmitEvent {
        event_type: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Write a pause marker with resume time.
    PauseQueue { duration_minutes: u64 },
    /// Remove the pause marker.
    ResumeQueue,
    /// Bump the worker-pool maximum by a factor, up to a cap.
    ScaleWorkers { factor: f64, max_workers: u64 },
    /// Update the token-budget reserve percentage.
    RecalculateBudget { reserve_percent: f64 },
    /// Put the task back on the queue for re-routing.
    RequeueTask { task_id: String },
}

impl PlaybookAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModifyConfig { .. } => "modify_config",
            Self::ResetCircuitBreaker { .. } => "reset_circuit_breaker",
            Self::CleanupState { .. } => "cleanup_state",
            Self::RestartWorker { .. } => "restart_worker",
            Self::EmitEvent { .. } => "emit_event",
            Self::PauseQueue { .. } => "pause_queue",
            Self::ResumeQueue => "resume_queue",
            Self::ScaleWorkers { .. } => "scale_workers",
            Self::RecalculateBudget { .. } => "recalculate_budget",
            Self::RequeueTask { .. } => "requeue_task",
        }
    }
}

/// Scoped path classes `cleanup_state` may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupScope {
    Locks,
    TempFiles,
}

/// One ordered step of a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub name: String,
    pub action: PlaybookAction,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default = "default_step_timeout")]
    pub timeout_seconds: u64,
}

fn default_step_timeout() -> u64 {
    300
}

/// Execution prerequisites checked before any step runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prerequisites {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cooling_period_minutes: Option<u64>,
}

/// What is checked some time after execution to judge effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// Matching pattern occurrences decreased within the window.
    PatternReduction,
    /// Success rate improved for the affected worker type.
    SuccessRateImprovement,
    /// The circuit breaker did not re-trip.
    NoImmediateRetrip,
    /// The restarted worker reports healthy.
    WorkerHealthy,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternReduction => "pattern_reduction",
            Self::SuccessRateImprovement => "success_rate_improvement",
            Self::NoImmediateRetrip => "no_immediate_retrip",
            Self::WorkerHealthy => "worker_healthy",
        }
    }
}

/// Declared post-execution validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSpec {
    #[serde(rename = "type")]
    pub validation_type: ValidationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default = "default_validation_delay")]
    pub delay_minutes: u64,
}

fn default_validation_delay() -> u64 {
    60
}

/// When rollback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    ValidationFailure,
    StepFailure,
}

/// Rollback declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSpec {
    pub enabled: bool,
    pub trigger: RollbackTrigger,
}

/// A static, versioned remediation recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub playbook_id: String,
    #[serde(default = "default_playbook_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Pattern `category:type` keys this playbook remediates.
    pub trigger_patterns: Vec<String>,
    /// Minimum severity the playbook responds to.
    pub severity_threshold: PatternSeverity,
    pub actions: Vec<PlaybookStep>,
    #[serde(default)]
    pub prerequisites: Prerequisites,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSpec>,
    #[serde(default)]
    pub auto_execute: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_playbook_version() -> String {
    "1.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Playbook {
    /// Whether this playbook responds to the given pattern at severity.
    pub fn matches(&self, pattern_key: &str, severity: PatternSeverity) -> bool {
        self.enabled
            && severity >= self.severity_threshold
            && self.trigger_patterns.iter().any(|p| p == pattern_key)
    }
}

/// Status of one playbook run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Aborted,
    RolledBack,
    PendingApproval,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Aborted => "aborted",
            Self::RolledBack => "rolled_back",
            Self::PendingApproval => "pending_approval",
        }
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub action: String,
    pub result: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Value before mutation, recorded so rollback can restore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Post-execution validation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub validation_type: ValidationType,
    pub passed: bool,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

/// Append-only record of one playbook invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationExecution {
    pub execution_id: String,
    pub playbook_id: String,
    /// Pattern/worker context the run was triggered with.
    pub context: serde_json::Value,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    #[serde(default)]
    pub dry_run: bool,
}
