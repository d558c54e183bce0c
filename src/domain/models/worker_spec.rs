//! Worker specification domain model.
//!
//! A WorkerSpec is the immutable instruction to run exactly one worker:
//! scope, context, resource limits, deliverables, and checkpointed
//! sub-goals. Specs move between the active/completed/failed stores but
//! their fields never change after a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::heartbeat::Heartbeat;

/// Lifecycle status of a worker. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status ordering for the monotonic-advance invariant.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn can_advance_to(&self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Resource limits attached to a spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResources {
    pub token_budget: u64,
    pub timeout_minutes: u64,
    pub max_retries: u32,
}

impl Default for WorkerResources {
    fn default() -> Self {
        Self {
            token_budget: 8_000,
            timeout_minutes: 30,
            max_retries: 2,
        }
    }
}

/// Execution bookkeeping, filled in as the worker runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub duration_minutes: f64,
}

/// How a checkpoint's success condition is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    /// success_condition is a path that must exist.
    FileExists,
    /// success_condition is a shell-free command descriptor.
    CommandSuccess,
    /// success_condition is `<dot-path>=<expected>`, compared as strings.
    JsonField,
    /// Implementation-specific evaluator.
    Custom,
    /// Semantic tag for reporting; not auto-validated.
    Artifact,
    /// Semantic tag for reporting; not auto-validated.
    Test,
    /// Semantic tag for reporting; not auto-validated.
    Review,
}

impl VerificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileExists => "file_exists",
            Self::CommandSuccess => "command_success",
            Self::JsonField => "json_field",
            Self::Custom => "custom",
            Self::Artifact => "artifact",
            Self::Test => "test",
            Self::Review => "review",
        }
    }

    /// Whether the control plane validates this checkpoint itself.
    pub fn is_auto_validated(&self) -> bool {
        matches!(
            self,
            Self::FileExists | Self::CommandSuccess | Self::JsonField | Self::Custom
        )
    }
}

/// Result of validating one checkpoint, appended in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointValidation {
    pub validated_at: DateTime<Utc>,
    pub validation_result: bool,
    pub validation_message: String,
    /// Validation attempts so far; each checkpoint gets one retry.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

/// A verifiable sub-goal within a spec. Validated in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    /// 1-based position within the spec.
    pub step: u32,
    pub verification_type: VerificationType,
    pub success_condition: String,
    #[serde(default = "default_checkpoint_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<CheckpointValidation>,
}

fn default_checkpoint_timeout() -> u64 {
    120
}

/// Immutable instruction to run one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Shape `worker-<type>-<id>`.
    pub worker_id: String,
    pub worker_type: String,
    pub created_by: String,
    pub task_id: String,
    #[serde(default)]
    pub status: WorkerStatus,
    pub scope: serde_json::Value,
    pub context: serde_json::Value,
    pub resources: WorkerResources,
    #[serde(default)]
    pub deliverables: Vec<String>,
    /// Relative path of the prompt template this worker runs with.
    pub prompt_ref: String,
    #[serde(default)]
    pub execution: ExecutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub checkpoint_criteria: Vec<Checkpoint>,
    /// Declared operations, checked against the restricted set at spawn.
    #[serde(default)]
    pub operations: Vec<String>,
    /// Data categories this worker reads (gated by the allow-list).
    #[serde(default)]
    pub data_access: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default)]
    pub audit_trail: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<Heartbeat>,
    /// Populated when the spec is moved to the failed store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_advances_monotonically() {
        assert!(WorkerStatus::Pending.can_advance_to(WorkerStatus::Running));
        assert!(WorkerStatus::Pending.can_advance_to(WorkerStatus::Failed));
        assert!(WorkerStatus::Running.can_advance_to(WorkerStatus::Completed));
        assert!(!WorkerStatus::Running.can_advance_to(WorkerStatus::Pending));
        assert!(!WorkerStatus::Completed.can_advance_to(WorkerStatus::Failed));
        assert!(!WorkerStatus::Failed.can_advance_to(WorkerStatus::Running));
    }

    #[test]
    fn test_semantic_tags_are_not_auto_validated() {
        assert!(VerificationType::FileExists.is_auto_validated());
        assert!(VerificationType::JsonField.is_auto_validated());
        assert!(!VerificationType::Artifact.is_auto_validated());
        assert!(!VerificationType::Test.is_auto_validated());
        assert!(!VerificationType::Review.is_auto_validated());
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let json = serde_json::json!({
            "worker_id": "worker-test-abc123",
            "worker_type": "test",
            "created_by": "quality-master",
            "task_id": "t1",
            "scope": {},
            "context": {},
            "resources": {"token_budget": 5000, "timeout_minutes": 20, "max_retries": 1},
            "prompt_ref": "coordination/prompts/workers/test.md",
            "created_at": Utc::now(),
        });
        let spec: WorkerSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.status, WorkerStatus::Pending);
        assert!(spec.checkpoint_criteria.is_empty());
        assert!(spec.results.is_none());
        assert_eq!(spec.execution.tokens_used, 0);
    }
}
