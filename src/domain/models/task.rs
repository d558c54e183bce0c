//! Task domain model.
//!
//! Tasks are the units of work dispatched to masters and executed by
//! short-lived workers. They are created externally and coordinated
//! through the task queue snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a task in the coordination pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be routed to a master.
    Pending,
    /// Task has been routed to a master.
    Routed,
    /// A worker is executing the task.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task failed during execution.
    Failed,
    /// Task was cancelled before completion.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Routed => "routed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "routed" => Some(Self::Routed),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state. Tasks are immutable after
    /// reaching one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Routed, Self::Cancelled],
            Self::Routed => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Complexity classification produced by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskComplexity {
    Simple,
    Medium,
    Complex,
    VeryComplex,
}

impl TaskComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::VeryComplex => "very-complex",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            "very-complex" | "very_complex" => Some(Self::VeryComplex),
            _ => None,
        }
    }
}

/// A unit of work flowing through the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque task identifier.
    pub id: String,
    /// Semantic task type (implementation, security-scan, bug-fix, ...).
    pub task_type: String,
    pub priority: TaskPriority,
    pub description: String,
    /// Capabilities a master must offer to accept this task.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Declared scope of the work (paths, components).
    #[serde(default)]
    pub scope: serde_json::Value,
    /// Files provided as context to the worker.
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_master: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            description: description.into(),
            required_capabilities: Vec::new(),
            scope: serde_json::Value::Null,
            context_files: Vec::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            assigned_master: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context_files(mut self, files: Vec<String>) -> Self {
        self.context_files = files;
        self
    }
}
