//! Lineage events: the append-only lifecycle record of every task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trace::TraceContext;

/// Ordered lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageEventType {
    TaskCreated,
    TaskAssigned,
    TaskStarted,
    WorkerSpawned,
    WorkerStarted,
    WorkerProgress,
    WorkerCompleted,
    WorkerFailed,
    TaskCompleted,
    TaskFailed,
    TaskBlocked,
    TaskUnblocked,
    TaskReassigned,
    TaskEscalated,
    TaskCancelled,
    HandoffCreated,
    HandoffAccepted,
    HandoffCompleted,
}

impl LineageEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskAssigned => "task_assigned",
            Self::TaskStarted => "task_started",
            Self::WorkerSpawned => "worker_spawned",
            Self::WorkerStarted => "worker_started",
            Self::WorkerProgress => "worker_progress",
            Self::WorkerCompleted => "worker_completed",
            Self::WorkerFailed => "worker_failed",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskBlocked => "task_blocked",
            Self::TaskUnblocked => "task_unblocked",
            Self::TaskReassigned => "task_reassigned",
            Self::TaskEscalated => "task_escalated",
            Self::TaskCancelled => "task_cancelled",
            Self::HandoffCreated => "handoff_created",
            Self::HandoffAccepted => "handoff_accepted",
            Self::HandoffCompleted => "handoff_completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }
}

/// What kind of actor produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Master,
    Worker,
    System,
    Human,
}

/// The actor attribution on a lineage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageActor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
    /// Identity from CORTEX_PRINCIPAL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

/// One append-only lifecycle entry. Ordering is append order; the
/// timestamp is for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEvent {
    pub lineage_id: String,
    pub task_id: String,
    pub event_type: LineageEventType,
    pub timestamp: DateTime<Utc>,
    pub actor: LineageActor,
    #[serde(default)]
    pub event_data: serde_json::Value,
    /// When present, references a prior event of the same task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_lineage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<TraceContext>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}
