//! Task queue over the environment's queue snapshot.
//!
//! Intake and status transitions for tasks. The queue file has a single
//! logical writer; mutations take the advisory lock.

use serde::{Deserialize, Serialize};

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{ActorType, LineageEventType, Task, TaskStatus};
use crate::domain::Clock;
use crate::infrastructure::Store;

use super::lineage::LineageRecorder;

/// The queue snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQueue {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Queue operations.
pub struct TaskQueueService<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> TaskQueueService<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    fn queue_path(&self) -> std::path::PathBuf {
        self.store.paths().task_queue(self.store.env())
    }

    fn load(&self) -> Result<TaskQueue> {
        self.store.read_json_or_default(&self.queue_path())
    }

    fn save(&self, queue: &TaskQueue) -> Result<()> {
        self.store.write_json_atomic(&self.queue_path(), queue)
    }

    /// Add a task to the queue and record `task_created` lineage.
    pub fn submit(&self, task: Task) -> Result<Task> {
        let _lock = self.store.lock("task-queue")?;
        let mut queue = self.load()?;
        if queue.tasks.iter().any(|t| t.id == task.id) {
            return Err(CortexError::PreconditionFailed(format!(
                "task {} already queued",
                task.id
            )));
        }
        queue.tasks.push(task.clone());
        self.save(&queue)?;

        LineageRecorder::new(self.store, self.clock).record(
            &task.id,
            LineageEventType::TaskCreated,
            ActorType::System,
            "task-intake",
            serde_json::json!({"task_type": task.task_type, "priority": task.priority}),
            None,
            None,
        )?;
        Ok(task)
    }

    /// Look up one task.
    pub fn get(&self, task_id: &str) -> Result<Task> {
        self.load()?
            .tasks
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CortexError::NotFound(format!("task {task_id}")))
    }

    /// Whether the task exists in the queue.
    pub fn exists(&self, task_id: &str) -> Result<bool> {
        Ok(self.load()?.tasks.iter().any(|t| t.id == task_id))
    }

    /// All queued tasks, optionally filtered by status.
    pub fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let tasks = self.load()?.tasks;
        Ok(match status {
            Some(s) => tasks.into_iter().filter(|t| t.status == s).collect(),
            None => tasks,
        })
    }

    /// Advance a task's status. Transitions are validated, terminal
    /// tasks are immutable, and every transition is recorded in the
    /// lineage stream.
    pub fn update_status(&self, task_id: &str, new_status: TaskStatus) -> Result<Task> {
        let updated = {
            let _lock = self.store.lock("task-queue")?;
            let mut queue = self.load()?;
            let task = queue
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| CortexError::NotFound(format!("task {task_id}")))?;

            if !task.status.can_transition_to(new_status) {
                return Err(CortexError::PreconditionFailed(format!(
                    "task {task_id}: invalid transition {} -> {}",
                    task.status.as_str(),
                    new_status.as_str()
                )));
            }
            task.status = new_status;
            let updated = task.clone();
            self.save(&queue)?;
            updated
        };

        let event_type = match new_status {
            TaskStatus::Routed => LineageEventType::TaskAssigned,
            TaskStatus::Running => LineageEventType::TaskStarted,
            TaskStatus::Completed => LineageEventType::TaskCompleted,
            TaskStatus::Failed => LineageEventType::TaskFailed,
            TaskStatus::Cancelled => LineageEventType::TaskCancelled,
            TaskStatus::Pending => LineageEventType::TaskUnblocked,
        };
        LineageRecorder::new(self.store, self.clock).record(
            task_id,
            event_type,
            ActorType::System,
            "task-queue",
            serde_json::json!({"status": new_status}),
            None,
            None,
        )?;
        Ok(updated)
    }

    /// Record the master assignment after routing.
    pub fn assign(&self, task_id: &str, master_id: &str) -> Result<Task> {
        let updated = {
            let _lock = self.store.lock("task-queue")?;
            let mut queue = self.load()?;
            let task = queue
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| CortexError::NotFound(format!("task {task_id}")))?;
            if !task.status.can_transition_to(TaskStatus::Routed) {
                return Err(CortexError::PreconditionFailed(format!(
                    "task {task_id}: cannot route from {}",
                    task.status.as_str()
                )));
            }
            task.status = TaskStatus::Routed;
            task.assigned_master = Some(master_id.to_string());
            let updated = task.clone();
            self.save(&queue)?;
            updated
        };

        LineageRecorder::new(self.store, self.clock).record(
            task_id,
            LineageEventType::TaskAssigned,
            ActorType::Master,
            master_id,
            serde_json::json!({"master": master_id}),
            None,
            None,
        )?;
        Ok(updated)
    }
}
