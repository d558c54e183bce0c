//! Lineage recorder: the append-only lifecycle log for every task.
//!
//! Events are appended to a global stream and a daily stream. Ordering
//! is append order; a non-null parent_lineage_id must reference a prior
//! event of the same task.

use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{
    ActorType, LineageActor, LineageEvent, LineageEventType, TraceContext,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// Writes and queries lineage events.
pub struct LineageRecorder<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    principal: Option<String>,
}

impl<'a> LineageRecorder<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            principal: std::env::var("CORTEX_PRINCIPAL").ok(),
        }
    }

    pub fn with_principal(mut self, principal: Option<String>) -> Self {
        self.principal = principal;
        self
    }

    /// Append one lifecycle event. Returns the assigned lineage id.
    pub fn record(
        &self,
        task_id: &str,
        event_type: LineageEventType,
        actor_type: ActorType,
        actor_id: &str,
        event_data: Value,
        parent_lineage_id: Option<String>,
        trace_context: Option<TraceContext>,
    ) -> Result<String> {
        if let Some(parent) = &parent_lineage_id {
            let prior = self.by_task(task_id)?;
            if !prior.iter().any(|e| &e.lineage_id == parent) {
                return Err(CortexError::InvalidInput(format!(
                    "parent_lineage_id {parent} does not reference a prior event of task {task_id}"
                )));
            }
        }

        let now = self.clock.now();
        let event = LineageEvent {
            lineage_id: format!("lin-{}", Uuid::new_v4().simple()),
            task_id: task_id.to_string(),
            event_type,
            timestamp: now,
            actor: LineageActor {
                actor_type,
                id: actor_id.to_string(),
                principal: self.principal.clone(),
            },
            event_data,
            parent_lineage_id,
            trace_context,
            version: 1,
        };

        let env = self.store.env();
        let paths = self.store.paths();
        self.store.append_jsonl(&paths.lineage_global(env), &event)?;
        self.store
            .append_jsonl(&paths.lineage_daily(env, now), &event)?;
        Ok(event.lineage_id)
    }

    fn all(&self) -> Result<Vec<LineageEvent>> {
        let path = self.store.paths().lineage_global(self.store.env());
        self.store.read_jsonl(&path)
    }

    /// All events for one task, in append order.
    pub fn by_task(&self, task_id: &str) -> Result<Vec<LineageEvent>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect())
    }

    /// All events recorded by one actor id.
    pub fn by_actor(&self, actor_id: &str) -> Result<Vec<LineageEvent>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.actor.id == actor_id)
            .collect())
    }

    /// All events of one type.
    pub fn by_type(&self, event_type: LineageEventType) -> Result<Vec<LineageEvent>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect())
    }

    /// Aggregate counts by event type and by task.
    pub fn stats(&self) -> Result<LineageStats> {
        let events = self.all()?;
        let mut by_event_type = BTreeMap::new();
        let mut tasks = std::collections::BTreeSet::new();
        for event in &events {
            *by_event_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0u64) += 1;
            tasks.insert(event.task_id.clone());
        }
        Ok(LineageStats {
            total_events: events.len() as u64,
            distinct_tasks: tasks.len() as u64,
            by_event_type,
        })
    }
}

/// Aggregate lineage statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LineageStats {
    pub total_events: u64,
    pub distinct_tasks: u64,
    pub by_event_type: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Environment;
    use crate::domain::SystemClock;
    use tempfile::TempDir;

    fn recorder_fixture(dir: &TempDir) -> (Store, SystemClock) {
        (Store::new(dir.path(), Environment::Dev), SystemClock)
    }

    #[test]
    fn test_record_and_query_by_task() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = recorder_fixture(&dir);
        let recorder = LineageRecorder::new(&store, &clock).with_principal(Some("ci".into()));

        let created = recorder
            .record(
                "t1",
                LineageEventType::TaskCreated,
                ActorType::System,
                "intake",
                Value::Null,
                None,
                None,
            )
            .unwrap();
        recorder
            .record(
                "t1",
                LineageEventType::TaskAssigned,
                ActorType::Master,
                "security-master",
                serde_json::json!({"master": "security-master"}),
                Some(created.clone()),
                None,
            )
            .unwrap();
        recorder
            .record(
                "t2",
                LineageEventType::TaskCreated,
                ActorType::System,
                "intake",
                Value::Null,
                None,
                None,
            )
            .unwrap();

        let t1 = recorder.by_task("t1").unwrap();
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[0].event_type, LineageEventType::TaskCreated);
        assert_eq!(t1[1].event_type, LineageEventType::TaskAssigned);
        assert_eq!(t1[1].parent_lineage_id.as_deref(), Some(created.as_str()));
        assert_eq!(t1[0].actor.principal.as_deref(), Some("ci"));
    }

    #[test]
    fn test_parent_must_reference_same_task() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = recorder_fixture(&dir);
        let recorder = LineageRecorder::new(&store, &clock);

        let other = recorder
            .record(
                "t1",
                LineageEventType::TaskCreated,
                ActorType::System,
                "intake",
                Value::Null,
                None,
                None,
            )
            .unwrap();

        let err = recorder
            .record(
                "t2",
                LineageEventType::TaskAssigned,
                ActorType::Master,
                "m",
                Value::Null,
                Some(other),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CortexError::InvalidInput(_)));
    }

    #[test]
    fn test_by_actor_and_type_and_stats() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = recorder_fixture(&dir);
        let recorder = LineageRecorder::new(&store, &clock);

        for task in ["t1", "t2", "t3"] {
            recorder
                .record(
                    task,
                    LineageEventType::TaskCreated,
                    ActorType::System,
                    "intake",
                    Value::Null,
                    None,
                    None,
                )
                .unwrap();
        }
        recorder
            .record(
                "t1",
                LineageEventType::WorkerSpawned,
                ActorType::Master,
                "development-master",
                Value::Null,
                None,
                None,
            )
            .unwrap();

        assert_eq!(recorder.by_actor("intake").unwrap().len(), 3);
        assert_eq!(
            recorder
                .by_type(LineageEventType::WorkerSpawned)
                .unwrap()
                .len(),
            1
        );

        let stats = recorder.stats().unwrap();
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.distinct_tasks, 3);
        assert_eq!(stats.by_event_type["task_created"], 3);
    }
}
