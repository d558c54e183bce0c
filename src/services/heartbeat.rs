//! Heartbeat monitor: per-worker liveness and phased failure detection.
//!
//! Workers emit heartbeats every interval; the monitor derives phases
//! from the age of the last snapshot and emits exactly one failure
//! event on first entry into the critical and zombie phases. A zombie
//! worker's spec is moved to the failed store.

use chrono::Duration;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde_json::json;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{
    ActorType, FailureEvent, FailureEventType, Heartbeat, HeartbeatPhase, HeartbeatThresholds,
    LineageEventType, ResourceSample, TaskStatus, WorkerHealth, WorkerSpec, WorkerStatus,
};
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

use super::lineage::LineageRecorder;
use super::task_queue::TaskQueueService;

impl HeartbeatThresholds {
    /// Thresholds from the HEARTBEAT_* environment, falling back to
    /// defaults (30/60/120/300 seconds).
    pub fn from_env() -> Self {
        fn var(name: &str, default: u64) -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        let defaults = Self::default();
        Self {
            interval_seconds: var("HEARTBEAT_INTERVAL_SECONDS", defaults.interval_seconds),
            warning_seconds: var("HEARTBEAT_WARNING_THRESHOLD", defaults.warning_seconds),
            critical_seconds: var("HEARTBEAT_CRITICAL_THRESHOLD", defaults.critical_seconds),
            zombie_seconds: var("HEARTBEAT_ZOMBIE_THRESHOLD", defaults.zombie_seconds),
        }
    }
}

/// Outcome of one monitor sweep over a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCheck {
    pub worker_id: String,
    pub phase: HeartbeatPhase,
    /// Whether this sweep emitted a failure event (first phase entry).
    pub event_emitted: bool,
}

/// The heartbeat monitor.
pub struct HeartbeatMonitor<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    thresholds: HeartbeatThresholds,
}

impl<'a> HeartbeatMonitor<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, thresholds: HeartbeatThresholds) -> Self {
        Self {
            store,
            clock,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> HeartbeatThresholds {
        self.thresholds
    }

    fn active_spec_path(&self, worker_id: &str) -> std::path::PathBuf {
        self.store.paths().worker_spec(SpecState::Active, worker_id)
    }

    fn load_active(&self, worker_id: &str) -> Result<WorkerSpec> {
        self.store.read_json(&self.active_spec_path(worker_id))
    }

    /// Initialize a fresh heartbeat subtree on a worker's spec.
    pub fn init(&self, worker_id: &str) -> Result<Heartbeat> {
        let mut spec = self.load_active(worker_id)?;
        let heartbeat = Heartbeat {
            worker_id: worker_id.to_string(),
            sequence: 0,
            timestamp: self.clock.now(),
            health: WorkerHealth::from_sample(&ResourceSample::default(), 0, "initialized"),
            missed_count: 0,
            last_phase: Some(HeartbeatPhase::Healthy),
        };
        spec.heartbeat = Some(heartbeat.clone());
        self.store
            .write_json_atomic(&self.active_spec_path(worker_id), &spec)?;
        Ok(heartbeat)
    }

    /// Record one heartbeat: bump the sequence, recompute health, and
    /// atomically replace the snapshot. Initializes the subtree when the
    /// spec has none yet.
    pub fn emit(
        &self,
        worker_id: &str,
        activity: &str,
        sample: &ResourceSample,
    ) -> Result<Heartbeat> {
        let mut spec = self.load_active(worker_id)?;
        let now = self.clock.now();

        let previous = match spec.heartbeat.take() {
            Some(hb) => hb,
            None => Heartbeat {
                worker_id: worker_id.to_string(),
                sequence: 0,
                timestamp: now,
                health: WorkerHealth::from_sample(&ResourceSample::default(), 0, "initialized"),
                missed_count: 0,
                last_phase: Some(HeartbeatPhase::Healthy),
            },
        };

        let active_for = (now - spec.created_at).num_seconds().max(0);
        let heartbeat = Heartbeat {
            worker_id: worker_id.to_string(),
            sequence: previous.sequence + 1,
            timestamp: now,
            health: WorkerHealth::from_sample(sample, active_for, activity),
            missed_count: 0,
            last_phase: Some(HeartbeatPhase::Healthy),
        };
        spec.heartbeat = Some(heartbeat.clone());
        self.store
            .write_json_atomic(&self.active_spec_path(worker_id), &spec)?;
        Ok(heartbeat)
    }

    /// Derive the current phase of one worker and handle transitions.
    ///
    /// Emits `heartbeat_critical` on first entry to critical and
    /// `zombie_detected` on first entry to zombie; a zombie's spec is
    /// moved to the failed store with a reason. A worker whose task was
    /// cancelled is dropped immediately.
    pub fn check(&self, worker_id: &str) -> Result<PhaseCheck> {
        let spec = self.load_active(worker_id)?;

        let queue = TaskQueueService::new(self.store, self.clock);
        if let Ok(task) = queue.get(&spec.task_id) {
            if task.status == TaskStatus::Cancelled {
                self.fail_worker(spec, "task_cancelled", None)?;
                return Ok(PhaseCheck {
                    worker_id: worker_id.to_string(),
                    phase: HeartbeatPhase::Zombie,
                    event_emitted: false,
                });
            }
        }

        let Some(heartbeat) = spec.heartbeat.clone() else {
            return Err(CortexError::PreconditionFailed(format!(
                "worker {worker_id} has no heartbeat; call init first"
            )));
        };

        let age = self.clock.now() - heartbeat.timestamp;
        let phase = self.thresholds.phase(age);
        let entered = heartbeat.last_phase != Some(phase);

        let mut event_emitted = false;
        match phase {
            HeartbeatPhase::Critical if entered => {
                self.append_failure(&spec, FailureEventType::HeartbeatCritical, age)?;
                event_emitted = true;
            }
            HeartbeatPhase::Zombie if entered => {
                self.append_failure(&spec, FailureEventType::ZombieDetected, age)?;
                self.fail_worker(
                    spec,
                    &format!("zombie: no heartbeat for {}s", age.num_seconds()),
                    Some(heartbeat.sequence),
                )?;
                return Ok(PhaseCheck {
                    worker_id: worker_id.to_string(),
                    phase,
                    event_emitted: true,
                });
            }
            _ => {}
        }

        if entered {
            let mut updated = spec;
            if let Some(hb) = updated.heartbeat.as_mut() {
                hb.last_phase = Some(phase);
                if phase > HeartbeatPhase::Healthy {
                    hb.missed_count += 1;
                }
            }
            self.store
                .write_json_atomic(&self.active_spec_path(worker_id), &updated)?;
        }

        Ok(PhaseCheck {
            worker_id: worker_id.to_string(),
            phase,
            event_emitted,
        })
    }

    /// Sweep every worker in the active store.
    pub fn check_all(&self) -> Result<Vec<PhaseCheck>> {
        let dir = self
            .store
            .paths()
            .worker_spec(SpecState::Active, "probe")
            .parent()
            .map(std::path::Path::to_path_buf)
            .ok_or_else(|| CortexError::FatalInvariant("active store has no parent".into()))?;

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checks = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            checks.push(self.check(stem)?);
        }
        Ok(checks)
    }

    fn append_failure(
        &self,
        spec: &WorkerSpec,
        event_type: FailureEventType,
        age: Duration,
    ) -> Result<()> {
        let event = FailureEvent {
            event_type,
            worker_id: spec.worker_id.clone(),
            worker_type: spec.worker_type.clone(),
            timestamp: self.clock.now(),
            data: json!({
                "task_id": spec.task_id,
                "heartbeat_age_seconds": age.num_seconds(),
            }),
        };
        let path = self.store.paths().failure_events(self.store.env());
        self.store.append_jsonl(&path, &event)
    }

    /// Move a worker's spec to the failed store with a reason, record
    /// the lineage event, and advance its status.
    fn fail_worker(
        &self,
        mut spec: WorkerSpec,
        reason: &str,
        last_sequence: Option<u64>,
    ) -> Result<()> {
        spec.status = WorkerStatus::Failed;
        spec.failure_reason = Some(reason.to_string());
        spec.execution.completed_at = Some(self.clock.now());

        let from = self.active_spec_path(&spec.worker_id);
        let to = self
            .store
            .paths()
            .worker_spec(SpecState::Failed, &spec.worker_id);
        self.store.write_json_atomic(&from, &spec)?;
        self.store.rename(&from, &to)?;

        LineageRecorder::new(self.store, self.clock).record(
            &spec.task_id,
            LineageEventType::WorkerFailed,
            ActorType::System,
            "heartbeat-monitor",
            json!({
                "worker_id": spec.worker_id,
                "reason": reason,
                "last_sequence": last_sequence,
            }),
            None,
            None,
        )?;
        Ok(())
    }
}

/// Emitter daemon: heartbeats on an interval for as long as the owning
/// worker process is alive. Stops on worker exit or ctrl-c.
pub async fn run_emitter(
    store: Store,
    thresholds: HeartbeatThresholds,
    worker_id: String,
    worker_pid: i32,
) -> Result<()> {
    let clock = crate::domain::SystemClock;
    let monitor = HeartbeatMonitor::new(&store, &clock, thresholds);
    let interval = std::time::Duration::from_secs(thresholds.interval_seconds);

    loop {
        if kill(Pid::from_raw(worker_pid), None).is_err() {
            tracing::info!(worker_id, worker_pid, "worker process gone; emitter stopping");
            return Ok(());
        }

        monitor.emit(&worker_id, "alive", &ResourceSample::default())?;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(worker_id, "emitter cancelled");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CortexConfig, Environment, Task};
    use crate::domain::{FakeClock, SystemClock};
    use crate::services::spec_builder::{SpecBuilder, SpecRequest};
    use tempfile::TempDir;

    fn seed_worker(store: &Store, worker_id: &str) {
        let sys = SystemClock;
        let queue = TaskQueueService::new(store, &sys);
        if !queue.exists("t1").unwrap() {
            queue
                .submit(Task::new("t1", "bug-fix", "heartbeat test task"))
                .unwrap();
        }
        let config = CortexConfig::default();
        let request = SpecRequest {
            worker_id: worker_id.into(),
            worker_type: "test".into(),
            created_by: "quality-master".into(),
            task_id: "t1".into(),
            scope: serde_json::json!({}),
            context: serde_json::json!({}),
            token_budget: None,
            timeout_minutes: None,
            max_retries: None,
            deliverables: Vec::new(),
            checkpoint_criteria: Vec::new(),
            operations: Vec::new(),
            data_access: Vec::new(),
            approval_id: None,
            audit_trail: false,
        };
        SpecBuilder::new(store, &sys, &config)
            .build_and_emit(request)
            .unwrap();
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let monitor = HeartbeatMonitor::new(&store, &clock, HeartbeatThresholds::default());
        seed_worker(&store, "worker-test-hb1");

        monitor.init("worker-test-hb1").unwrap();
        let mut last = 0;
        for _ in 0..4 {
            clock.advance(Duration::seconds(30));
            let hb = monitor
                .emit("worker-test-hb1", "working", &ResourceSample::default())
                .unwrap();
            assert_eq!(hb.sequence, last + 1);
            last = hb.sequence;
        }
    }

    #[test]
    fn test_emit_without_init_bootstraps_heartbeat() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let monitor = HeartbeatMonitor::new(&store, &clock, HeartbeatThresholds::default());
        seed_worker(&store, "worker-test-hb2");

        let hb = monitor
            .emit("worker-test-hb2", "starting", &ResourceSample::default())
            .unwrap();
        assert_eq!(hb.sequence, 1);
    }

    #[test]
    fn test_phase_progression_emits_one_event_per_entry() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let monitor = HeartbeatMonitor::new(&store, &clock, HeartbeatThresholds::default());
        seed_worker(&store, "worker-test-hb3");
        monitor.init("worker-test-hb3").unwrap();
        monitor
            .emit("worker-test-hb3", "working", &ResourceSample::default())
            .unwrap();

        // +60s: warning, no event
        clock.advance(Duration::seconds(60));
        let check = monitor.check("worker-test-hb3").unwrap();
        assert_eq!(check.phase, HeartbeatPhase::Warning);
        assert!(!check.event_emitted);

        // Re-checking inside the same phase emits nothing
        let check = monitor.check("worker-test-hb3").unwrap();
        assert!(!check.event_emitted);

        // +120s total: critical, exactly one event
        clock.advance(Duration::seconds(60));
        let check = monitor.check("worker-test-hb3").unwrap();
        assert_eq!(check.phase, HeartbeatPhase::Critical);
        assert!(check.event_emitted);
        let check = monitor.check("worker-test-hb3").unwrap();
        assert!(!check.event_emitted);

        // +300s total: zombie, one event, spec moved to failed
        clock.advance(Duration::seconds(180));
        let check = monitor.check("worker-test-hb3").unwrap();
        assert_eq!(check.phase, HeartbeatPhase::Zombie);
        assert!(check.event_emitted);

        let events: Vec<FailureEvent> = store
            .read_jsonl(&store.paths().failure_events(Environment::Dev))
            .unwrap();
        let critical = events
            .iter()
            .filter(|e| e.event_type == FailureEventType::HeartbeatCritical)
            .count();
        let zombie = events
            .iter()
            .filter(|e| e.event_type == FailureEventType::ZombieDetected)
            .count();
        assert_eq!(critical, 1);
        assert_eq!(zombie, 1);

        let failed = store
            .paths()
            .worker_spec(SpecState::Failed, "worker-test-hb3");
        assert!(failed.exists());
        let spec: WorkerSpec = store.read_json(&failed).unwrap();
        assert_eq!(spec.status, WorkerStatus::Failed);
        assert!(spec.failure_reason.as_deref().unwrap().starts_with("zombie"));
        assert!(!store
            .paths()
            .worker_spec(SpecState::Active, "worker-test-hb3")
            .exists());
    }

    #[test]
    fn test_fresh_heartbeat_is_healthy() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let monitor = HeartbeatMonitor::new(&store, &clock, HeartbeatThresholds::default());
        seed_worker(&store, "worker-test-hb4");
        monitor.init("worker-test-hb4").unwrap();

        clock.advance(Duration::seconds(10));
        let check = monitor.check("worker-test-hb4").unwrap();
        assert_eq!(check.phase, HeartbeatPhase::Healthy);
        assert!(!check.event_emitted);
    }

    #[test]
    fn test_cancelled_task_drops_worker() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let monitor = HeartbeatMonitor::new(&store, &clock, HeartbeatThresholds::default());
        seed_worker(&store, "worker-test-hb5");
        monitor.init("worker-test-hb5").unwrap();

        let sys = SystemClock;
        TaskQueueService::new(&store, &sys)
            .update_status("t1", TaskStatus::Cancelled)
            .unwrap();

        monitor.check("worker-test-hb5").unwrap();
        let failed = store
            .paths()
            .worker_spec(SpecState::Failed, "worker-test-hb5");
        assert!(failed.exists());
        let spec: WorkerSpec = store.read_json(&failed).unwrap();
        assert_eq!(spec.failure_reason.as_deref(), Some("task_cancelled"));
    }

    #[tokio::test]
    async fn test_emitter_stops_when_worker_pid_gone() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        seed_worker(&store, "worker-test-hb6");

        // A PID far beyond pid_max never exists, so the emitter returns
        // on its first liveness probe without emitting.
        run_emitter(
            store.clone(),
            HeartbeatThresholds::default(),
            "worker-test-hb6".into(),
            999_999_999,
        )
        .await
        .unwrap();

        let spec: WorkerSpec = store
            .read_json(&store.paths().worker_spec(SpecState::Active, "worker-test-hb6"))
            .unwrap();
        assert!(spec.heartbeat.is_none());
    }

    #[test]
    fn test_thresholds_from_env() {
        temp_env::with_vars(
            [
                ("HEARTBEAT_INTERVAL_SECONDS", Some("10")),
                ("HEARTBEAT_WARNING_THRESHOLD", Some("20")),
                ("HEARTBEAT_CRITICAL_THRESHOLD", Some("40")),
                ("HEARTBEAT_ZOMBIE_THRESHOLD", Some("80")),
            ],
            || {
                let t = HeartbeatThresholds::from_env();
                assert_eq!(t.interval_seconds, 10);
                assert_eq!(t.warning_seconds, 20);
                assert_eq!(t.critical_seconds, 40);
                assert_eq!(t.zombie_seconds, 80);
            },
        );
        temp_env::with_var("HEARTBEAT_ZOMBIE_THRESHOLD", Some("garbage"), || {
            assert_eq!(HeartbeatThresholds::from_env().zombie_seconds, 300);
        });
    }
}
