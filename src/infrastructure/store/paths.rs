//! Coordination directory layout.
//!
//! All persisted state lives under `<home>/coordination/`. Environment
//! scoped paths sit below `<env>/`; patterns, prompts, playbooks,
//! policies, worker specs, and checkpoints are shared across
//! environments.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::domain::models::Environment;

/// Path helpers over one coordination root.
#[derive(Debug, Clone)]
pub struct CoordinationPaths {
    root: PathBuf,
}

impl CoordinationPaths {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            root: home.as_ref().join("coordination"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subtree for one environment.
    pub fn env_root(&self, env: Environment) -> PathBuf {
        self.root.join(env.as_str())
    }

    /// Whether `path` lives inside some environment subtree, and which.
    pub fn env_of(&self, path: &Path) -> Option<Environment> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let first = rel.components().next()?.as_os_str().to_str()?;
        Environment::from_str(first)
    }

    // -- environment-scoped --

    pub fn task_queue(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("tasks").join("task-queue.json")
    }

    pub fn queue_pause_marker(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("tasks").join("queue-paused.json")
    }

    pub fn routing_decisions(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("routing").join("decisions.jsonl")
    }

    pub fn capability_adjustments(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("routing")
            .join("capability-adjustments.json")
    }

    pub fn allocation(&self, env: Environment, allocation_id: &str) -> PathBuf {
        self.env_root(env)
            .join("metrics")
            .join("allocations")
            .join(format!("{allocation_id}.json"))
    }

    pub fn allocation_history(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("metrics")
            .join("allocation-history.jsonl")
    }

    pub fn circuit_breakers(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("metrics")
            .join("circuit-breakers.json")
    }

    pub fn worker_pool(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("metrics").join("worker-pool.json")
    }

    pub fn token_budget(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("metrics").join("token-budget.json")
    }

    pub fn lineage_global(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("lineage")
            .join("task-lineage.jsonl")
    }

    pub fn lineage_daily(&self, env: Environment, day: DateTime<Utc>) -> PathBuf {
        self.env_root(env)
            .join("lineage")
            .join(format!("lineage-{}.jsonl", day.format("%Y-%m-%d")))
    }

    pub fn failure_events(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("events")
            .join("failure-events.jsonl")
    }

    pub fn dashboard_events(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("events")
            .join("dashboard-events.jsonl")
    }

    pub fn restart_events(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("events")
            .join("restart-events.jsonl")
    }

    pub fn compliance_events(&self, env: Environment) -> PathBuf {
        self.env_root(env)
            .join("events")
            .join("compliance-events.jsonl")
    }

    pub fn trace(&self, env: Environment, correlation_id: &str) -> PathBuf {
        self.env_root(env)
            .join("traces")
            .join(format!("{correlation_id}.jsonl"))
    }

    pub fn trace_daily(&self, env: Environment, day: DateTime<Utc>) -> PathBuf {
        self.env_root(env)
            .join("traces")
            .join("daily")
            .join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    pub fn logs(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("logs")
    }

    pub fn locks(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("locks")
    }

    pub fn temp(&self, env: Environment) -> PathBuf {
        self.env_root(env).join("tmp")
    }

    // -- shared across environments --

    pub fn failure_patterns(&self) -> PathBuf {
        self.root.join("patterns").join("failure-patterns.jsonl")
    }

    pub fn pattern_index(&self) -> PathBuf {
        self.root.join("patterns").join("pattern-index.json")
    }

    pub fn prompt_version(&self, prompt_id: &str, version: &str) -> PathBuf {
        // Prompt ids may contain path separators (e.g. workers/test);
        // flatten them for the version file name.
        let flat = prompt_id.replace('/', "--");
        self.root
            .join("prompts")
            .join("versions")
            .join(format!("{flat}-v{version}.json"))
    }

    pub fn prompt_registry(&self) -> PathBuf {
        self.root.join("prompts").join("registry.json")
    }

    pub fn ab_test(&self, test_id: &str) -> PathBuf {
        self.root
            .join("prompts")
            .join("ab-tests")
            .join(format!("{test_id}.json"))
    }

    pub fn worker_prompt(&self, worker_type: &str) -> PathBuf {
        self.root
            .join("prompts")
            .join("workers")
            .join(format!("{worker_type}.md"))
    }

    pub fn playbook_index(&self) -> PathBuf {
        self.root.join("remediation-playbooks").join("index.json")
    }

    pub fn remediation_history(&self) -> PathBuf {
        self.root.join("remediation-playbooks").join("history.jsonl")
    }

    pub fn remediation_execution(&self, execution_id: &str) -> PathBuf {
        self.root
            .join("remediation-playbooks")
            .join("executions")
            .join(format!("{execution_id}.json"))
    }

    pub fn remediation_approval(&self, approval_id: &str) -> PathBuf {
        self.root
            .join("remediation-playbooks")
            .join("approvals")
            .join(format!("{approval_id}.json"))
    }

    pub fn policy_definitions(&self) -> PathBuf {
        self.root.join("policies").join("policy-definitions")
    }

    pub fn policy_evaluation(&self, evaluation_id: &str) -> PathBuf {
        self.root
            .join("policies")
            .join("evaluation-results")
            .join(format!("{evaluation_id}.json"))
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root
            .join("policies")
            .join("audit-logs")
            .join("audit.jsonl")
    }

    pub fn worker_spec(&self, state: SpecState, worker_id: &str) -> PathBuf {
        self.root
            .join("worker-specs")
            .join(state.as_str())
            .join(format!("{worker_id}.json"))
    }

    pub fn checkpoint(&self, checkpoint_id: &str) -> PathBuf {
        self.root
            .join("checkpoints")
            .join(format!("{checkpoint_id}.json"))
    }
}

/// Which worker-spec store a spec currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecState {
    Active,
    Completed,
    Failed,
}

impl SpecState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const ALL: [SpecState; 3] = [SpecState::Active, SpecState::Completed, SpecState::Failed];
}
