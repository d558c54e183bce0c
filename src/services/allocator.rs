//! Resource allocator: complexity estimation and budget computation.
//!
//! Produces the resource envelope for a task from its description,
//! type, and priority, adjusted by the recent history of similar work.

use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::allocation::{MAX_TOKEN_BUDGET, MIN_TOKEN_BUDGET};
use crate::domain::models::{
    Allocation, AllocationExtension, AllocationOutcome, OutcomeKind, Task, TaskComplexity,
    TaskPriority,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// Keywords that push a task toward higher complexity.
const HIGH_COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture",
    "refactor",
    "migration",
    "distributed",
    "concurrency",
    "security",
    "performance",
    "infrastructure",
];

/// Keywords indicating moderate complexity.
const MODERATE_COMPLEXITY_KEYWORDS: &[&str] = &[
    "implement",
    "integrate",
    "api",
    "database",
    "pipeline",
    "protocol",
];

/// Keywords indicating trivial work.
const LOW_COMPLEXITY_KEYWORDS: &[&str] = &[
    "typo", "rename", "comment", "readme", "format", "bump", "whitespace",
];

/// Base token budgets per complexity level.
const fn base_tokens(level: TaskComplexity) -> u64 {
    match level {
        TaskComplexity::Simple => 5_000,
        TaskComplexity::Medium => 12_000,
        TaskComplexity::Complex => 25_000,
        TaskComplexity::VeryComplex => 50_000,
    }
}

/// Budget multiplier per task type.
fn type_multiplier(task_type: &str) -> f64 {
    match task_type {
        "implementation" => 1.5,
        "integration" => 1.3,
        "security-scan" => 1.2,
        "refactor" => 1.2,
        "review" => 1.1,
        "bug-fix" | "testing" => 1.0,
        "research" => 0.9,
        "documentation" => 0.8,
        _ => 1.0,
    }
}

const fn priority_multiplier(priority: TaskPriority) -> f64 {
    match priority {
        TaskPriority::Critical => 1.3,
        TaskPriority::High => 1.2,
        TaskPriority::Medium => 1.0,
        TaskPriority::Low => 0.9,
    }
}

/// Default cap on a single extension relative to the current budget.
const EXTENSION_FRACTION: f64 = 0.25;
/// Extensions allowed without policy approval.
const MAX_EXTENSIONS: usize = 1;
/// Samples required before the historical factor applies.
const MIN_HISTORY_SAMPLES: usize = 3;
/// Outcomes consulted for the historical factor.
const HISTORY_WINDOW: usize = 10;

/// The allocator service.
pub struct Allocator<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> Allocator<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Score a task's complexity: keyword hits over the type and
    /// description, description length band, file count band, and a
    /// priority bonus. Negative totals floor to 0.
    pub fn complexity_score(task: &Task) -> i64 {
        let description = task.description.to_lowercase();
        let haystack = format!("{} {description}", task.task_type.to_lowercase());
        let mut score: i64 = 0;

        for kw in HIGH_COMPLEXITY_KEYWORDS {
            if haystack.contains(kw) {
                score += 3;
            }
        }
        for kw in MODERATE_COMPLEXITY_KEYWORDS {
            if haystack.contains(kw) {
                score += 1;
            }
        }
        for kw in LOW_COMPLEXITY_KEYWORDS {
            if haystack.contains(kw) {
                score -= 2;
            }
        }

        score += match description.len() {
            0..=99 => 0,
            100..=299 => 1,
            300..=599 => 2,
            _ => 3,
        };

        score += match task.context_files.len() {
            0 => 0,
            1..=2 => 1,
            3..=5 => 2,
            _ => 3,
        };

        score += match task.priority {
            TaskPriority::Critical => 2,
            TaskPriority::High => 1,
            _ => 0,
        };

        score.max(0)
    }

    /// Map a score to a complexity level.
    pub fn complexity_level(score: i64) -> TaskComplexity {
        match score {
            s if s >= 10 => TaskComplexity::VeryComplex,
            s if s >= 6 => TaskComplexity::Complex,
            s if s >= 3 => TaskComplexity::Medium,
            _ => TaskComplexity::Simple,
        }
    }

    /// Compute the resource envelope for a task and persist it.
    pub fn allocate(&self, task: &Task) -> Result<Allocation> {
        if task.description.trim().is_empty() {
            return Err(CortexError::InvalidInput(
                "task description is empty".into(),
            ));
        }

        let score = Self::complexity_score(task);
        let complexity = Self::complexity_level(score);

        let raw = base_tokens(complexity) as f64
            * type_multiplier(&task.task_type)
            * priority_multiplier(task.priority)
            * self.historical_factor(&task.task_type, complexity)?;

        let token_budget = (raw.round() as u64).clamp(MIN_TOKEN_BUDGET, MAX_TOKEN_BUDGET);
        if (raw.round() as u64) != token_budget {
            tracing::warn!(
                task_id = %task.id,
                raw = raw.round(),
                clamped = token_budget,
                "token budget clamped"
            );
        }

        let allocation = Allocation {
            allocation_id: format!("alloc-{}", Uuid::new_v4().simple()),
            task_id: task.id.clone(),
            complexity,
            complexity_score: score,
            token_budget,
            time_budget_seconds: token_budget / 100,
            memory_mb: token_budget.div_ceil(1000).clamp(256, 4096),
            extension_limit: (token_budget as f64 * 1.5).round() as u64,
            created_at: self.clock.now(),
            extensions: Vec::new(),
            sealed: false,
        };

        let path = self
            .store
            .paths()
            .allocation(self.store.env(), &allocation.allocation_id);
        self.store.write_json_atomic(&path, &allocation)?;
        Ok(allocation)
    }

    /// Grant a budget extension of at most 25% of the current budget,
    /// capped by the allocation's extension limit. One extension per
    /// allocation; more require policy approval.
    pub fn extend(
        &self,
        allocation_id: &str,
        reason: &str,
        requested_tokens: u64,
    ) -> Result<Allocation> {
        let path = self.store.paths().allocation(self.store.env(), allocation_id);
        let mut allocation: Allocation = self.store.read_json(&path)?;

        if allocation.sealed {
            return Err(CortexError::PreconditionFailed(format!(
                "allocation {allocation_id} is sealed"
            )));
        }
        if allocation.extensions.len() >= MAX_EXTENSIONS {
            return Err(CortexError::PolicyDenied(format!(
                "allocation {allocation_id} already extended; further extensions require approval"
            )));
        }

        let current = allocation.effective_budget();
        let max_grant = ((current as f64 * EXTENSION_FRACTION).round() as u64)
            .min(allocation.extension_limit.saturating_sub(current));
        if max_grant == 0 {
            return Err(CortexError::PreconditionFailed(format!(
                "allocation {allocation_id} is at its extension limit"
            )));
        }

        let granted = requested_tokens.min(max_grant);
        allocation.extensions.push(AllocationExtension {
            reason: reason.to_string(),
            requested_tokens,
            granted_tokens: granted,
            granted_at: self.clock.now(),
        });
        self.store.write_json_atomic(&path, &allocation)?;
        Ok(allocation)
    }

    /// Record actual usage against an allocation and seal it.
    pub fn record_usage(
        &self,
        allocation_id: &str,
        task_type: &str,
        actual_tokens: u64,
        actual_time_seconds: u64,
        outcome: OutcomeKind,
    ) -> Result<AllocationOutcome> {
        let path = self.store.paths().allocation(self.store.env(), allocation_id);
        let mut allocation: Allocation = self.store.read_json(&path)?;
        if allocation.sealed {
            return Err(CortexError::PreconditionFailed(format!(
                "allocation {allocation_id} is already sealed"
            )));
        }

        let budget = allocation.effective_budget();
        let utilization = actual_tokens as f64 / budget as f64;
        let mut efficiency = efficiency_band(utilization);
        if outcome == OutcomeKind::Failure {
            efficiency /= 2.0;
        }

        let record = AllocationOutcome {
            allocation_id: allocation_id.to_string(),
            task_id: allocation.task_id.clone(),
            task_type: task_type.to_string(),
            complexity: allocation.complexity,
            token_budget: budget,
            actual_tokens,
            actual_time_seconds,
            utilization,
            efficiency,
            outcome,
            recorded_at: self.clock.now(),
        };

        let history = self.store.paths().allocation_history(self.store.env());
        self.store.append_jsonl(&history, &record)?;

        allocation.sealed = true;
        self.store.write_json_atomic(&path, &allocation)?;
        Ok(record)
    }

    /// Mean utilization of the last few same-(type, complexity)
    /// outcomes, clamped to [0.8, 1.1]. Applies only once at least
    /// three samples exist.
    fn historical_factor(&self, task_type: &str, complexity: TaskComplexity) -> Result<f64> {
        let history = self.store.paths().allocation_history(self.store.env());
        let outcomes: Vec<AllocationOutcome> = self.store.read_jsonl(&history)?;
        let recent: Vec<&AllocationOutcome> = outcomes
            .iter()
            .rev()
            .filter(|o| o.task_type == task_type && o.complexity == complexity)
            .take(HISTORY_WINDOW)
            .collect();

        if recent.len() < MIN_HISTORY_SAMPLES {
            return Ok(1.0);
        }
        let mean = recent.iter().map(|o| o.utilization).sum::<f64>() / recent.len() as f64;
        Ok(mean.clamp(0.8, 1.1))
    }
}

/// Efficiency bands over utilization: the sweet spot is 80-95% of
/// budget; overruns score worst.
fn efficiency_band(utilization: f64) -> f64 {
    if utilization > 1.0 {
        0.7
    } else if utilization > 0.95 {
        0.85
    } else if utilization >= 0.8 {
        1.0
    } else if utilization >= 0.7 {
        0.9
    } else {
        0.75
    }
}
