//! Resource allocation domain model.
//!
//! An allocation is the resource envelope the allocator computes for a
//! task: token budget, derived time and memory budgets, and the hard
//! ceiling for budget extensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskComplexity;

/// Lower clamp for token budgets.
pub const MIN_TOKEN_BUDGET: u64 = 2_000;
/// Upper clamp for token budgets.
pub const MAX_TOKEN_BUDGET: u64 = 100_000;

/// Resource envelope computed for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub task_id: String,
    pub complexity: TaskComplexity,
    /// Raw complexity score the level was derived from.
    pub complexity_score: i64,
    pub token_budget: u64,
    /// Derived as token_budget / 100.
    pub time_budget_seconds: u64,
    /// Derived as ceil(token_budget / 1000), clamped to [256, 4096].
    pub memory_mb: u64,
    /// Hard ceiling for extensions: 1.5x the original token budget.
    pub extension_limit: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub extensions: Vec<AllocationExtension>,
    /// Set when the owning task reaches a terminal state; no further
    /// extensions or usage records are accepted after sealing.
    #[serde(default)]
    pub sealed: bool,
}

impl Allocation {
    /// Current effective token budget including granted extensions.
    pub fn effective_budget(&self) -> u64 {
        self.token_budget
            + self
                .extensions
                .iter()
                .map(|e| e.granted_tokens)
                .sum::<u64>()
    }
}

/// A granted budget extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationExtension {
    pub reason: String,
    pub requested_tokens: u64,
    pub granted_tokens: u64,
    pub granted_at: DateTime<Utc>,
}

/// Terminal outcome of the work an allocation funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" | "completed" => Some(Self::Success),
            "failure" | "failed" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Recorded usage for a sealed allocation; feeds the historical factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocation_id: String,
    pub task_id: String,
    pub task_type: String,
    pub complexity: TaskComplexity,
    pub token_budget: u64,
    pub actual_tokens: u64,
    pub actual_time_seconds: u64,
    /// actual_tokens / token_budget.
    pub utilization: f64,
    /// Band-mapped efficiency in [0, 1]; halved on failure.
    pub efficiency: f64,
    pub outcome: OutcomeKind,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(budget: u64) -> Allocation {
        Allocation {
            allocation_id: "alloc-1".into(),
            task_id: "t1".into(),
            complexity: TaskComplexity::Medium,
            complexity_score: 4,
            token_budget: budget,
            time_budget_seconds: budget / 100,
            memory_mb: (budget.div_ceil(1000)).clamp(256, 4096),
            extension_limit: budget + budget / 2,
            created_at: Utc::now(),
            extensions: Vec::new(),
            sealed: false,
        }
    }

    #[test]
    fn test_effective_budget_includes_extensions() {
        let mut alloc = allocation(10_000);
        assert_eq!(alloc.effective_budget(), 10_000);
        alloc.extensions.push(AllocationExtension {
            reason: "long tail".into(),
            requested_tokens: 3_000,
            granted_tokens: 2_500,
            granted_at: Utc::now(),
        });
        assert_eq!(alloc.effective_budget(), 12_500);
    }

    #[test]
    fn test_outcome_kind_parses_terminal_statuses() {
        assert_eq!(OutcomeKind::from_str("completed"), Some(OutcomeKind::Success));
        assert_eq!(OutcomeKind::from_str("failed"), Some(OutcomeKind::Failure));
        assert_eq!(OutcomeKind::from_str("unknown"), None);
    }
}
