//! Utility-based routing domain model.
//!
//! Routing scores candidate masters across four objectives with
//! context-adjusted weights. Decisions are persisted with the full
//! per-objective breakdown for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::task::{TaskComplexity, TaskPriority};

/// Scoring objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Speed,
    Quality,
    Cost,
    SuccessRate,
}

impl Objective {
    pub const ALL: [Objective; 4] = [
        Objective::Speed,
        Objective::Quality,
        Objective::Cost,
        Objective::SuccessRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Quality => "quality",
            Self::Cost => "cost",
            Self::SuccessRate => "success_rate",
        }
    }
}

/// Weights over the four objectives. Valid weights sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub speed: f64,
    pub quality: f64,
    pub cost: f64,
    pub success_rate: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            speed: 0.25,
            quality: 0.35,
            cost: 0.20,
            success_rate: 0.20,
        }
    }
}

impl ObjectiveWeights {
    pub fn get(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Speed => self.speed,
            Objective::Quality => self.quality,
            Objective::Cost => self.cost,
            Objective::SuccessRate => self.success_rate,
        }
    }

    pub fn set(&mut self, objective: Objective, value: f64) {
        match objective {
            Objective::Speed => self.speed = value,
            Objective::Quality => self.quality = value,
            Objective::Cost => self.cost = value,
            Objective::SuccessRate => self.success_rate = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.speed + self.quality + self.cost + self.success_rate
    }

    /// Normalize so the weights sum to 1.
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total <= f64::EPSILON {
            return Self::default();
        }
        Self {
            speed: self.speed / total,
            quality: self.quality / total,
            cost: self.cost / total,
            success_rate: self.success_rate / total,
        }
    }
}

/// Deadline pressure hint carried in the routing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineHint {
    Normal,
    Urgent,
}

/// Budget pressure hint carried in the routing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetHint {
    Normal,
    Constrained,
}

/// Context that adjusts objective weights before selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<TaskComplexity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DeadlineHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetHint>,
}

/// Static per-master capability baselines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MasterBaseline {
    pub speed: f64,
    pub quality: f64,
    pub cost: f64,
    pub success_rate: f64,
}

impl MasterBaseline {
    pub fn get(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Speed => self.speed,
            Objective::Quality => self.quality,
            Objective::Cost => self.cost,
            Objective::SuccessRate => self.success_rate,
        }
    }
}

/// Scored candidate with its per-objective contributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub master_id: String,
    pub utility: f64,
    /// objective -> weighted contribution to the utility.
    pub contributions: BTreeMap<String, f64>,
    /// objective -> raw capability score in [0, 1].
    pub capabilities: BTreeMap<String, f64>,
}

/// Persisted record of one routing event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task_id: String,
    pub task_type: String,
    pub candidates: Vec<CandidateScore>,
    pub selected_master: String,
    pub utility_score: f64,
    pub weights: ObjectiveWeights,
    pub timestamp: DateTime<Utc>,
}

/// Observed outcome scores fed back into the router, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutcomeScores {
    pub speed: f64,
    pub quality: f64,
    pub cost: f64,
    pub success: f64,
}

impl OutcomeScores {
    pub fn get(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Speed => self.speed,
            Objective::Quality => self.quality,
            Objective::Cost => self.cost,
            Objective::SuccessRate => self.success,
        }
    }
}
