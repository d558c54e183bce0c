//! Utility-based master routing.
//!
//! Scores each candidate master across speed, quality, cost, and
//! success-rate with context-adjusted weights, picks the argmax, and
//! persists the decision with per-objective contributions for audit.
//! Capability scores learn online from outcomes via a capped EMA.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::routing::{BudgetHint, DeadlineHint, MasterBaseline};
use crate::domain::models::{
    CandidateScore, Objective, ObjectiveWeights, OutcomeScores, RoutingContext, RoutingDecision,
    Task, TaskComplexity, TaskPriority,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// EMA step for historical adjustments.
const EMA_ALPHA: f64 = 0.2;
/// Historical adjustments are capped to this magnitude.
const ADJUSTMENT_CAP: f64 = 0.2;

/// Static capability baselines per master.
fn baselines() -> &'static [(&'static str, MasterBaseline)] {
    &[
        (
            "development-master",
            MasterBaseline {
                speed: 0.75,
                quality: 0.70,
                cost: 0.70,
                success_rate: 0.75,
            },
        ),
        (
            "security-master",
            MasterBaseline {
                speed: 0.60,
                quality: 0.85,
                cost: 0.55,
                success_rate: 0.85,
            },
        ),
        (
            "quality-master",
            MasterBaseline {
                speed: 0.65,
                quality: 0.80,
                cost: 0.65,
                success_rate: 0.80,
            },
        ),
        (
            "integration-master",
            MasterBaseline {
                speed: 0.70,
                quality: 0.70,
                cost: 0.60,
                success_rate: 0.70,
            },
        ),
        (
            "research-master",
            MasterBaseline {
                speed: 0.80,
                quality: 0.65,
                cost: 0.80,
                success_rate: 0.70,
            },
        ),
    ]
}

fn baseline_for(master_id: &str) -> MasterBaseline {
    baselines()
        .iter()
        .find(|(id, _)| *id == master_id)
        .map(|(_, b)| *b)
        .unwrap_or_else(|| {
            tracing::warn!(master_id, "no baseline for master; using neutral profile");
            MasterBaseline {
                speed: 0.65,
                quality: 0.65,
                cost: 0.65,
                success_rate: 0.65,
            }
        })
}

/// Base weights per task type, before context adjustment.
fn task_type_profile(task_type: &str) -> ObjectiveWeights {
    match task_type {
        "security-scan" | "security" => ObjectiveWeights {
            speed: 0.15,
            quality: 0.45,
            cost: 0.10,
            success_rate: 0.30,
        },
        "implementation" => ObjectiveWeights {
            speed: 0.20,
            quality: 0.40,
            cost: 0.15,
            success_rate: 0.25,
        },
        "documentation" => ObjectiveWeights {
            speed: 0.35,
            quality: 0.25,
            cost: 0.30,
            success_rate: 0.10,
        },
        "research" => ObjectiveWeights {
            speed: 0.25,
            quality: 0.30,
            cost: 0.25,
            success_rate: 0.20,
        },
        _ => ObjectiveWeights::default(),
    }
}

/// Learned per-(master, task_type, objective) deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityAdjustments {
    /// master -> task_type -> objective -> adjustment.
    #[serde(default)]
    pub adjustments: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl CapabilityAdjustments {
    pub fn get(&self, master_id: &str, task_type: &str, objective: Objective) -> f64 {
        self.adjustments
            .get(master_id)
            .and_then(|by_type| by_type.get(task_type))
            .and_then(|by_obj| by_obj.get(objective.as_str()))
            .copied()
            .unwrap_or(0.0)
    }

    fn entry(&mut self, master_id: &str, task_type: &str, objective: Objective) -> &mut f64 {
        self.adjustments
            .entry(master_id.to_string())
            .or_default()
            .entry(task_type.to_string())
            .or_default()
            .entry(objective.as_str().to_string())
            .or_insert(0.0)
    }
}

/// The router service.
pub struct Router<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> Router<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Apply context multipliers to profile weights, then normalize to
    /// sum 1.
    pub fn adjusted_weights(task_type: &str, context: &RoutingContext) -> ObjectiveWeights {
        let mut weights = task_type_profile(task_type);

        if context.priority == Some(TaskPriority::Critical) {
            weights.quality *= 1.5;
            weights.success_rate *= 1.3;
            weights.cost *= 0.5;
        }

        match context.complexity {
            Some(TaskComplexity::Complex) => {
                weights.quality *= 1.3;
                weights.success_rate *= 1.2;
            }
            Some(TaskComplexity::VeryComplex) => {
                weights.quality *= 1.5;
                weights.success_rate *= 1.4;
            }
            _ => {}
        }

        if context.deadline == Some(DeadlineHint::Urgent) {
            weights.speed *= 1.8;
            weights.quality *= 0.9;
        }

        if context.budget == Some(BudgetHint::Constrained) {
            weights.cost *= 1.6;
            weights.speed *= 0.8;
        }

        weights.normalized()
    }

    fn adjustments_path(&self) -> std::path::PathBuf {
        self.store.paths().capability_adjustments(self.store.env())
    }

    fn load_adjustments(&self) -> Result<CapabilityAdjustments> {
        self.store.read_json_or_default(&self.adjustments_path())
    }

    /// Capability score for one (master, objective) under a task type.
    fn capability(
        adjustments: &CapabilityAdjustments,
        master_id: &str,
        task_type: &str,
        objective: Objective,
    ) -> f64 {
        let baseline = baseline_for(master_id).get(objective);
        (baseline + adjustments.get(master_id, task_type, objective)).clamp(0.0, 1.0)
    }

    /// Select the master with the highest weighted utility. Ties break
    /// deterministically on master id order.
    pub fn select(
        &self,
        task: &Task,
        candidates: &[String],
        context: &RoutingContext,
    ) -> Result<RoutingDecision> {
        if candidates.is_empty() {
            return Err(CortexError::InvalidInput(
                "no candidate masters supplied".into(),
            ));
        }

        let weights = Self::adjusted_weights(&task.task_type, context);
        let adjustments = self.load_adjustments()?;

        let mut scored: Vec<CandidateScore> = candidates
            .iter()
            .map(|master_id| {
                let mut contributions = BTreeMap::new();
                let mut capabilities = BTreeMap::new();
                let mut utility = 0.0;
                for objective in Objective::ALL {
                    let capability =
                        Self::capability(&adjustments, master_id, &task.task_type, objective);
                    let contribution = weights.get(objective) * capability;
                    utility += contribution;
                    capabilities.insert(objective.as_str().to_string(), capability);
                    contributions.insert(objective.as_str().to_string(), contribution);
                }
                CandidateScore {
                    master_id: master_id.clone(),
                    utility,
                    contributions,
                    capabilities,
                }
            })
            .collect();

        // Deterministic tie-break: sort by id first, pick max by utility
        // with a strictly-greater comparison so the earlier id wins ties.
        scored.sort_by(|a, b| a.master_id.cmp(&b.master_id));
        let selected = scored
            .iter()
            .max_by(|a, b| {
                a.utility
                    .partial_cmp(&b.utility)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.master_id.cmp(&a.master_id))
            })
            .cloned()
            .ok_or_else(|| CortexError::FatalInvariant("scored candidates empty".into()))?;

        let decision = RoutingDecision {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            candidates: scored,
            selected_master: selected.master_id.clone(),
            utility_score: selected.utility,
            weights,
            timestamp: self.clock.now(),
        };

        let path = self.store.paths().routing_decisions(self.store.env());
        self.store.append_jsonl(&path, &decision)?;
        Ok(decision)
    }

    /// Fold an observed outcome into the per-(master, task_type)
    /// adjustments: `adj += alpha * (observed - baseline)`, capped.
    pub fn update_performance(
        &self,
        master_id: &str,
        task_type: &str,
        outcome: &OutcomeScores,
    ) -> Result<CapabilityAdjustments> {
        for objective in Objective::ALL {
            let observed = outcome.get(objective);
            if !(0.0..=1.0).contains(&observed) {
                return Err(CortexError::InvalidInput(format!(
                    "outcome score for {} out of [0, 1]: {observed}",
                    objective.as_str()
                )));
            }
        }

        let _lock = self.store.lock("capability-adjustments")?;
        let mut adjustments = self.load_adjustments()?;
        let baseline = baseline_for(master_id);
        for objective in Objective::ALL {
            let observed = outcome.get(objective);
            let entry = adjustments.entry(master_id, task_type, objective);
            *entry = (*entry + EMA_ALPHA * (observed - baseline.get(objective)))
                .clamp(-ADJUSTMENT_CAP, ADJUSTMENT_CAP);
        }
        self.store
            .write_json_atomic(&self.adjustments_path(), &adjustments)?;
        Ok(adjustments)
    }

    /// Recorded decisions, newest last.
    pub fn decisions(&self) -> Result<Vec<RoutingDecision>> {
        self.store
            .read_jsonl(&self.store.paths().routing_decisions(self.store.env()))
    }
}
