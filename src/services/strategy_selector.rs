//! Strategy recall from prior outcomes.
//!
//! Combines three sources: semantic recall of similar prior tasks (an
//! external collaborator behind a port), avoidance strategies derived
//! from detected failure patterns, and worker types that have succeeded
//! for the task type. Emits a ranked list with a confidence score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::Result;
use crate::domain::models::WorkerSpec;
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

use super::pattern_detector::PatternDetector;
use super::task_queue::TaskQueueService;

/// A prior task surfaced by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalledTask {
    pub task_id: String,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,
    /// Semantic similarity in [0, 1].
    pub similarity: f64,
}

/// Port to the external vector recall collaborator.
#[async_trait]
pub trait VectorRecall: Send + Sync {
    async fn similar_tasks(&self, description: &str, k: usize) -> Result<Vec<RecalledTask>>;
}

/// Recall that returns nothing; used when no vector store is wired.
pub struct NoRecall;

#[async_trait]
impl VectorRecall for NoRecall {
    async fn similar_tasks(&self, _description: &str, _k: usize) -> Result<Vec<RecalledTask>> {
        Ok(Vec::new())
    }
}

/// Where a strategy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySource {
    VectorRecall,
    FailurePattern,
    LearnedRouting,
}

/// One ranked strategy suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub approach: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,
    /// Relevance in [0, 1].
    pub similarity: f64,
    pub source: StrategySource,
}

/// Ranked recall result.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRecommendation {
    pub strategies: Vec<Strategy>,
    /// Mean similarity of the emitted strategies, scaled to [0, 100].
    pub confidence: u8,
}

/// The strategy selector.
pub struct StrategySelector<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    recall: &'a dyn VectorRecall,
}

impl<'a> StrategySelector<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, recall: &'a dyn VectorRecall) -> Self {
        Self {
            store,
            clock,
            recall,
        }
    }

    /// Recall up to `max_k` strategies for a task.
    pub async fn select(
        &self,
        task_description: &str,
        task_type: &str,
        max_k: usize,
    ) -> Result<StrategyRecommendation> {
        let mut strategies = Vec::new();

        // 1. Semantic recall of prior similar tasks.
        for recalled in self.recall.similar_tasks(task_description, max_k).await? {
            strategies.push(Strategy {
                approach: recalled.strategy,
                worker_type: recalled.worker_type,
                similarity: recalled.similarity.clamp(0.0, 1.0),
                source: StrategySource::VectorRecall,
            });
        }

        // 2. Avoidance strategies from detected failure patterns.
        let detector = PatternDetector::new(self.store, self.clock);
        for pattern in detector.current_patterns()? {
            let relevant = pattern.signature.worker_type == task_type
                || pattern.severity >= crate::domain::models::PatternSeverity::High;
            if !relevant {
                continue;
            }
            if let Some(action) = &pattern.auto_fix_action {
                strategies.push(Strategy {
                    approach: format!(
                        "{action} to avoid recurring {} failures",
                        pattern.category_type()
                    ),
                    worker_type: Some(pattern.signature.worker_type.clone()),
                    similarity: pattern.confidence,
                    source: StrategySource::FailurePattern,
                });
            }
        }

        // 3. Worker types with the best recorded success rate for this
        //    task type.
        for (worker_type, rate) in self.success_rates(task_type)? {
            strategies.push(Strategy {
                approach: format!("route to a {worker_type} worker ({:.0}% success)", rate * 100.0),
                worker_type: Some(worker_type),
                similarity: rate,
                source: StrategySource::LearnedRouting,
            });
        }

        strategies.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        strategies.truncate(max_k);

        let confidence = if strategies.is_empty() {
            0
        } else {
            let mean =
                strategies.iter().map(|s| s.similarity).sum::<f64>() / strategies.len() as f64;
            (mean * 100.0).round().clamp(0.0, 100.0) as u8
        };

        Ok(StrategyRecommendation {
            strategies,
            confidence,
        })
    }

    /// Success rate per worker type for this task type, best first,
    /// computed from the terminal spec stores joined with the queue.
    fn success_rates(&self, task_type: &str) -> Result<Vec<(String, f64)>> {
        let queue = TaskQueueService::new(self.store, self.clock);
        let mut tallies: BTreeMap<String, (u64, u64)> = BTreeMap::new();

        for (state, succeeded) in [(SpecState::Completed, true), (SpecState::Failed, false)] {
            let dir = self
                .store
                .paths()
                .worker_spec(state, "probe")
                .parent()
                .map(std::path::Path::to_path_buf);
            let Some(dir) = dir else { continue };
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.extension().map_or(true, |e| e != "json") {
                    continue;
                }
                let spec: WorkerSpec = self.store.read_json(&path)?;
                let Ok(task) = queue.get(&spec.task_id) else {
                    continue;
                };
                if task.task_type != task_type {
                    continue;
                }
                let tally = tallies.entry(spec.worker_type).or_insert((0, 0));
                tally.1 += 1;
                if succeeded {
                    tally.0 += 1;
                }
            }
        }

        let mut rates: Vec<(String, f64)> = tallies
            .into_iter()
            .filter(|(_, (_, total))| *total > 0)
            .map(|(wt, (ok, total))| (wt, ok as f64 / total as f64))
            .collect();
        rates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Environment, FailureEvent, FailureEventType};
    use crate::domain::FakeClock;
    use serde_json::json;
    use tempfile::TempDir;

    struct FixedRecall(Vec<RecalledTask>);

    #[async_trait]
    impl VectorRecall for FixedRecall {
        async fn similar_tasks(&self, _d: &str, k: usize) -> Result<Vec<RecalledTask>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_empty_sources_give_zero_confidence() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let selector = StrategySelector::new(&store, &clock, &NoRecall);
        let rec = selector.select("fix the parser", "bug-fix", 3).await.unwrap();
        assert!(rec.strategies.is_empty());
        assert_eq!(rec.confidence, 0);
    }

    #[tokio::test]
    async fn test_vector_recall_ranked_first_when_most_similar() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let recall = FixedRecall(vec![RecalledTask {
            task_id: "old-1".into(),
            strategy: "split the parser change into lexer and grammar passes".into(),
            worker_type: Some("implementation".into()),
            similarity: 0.92,
        }]);
        let selector = StrategySelector::new(&store, &clock, &recall);
        let rec = selector.select("refactor the parser", "refactor", 3).await.unwrap();
        assert_eq!(rec.strategies[0].source, StrategySource::VectorRecall);
        assert_eq!(rec.confidence, 92);
    }

    #[tokio::test]
    async fn test_failure_patterns_become_avoidance_strategies() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();

        // Mine a pattern for the test worker type
        for _ in 0..3 {
            let ev = FailureEvent {
                event_type: FailureEventType::ZombieDetected,
                worker_id: "worker-test-1".into(),
                worker_type: "test".into(),
                timestamp: clock.now(),
                data: json!({"timeout": 1800}),
            };
            store
                .append_jsonl(&store.paths().failure_events(Environment::Dev), &ev)
                .unwrap();
        }
        PatternDetector::new(&store, &clock).analyze(24).unwrap();

        let selector = StrategySelector::new(&store, &clock, &NoRecall);
        let rec = selector.select("run the suite", "test", 3).await.unwrap();
        assert_eq!(rec.strategies.len(), 1);
        let s = &rec.strategies[0];
        assert_eq!(s.source, StrategySource::FailurePattern);
        assert!(s.approach.contains("resource:timeout"));
        assert!((s.similarity - 0.33).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learned_routing_ranks_worker_types() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let sys = crate::domain::SystemClock;
        let queue = crate::services::task_queue::TaskQueueService::new(&store, &sys);
        queue
            .submit(crate::domain::models::Task::new("t1", "bug-fix", "seeded"))
            .unwrap();

        // Two completed implementation workers, one failed debug worker
        let mk = |worker_id: &str, worker_type: &str, state: SpecState| {
            let spec = serde_json::json!({
                "worker_id": worker_id,
                "worker_type": worker_type,
                "created_by": "development-master",
                "task_id": "t1",
                "status": if state == SpecState::Completed { "completed" } else { "failed" },
                "scope": {},
                "context": {},
                "resources": {"token_budget": 5000, "timeout_minutes": 30, "max_retries": 2},
                "prompt_ref": format!("coordination/prompts/workers/{worker_type}.md"),
                "created_at": clock.now(),
            });
            store
                .write_json_atomic(&store.paths().worker_spec(state, worker_id), &spec)
                .unwrap();
        };
        mk("worker-implementation-s1", "implementation", SpecState::Completed);
        mk("worker-implementation-s2", "implementation", SpecState::Completed);
        mk("worker-debug-s1", "debug", SpecState::Failed);

        let selector = StrategySelector::new(&store, &clock, &NoRecall);
        let rec = selector.select("fix it", "bug-fix", 3).await.unwrap();
        let routed: Vec<&Strategy> = rec
            .strategies
            .iter()
            .filter(|s| s.source == StrategySource::LearnedRouting)
            .collect();
        assert_eq!(routed.len(), 2);
        assert_eq!(routed[0].worker_type.as_deref(), Some("implementation"));
        assert!((routed[0].similarity - 1.0).abs() < 1e-9);
        assert!((routed[1].similarity - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_truncates_to_max_k_and_ranks_by_similarity() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = FakeClock::default();
        let recall = FixedRecall(vec![
            RecalledTask {
                task_id: "a".into(),
                strategy: "low".into(),
                worker_type: None,
                similarity: 0.2,
            },
            RecalledTask {
                task_id: "b".into(),
                strategy: "high".into(),
                worker_type: None,
                similarity: 0.9,
            },
            RecalledTask {
                task_id: "c".into(),
                strategy: "mid".into(),
                worker_type: None,
                similarity: 0.5,
            },
        ]);
        let selector = StrategySelector::new(&store, &clock, &recall);
        let rec = selector.select("anything", "bug-fix", 2).await.unwrap();
        assert_eq!(rec.strategies.len(), 2);
        assert_eq!(rec.strategies[0].approach, "high");
        assert_eq!(rec.strategies[1].approach, "mid");
    }
}
