//! Failure pattern detection.
//!
//! Classifies failure events deterministically, buckets them by
//! `(category, type, worker_type)` over a sliding window, and emits or
//! updates patterns once the frequency threshold is crossed. The
//! pattern log is append-only; the latest record per signature wins,
//! and the index maintains O(1) lookup counts.

use chrono::Duration;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::models::failure::PatternFrequency;
use crate::domain::models::{
    FailureCategory, FailureEvent, FailureEventType, FailurePattern, FailureSignature,
    PatternIndex, PatternSeverity,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// Default sliding window over failure events.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;
/// Occurrences required before a pattern is emitted.
pub const DEFAULT_FREQUENCY_THRESHOLD: u64 = 3;

/// Classification of one event into `category:type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: FailureCategory,
    pub pattern_type: &'static str,
}

/// Deterministic event classification.
pub fn classify(event: &FailureEvent) -> Classification {
    match event.event_type {
        FailureEventType::ZombieDetected | FailureEventType::WorkerPresumedDead => {
            let data = &event.data;
            if data.get("memory_mb").is_some() || data.get("out_of_memory").is_some() {
                Classification {
                    category: FailureCategory::Resource,
                    pattern_type: "out_of_memory",
                }
            } else if data.get("timeout").is_some() || data.get("timeout_minutes").is_some() {
                Classification {
                    category: FailureCategory::Resource,
                    pattern_type: "timeout",
                }
            } else {
                Classification {
                    category: FailureCategory::Resource,
                    pattern_type: "unresponsive",
                }
            }
        }
        FailureEventType::WorkerTimeout => Classification {
            category: FailureCategory::Resource,
            pattern_type: "timeout",
        },
        FailureEventType::WorkerRestartAbandoned => Classification {
            category: FailureCategory::Systemic,
            pattern_type: "max_retries_exceeded",
        },
        FailureEventType::CircuitBreakerTripped => Classification {
            category: FailureCategory::Systemic,
            pattern_type: "recurring_failure",
        },
        FailureEventType::HeartbeatCritical => Classification {
            category: FailureCategory::Resource,
            pattern_type: "degraded_performance",
        },
        FailureEventType::Unknown => Classification {
            category: FailureCategory::Unknown,
            pattern_type: "unclassified",
        },
    }
}

/// Recommended remediation surfaced with a pattern.
fn auto_fix_action(category: FailureCategory, pattern_type: &str) -> Option<String> {
    let action = match (category, pattern_type) {
        (FailureCategory::Resource, "timeout") => "increase the worker timeout budget",
        (FailureCategory::Resource, "out_of_memory") => "raise the memory allocation",
        (FailureCategory::Resource, "unresponsive") => "restart the worker and clean stale state",
        (FailureCategory::Resource, "degraded_performance") => "reduce concurrent load",
        (FailureCategory::Systemic, "recurring_failure") => {
            "reset the circuit breaker after a cooling period"
        }
        (FailureCategory::Systemic, "max_retries_exceeded") => "requeue the task for re-routing",
        _ => return None,
    };
    Some(action.to_string())
}

/// Report for one analysis run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisReport {
    pub events_in_window: usize,
    pub patterns_created: usize,
    pub patterns_updated: usize,
    pub patterns: Vec<FailurePattern>,
}

/// The pattern detector.
pub struct PatternDetector<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    frequency_threshold: u64,
}

impl<'a> PatternDetector<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            frequency_threshold: DEFAULT_FREQUENCY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.frequency_threshold = threshold.max(1);
        self
    }

    /// Latest version of each pattern, keyed by pattern id.
    pub fn current_patterns(&self) -> Result<Vec<FailurePattern>> {
        let log: Vec<FailurePattern> = self
            .store
            .read_jsonl(&self.store.paths().failure_patterns())?;
        let mut latest: BTreeMap<String, FailurePattern> = BTreeMap::new();
        for pattern in log {
            latest.insert(pattern.pattern_id.clone(), pattern);
        }
        Ok(latest.into_values().collect())
    }

    /// Look up one pattern by id.
    pub fn get(&self, pattern_id: &str) -> Result<Option<FailurePattern>> {
        Ok(self
            .current_patterns()?
            .into_iter()
            .find(|p| p.pattern_id == pattern_id))
    }

    /// Count events in the window matching a pattern's signature.
    pub fn occurrences_matching(
        &self,
        pattern: &FailurePattern,
        window_hours: i64,
    ) -> Result<u64> {
        let cutoff = self.clock.now() - Duration::hours(window_hours);
        let events: Vec<FailureEvent> = self
            .store
            .read_jsonl(&self.store.paths().failure_events(self.store.env()))?;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .filter(|e| {
                let c = classify(e);
                let signature = FailureSignature {
                    event_type: e.event_type,
                    worker_type: e.worker_type.clone(),
                };
                c.category == pattern.category
                    && c.pattern_type == pattern.pattern_type
                    && signature.similarity(&pattern.signature)
                        >= crate::domain::models::failure::SIGNATURE_SIMILARITY_THRESHOLD
            })
            .count() as u64)
    }

    /// Mine the failure event stream and emit/update patterns.
    pub fn analyze(&self, window_hours: i64) -> Result<AnalysisReport> {
        let now = self.clock.now();
        let cutoff = now - Duration::hours(window_hours);
        let events: Vec<FailureEvent> = self
            .store
            .read_jsonl(&self.store.paths().failure_events(self.store.env()))?;
        let windowed: Vec<&FailureEvent> =
            events.iter().filter(|e| e.timestamp >= cutoff).collect();

        // Bucket by (category, type, worker_type); remember the first
        // event of each bucket for the signature.
        let mut buckets: BTreeMap<(FailureCategory, &'static str, String), Vec<&FailureEvent>> =
            BTreeMap::new();
        for event in &windowed {
            let classification = classify(event);
            buckets
                .entry((
                    classification.category,
                    classification.pattern_type,
                    event.worker_type.clone(),
                ))
                .or_default()
                .push(event);
        }

        let existing = self.current_patterns()?;
        let mut by_signature: BTreeMap<(String, String), FailurePattern> = existing
            .into_iter()
            .map(|p| ((p.category_type(), p.signature.worker_type.clone()), p))
            .collect();

        let mut created = 0;
        let mut updated = 0;
        let mut touched = Vec::new();

        for ((category, pattern_type, worker_type), bucket) in buckets {
            let count = bucket.len() as u64;
            if count < self.frequency_threshold {
                continue;
            }
            let key = (
                format!("{}:{pattern_type}", category.as_str()),
                worker_type.clone(),
            );
            let confidence = FailurePattern::confidence_band(count, self.frequency_threshold);
            let first_seen = bucket.iter().map(|e| e.timestamp).min();
            let last_seen = bucket.iter().map(|e| e.timestamp).max();

            let pattern = match by_signature.remove(&key) {
                Some(mut existing) => {
                    existing.frequency.total_occurrences = count;
                    existing.frequency.first_seen =
                        existing.frequency.first_seen.or(first_seen);
                    existing.frequency.last_seen = last_seen;
                    // Confidence never regresses even if the window
                    // narrows between runs.
                    existing.confidence = existing.confidence.max(confidence);
                    existing.severity = FailurePattern::severity_band(
                        count,
                        self.frequency_threshold,
                        existing.severity,
                    );
                    existing.updated_at = now;
                    updated += 1;
                    existing
                }
                None => {
                    created += 1;
                    FailurePattern {
                        pattern_id: format!("pat-{}", Uuid::new_v4().simple()),
                        category,
                        pattern_type: pattern_type.to_string(),
                        signature: FailureSignature {
                            event_type: bucket[0].event_type,
                            worker_type: worker_type.clone(),
                        },
                        frequency: PatternFrequency {
                            total_occurrences: count,
                            first_seen,
                            last_seen,
                        },
                        confidence,
                        severity: FailurePattern::severity_band(
                            count,
                            self.frequency_threshold,
                            PatternSeverity::Medium,
                        ),
                        auto_fix_action: auto_fix_action(category, pattern_type),
                        created_at: now,
                        updated_at: now,
                    }
                }
            };

            self.store
                .append_jsonl(&self.store.paths().failure_patterns(), &pattern)?;
            touched.push(pattern);
        }

        self.rebuild_index()?;

        Ok(AnalysisReport {
            events_in_window: windowed.len(),
            patterns_created: created,
            patterns_updated: updated,
            patterns: touched,
        })
    }

    /// Recompute the O(1) lookup index from current patterns.
    fn rebuild_index(&self) -> Result<PatternIndex> {
        let patterns = self.current_patterns()?;
        let mut index = PatternIndex {
            total_patterns: patterns.len() as u64,
            updated_at: Some(self.clock.now()),
            ..Default::default()
        };
        for pattern in &patterns {
            *index
                .by_category
                .entry(pattern.category.as_str().to_string())
                .or_insert(0) += 1;
            *index
                .by_worker_type
                .entry(pattern.signature.worker_type.clone())
                .or_insert(0) += 1;
            *index
                .by_severity
                .entry(pattern.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        self.store
            .write_json_atomic(&self.store.paths().pattern_index(), &index)?;
        Ok(index)
    }
}
