//! Failure events, signatures, and mined patterns.
//!
//! Failure events are append-only observations; the pattern detector
//! buckets them into recurring signatures with banded confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed fault types emitted by the monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureEventType {
    ZombieDetected,
    WorkerPresumedDead,
    WorkerRestartAbandoned,
    CircuitBreakerTripped,
    HeartbeatCritical,
    WorkerTimeout,
    #[serde(other)]
    Unknown,
}

impl FailureEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZombieDetected => "zombie_detected",
            Self::WorkerPresumedDead => "worker_presumed_dead",
            Self::WorkerRestartAbandoned => "worker_restart_abandoned",
            Self::CircuitBreakerTripped => "circuit_breaker_tripped",
            Self::HeartbeatCritical => "heartbeat_critical",
            Self::WorkerTimeout => "worker_timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// An observed fault, appended to the failure event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub event_type: FailureEventType,
    pub worker_id: String,
    #[serde(default)]
    pub worker_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Top-level failure category a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Resource,
    Systemic,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Systemic => "systemic",
            Self::Unknown => "unknown",
        }
    }
}

/// Severity attached to a pattern. Never de-escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PatternSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Minimal matching signature: equal fields over the event shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureSignature {
    pub event_type: FailureEventType,
    pub worker_type: String,
}

impl FailureSignature {
    /// Fraction of equal fields between two signatures.
    pub fn similarity(&self, other: &Self) -> f64 {
        let mut equal = 0u32;
        if self.event_type == other.event_type {
            equal += 1;
        }
        if self.worker_type == other.worker_type {
            equal += 1;
        }
        f64::from(equal) / 2.0
    }
}

/// Similarity threshold for treating two signatures as the same pattern.
pub const SIGNATURE_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Occurrence bookkeeping for a pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternFrequency {
    pub total_occurrences: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A recurring failure signature crossing the frequency threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    pub pattern_id: String,
    pub category: FailureCategory,
    /// Sub-type within the category, e.g. `timeout` in `resource:timeout`.
    pub pattern_type: String,
    pub signature: FailureSignature,
    pub frequency: PatternFrequency,
    /// Banded: 0.33 at threshold, 0.67 at 2x, 1.00 at 3x.
    pub confidence: f64,
    pub severity: PatternSeverity,
    /// Recommended remediation, surfaced by the strategy selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix_action: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FailurePattern {
    /// `category:type` key, e.g. `resource:timeout`.
    pub fn category_type(&self) -> String {
        format!("{}:{}", self.category.as_str(), self.pattern_type)
    }

    /// Map an occurrence count to the confidence band given a threshold.
    pub fn confidence_band(occurrences: u64, threshold: u64) -> f64 {
        if occurrences >= threshold * 3 {
            1.00
        } else if occurrences >= threshold * 2 {
            0.67
        } else {
            0.33
        }
    }

    /// Severity escalates with the frequency band and never de-escalates.
    pub fn severity_band(occurrences: u64, threshold: u64, current: PatternSeverity) -> PatternSeverity {
        let banded = if occurrences >= threshold * 3 {
            PatternSeverity::Critical
        } else if occurrences >= threshold * 2 {
            PatternSeverity::High
        } else {
            PatternSeverity::Medium
        };
        banded.max(current)
    }
}

/// O(1) lookup counts maintained alongside the pattern log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternIndex {
    #[serde(default)]
    pub by_category: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_worker_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_severity: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_patterns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_similarity() {
        let a = FailureSignature {
            event_type: FailureEventType::ZombieDetected,
            worker_type: "implementation".into(),
        };
        let b = FailureSignature {
            event_type: FailureEventType::ZombieDetected,
            worker_type: "implementation".into(),
        };
        let c = FailureSignature {
            event_type: FailureEventType::ZombieDetected,
            worker_type: "test".into(),
        };
        let d = FailureSignature {
            event_type: FailureEventType::HeartbeatCritical,
            worker_type: "test".into(),
        };
        assert_eq!(a.similarity(&b), 1.0);
        assert_eq!(a.similarity(&c), 0.5);
        assert_eq!(a.similarity(&d), 0.0);
        assert!(a.similarity(&b) >= SIGNATURE_SIMILARITY_THRESHOLD);
        assert!(a.similarity(&c) < SIGNATURE_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(FailurePattern::confidence_band(3, 3), 0.33);
        assert_eq!(FailurePattern::confidence_band(5, 3), 0.33);
        assert_eq!(FailurePattern::confidence_band(6, 3), 0.67);
        assert_eq!(FailurePattern::confidence_band(8, 3), 0.67);
        assert_eq!(FailurePattern::confidence_band(9, 3), 1.00);
        assert_eq!(FailurePattern::confidence_band(40, 3), 1.00);
    }

    #[test]
    fn test_confidence_monotone_in_occurrences() {
        let mut last = 0.0;
        for n in 3..30 {
            let c = FailurePattern::confidence_band(n, 3);
            assert!(c >= last);
            last = c;
        }
    }

    #[test]
    fn test_severity_never_deescalates() {
        let s = FailurePattern::severity_band(3, 3, PatternSeverity::Critical);
        assert_eq!(s, PatternSeverity::Critical);
        let s = FailurePattern::severity_band(6, 3, PatternSeverity::Medium);
        assert_eq!(s, PatternSeverity::High);
        let s = FailurePattern::severity_band(9, 3, PatternSeverity::Medium);
        assert_eq!(s, PatternSeverity::Critical);
    }

    #[test]
    fn test_unknown_event_type_deserializes() {
        let ev: FailureEventType = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(ev, FailureEventType::Unknown);
    }
}
