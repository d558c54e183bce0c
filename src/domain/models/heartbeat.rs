//! Heartbeat and worker-health domain model.
//!
//! The last written heartbeat snapshot is authoritative for a worker's
//! liveness. Phases are derived from the age of that snapshot, not
//! stored state, so a stalled monitor never freezes a worker healthy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Health classification from the 0-100 health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Map a health score to a status: >=80 healthy, 50-79 degraded,
    /// below 50 unhealthy.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=100 => Self::Healthy,
            50..=79 => Self::Degraded,
            _ => Self::Unhealthy,
        }
    }
}

/// Point-in-time resource sample reported with a heartbeat.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_mb: u64,
    pub tokens_used: u64,
    pub tokens_remaining: u64,
}

/// Computed health subtree of a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub status: HealthStatus,
    /// 0-100.
    pub health_score: u8,
    pub cpu_percent: f64,
    pub memory_mb: u64,
    pub tokens_used: u64,
    pub tokens_remaining: u64,
    pub active_for_seconds: i64,
    pub last_activity: String,
}

impl WorkerHealth {
    /// Compute the health score from a resource sample.
    ///
    /// Start at 100; subtract 15/30 at CPU >60/>80 percent, 15/30 at
    /// memory >512/>1024 MB, 20/40 when tokens remaining fall below
    /// 25%/10% of the total budget.
    pub fn score(sample: &ResourceSample) -> u8 {
        let mut score: i32 = 100;

        if sample.cpu_percent > 80.0 {
            score -= 30;
        } else if sample.cpu_percent > 60.0 {
            score -= 15;
        }

        if sample.memory_mb > 1024 {
            score -= 30;
        } else if sample.memory_mb > 512 {
            score -= 15;
        }

        let total = sample.tokens_used + sample.tokens_remaining;
        if total > 0 {
            let remaining_pct = sample.tokens_remaining as f64 / total as f64;
            if remaining_pct < 0.10 {
                score -= 40;
            } else if remaining_pct < 0.25 {
                score -= 20;
            }
        }

        score.clamp(0, 100) as u8
    }

    pub fn from_sample(sample: &ResourceSample, active_for_seconds: i64, activity: &str) -> Self {
        let health_score = Self::score(sample);
        Self {
            status: HealthStatus::from_score(health_score),
            health_score,
            cpu_percent: sample.cpu_percent,
            memory_mb: sample.memory_mb,
            tokens_used: sample.tokens_used,
            tokens_remaining: sample.tokens_remaining,
            active_for_seconds,
            last_activity: activity.to_string(),
        }
    }
}

/// Liveness phase derived from heartbeat age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatPhase {
    Healthy,
    Warning,
    Critical,
    Zombie,
}

impl HeartbeatPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Zombie => "zombie",
        }
    }
}

/// Phase thresholds, overridable through the HEARTBEAT_* environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatThresholds {
    pub interval_seconds: u64,
    pub warning_seconds: u64,
    pub critical_seconds: u64,
    pub zombie_seconds: u64,
}

impl Default for HeartbeatThresholds {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            warning_seconds: 60,
            critical_seconds: 120,
            zombie_seconds: 300,
        }
    }
}

impl HeartbeatThresholds {
    /// Derive the phase from time since the last heartbeat.
    ///
    /// Boundary ages land in the later phase: exactly 60s is warning,
    /// 120s critical, 300s zombie.
    pub fn phase(&self, age: Duration) -> HeartbeatPhase {
        let secs = age.num_seconds();
        if secs >= self.zombie_seconds as i64 {
            HeartbeatPhase::Zombie
        } else if secs >= self.critical_seconds as i64 {
            HeartbeatPhase::Critical
        } else if secs >= self.warning_seconds as i64 {
            HeartbeatPhase::Warning
        } else {
            HeartbeatPhase::Healthy
        }
    }
}

/// Liveness snapshot for one worker. Sequence is strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub health: WorkerHealth,
    #[serde(default)]
    pub missed_count: u32,
    /// Last phase the monitor observed; events fire only on phase entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase: Option<HeartbeatPhase>,
}
