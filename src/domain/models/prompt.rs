//! Versioned prompts and A/B experiments.
//!
//! Prompt versions are immutable once written; the registry's `active`
//! pointer is the only mutable piece of state, and at most one version
//! per prompt id holds it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a prompt version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Draft,
    Active,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
        }
    }
}

/// Aggregated usage metrics for one version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptMetrics {
    pub uses: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_tokens: f64,
    pub avg_time_seconds: f64,
}

impl PromptMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.uses == 0 {
            return 0.0;
        }
        self.successes as f64 / self.uses as f64
    }

    /// Fold one observation into the running averages.
    pub fn record(&mut self, success: bool, tokens: u64, time_seconds: f64) {
        let n = self.uses as f64;
        self.avg_tokens = (self.avg_tokens * n + tokens as f64) / (n + 1.0);
        self.avg_time_seconds = (self.avg_time_seconds * n + time_seconds) / (n + 1.0);
        self.uses += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }
}

/// One immutable prompt version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub version_id: String,
    pub prompt_id: String,
    /// Semver string.
    pub version: String,
    pub content: String,
    /// SHA-256 of the content, hex-encoded.
    pub content_hash: String,
    pub status: PromptStatus,
    #[serde(default)]
    pub metrics: PromptMetrics,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Registry entry for one prompt id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Version string of the active version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// The prompt registry snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRegistry {
    #[serde(default)]
    pub prompts: BTreeMap<String, RegistryEntry>,
}

/// Which arm of an A/B test a task was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }
}

/// Per-variant outcome tallies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantStats {
    pub uses: u64,
    pub successes: u64,
    pub failures: u64,
}

impl VariantStats {
    pub fn success_rate(&self) -> f64 {
        if self.uses == 0 {
            return 0.0;
        }
        self.successes as f64 / self.uses as f64
    }
}

/// Confidence level of a declared winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceConfidence {
    High,
    Medium,
}

/// Significance verdict once both variants have enough uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Significance {
    pub winner: Variant,
    pub confidence: SignificanceConfidence,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbTestStatus {
    Active,
    Concluded,
}

/// A traffic-split experiment between two versions of one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTest {
    pub test_id: String,
    pub name: String,
    pub prompt_id: String,
    pub control_version: String,
    pub treatment_version: String,
    /// Percentage of traffic (0-100) routed to the treatment arm.
    pub traffic_split: u8,
    pub status: AbTestStatus,
    #[serde(default)]
    pub control: VariantStats,
    #[serde(default)]
    pub treatment: VariantStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<Significance>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concluded_at: Option<DateTime<Utc>>,
}

/// Minimum uses per variant before significance is checked.
pub const SIGNIFICANCE_MIN_USES: u64 = 30;
/// Success-rate delta for a high-confidence winner.
pub const SIGNIFICANCE_HIGH_DELTA: f64 = 0.10;
/// Success-rate delta for a medium-confidence winner.
pub const SIGNIFICANCE_MEDIUM_DELTA: f64 = 0.05;

impl AbTest {
    /// Check significance; `None` until both arms have enough samples or
    /// while the delta stays under the medium threshold.
    pub fn check_significance(&self) -> Option<Significance> {
        if self.control.uses < SIGNIFICANCE_MIN_USES || self.treatment.uses < SIGNIFICANCE_MIN_USES
        {
            return None;
        }
        let delta = self.treatment.success_rate() - self.control.success_rate();
        let confidence = if delta.abs() > SIGNIFICANCE_HIGH_DELTA {
            SignificanceConfidence::High
        } else if delta.abs() > SIGNIFICANCE_MEDIUM_DELTA {
            SignificanceConfidence::Medium
        } else {
            return None;
        };
        let winner = if delta > 0.0 {
            Variant::Treatment
        } else {
            Variant::Control
        };
        Some(Significance {
            winner,
            confidence,
            delta,
        })
    }
}
