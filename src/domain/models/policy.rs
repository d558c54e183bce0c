//! Policy definitions and evaluation results.
//!
//! Rules carry a dot-path `field` and a typed condition. Composite
//! conditions (`all`/`any`/`none`) nest sub-conditions; the whole tree
//! is parsed once at load and evaluated against JSON targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compliance framework tags policies are indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    NistCsf,
    Soc2,
    Owasp,
    Cis,
    Custom,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NistCsf => "nist-csf",
            Self::Soc2 => "soc2",
            Self::Owasp => "owasp",
            Self::Cis => "cis",
            Self::Custom => "custom",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nist-csf" | "nist_csf" => Some(Self::NistCsf),
            "soc2" => Some(Self::Soc2),
            "owasp" => Some(Self::Owasp),
            "cis" => Some(Self::Cis),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Policy severity, reported with evaluation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A typed condition over a rule's target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Equals { value: serde_json::Value },
    NotEquals { value: serde_json::Value },
    Contains { value: String },
    NotContains { value: String },
    Regex { pattern: String },
    GreaterThan { value: f64 },
    LessThan { value: f64 },
    GreaterOrEqual { value: f64 },
    LessOrEqual { value: f64 },
    In { values: Vec<serde_json::Value> },
    NotIn { values: Vec<serde_json::Value> },
    Exists,
    NotExists,
    IsType { expected: JsonType },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    None { conditions: Vec<Condition> },
}

/// JSON type names usable with `is_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Null => value.is_null(),
        }
    }
}

/// One rule of a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    /// Dot-path into the target document.
    pub field: String,
    pub condition: Condition,
    /// Hint surfaced when the rule fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// A versioned rule set evaluated against targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    #[serde(default = "default_policy_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub severity: PolicySeverity,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default)]
    pub controls: Vec<String>,
    pub rules: Vec<PolicyRule>,
}

fn default_policy_version() -> String {
    "1.0.0".to_string()
}

/// Pass/fail aggregate over a policy's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationResult {
    Pass,
    Fail,
}

impl EvaluationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

/// Per-rule evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub field: String,
    pub passed: bool,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Evaluation summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_rules: usize,
    pub passed: usize,
    pub failed: usize,
    pub compliance_percentage: f64,
}

/// Append-only record of one policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub evaluation_id: String,
    pub timestamp: DateTime<Utc>,
    pub policy_id: String,
    pub policy_version: String,
    pub severity: PolicySeverity,
    pub frameworks: Vec<Framework>,
    pub controls: Vec<String>,
    /// Description of the evaluated target.
    pub target: String,
    pub result: EvaluationResult,
    pub rule_results: Vec<RuleResult>,
    pub summary: EvaluationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_tagged_parse() {
        let json = serde_json::json!({"type": "greater_than", "value": 10.0});
        let cond: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(cond, Condition::GreaterThan { value: 10.0 });
    }

    #[test]
    fn test_nested_composite_parse() {
        let json = serde_json::json!({
            "type": "all",
            "conditions": [
                {"type": "exists"},
                {"type": "any", "conditions": [
                    {"type": "equals", "value": "a"},
                    {"type": "equals", "value": "b"}
                ]}
            ]
        });
        let cond: Condition = serde_json::from_value(json).unwrap();
        match cond {
            Condition::All { conditions } => {
                assert_eq!(conditions.len(), 2);
                assert!(matches!(conditions[1], Condition::Any { .. }));
            }
            other => panic!("expected all, got {other:?}"),
        }
    }

    #[test]
    fn test_framework_tags() {
        assert_eq!(Framework::from_str("nist-csf"), Some(Framework::NistCsf));
        assert_eq!(Framework::NistCsf.as_str(), "nist-csf");
        let json = serde_json::to_string(&Framework::NistCsf).unwrap();
        assert_eq!(json, "\"nist-csf\"");
    }

    #[test]
    fn test_json_type_matching() {
        assert!(JsonType::String.matches(&serde_json::json!("x")));
        assert!(JsonType::Number.matches(&serde_json::json!(3)));
        assert!(JsonType::Array.matches(&serde_json::json!([])));
        assert!(!JsonType::Object.matches(&serde_json::json!([])));
    }
}
