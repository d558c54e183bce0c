//! Policy engine: versioned rule sets evaluated against JSON targets.
//!
//! Policies load once from JSON/YAML definitions into a typed condition
//! tree. A policy fails if any rule fails; every evaluation produces an
//! append-only result record and an audit entry.

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::policy::{EvaluationSummary, RuleResult};
use crate::domain::models::{
    Condition, EvaluationResult, Framework, Policy, PolicyEvaluation, PolicyRule,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

use super::checkpoints::lookup_dot_path;

/// Evaluate one condition against an optional field value.
pub fn evaluate_condition(condition: &Condition, value: Option<&Value>) -> bool {
    match condition {
        Condition::Exists => value.is_some(),
        Condition::NotExists => value.is_none(),
        Condition::Equals { value: expected } => value == Some(expected),
        Condition::NotEquals { value: expected } => value != Some(expected),
        Condition::Contains { value: needle } => contains(value, needle),
        Condition::NotContains { value: needle } => !contains(value, needle),
        Condition::Regex { pattern } => match (value.and_then(Value::as_str), Regex::new(pattern)) {
            (Some(s), Ok(re)) => re.is_match(s),
            _ => false,
        },
        Condition::GreaterThan { value: bound } => numeric(value).map_or(false, |n| n > *bound),
        Condition::LessThan { value: bound } => numeric(value).map_or(false, |n| n < *bound),
        Condition::GreaterOrEqual { value: bound } => {
            numeric(value).map_or(false, |n| n >= *bound)
        }
        Condition::LessOrEqual { value: bound } => numeric(value).map_or(false, |n| n <= *bound),
        Condition::In { values } => value.map_or(false, |v| values.contains(v)),
        Condition::NotIn { values } => value.map_or(true, |v| !values.contains(v)),
        Condition::IsType { expected } => value.map_or(false, |v| expected.matches(v)),
        Condition::All { conditions } => conditions.iter().all(|c| evaluate_condition(c, value)),
        Condition::Any { conditions } => conditions.iter().any(|c| evaluate_condition(c, value)),
        Condition::None { conditions } => !conditions.iter().any(|c| evaluate_condition(c, value)),
    }
}

fn contains(value: Option<&Value>, needle: &str) -> bool {
    match value {
        Some(Value::String(s)) => s.contains(needle),
        Some(Value::Array(items)) => items.iter().any(|item| match item {
            Value::String(s) => s == needle,
            other => other.to_string() == needle,
        }),
        _ => false,
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// The policy engine.
pub struct PolicyEngine<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Parse one policy definition from JSON or YAML text.
    pub fn parse(raw: &str, file_name: &str) -> Result<Policy> {
        let policy: Policy = if file_name.ends_with(".yaml") || file_name.ends_with(".yml") {
            serde_yaml::from_str(raw).map_err(|e| {
                CortexError::InvalidInput(format!("policy {file_name}: invalid YAML: {e}"))
            })?
        } else {
            serde_json::from_str(raw).map_err(|e| {
                CortexError::InvalidInput(format!("policy {file_name}: {e}"))
            })?
        };
        Self::validate_policy(&policy)?;
        Ok(policy)
    }

    /// Structural checks on a parsed policy.
    pub fn validate_policy(policy: &Policy) -> Result<()> {
        if policy.policy_id.trim().is_empty() {
            return Err(CortexError::ValidationFailure("policy_id is empty".into()));
        }
        if policy.rules.is_empty() {
            return Err(CortexError::ValidationFailure(format!(
                "policy {} has no rules",
                policy.policy_id
            )));
        }
        for rule in &policy.rules {
            if rule.field.trim().is_empty() {
                return Err(CortexError::ValidationFailure(format!(
                    "policy {}: rule with empty field",
                    policy.policy_id
                )));
            }
            validate_condition(&rule.condition).map_err(|e| {
                CortexError::ValidationFailure(format!("policy {}: {e}", policy.policy_id))
            })?;
        }
        Ok(())
    }

    /// Load every policy definition on disk.
    pub fn load_all(&self) -> Result<Vec<Policy>> {
        let dir = self.store.paths().policy_definitions();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut policies = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !(name.ends_with(".json") || name.ends_with(".yaml") || name.ends_with(".yml")) {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            policies.push(Self::parse(&raw, name)?);
        }
        policies.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
        Ok(policies)
    }

    /// Load one policy by id.
    pub fn load(&self, policy_id: &str) -> Result<Policy> {
        self.load_all()?
            .into_iter()
            .find(|p| p.policy_id == policy_id)
            .ok_or_else(|| CortexError::NotFound(format!("policy {policy_id}")))
    }

    /// Policies carrying a framework tag.
    pub fn by_framework(&self, framework: Framework) -> Result<Vec<Policy>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|p| p.frameworks.contains(&framework))
            .collect())
    }

    /// Evaluate one policy against a target document. The result is
    /// persisted and audited regardless of outcome.
    pub fn evaluate(
        &self,
        policy: &Policy,
        target: &Value,
        target_label: &str,
    ) -> Result<PolicyEvaluation> {
        let rule_results: Vec<RuleResult> = policy
            .rules
            .iter()
            .map(|rule| evaluate_rule(rule, target))
            .collect();

        let passed = rule_results.iter().filter(|r| r.passed).count();
        let failed = rule_results.len() - passed;
        let result = if failed == 0 {
            EvaluationResult::Pass
        } else {
            EvaluationResult::Fail
        };

        let evaluation = PolicyEvaluation {
            evaluation_id: format!("eval-{}", Uuid::new_v4().simple()),
            timestamp: self.clock.now(),
            policy_id: policy.policy_id.clone(),
            policy_version: policy.version.clone(),
            severity: policy.severity,
            frameworks: policy.frameworks.clone(),
            controls: policy.controls.clone(),
            target: target_label.to_string(),
            result,
            summary: EvaluationSummary {
                total_rules: rule_results.len(),
                passed,
                failed,
                compliance_percentage: if rule_results.is_empty() {
                    100.0
                } else {
                    100.0 * passed as f64 / rule_results.len() as f64
                },
            },
            rule_results,
        };

        self.store.write_json_atomic(
            &self.store.paths().policy_evaluation(&evaluation.evaluation_id),
            &evaluation,
        )?;
        self.store
            .append_jsonl(&self.store.paths().audit_log(), &evaluation)?;
        Ok(evaluation)
    }

    /// Evaluate every loaded policy against a target.
    pub fn evaluate_all(&self, target: &Value, target_label: &str) -> Result<Vec<PolicyEvaluation>> {
        self.load_all()?
            .iter()
            .map(|policy| self.evaluate(policy, target, target_label))
            .collect()
    }
}

fn evaluate_rule(rule: &PolicyRule, target: &Value) -> RuleResult {
    let value = lookup_dot_path(target, &rule.field);
    let passed = evaluate_condition(&rule.condition, value);
    RuleResult {
        rule_id: rule.rule_id.clone(),
        field: rule.field.clone(),
        passed,
        detail: if passed {
            format!("{} satisfied", rule.field)
        } else {
            format!(
                "{} = {} violates condition",
                rule.field,
                value.map_or_else(|| "<absent>".to_string(), Value::to_string)
            )
        },
        remediation: if passed { None } else { rule.remediation.clone() },
    }
}

/// Reject conditions that can never evaluate (bad regexes, empty
/// composites) at load time rather than evaluation time.
fn validate_condition(condition: &Condition) -> std::result::Result<(), String> {
    match condition {
        Condition::Regex { pattern } => Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| format!("invalid regex {pattern:?}: {e}")),
        Condition::All { conditions }
        | Condition::Any { conditions }
        | Condition::None { conditions } => {
            if conditions.is_empty() {
                return Err("empty composite condition".into());
            }
            conditions.iter().try_for_each(validate_condition)
        }
        _ => Ok(()),
    }
}
