//! Policy engine commands.

use std::path::Path;

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::Framework;
use crate::services::PolicyEngine;

use super::AppContext;

fn read_target(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn handle_evaluate(
    ctx: &AppContext,
    target_path: std::path::PathBuf,
    policy_id: String,
    json: bool,
) -> Result<()> {
    let target = read_target(&target_path)?;
    let engine = PolicyEngine::new(&ctx.store, &ctx.clock);
    let policy = engine.load(&policy_id)?;
    let evaluation = engine.evaluate(&policy, &target, &target_path.display().to_string())?;
    if json {
        output::print_json(&evaluation);
    } else {
        println!(
            "{}  {}  {:.1}% compliant ({}/{} rules)",
            evaluation.policy_id,
            evaluation.result.as_str(),
            evaluation.summary.compliance_percentage,
            evaluation.summary.passed,
            evaluation.summary.total_rules
        );
        for rule in evaluation.rule_results.iter().filter(|r| !r.passed) {
            println!(
                "  FAIL {}  {}{}",
                rule.field,
                rule.detail,
                rule.remediation
                    .as_ref()
                    .map(|r| format!(" (fix: {r})"))
                    .unwrap_or_default()
            );
        }
    }
    match evaluation.result {
        crate::domain::models::EvaluationResult::Pass => Ok(()),
        crate::domain::models::EvaluationResult::Fail => Err(CortexError::ValidationFailure(
            format!("policy {policy_id} failed"),
        )),
    }
}

pub fn handle_evaluate_all(
    ctx: &AppContext,
    target_path: std::path::PathBuf,
    json: bool,
) -> Result<()> {
    let target = read_target(&target_path)?;
    let engine = PolicyEngine::new(&ctx.store, &ctx.clock);
    let evaluations = engine.evaluate_all(&target, &target_path.display().to_string())?;
    if json {
        output::print_json(&evaluations);
    } else {
        output::print_table(
            &["policy", "result", "compliance"],
            evaluations
                .iter()
                .map(|e| {
                    vec![
                        e.policy_id.clone(),
                        e.result.as_str().to_string(),
                        format!("{:.1}%", e.summary.compliance_percentage),
                    ]
                })
                .collect(),
        );
    }
    let failed = evaluations
        .iter()
        .filter(|e| e.result == crate::domain::models::EvaluationResult::Fail)
        .count();
    if failed > 0 {
        return Err(CortexError::ValidationFailure(format!(
            "{failed} policy evaluations failed"
        )));
    }
    Ok(())
}

pub fn handle_list(ctx: &AppContext, framework: Option<String>, json: bool) -> Result<()> {
    let engine = PolicyEngine::new(&ctx.store, &ctx.clock);
    let policies = match framework {
        Some(raw) => {
            let fw = Framework::from_str(&raw)
                .ok_or_else(|| CortexError::InvalidInput(format!("unknown framework {raw:?}")))?;
            engine.by_framework(fw)?
        }
        None => engine.load_all()?,
    };
    if json {
        output::print_json(&policies);
    } else {
        output::print_table(
            &["id", "version", "severity", "frameworks", "rules"],
            policies
                .iter()
                .map(|p| {
                    vec![
                        p.policy_id.clone(),
                        p.version.clone(),
                        format!("{:?}", p.severity).to_lowercase(),
                        p.frameworks
                            .iter()
                            .map(|f| f.as_str())
                            .collect::<Vec<_>>()
                            .join(","),
                        p.rules.len().to_string(),
                    ]
                })
                .collect(),
        );
    }
    Ok(())
}

pub fn handle_validate(_ctx: &AppContext, policy_path: std::path::PathBuf, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&policy_path)?;
    let name = policy_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("policy.json");
    let policy = PolicyEngine::parse(&raw, name)?;
    if json {
        output::print_json(&policy);
    } else {
        println!("{} is valid ({} rules)", policy.policy_id, policy.rules.len());
    }
    Ok(())
}
