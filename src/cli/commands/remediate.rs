//! Remediation commands.

use serde_json::json;

use crate::cli::output;
use crate::domain::error::Result;
use crate::services::Remediator;

use super::AppContext;

pub fn handle_run(
    ctx: &AppContext,
    pattern_id: String,
    worker_type: Option<String>,
    worker_id: Option<String>,
    json_out: bool,
) -> Result<()> {
    let remediator = Remediator::new(&ctx.store, &ctx.clock);
    let context = json!({
        "worker_type": worker_type,
        "worker_id": worker_id,
    });
    let executions = remediator.remediate(&pattern_id, context)?;
    if json_out {
        output::print_json(&executions);
    } else if executions.is_empty() {
        println!("no enabled playbook matches pattern {pattern_id}");
    } else {
        for execution in &executions {
            println!(
                "{}  playbook={}  status={}",
                execution.execution_id,
                execution.playbook_id,
                execution.status.as_str()
            );
        }
    }
    Ok(())
}

pub fn handle_execute(
    ctx: &AppContext,
    playbook_id: String,
    dry_run: bool,
    json_out: bool,
) -> Result<()> {
    let remediator = Remediator::new(&ctx.store, &ctx.clock);
    let execution = remediator.execute(&playbook_id, json!({}), dry_run)?;
    if json_out {
        output::print_json(&execution);
    } else {
        println!(
            "{}  status={}  steps={}",
            execution.execution_id,
            execution.status.as_str(),
            execution.step_results.len()
        );
    }
    Ok(())
}

pub fn handle_validate(ctx: &AppContext, execution_id: String, json_out: bool) -> Result<()> {
    let remediator = Remediator::new(&ctx.store, &ctx.clock);
    let execution = remediator.validate(&execution_id)?;
    if json_out {
        output::print_json(&execution);
    } else {
        let validation = execution.validation.as_ref();
        println!(
            "{}  status={}  validation={}",
            execution.execution_id,
            execution.status.as_str(),
            validation.map_or("none".to_string(), |v| format!(
                "{} ({})",
                if v.passed { "passed" } else { "failed" },
                v.detail
            ))
        );
    }
    Ok(())
}
