//! Worker spec builder commands.

use std::path::PathBuf;

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::services::checkpoints::CheckpointValidator;
use crate::services::spec_builder::{SpecBuilder, SpecRequest};
use crate::services::validator;

use super::AppContext;

#[allow(clippy::too_many_arguments)]
pub fn handle_build(
    ctx: &AppContext,
    worker_id: String,
    worker_type: String,
    task_id: String,
    token_budget: Option<u64>,
    timeout_minutes: Option<u64>,
    scope: String,
    context: String,
    output_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let scope = validator::validate_json_syntax(&scope)?;
    let context = validator::validate_json_syntax(&context)?;
    let created_by = ctx
        .config
        .principal
        .clone()
        .unwrap_or_else(|| "cli".to_string());

    let builder = SpecBuilder::new(&ctx.store, &ctx.clock, &ctx.config);
    let spec = builder.build_and_emit(SpecRequest {
        worker_id,
        worker_type,
        created_by,
        task_id,
        scope,
        context,
        token_budget,
        timeout_minutes,
        max_retries: None,
        deliverables: Vec::new(),
        checkpoint_criteria: Vec::new(),
        operations: Vec::new(),
        data_access: Vec::new(),
        approval_id: None,
        audit_trail: false,
    })?;

    if let Some(path) = output_path {
        let doc = serde_json::to_value(&spec)
            .map_err(|e| CortexError::FatalInvariant(format!("spec serialization: {e}")))?;
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&doc)
                .map_err(|e| CortexError::FatalInvariant(e.to_string()))?,
        )?;
    }

    if json {
        output::print_json(&spec);
    } else {
        println!(
            "emitted {} (type={}, tokens={}, timeout={}m)",
            spec.worker_id,
            spec.worker_type,
            spec.resources.token_budget,
            spec.resources.timeout_minutes
        );
    }
    Ok(())
}

pub fn handle_validate_checkpoint(
    ctx: &AppContext,
    worker_id: String,
    checkpoint_id: String,
    json: bool,
) -> Result<()> {
    let home = ctx
        .config
        .home
        .clone()
        .unwrap_or_else(|| ".".to_string());
    let validator = CheckpointValidator::new(&ctx.store, &ctx.clock, home);
    let validation = validator.validate(&worker_id, &checkpoint_id)?;
    if json {
        output::print_json(&validation);
    } else {
        println!(
            "{checkpoint_id}: {} ({})",
            if validation.validation_result {
                "passed"
            } else {
                "failed"
            },
            validation.validation_message
        );
    }
    if validation.validation_result {
        Ok(())
    } else {
        Err(CortexError::ValidationFailure(format!(
            "checkpoint {checkpoint_id} failed"
        )))
    }
}
