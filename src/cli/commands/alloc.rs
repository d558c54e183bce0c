//! Allocation commands.

use uuid::Uuid;

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::{OutcomeKind, Task, TaskPriority};
use crate::services::Allocator;

use super::AppContext;

#[allow(clippy::too_many_arguments)]
pub fn handle_allocate(
    ctx: &AppContext,
    task_description: String,
    task_type: String,
    priority: String,
    file_count: Option<usize>,
    task_id: Option<String>,
    json: bool,
) -> Result<()> {
    let priority = TaskPriority::from_str(&priority)
        .ok_or_else(|| CortexError::InvalidInput(format!("unknown priority {priority:?}")))?;
    let id = task_id.unwrap_or_else(|| format!("task-{}", Uuid::new_v4().simple()));
    let mut task = Task::new(id, task_type, task_description).with_priority(priority);
    if let Some(count) = file_count {
        task.context_files = (0..count).map(|i| format!("file-{i}")).collect();
    }

    let allocator = Allocator::new(&ctx.store, &ctx.clock);
    let allocation = allocator.allocate(&task)?;
    if json {
        output::print_json(&allocation);
    } else {
        println!(
            "{}  complexity={}  tokens={}  time={}s  memory={}MB",
            allocation.allocation_id,
            allocation.complexity.as_str(),
            allocation.token_budget,
            allocation.time_budget_seconds,
            allocation.memory_mb
        );
    }
    Ok(())
}

pub fn handle_record_outcome(
    ctx: &AppContext,
    allocation_id: String,
    task_type: String,
    actual_tokens: u64,
    actual_time_seconds: u64,
    outcome: String,
    json: bool,
) -> Result<()> {
    let outcome = OutcomeKind::from_str(&outcome)
        .ok_or_else(|| CortexError::InvalidInput(format!("unknown outcome {outcome:?}")))?;
    let allocator = Allocator::new(&ctx.store, &ctx.clock);
    let record = allocator.record_usage(
        &allocation_id,
        &task_type,
        actual_tokens,
        actual_time_seconds,
        outcome,
    )?;
    if json {
        output::print_json(&record);
    } else {
        println!(
            "recorded {}: utilization={:.2} efficiency={:.2}",
            record.allocation_id, record.utilization, record.efficiency
        );
    }
    Ok(())
}

pub fn handle_extend(
    ctx: &AppContext,
    allocation_id: String,
    reason: String,
    requested_tokens: u64,
    json: bool,
) -> Result<()> {
    let allocator = Allocator::new(&ctx.store, &ctx.clock);
    let allocation = allocator.extend(&allocation_id, &reason, requested_tokens)?;
    if json {
        output::print_json(&allocation);
    } else {
        let granted = allocation
            .extensions
            .last()
            .map_or(0, |e| e.granted_tokens);
        println!(
            "extended {} by {} tokens (effective budget {})",
            allocation.allocation_id,
            granted,
            allocation.effective_budget()
        );
    }
    Ok(())
}
