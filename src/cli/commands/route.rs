//! Routing commands.

use serde::Deserialize;

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::{
    OutcomeScores, RoutingContext, Task, TaskPriority, TaskStatus,
};
use crate::services::Router;

use super::AppContext;

/// Task document accepted by `route select`.
#[derive(Debug, Deserialize)]
struct TaskInput {
    id: String,
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    priority: Option<String>,
    description: String,
    #[serde(default)]
    context: Option<RoutingContext>,
}

pub fn handle_select(
    ctx: &AppContext,
    task_json: String,
    candidates: Vec<String>,
    json: bool,
) -> Result<()> {
    let input: TaskInput = serde_json::from_str(&task_json)?;
    let priority = match &input.priority {
        Some(raw) => TaskPriority::from_str(raw)
            .ok_or_else(|| CortexError::InvalidInput(format!("unknown priority {raw:?}")))?,
        None => TaskPriority::default(),
    };

    let mut task = Task::new(input.id, input.task_type, input.description).with_priority(priority);
    task.status = TaskStatus::Pending;

    let mut context = input.context.unwrap_or_default();
    if context.priority.is_none() {
        context.priority = Some(priority);
    }

    let router = Router::new(&ctx.store, &ctx.clock);
    let decision = router.select(&task, &candidates, &context)?;
    if json {
        output::print_json(&decision);
    } else {
        println!(
            "selected {} (utility {:.4}) for task {}",
            decision.selected_master, decision.utility_score, decision.task_id
        );
        output::print_table(
            &["master", "utility"],
            decision
                .candidates
                .iter()
                .map(|c| vec![c.master_id.clone(), format!("{:.4}", c.utility)])
                .collect(),
        );
    }
    Ok(())
}

pub fn handle_update_performance(
    ctx: &AppContext,
    master: String,
    task_type: String,
    outcome_json: String,
    json: bool,
) -> Result<()> {
    let outcome: OutcomeScores = serde_json::from_str(&outcome_json)?;
    let router = Router::new(&ctx.store, &ctx.clock);
    let adjustments = router.update_performance(&master, &task_type, &outcome)?;
    if json {
        output::print_json(&adjustments);
    } else {
        println!("updated capability adjustments for {master} / {task_type}");
    }
    Ok(())
}
