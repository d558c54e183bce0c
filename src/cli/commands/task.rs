//! Task intake and queue inspection.

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::services::TaskQueueService;

use super::AppContext;

pub fn handle_submit(
    ctx: &AppContext,
    task_id: String,
    task_type: String,
    description: String,
    priority: String,
    json: bool,
) -> Result<()> {
    let priority = TaskPriority::from_str(&priority)
        .ok_or_else(|| CortexError::InvalidInput(format!("unknown priority {priority:?}")))?;
    let task = Task::new(task_id, task_type, description).with_priority(priority);
    let queue = TaskQueueService::new(&ctx.store, &ctx.clock);
    let submitted = queue.submit(task)?;

    if json {
        output::print_json(&submitted);
    } else {
        println!("submitted task {} ({})", submitted.id, submitted.task_type);
    }
    Ok(())
}

pub fn handle_show(ctx: &AppContext, task_id: String, json: bool) -> Result<()> {
    let queue = TaskQueueService::new(&ctx.store, &ctx.clock);
    let task = queue.get(&task_id)?;
    if json {
        output::print_json(&task);
    } else {
        println!(
            "{}  type={}  priority={}  status={}  master={}",
            task.id,
            task.task_type,
            task.priority.as_str(),
            task.status.as_str(),
            task.assigned_master.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn handle_list(ctx: &AppContext, status: Option<String>, json: bool) -> Result<()> {
    let filter = match status {
        Some(raw) => Some(
            TaskStatus::from_str(&raw)
                .ok_or_else(|| CortexError::InvalidInput(format!("unknown status {raw:?}")))?,
        ),
        None => None,
    };
    let queue = TaskQueueService::new(&ctx.store, &ctx.clock);
    let tasks = queue.list(filter)?;
    if json {
        output::print_json(&tasks);
    } else {
        output::print_table(
            &["id", "type", "priority", "status", "master"],
            tasks
                .iter()
                .map(|t| {
                    vec![
                        t.id.clone(),
                        t.task_type.clone(),
                        t.priority.as_str().to_string(),
                        t.status.as_str().to_string(),
                        t.assigned_master.clone().unwrap_or_else(|| "-".into()),
                    ]
                })
                .collect(),
        );
    }
    Ok(())
}
