//! Lineage and tracing commands.

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::{ActorType, LineageEventType, TraceContext};
use crate::services::{LineageRecorder, Tracer};

use super::AppContext;

pub fn handle_init_task_trace(
    ctx: &AppContext,
    task_id: String,
    component: String,
    json: bool,
) -> Result<()> {
    let trace = TraceContext::start(&ctx.clock, &component, "init-task-trace");
    let tracer = Tracer::new(&ctx.store, &ctx.clock);
    tracer.record(
        &trace,
        &component,
        "init-task-trace",
        serde_json::json!({"task_id": task_id}),
    )?;
    if json {
        output::print_json(&trace);
    } else {
        // Shell-friendly: eval-able export lines
        for (key, value) in trace.to_env() {
            println!("export {key}={value}");
        }
    }
    Ok(())
}

pub fn handle_emit_event(
    ctx: &AppContext,
    task_id: String,
    event_type: String,
    data: String,
    actor_type: String,
    actor_id: String,
    json: bool,
) -> Result<()> {
    let event_type = LineageEventType::from_str(&event_type)
        .ok_or_else(|| CortexError::InvalidInput(format!("unknown event type {event_type:?}")))?;
    let actor_type = match actor_type.to_lowercase().as_str() {
        "master" => ActorType::Master,
        "worker" => ActorType::Worker,
        "system" => ActorType::System,
        "human" => ActorType::Human,
        other => {
            return Err(CortexError::InvalidInput(format!(
                "unknown actor type {other:?}"
            )))
        }
    };
    let data: serde_json::Value = serde_json::from_str(&data)?;

    let recorder = LineageRecorder::new(&ctx.store, &ctx.clock);
    let lineage_id = recorder.record(
        &task_id,
        event_type,
        actor_type,
        &actor_id,
        data,
        None,
        TraceContext::from_env(),
    )?;
    if json {
        output::print_json(&serde_json::json!({"lineage_id": lineage_id}));
    } else {
        println!("{lineage_id}");
    }
    Ok(())
}

pub fn handle_query_by_task(ctx: &AppContext, task_id: String, json: bool) -> Result<()> {
    let recorder = LineageRecorder::new(&ctx.store, &ctx.clock);
    let events = recorder.by_task(&task_id)?;
    if json {
        output::print_json(&events);
    } else {
        output::print_table(
            &["event", "actor", "timestamp"],
            events
                .iter()
                .map(|e| {
                    vec![
                        e.event_type.as_str().to_string(),
                        format!("{}:{}", format!("{:?}", e.actor.actor_type).to_lowercase(), e.actor.id),
                        e.timestamp.to_rfc3339(),
                    ]
                })
                .collect(),
        );
    }
    Ok(())
}

pub fn handle_stats(ctx: &AppContext, json: bool) -> Result<()> {
    let recorder = LineageRecorder::new(&ctx.store, &ctx.clock);
    let stats = recorder.stats()?;
    if json {
        output::print_json(&stats);
    } else {
        println!(
            "{} events across {} tasks",
            stats.total_events, stats.distinct_tasks
        );
        for (event_type, count) in &stats.by_event_type {
            println!("  {event_type}: {count}");
        }
    }
    Ok(())
}
