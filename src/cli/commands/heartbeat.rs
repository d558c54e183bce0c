//! Heartbeat commands, including the emitter daemon.

use crate::cli::output;
use crate::domain::error::Result;
use crate::domain::models::{HeartbeatThresholds, ResourceSample};
use crate::services::HeartbeatMonitor;

use super::AppContext;

pub fn handle_init(ctx: &AppContext, worker_id: String, json: bool) -> Result<()> {
    let monitor = HeartbeatMonitor::new(&ctx.store, &ctx.clock, HeartbeatThresholds::from_env());
    let heartbeat = monitor.init(&worker_id)?;
    if json {
        output::print_json(&heartbeat);
    } else {
        println!("initialized heartbeat for {worker_id}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn handle_emit(
    ctx: &AppContext,
    worker_id: String,
    activity: String,
    cpu_percent: f64,
    memory_mb: u64,
    tokens_used: u64,
    tokens_remaining: u64,
    json: bool,
) -> Result<()> {
    let monitor = HeartbeatMonitor::new(&ctx.store, &ctx.clock, HeartbeatThresholds::from_env());
    let sample = ResourceSample {
        cpu_percent,
        memory_mb,
        tokens_used,
        tokens_remaining,
    };
    let heartbeat = monitor.emit(&worker_id, &activity, &sample)?;
    if json {
        output::print_json(&heartbeat);
    } else {
        println!(
            "{worker_id} seq={} health={} ({})",
            heartbeat.sequence,
            heartbeat.health.health_score,
            heartbeat.health.status.as_str()
        );
    }
    Ok(())
}

pub fn handle_check(ctx: &AppContext, worker_id: Option<String>, json: bool) -> Result<()> {
    let monitor = HeartbeatMonitor::new(&ctx.store, &ctx.clock, HeartbeatThresholds::from_env());
    let checks = match worker_id {
        Some(id) => vec![monitor.check(&id)?],
        None => monitor.check_all()?,
    };
    if json {
        let rows: Vec<serde_json::Value> = checks
            .iter()
            .map(|c| {
                serde_json::json!({
                    "worker_id": c.worker_id,
                    "phase": c.phase.as_str(),
                    "event_emitted": c.event_emitted,
                })
            })
            .collect();
        output::print_json(&rows);
    } else {
        output::print_table(
            &["worker", "phase", "event"],
            checks
                .iter()
                .map(|c| {
                    vec![
                        c.worker_id.clone(),
                        c.phase.as_str().to_string(),
                        c.event_emitted.to_string(),
                    ]
                })
                .collect(),
        );
    }
    Ok(())
}

pub async fn handle_run(ctx: &AppContext, worker_id: String, worker_pid: i32) -> Result<()> {
    crate::services::heartbeat::run_emitter(
        ctx.store.clone(),
        HeartbeatThresholds::from_env(),
        worker_id,
        worker_pid,
    )
    .await
}
