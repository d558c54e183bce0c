//! Cortex CLI entry point.

use clap::Parser;
use cortex::cli::commands::{
    alloc, heartbeat, lineage, patterns, policy, prompts, remediate, route, spec, task, AppContext,
};
use cortex::cli::{
    AllocCommands, Cli, Commands, HeartbeatCommands, LineageCommands, PatternCommands,
    PolicyCommands, PromptCommands, RemediateCommands, RouteCommands, SpecCommands, TaskCommands,
};
use cortex::domain::CortexError;
use cortex::infrastructure::config::{env_from_process, ConfigLoader};
use cortex::infrastructure::logging::Logger;
use cortex::infrastructure::Store;

/// Exit code for validation/logic failures.
const EXIT_FAILURE: i32 = 1;
/// Exit code for bootstrap failures (config, store, logging).
const EXIT_BOOTSTRAP: i32 = 99;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (ctx, _logger) = match bootstrap() {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("bootstrap: {err}");
            std::process::exit(EXIT_BOOTSTRAP);
        }
    };

    if let Err(err) = dispatch(&ctx, cli).await {
        eprintln!("{}: {err}", err.kind());
        std::process::exit(EXIT_FAILURE);
    }
}

fn bootstrap() -> anyhow::Result<(AppContext, Logger)> {
    let config = ConfigLoader::load()?;
    let env = env_from_process()?;
    let home = ConfigLoader::home_of(&config);
    let store = Store::new(&home, env);

    let logger = Logger::init(&config.logging, &store.paths().logs(env))?;

    let mut config = config;
    config.env = env;
    if config.principal.is_none() {
        config.principal = std::env::var("CORTEX_PRINCIPAL").ok();
    }
    Ok((AppContext::new(store, config), logger))
}

async fn dispatch(ctx: &AppContext, cli: Cli) -> Result<(), CortexError> {
    let json = cli.json;
    match cli.command {
        Commands::Init => {
            ctx.store.init_layout()?;
            if !json {
                println!(
                    "initialized coordination layout for {} environment",
                    ctx.store.env().as_str()
                );
            }
            Ok(())
        }
        Commands::Task(cmd) => match cmd {
            TaskCommands::Submit {
                task_id,
                task_type,
                description,
                priority,
            } => task::handle_submit(ctx, task_id, task_type, description, priority, json),
            TaskCommands::Show { task_id } => task::handle_show(ctx, task_id, json),
            TaskCommands::List { status } => task::handle_list(ctx, status, json),
        },
        Commands::Alloc(cmd) => match cmd {
            AllocCommands::Allocate {
                task_description,
                task_type,
                priority,
                file_count,
                task_id,
            } => alloc::handle_allocate(
                ctx,
                task_description,
                task_type,
                priority,
                file_count,
                task_id,
                json,
            ),
            AllocCommands::RecordOutcome {
                allocation_id,
                task_type,
                actual_tokens,
                actual_time_seconds,
                outcome,
            } => alloc::handle_record_outcome(
                ctx,
                allocation_id,
                task_type,
                actual_tokens,
                actual_time_seconds,
                outcome,
                json,
            ),
            AllocCommands::Extend {
                allocation_id,
                reason,
                requested_tokens,
            } => alloc::handle_extend(ctx, allocation_id, reason, requested_tokens, json),
        },
        Commands::Spec(cmd) => match cmd {
            SpecCommands::Build {
                worker_id,
                worker_type,
                task_id,
                token_budget,
                timeout_minutes,
                scope,
                context,
                output,
            } => spec::handle_build(
                ctx,
                worker_id,
                worker_type,
                task_id,
                token_budget,
                timeout_minutes,
                scope,
                context,
                output,
                json,
            ),
            SpecCommands::ValidateCheckpoint {
                worker_id,
                checkpoint_id,
            } => spec::handle_validate_checkpoint(ctx, worker_id, checkpoint_id, json),
        },
        Commands::Route(cmd) => match cmd {
            RouteCommands::Select { task, candidates } => {
                route::handle_select(ctx, task, candidates, json)
            }
            RouteCommands::UpdatePerformance {
                master,
                task_type,
                outcome,
            } => route::handle_update_performance(ctx, master, task_type, outcome, json),
        },
        Commands::Heartbeat(cmd) => match cmd {
            HeartbeatCommands::Init { worker_id } => heartbeat::handle_init(ctx, worker_id, json),
            HeartbeatCommands::Emit {
                worker_id,
                activity,
                cpu_percent,
                memory_mb,
                tokens_used,
                tokens_remaining,
            } => heartbeat::handle_emit(
                ctx,
                worker_id,
                activity,
                cpu_percent,
                memory_mb,
                tokens_used,
                tokens_remaining,
                json,
            ),
            HeartbeatCommands::Check { worker_id } => heartbeat::handle_check(ctx, worker_id, json),
            HeartbeatCommands::Run {
                worker_id,
                worker_pid,
            } => heartbeat::handle_run(ctx, worker_id, worker_pid).await,
        },
        Commands::Patterns(cmd) => match cmd {
            PatternCommands::Analyze { window_hours } => {
                patterns::handle_analyze(ctx, window_hours, json)
            }
            PatternCommands::List => patterns::handle_list(ctx, json),
        },
        Commands::Remediate(cmd) => match cmd {
            RemediateCommands::Run {
                pattern_id,
                worker_type,
                worker_id,
            } => remediate::handle_run(ctx, pattern_id, worker_type, worker_id, json),
            RemediateCommands::Execute {
                playbook_id,
                dry_run,
            } => remediate::handle_execute(ctx, playbook_id, dry_run, json),
            RemediateCommands::Validate { execution_id } => {
                remediate::handle_validate(ctx, execution_id, json)
            }
        },
        Commands::Prompts(cmd) => match cmd {
            PromptCommands::CreateVersion {
                prompt_id,
                version,
                content,
            } => prompts::handle_create_version(ctx, prompt_id, version, content, json),
            PromptCommands::Activate { prompt_id, version } => {
                prompts::handle_activate(ctx, prompt_id, version, json)
            }
            PromptCommands::Get { prompt_id, version } => {
                prompts::handle_get(ctx, prompt_id, version, json)
            }
            PromptCommands::AbCreate {
                name,
                prompt_id,
                control,
                treatment,
                traffic_split,
            } => prompts::handle_ab_create(ctx, name, prompt_id, control, treatment, traffic_split, json),
            PromptCommands::AbSelect { test_id, task_id } => {
                prompts::handle_ab_select(ctx, test_id, task_id, json)
            }
            PromptCommands::AbConclude { test_id } => {
                prompts::handle_ab_conclude(ctx, test_id, json)
            }
            PromptCommands::RecordOutcome {
                test_id,
                variant,
                success,
            } => prompts::handle_record_outcome(ctx, test_id, variant, success, json),
        },
        Commands::Policy(cmd) => match cmd {
            PolicyCommands::Evaluate { target, policy_id } => {
                policy::handle_evaluate(ctx, target, policy_id, json)
            }
            PolicyCommands::EvaluateAll { target } => policy::handle_evaluate_all(ctx, target, json),
            PolicyCommands::List { framework } => policy::handle_list(ctx, framework, json),
            PolicyCommands::Validate { policy: path } => policy::handle_validate(ctx, path, json),
        },
        Commands::Lineage(cmd) => match cmd {
            LineageCommands::InitTaskTrace { task_id, component } => {
                lineage::handle_init_task_trace(ctx, task_id, component, json)
            }
            LineageCommands::EmitEvent {
                task_id,
                event_type,
                data,
                actor_type,
                actor_id,
            } => lineage::handle_emit_event(ctx, task_id, event_type, data, actor_type, actor_id, json),
            LineageCommands::QueryByTask { task_id } => {
                lineage::handle_query_by_task(ctx, task_id, json)
            }
            LineageCommands::Stats => lineage::handle_stats(ctx, json),
        },
    }
}
