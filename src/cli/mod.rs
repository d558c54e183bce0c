//! CLI interface module.
//!
//! One subcommand group per subsystem, mirroring the verb surface each
//! component exposes. Global `--json` switches output to machine
//! readable form.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

/// Autonomous agent orchestration control plane.
#[derive(Parser, Debug)]
#[command(name = "cortex", version, about)]
pub struct Cli {
    /// Emit machine-readable JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the coordination directory layout.
    Init,
    /// Task intake and queue inspection.
    #[command(subcommand)]
    Task(TaskCommands),
    /// Resource allocation.
    #[command(subcommand)]
    Alloc(AllocCommands),
    /// Worker specification builder.
    #[command(subcommand)]
    Spec(SpecCommands),
    /// Utility-based routing.
    #[command(subcommand)]
    Route(RouteCommands),
    /// Heartbeat monitoring.
    #[command(subcommand)]
    Heartbeat(HeartbeatCommands),
    /// Failure pattern detection.
    #[command(subcommand)]
    Patterns(PatternCommands),
    /// Remediation playbooks.
    #[command(subcommand)]
    Remediate(RemediateCommands),
    /// Prompt versioning and A/B tests.
    #[command(subcommand)]
    Prompts(PromptCommands),
    /// Policy evaluation.
    #[command(subcommand)]
    Policy(PolicyCommands),
    /// Lineage and tracing.
    #[command(subcommand)]
    Lineage(LineageCommands),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Submit a task to the queue.
    Submit {
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        task_type: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// Show one task.
    Show { task_id: String },
    /// List queued tasks.
    List {
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AllocCommands {
    /// Compute a resource envelope for a task description.
    Allocate {
        #[arg(long)]
        task_description: String,
        #[arg(long, default_value = "implementation")]
        task_type: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        file_count: Option<usize>,
        /// Existing task id to allocate for; generated when absent.
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Record actual usage against an allocation.
    RecordOutcome {
        #[arg(long)]
        allocation_id: String,
        #[arg(long)]
        task_type: String,
        #[arg(long)]
        actual_tokens: u64,
        #[arg(long)]
        actual_time_seconds: u64,
        /// success or failure.
        #[arg(long)]
        outcome: String,
    },
    /// Extend an allocation's token budget.
    Extend {
        #[arg(long)]
        allocation_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        requested_tokens: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SpecCommands {
    /// Build and emit a worker spec.
    Build {
        #[arg(long)]
        worker_id: String,
        #[arg(long)]
        worker_type: String,
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        token_budget: Option<u64>,
        #[arg(long)]
        timeout_minutes: Option<u64>,
        /// Scope as a JSON object.
        #[arg(long, default_value = "{}")]
        scope: String,
        /// Context as a JSON object.
        #[arg(long, default_value = "{}")]
        context: String,
        /// Also write the spec to this path.
        #[arg(long)]
        output: Option<std::path::PathBuf>,
    },
    /// Validate a checkpoint of a worker spec.
    ValidateCheckpoint {
        worker_id: String,
        checkpoint_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RouteCommands {
    /// Select a master for a task given as JSON.
    Select {
        /// Task document: {"id", "type", "priority", "description"}.
        #[arg(long)]
        task: String,
        /// Candidate master ids.
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },
    /// Feed an observed outcome back into the router.
    UpdatePerformance {
        #[arg(long)]
        master: String,
        #[arg(long)]
        task_type: String,
        /// Outcome scores: {"speed", "quality", "cost", "success"}.
        #[arg(long)]
        outcome: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum HeartbeatCommands {
    /// Initialize the heartbeat subtree for a worker.
    Init { worker_id: String },
    /// Emit one heartbeat.
    Emit {
        worker_id: String,
        activity: String,
        #[arg(long, default_value_t = 0.0)]
        cpu_percent: f64,
        #[arg(long, default_value_t = 0)]
        memory_mb: u64,
        #[arg(long, default_value_t = 0)]
        tokens_used: u64,
        #[arg(long, default_value_t = 0)]
        tokens_remaining: u64,
    },
    /// Sweep workers and apply phase transitions.
    Check {
        /// Restrict the sweep to one worker.
        worker_id: Option<String>,
    },
    /// Run the emitter daemon for a worker process.
    Run { worker_id: String, worker_pid: i32 },
}

#[derive(Subcommand, Debug)]
pub enum PatternCommands {
    /// Mine failure events for recurring patterns.
    Analyze {
        #[arg(long, default_value_t = 24)]
        window_hours: i64,
    },
    /// List current patterns.
    List,
}

#[derive(Subcommand, Debug)]
pub enum RemediateCommands {
    /// Remediate a detected pattern through matching playbooks.
    Run {
        pattern_id: String,
        #[arg(long)]
        worker_type: Option<String>,
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Execute one playbook directly.
    Execute {
        playbook_id: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a completed execution's validation.
    Validate { execution_id: String },
}

#[derive(Subcommand, Debug)]
pub enum PromptCommands {
    /// Store a new draft version.
    CreateVersion {
        #[arg(long)]
        prompt_id: String,
        #[arg(long)]
        version: String,
        /// Content string, or @path to read a file.
        #[arg(long)]
        content: String,
    },
    /// Activate a version.
    Activate {
        #[arg(long)]
        prompt_id: String,
        #[arg(long)]
        version: String,
    },
    /// Retrieve prompt content.
    Get {
        prompt_id: String,
        /// Pinned version, or "latest"; defaults to the active pointer.
        version: Option<String>,
    },
    /// Create an A/B test.
    AbCreate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        prompt_id: String,
        #[arg(long)]
        control: String,
        #[arg(long)]
        treatment: String,
        #[arg(long, default_value_t = 50)]
        traffic_split: u8,
    },
    /// Deterministically select a variant for a task.
    AbSelect { test_id: String, task_id: String },
    /// Conclude a test and activate the winner.
    AbConclude { test_id: String },
    /// Record an outcome against a test variant.
    RecordOutcome {
        #[arg(long)]
        test_id: String,
        /// control or treatment.
        #[arg(long)]
        variant: String,
        #[arg(long)]
        success: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Evaluate one policy against a target JSON file.
    Evaluate {
        /// Path to the target document.
        target: std::path::PathBuf,
        policy_id: String,
    },
    /// Evaluate every policy against a target JSON file.
    EvaluateAll { target: std::path::PathBuf },
    /// List loaded policies.
    List {
        #[arg(long)]
        framework: Option<String>,
    },
    /// Validate a policy definition file.
    Validate { policy: std::path::PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum LineageCommands {
    /// Start a trace for a task and print the context.
    InitTaskTrace { task_id: String, component: String },
    /// Append a lineage event.
    EmitEvent {
        #[arg(long)]
        task_id: String,
        /// Lineage event type, e.g. task_assigned.
        #[arg(long)]
        event_type: String,
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long, default_value = "system")]
        actor_type: String,
        #[arg(long, default_value = "cli")]
        actor_id: String,
    },
    /// All lineage events of one task.
    QueryByTask { task_id: String },
    /// Aggregate lineage statistics.
    Stats,
}
