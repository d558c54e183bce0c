//! Domain models for the control plane.

pub mod allocation;
pub mod config;
pub mod failure;
pub mod heartbeat;
pub mod lineage;
pub mod playbook;
pub mod policy;
pub mod prompt;
pub mod routing;
pub mod task;
pub mod trace;
pub mod worker_spec;

pub use allocation::{Allocation, AllocationExtension, AllocationOutcome, OutcomeKind};
pub use config::{CortexConfig, Environment, GovernanceConfig, LimitsConfig, LoggingConfig};
pub use failure::{
    FailureCategory, FailureEvent, FailureEventType, FailurePattern, FailureSignature,
    PatternIndex, PatternSeverity,
};
pub use heartbeat::{
    Heartbeat, HeartbeatPhase, HeartbeatThresholds, HealthStatus, ResourceSample, WorkerHealth,
};
pub use lineage::{ActorType, LineageActor, LineageEvent, LineageEventType};
pub use playbook::{
    ExecutionStatus, OnFailure, Playbook, PlaybookAction, PlaybookStep, RemediationExecution,
    StepOutcome, StepResult, ValidationType,
};
pub use policy::{
    Condition, EvaluationResult, Framework, Policy, PolicyEvaluation, PolicyRule, PolicySeverity,
};
pub use prompt::{
    AbTest, AbTestStatus, PromptRegistry, PromptStatus, PromptVersion, Significance, Variant,
};
pub use routing::{
    CandidateScore, Objective, ObjectiveWeights, OutcomeScores, RoutingContext, RoutingDecision,
};
pub use task::{Task, TaskComplexity, TaskPriority, TaskStatus};
pub use trace::{TraceContext, TraceEvent};
pub use worker_spec::{
    Checkpoint, CheckpointValidation, ExecutionState, VerificationType, WorkerResources,
    WorkerSpec, WorkerStatus,
};
