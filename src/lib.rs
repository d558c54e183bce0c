//! Cortex - autonomous agent orchestration control plane.
//!
//! Coordinates long-lived master agents and short-lived workers over a
//! single-host coordination directory:
//! - Task allocation with complexity-derived token/time budgets
//! - Utility-based routing across masters with online learning
//! - Worker spec synthesis with checkpoints and pre-flight compliance
//! - Heartbeat liveness with phased failure detection
//! - Failure pattern mining and gated remediation playbooks
//! - Versioned prompts with A/B experiments
//! - Correlation-ID tracing and append-only lineage

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{Clock, CortexError, FakeClock, Result, SystemClock};
pub use infrastructure::{ConfigLoader, Store};
