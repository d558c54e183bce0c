//! Control-plane error taxonomy.
//!
//! Every component translates its internal failures into one of these
//! kinds before crossing a subsystem boundary. The CLI maps kinds to
//! exit codes and a single-line stderr message.

use thiserror::Error;

/// Errors surfaced across subsystem boundaries.
#[derive(Error, Debug)]
pub enum CortexError {
    /// Malformed JSON, missing required field, or identifier format
    /// mismatch. Fails at the boundary with no side effects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Schema, compliance, or pre-flight rule failure.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// Compliance gate denied the operation or an approval is missing.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// A referenced task/worker/allocation/playbook/version is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Cooling period, concurrency cap, duplicate id, or clamp violation.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Lock contention or temporary I/O failure; retried before surfacing.
    #[error("transient: {0}")]
    Transient(String),

    /// Append-only log corruption or an unknown enum value on disk.
    #[error("fatal invariant: {0}")]
    FatalInvariant(String),
}

impl CortexError {
    /// Whether the operation may be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short machine-readable kind tag for structured error records.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ValidationFailure(_) => "validation_failure",
            Self::PolicyDenied(_) => "policy_denied",
            Self::NotFound(_) => "not_found",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Transient(_) => "transient",
            Self::FatalInvariant(_) => "fatal_invariant",
        }
    }
}

impl From<std::io::Error> for CortexError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
                Self::Transient(err.to_string())
            }
            _ => Self::Transient(format!("i/o error: {err}")),
        }
    }
}

impl From<serde_json::Error> for CortexError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("malformed JSON: {err}"))
    }
}

/// Convenience alias used throughout the services layer.
pub type Result<T> = std::result::Result<T, CortexError>;
