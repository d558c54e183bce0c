//! Control-plane configuration model.
//!
//! Loaded hierarchically (defaults, then `coordination/config.yaml`,
//! then `CORTEX_*` environment variables) by the infrastructure config
//! loader.

use serde::{Deserialize, Serialize};

/// Coordination environment. Writes are confined to the current
/// environment's subtree; reads follow the allow matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Prod
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Some(Self::Dev),
            "staging" => Some(Self::Staging),
            "prod" => Some(Self::Prod),
            _ => None,
        }
    }

    /// Read-allow matrix: dev reads staging and prod, staging reads
    /// prod, prod is isolated.
    pub fn may_read(&self, other: Environment) -> bool {
        if *self == other {
            return true;
        }
        match self {
            Self::Dev => matches!(other, Self::Staging | Self::Prod),
            Self::Staging => matches!(other, Self::Prod),
            Self::Prod => false,
        }
    }
}

/// Global resource limits enforced by validation and the compliance gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Upper bound on any worker spec's token budget.
    pub max_tokens_per_worker: u64,
    /// Upper bound on any worker spec's timeout.
    pub max_timeout_minutes: u64,
    /// Concurrent-worker cap per worker type.
    pub max_concurrent_per_type: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_worker: 100_000,
            max_timeout_minutes: 240,
            max_concurrent_per_type: 5,
        }
    }
}

/// Governance and compliance gating switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    pub enabled: bool,
    /// Operations no spec may declare.
    pub restricted_operations: Vec<String>,
    /// Data category -> worker types allowed to read it.
    pub sensitive_data_access: std::collections::BTreeMap<String, Vec<String>>,
    /// Task types that require the audit trail enabled.
    pub audit_required_task_types: Vec<String>,
    /// Operations that require an approved approval record.
    pub approval_required_operations: Vec<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        let mut sensitive = std::collections::BTreeMap::new();
        sensitive.insert(
            "credentials".to_string(),
            vec!["security".to_string()],
        );
        sensitive.insert(
            "pii".to_string(),
            vec!["security".to_string(), "review".to_string()],
        );
        Self {
            enabled: true,
            restricted_operations: vec![
                "delete_repository".to_string(),
                "modify_secrets".to_string(),
                "external_publish".to_string(),
            ],
            sensitive_data_access: sensitive,
            audit_required_task_types: vec!["security-scan".to_string()],
            approval_required_operations: vec!["production_deploy".to_string()],
        }
    }
}

/// Logging bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error.
    pub level: String,
    /// json or pretty.
    pub format: String,
    /// When true, also log to `<env>/logs/` with daily rotation.
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            to_file: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CortexConfig {
    /// Root directory holding `coordination/`. Defaults to the current
    /// directory; CORTEX_HOME overrides.
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub env: Environment,
    /// Actor identity recorded on lineage events (CORTEX_PRINCIPAL).
    #[serde(default)]
    pub principal: Option<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
