//! Validation for JSON payloads and worker specifications.
//!
//! `safe_write_json` is the single gate every snapshot write goes
//! through: syntax, uninitialized-template detection, optional schema
//! validation, then temp-file + atomic rename. Any failure aborts and
//! writes nothing.

use jsonschema::{Draft, JSONSchema};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::allocation::{MAX_TOKEN_BUDGET, MIN_TOKEN_BUDGET};
use crate::domain::models::WorkerStatus;
use crate::infrastructure::Store;

/// Worker identifier shape: `worker-<type>-<id>`.
pub fn worker_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^worker-[a-z]+-[0-9A-Za-z]+$").expect("static regex"))
}

/// Correlation identifier shape: `corr-<ts>-<6 hex>-<component>`.
pub fn correlation_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^corr-\d+-[0-9a-f]{6}-[a-z0-9-]+$").expect("static regex"))
}

fn template_var_regexes() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            // A value slot left empty by failed interpolation: `, ,` / `: ,`
            Regex::new(r"(,\s*,|:\s*,)").expect("static regex"),
            // Unexpanded shell-style interpolation
            Regex::new(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}").expect("static regex"),
            // Unexpanded mustache-style interpolation
            Regex::new(r"\{\{[^}]*\}\}").expect("static regex"),
        ]
    })
}

fn worker_spec_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": [
                "worker_id", "worker_type", "created_by", "task_id",
                "scope", "context", "resources", "prompt_ref", "created_at"
            ],
            "properties": {
                "worker_id": {"type": "string", "pattern": "^worker-[a-z]+-[0-9A-Za-z]+$"},
                "worker_type": {"type": "string", "minLength": 1},
                "created_by": {"type": "string", "minLength": 1},
                "task_id": {"type": "string", "minLength": 1},
                "status": {"enum": ["pending", "running", "completed", "failed"]},
                "scope": {"type": "object"},
                "context": {"type": "object"},
                "resources": {
                    "type": "object",
                    "required": ["token_budget", "timeout_minutes", "max_retries"],
                    "properties": {
                        "token_budget": {"type": "integer", "minimum": 1},
                        "timeout_minutes": {"type": "integer", "minimum": 1},
                        "max_retries": {"type": "integer", "minimum": 0}
                    }
                },
                "prompt_ref": {"type": "string", "minLength": 1},
                "checkpoint_criteria": {"type": "array"}
            }
        });
        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .expect("embedded schema compiles")
    })
}

/// Parse a string as JSON, surfacing `InvalidInput` on failure.
pub fn validate_json_syntax(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(CortexError::from)
}

/// Require top-level fields to be present and non-null.
pub fn validate_required_fields(value: &Value, fields: &[&str]) -> Result<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| CortexError::InvalidInput("expected a JSON object".into()))?;
    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| obj.get(**f).map_or(true, Value::is_null))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CortexError::InvalidInput(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Detect uninitialized interpolation leftovers in serialized JSON.
pub fn validate_template_vars(raw: &str) -> Result<()> {
    for re in template_var_regexes() {
        if let Some(found) = re.find(raw) {
            return Err(CortexError::ValidationFailure(format!(
                "uninitialized template pattern {:?} in output",
                found.as_str()
            )));
        }
    }
    Ok(())
}

/// Structural and semantic checks for a worker spec document.
///
/// Validating an already-valid spec is a no-op: the document is not
/// mutated and the same checks pass again.
pub fn validate_worker_spec(value: &Value) -> Result<()> {
    if let Err(errors) = worker_spec_schema().validate(value) {
        let detail: Vec<String> = errors.map(|e| e.to_string()).take(3).collect();
        return Err(CortexError::ValidationFailure(format!(
            "worker spec schema: {}",
            detail.join("; ")
        )));
    }

    let worker_id = value["worker_id"].as_str().unwrap_or_default();
    if !worker_id_regex().is_match(worker_id) {
        return Err(CortexError::InvalidInput(format!(
            "worker_id {worker_id:?} does not match worker-<type>-<id>"
        )));
    }

    if let Some(status) = value.get("status").and_then(Value::as_str) {
        if WorkerStatus::from_str(status).is_none() {
            return Err(CortexError::ValidationFailure(format!(
                "unknown worker status {status:?}"
            )));
        }
    }

    let budget = value["resources"]["token_budget"].as_u64().unwrap_or(0);
    if !(MIN_TOKEN_BUDGET..=MAX_TOKEN_BUDGET).contains(&budget) {
        return Err(CortexError::ValidationFailure(format!(
            "token_budget {budget} outside [{MIN_TOKEN_BUDGET}, {MAX_TOKEN_BUDGET}]"
        )));
    }

    Ok(())
}

/// Whether the target document should be checked as a worker spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    WorkerSpec,
    None,
}

/// Whether validation is on; VALIDATION_ENABLED=false switches the
/// pipeline off (writes stay atomic).
fn validation_enabled() -> bool {
    match std::env::var("VALIDATION_ENABLED") {
        Ok(raw) => !(raw == "false" || raw == "0"),
        Err(_) => true,
    }
}

/// Validate then atomically write a JSON document.
///
/// Pipeline: serialize → syntax → template vars → schema → temp file →
/// rename. The write is byte-stable: serializing a deserialized copy of
/// the same document produces identical output.
pub fn safe_write_json(store: &Store, path: &Path, value: &Value, schema: SchemaKind) -> Result<()> {
    if validation_enabled() {
        let serialized = serde_json::to_string_pretty(value)
            .map_err(|e| CortexError::FatalInvariant(format!("serialization failed: {e}")))?;
        validate_json_syntax(&serialized)?;
        validate_template_vars(&serialized)?;
        if schema == SchemaKind::WorkerSpec {
            validate_worker_spec(value)?;
        }
    }
    store.write_json_atomic(path, value)
}
