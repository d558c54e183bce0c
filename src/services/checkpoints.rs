//! Checkpoint validation.
//!
//! Checkpoints are validated in declared order; each validation rewrites
//! the owning spec atomically with the result appended to the checkpoint
//! entry in place. A failed checkpoint may be retried exactly once.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::{CheckpointValidation, VerificationType, WorkerSpec};
use crate::domain::Clock;
use crate::infrastructure::{SpecState, Store};

/// Implementation-specific evaluator for `custom` checkpoints.
pub type CustomEvaluator = Box<dyn Fn(&str, &WorkerSpec) -> (bool, String) + Send + Sync>;

/// Validates checkpoints against the filesystem and spec state.
pub struct CheckpointValidator<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    /// Base directory relative paths in `file_exists` conditions resolve
    /// against.
    base_dir: PathBuf,
    custom: HashMap<String, CustomEvaluator>,
}

impl<'a> CheckpointValidator<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            clock,
            base_dir: base_dir.into(),
            custom: HashMap::new(),
        }
    }

    /// Register an evaluator for `custom` checkpoints. The condition's
    /// leading word selects the evaluator; the rest is its argument.
    pub fn register_custom(&mut self, name: impl Into<String>, evaluator: CustomEvaluator) {
        self.custom.insert(name.into(), evaluator);
    }

    fn spec_path(&self, worker_id: &str) -> Result<(SpecState, PathBuf)> {
        for state in SpecState::ALL {
            let path = self.store.paths().worker_spec(state, worker_id);
            if path.exists() {
                return Ok((state, path));
            }
        }
        Err(CortexError::NotFound(format!("worker spec {worker_id}")))
    }

    /// Validate one checkpoint of a worker's spec by id.
    ///
    /// Enforces declared order over required checkpoints: a required
    /// earlier step must have passed before a later one is validated.
    pub fn validate(&self, worker_id: &str, checkpoint_id: &str) -> Result<CheckpointValidation> {
        let (_, path) = self.spec_path(worker_id)?;
        let mut spec: WorkerSpec = self.store.read_json(&path)?;

        let position = spec
            .checkpoint_criteria
            .iter()
            .position(|c| c.checkpoint_id == checkpoint_id)
            .ok_or_else(|| {
                CortexError::NotFound(format!("checkpoint {checkpoint_id} in {worker_id}"))
            })?;

        for earlier in &spec.checkpoint_criteria[..position] {
            if earlier.required
                && !earlier
                    .validation
                    .as_ref()
                    .map_or(false, |v| v.validation_result)
            {
                return Err(CortexError::PreconditionFailed(format!(
                    "checkpoint {} must pass before {}",
                    earlier.checkpoint_id, checkpoint_id
                )));
            }
        }

        let attempts = match &spec.checkpoint_criteria[position].validation {
            None => 1,
            Some(prior) if prior.validation_result => {
                // Idempotent: an already-passed checkpoint is not re-run.
                return Ok(prior.clone());
            }
            Some(prior) if prior.attempts < 2 => prior.attempts + 1,
            Some(_) => {
                return Err(CortexError::PreconditionFailed(format!(
                    "checkpoint {checkpoint_id} retry exhausted"
                )))
            }
        };

        let checkpoint = spec.checkpoint_criteria[position].clone();
        let (result, message) = self.evaluate(
            checkpoint.verification_type,
            &checkpoint.success_condition,
            &spec,
        );

        let validation = CheckpointValidation {
            validated_at: self.clock.now(),
            validation_result: result,
            validation_message: message,
            attempts,
        };
        spec.checkpoint_criteria[position].validation = Some(validation.clone());

        self.store.write_json_atomic(&path, &spec)?;
        let mirror = self.store.paths().checkpoint(checkpoint_id);
        self.store
            .write_json_atomic(&mirror, &spec.checkpoint_criteria[position])?;
        Ok(validation)
    }

    fn evaluate(
        &self,
        verification: VerificationType,
        condition: &str,
        spec: &WorkerSpec,
    ) -> (bool, String) {
        match verification {
            VerificationType::FileExists => {
                let candidate = PathBuf::from(condition);
                let resolved = if candidate.is_absolute() {
                    candidate
                } else {
                    self.base_dir.join(candidate)
                };
                if resolved.exists() {
                    (true, format!("{} exists", resolved.display()))
                } else {
                    (false, format!("{} does not exist", resolved.display()))
                }
            }
            VerificationType::CommandSuccess => self.run_command(condition),
            VerificationType::JsonField => Self::check_json_field(condition, spec),
            VerificationType::Custom => {
                let mut parts = condition.splitn(2, ' ');
                let name = parts.next().unwrap_or_default();
                let arg = parts.next().unwrap_or_default();
                match self.custom.get(name) {
                    Some(evaluator) => evaluator(arg, spec),
                    None => (false, format!("no custom evaluator registered for {name:?}")),
                }
            }
            VerificationType::Artifact | VerificationType::Test | VerificationType::Review => {
                (true, "semantic tag, reported only".to_string())
            }
        }
    }

    /// Run a shell-free command descriptor: whitespace-split program and
    /// arguments, executed directly without a shell.
    fn run_command(&self, descriptor: &str) -> (bool, String) {
        let mut parts = descriptor.split_whitespace();
        let Some(program) = parts.next() else {
            return (false, "empty command descriptor".to_string());
        };
        match Command::new(program)
            .args(parts)
            .current_dir(&self.base_dir)
            .output()
        {
            Ok(output) if output.status.success() => {
                (true, format!("{program} exited successfully"))
            }
            Ok(output) => (
                false,
                format!("{program} exited with {:?}", output.status.code()),
            ),
            Err(err) => (false, format!("failed to run {program}: {err}")),
        }
    }

    /// `<dot-path>=<expected>` evaluated against the spec document,
    /// compared as strings.
    fn check_json_field(condition: &str, spec: &WorkerSpec) -> (bool, String) {
        let Some((field_path, expected)) = condition.split_once('=') else {
            return (
                false,
                format!("malformed json_field condition {condition:?}"),
            );
        };
        let doc = match serde_json::to_value(spec) {
            Ok(doc) => doc,
            Err(err) => return (false, format!("spec serialization: {err}")),
        };
        let actual = lookup_dot_path(&doc, field_path);
        let actual_str = match &actual {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return (false, format!("field {field_path:?} absent"));
            }
        };
        if actual_str == expected {
            (true, format!("{field_path} = {expected}"))
        } else {
            (
                false,
                format!("{field_path} is {actual_str:?}, expected {expected:?}"),
            )
        }
    }
}

/// Resolve a dot-path (`a.b.c`) into a JSON document.
pub fn lookup_dot_path<'v>(doc: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
