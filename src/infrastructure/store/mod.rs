//! Filesystem store over the coordination directory.
//!
//! The store is the only component that touches disk. It owns
//! environment isolation: writes are permitted only to the current
//! environment's subtree (shared subtrees are writable from any
//! environment), and cross-environment reads follow the allow matrix.
//!
//! Snapshots are JSON files replaced atomically (temp file + rename).
//! Streams are JSONL files appended with a single `O_APPEND` write per
//! record, so concurrent producers never interleave partial lines.

pub mod lock;
pub mod paths;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::domain::error::{CortexError, Result};
use crate::domain::models::Environment;

pub use lock::ResourceLock;
pub use paths::{CoordinationPaths, SpecState};

/// Handle to the coordination directory for one environment.
#[derive(Debug, Clone)]
pub struct Store {
    paths: CoordinationPaths,
    env: Environment,
}

impl Store {
    pub fn new(home: impl AsRef<Path>, env: Environment) -> Self {
        Self {
            paths: CoordinationPaths::new(home),
            env,
        }
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn paths(&self) -> &CoordinationPaths {
        &self.paths
    }

    /// Create the directory skeleton for this environment plus the
    /// shared subtrees.
    pub fn init_layout(&self) -> Result<()> {
        let env_root = self.paths.env_root(self.env);
        for sub in [
            "tasks", "routing", "metrics", "lineage", "events", "traces", "traces/daily", "logs",
            "locks", "tmp",
        ] {
            fs::create_dir_all(env_root.join(sub))?;
        }
        let root = self.paths.root();
        for sub in [
            "patterns",
            "prompts/versions",
            "prompts/ab-tests",
            "prompts/workers",
            "remediation-playbooks/executions",
            "remediation-playbooks/approvals",
            "policies/policy-definitions",
            "policies/evaluation-results",
            "policies/audit-logs",
            "worker-specs/active",
            "worker-specs/completed",
            "worker-specs/failed",
            "checkpoints",
        ] {
            fs::create_dir_all(root.join(sub))?;
        }
        Ok(())
    }

    /// Deny writes targeting another environment's subtree.
    fn ensure_writable(&self, path: &Path) -> Result<()> {
        if let Some(target_env) = self.paths.env_of(path) {
            if target_env != self.env {
                return Err(CortexError::PolicyDenied(format!(
                    "write to {} subtree denied from {} environment",
                    target_env.as_str(),
                    self.env.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Deny reads the allow matrix forbids.
    fn ensure_readable(&self, path: &Path) -> Result<()> {
        if let Some(target_env) = self.paths.env_of(path) {
            if !self.env.may_read(target_env) {
                return Err(CortexError::PolicyDenied(format!(
                    "read of {} subtree denied from {} environment",
                    target_env.as_str(),
                    self.env.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Read a JSON snapshot.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        self.ensure_readable(path)?;
        let contents = fs::read_to_string(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CortexError::NotFound(format!("{}", path.display()))
                }
                _ => e.into(),
            })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Read a JSON snapshot, or produce a default when absent.
    pub fn read_json_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        match self.read_json(path) {
            Ok(value) => Ok(value),
            Err(CortexError::NotFound(_)) => Ok(T::default()),
            Err(err) => Err(err),
        }
    }

    /// Atomically replace a JSON snapshot: serialize, write to a temp
    /// file beside the target, rename over it.
    pub fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_writable(path)?;
        let parent = path.parent().ok_or_else(|| {
            CortexError::InvalidInput(format!("path has no parent: {}", path.display()))
        })?;
        fs::create_dir_all(parent)?;

        let serialized = serde_json::to_string_pretty(value)
            .map_err(|e| CortexError::FatalInvariant(format!("serialization failed: {e}")))?;

        let tmp = tmp_sibling(path);
        fs::write(&tmp, serialized.as_bytes())?;
        fs::rename(&tmp, path).map_err(|e| {
            fs::remove_file(&tmp).ok();
            CortexError::from(e)
        })?;
        Ok(())
    }

    /// Append one record to a JSONL stream as a single write.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        self.ensure_writable(path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)
            .map_err(|e| CortexError::FatalInvariant(format!("serialization failed: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Stream a JSONL file into typed records. A line that fails to
    /// parse means the append-only log is corrupt, which is fatal.
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        self.ensure_readable(path)?;
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                CortexError::FatalInvariant(format!(
                    "corrupt record at {}:{}: {e}",
                    path.display(),
                    idx + 1
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Whether a file exists (reads allowed by the matrix only).
    pub fn exists(&self, path: &Path) -> bool {
        self.ensure_readable(path).is_ok() && path.exists()
    }

    /// Remove a file, tolerating absence.
    pub fn remove(&self, path: &Path) -> Result<()> {
        self.ensure_writable(path)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename within the coordination tree (spec moves between stores).
    pub fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_writable(from)?;
        self.ensure_writable(to)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)?;
        Ok(())
    }

    /// Acquire the writer lock for a named logical resource.
    pub fn lock(&self, resource: &str) -> Result<ResourceLock> {
        ResourceLock::acquire(&self.paths.locks(self.env), resource)
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()))
}
