//! Versioned prompt registry with A/B experiments.
//!
//! Versions are immutable once written; activation moves the registry's
//! `active` pointer, of which there is at most one per prompt id. A/B
//! assignment is a deterministic hash of the task id, so a task always
//! sees the same variant.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::error::{CortexError, Result};
use crate::domain::models::prompt::{RegistryEntry, VariantStats};
use crate::domain::models::{
    AbTest, AbTestStatus, PromptRegistry, PromptStatus, PromptVersion, Variant,
};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// Which version of a prompt to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// The registry's active pointer (default).
    Active,
    /// Most recently created version.
    Latest,
    /// A pinned version string.
    Pinned(String),
}

/// The prompt registry service.
pub struct PromptRegistryService<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> PromptRegistryService<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    fn registry(&self) -> Result<PromptRegistry> {
        self.store
            .read_json_or_default(&self.store.paths().prompt_registry())
    }

    fn save_registry(&self, registry: &PromptRegistry) -> Result<()> {
        self.store
            .write_json_atomic(&self.store.paths().prompt_registry(), registry)
    }

    fn version_path(&self, prompt_id: &str, version: &str) -> std::path::PathBuf {
        self.store.paths().prompt_version(prompt_id, version)
    }

    fn load_version(&self, prompt_id: &str, version: &str) -> Result<PromptVersion> {
        self.store.read_json(&self.version_path(prompt_id, version))
    }

    /// Store a new draft version. The version string must be new for
    /// this prompt id.
    pub fn create_version(
        &self,
        prompt_id: &str,
        version: &str,
        content: &str,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<PromptVersion> {
        if prompt_id.trim().is_empty() || version.trim().is_empty() {
            return Err(CortexError::InvalidInput(
                "prompt_id and version must be non-empty".into(),
            ));
        }

        let _lock = self.store.lock("prompt-registry")?;
        let mut registry = self.registry()?;
        let entry = registry
            .prompts
            .entry(prompt_id.to_string())
            .or_insert_with(RegistryEntry::default);
        if entry.versions.iter().any(|v| v == version) {
            return Err(CortexError::PreconditionFailed(format!(
                "version {version} of {prompt_id} already exists"
            )));
        }

        let record = PromptVersion {
            version_id: format!("pv-{}", Uuid::new_v4().simple()),
            prompt_id: prompt_id.to_string(),
            version: version.to_string(),
            content: content.to_string(),
            content_hash: sha256_hex(content.as_bytes()),
            status: PromptStatus::Draft,
            metrics: Default::default(),
            metadata,
            created_at: self.clock.now(),
        };

        self.store
            .write_json_atomic(&self.version_path(prompt_id, version), &record)?;
        entry.versions.push(version.to_string());
        self.save_registry(&registry)?;
        Ok(record)
    }

    /// Activate one version. Demotes the previously active version so
    /// at most one is active per prompt id.
    pub fn activate(&self, prompt_id: &str, version: &str) -> Result<PromptVersion> {
        let _lock = self.store.lock("prompt-registry")?;
        let mut registry = self.registry()?;
        let entry = registry
            .prompts
            .get_mut(prompt_id)
            .ok_or_else(|| CortexError::NotFound(format!("prompt {prompt_id}")))?;
        if !entry.versions.iter().any(|v| v == version) {
            return Err(CortexError::NotFound(format!(
                "version {version} of {prompt_id}"
            )));
        }

        if let Some(previous) = entry.active.clone() {
            if previous != version {
                let mut old = self.load_version(prompt_id, &previous)?;
                old.status = PromptStatus::Draft;
                self.store
                    .write_json_atomic(&self.version_path(prompt_id, &previous), &old)?;
            }
        }

        let mut record = self.load_version(prompt_id, version)?;
        record.status = PromptStatus::Active;
        self.store
            .write_json_atomic(&self.version_path(prompt_id, version), &record)?;

        entry.active = Some(version.to_string());
        self.save_registry(&registry)?;
        Ok(record)
    }

    /// Retrieve a prompt's content by selector.
    pub fn get(&self, prompt_id: &str, selector: &VersionSelector) -> Result<PromptVersion> {
        let registry = self.registry()?;
        let entry = registry
            .prompts
            .get(prompt_id)
            .ok_or_else(|| CortexError::NotFound(format!("prompt {prompt_id}")))?;

        let version = match selector {
            VersionSelector::Active => entry.active.clone().ok_or_else(|| {
                CortexError::NotFound(format!("prompt {prompt_id} has no active version"))
            })?,
            VersionSelector::Latest => {
                let mut latest: Option<PromptVersion> = None;
                for v in &entry.versions {
                    let record = self.load_version(prompt_id, v)?;
                    if latest
                        .as_ref()
                        .map_or(true, |l| record.created_at > l.created_at)
                    {
                        latest = Some(record);
                    }
                }
                return latest.ok_or_else(|| {
                    CortexError::NotFound(format!("prompt {prompt_id} has no versions"))
                });
            }
            VersionSelector::Pinned(v) => v.clone(),
        };
        self.load_version(prompt_id, &version)
    }

    /// Record one usage outcome against a version's metrics.
    pub fn record_version_outcome(
        &self,
        prompt_id: &str,
        version: &str,
        success: bool,
        tokens: u64,
        time_seconds: f64,
    ) -> Result<PromptVersion> {
        let mut record = self.load_version(prompt_id, version)?;
        record.metrics.record(success, tokens, time_seconds);
        self.store
            .write_json_atomic(&self.version_path(prompt_id, version), &record)?;
        Ok(record)
    }

    // -- A/B ---------------------------------------------------------

    fn test_path(&self, test_id: &str) -> std::path::PathBuf {
        self.store.paths().ab_test(test_id)
    }

    fn load_test(&self, test_id: &str) -> Result<AbTest> {
        self.store.read_json(&self.test_path(test_id))
    }

    /// Create an active A/B test between two existing versions.
    pub fn create_ab(
        &self,
        name: &str,
        prompt_id: &str,
        control_version: &str,
        treatment_version: &str,
        traffic_split: u8,
    ) -> Result<AbTest> {
        if traffic_split > 100 {
            return Err(CortexError::InvalidInput(format!(
                "traffic_split {traffic_split} not a percentage"
            )));
        }
        // Both arms must exist
        self.load_version(prompt_id, control_version)?;
        self.load_version(prompt_id, treatment_version)?;

        let test = AbTest {
            test_id: format!("ab-{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            prompt_id: prompt_id.to_string(),
            control_version: control_version.to_string(),
            treatment_version: treatment_version.to_string(),
            traffic_split,
            status: AbTestStatus::Active,
            control: VariantStats::default(),
            treatment: VariantStats::default(),
            significance: None,
            created_at: self.clock.now(),
            concluded_at: None,
        };
        self.store.write_json_atomic(&self.test_path(&test.test_id), &test)?;
        Ok(test)
    }

    /// Deterministic variant assignment: `hash(task_id) mod 100`
    /// against the traffic split. Stable for a given task id.
    pub fn select_variant(&self, test_id: &str, task_id: &str) -> Result<(Variant, String)> {
        let test = self.load_test(test_id)?;
        if test.status != AbTestStatus::Active {
            return Err(CortexError::PreconditionFailed(format!(
                "test {test_id} is concluded"
            )));
        }
        let variant = assign_variant(task_id, test.traffic_split);
        let version = match variant {
            Variant::Control => test.control_version.clone(),
            Variant::Treatment => test.treatment_version.clone(),
        };
        Ok((variant, version))
    }

    /// Attribute one outcome to a variant; checks significance once
    /// both arms have enough uses.
    pub fn record_ab_outcome(
        &self,
        test_id: &str,
        variant: Variant,
        success: bool,
    ) -> Result<AbTest> {
        let _lock = self.store.lock("ab-tests")?;
        let mut test = self.load_test(test_id)?;
        if test.status != AbTestStatus::Active {
            return Err(CortexError::PreconditionFailed(format!(
                "test {test_id} is concluded"
            )));
        }

        let stats = match variant {
            Variant::Control => &mut test.control,
            Variant::Treatment => &mut test.treatment,
        };
        stats.uses += 1;
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }

        test.significance = test.check_significance();
        self.store.write_json_atomic(&self.test_path(test_id), &test)?;
        Ok(test)
    }

    /// Conclude a test. The winner (if significance declared one) is
    /// activated automatically.
    pub fn conclude(&self, test_id: &str) -> Result<AbTest> {
        let mut test = self.load_test(test_id)?;
        if test.status == AbTestStatus::Concluded {
            return Err(CortexError::PreconditionFailed(format!(
                "test {test_id} already concluded"
            )));
        }
        test.significance = test.check_significance();
        test.status = AbTestStatus::Concluded;
        test.concluded_at = Some(self.clock.now());
        self.store.write_json_atomic(&self.test_path(test_id), &test)?;

        if let Some(significance) = &test.significance {
            let winner_version = match significance.winner {
                Variant::Control => &test.control_version,
                Variant::Treatment => &test.treatment_version,
            };
            self.activate(&test.prompt_id, winner_version)?;
        }
        Ok(test)
    }
}

/// Hash-based variant assignment shared by select and tests.
pub fn assign_variant(task_id: &str, traffic_split: u8) -> Variant {
    let digest = Sha256::digest(task_id.as_bytes());
    let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 100;
    if bucket < u32::from(traffic_split) {
        Variant::Treatment
    } else {
        Variant::Control
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
