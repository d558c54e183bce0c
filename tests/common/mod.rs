//! Common test utilities for integration tests.
//!
//! Provides a temp coordination directory fixture shared across the
//! end-to-end scenarios.

use cortex::domain::models::{CortexConfig, Environment};
use cortex::infrastructure::Store;
use tempfile::TempDir;

/// An isolated coordination directory with its store and config.
pub struct Fixture {
    /// Held so the directory outlives the test.
    #[allow(dead_code)]
    pub home: TempDir,
    pub store: Store,
    pub config: CortexConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let home = tempfile::tempdir().expect("failed to create temp home");
        let store = Store::new(home.path(), Environment::Dev);
        store.init_layout().expect("failed to init layout");
        Self {
            home,
            store,
            config: CortexConfig::default(),
        }
    }
}
