//! Command handlers, one module per subsystem.

pub mod alloc;
pub mod heartbeat;
pub mod lineage;
pub mod patterns;
pub mod policy;
pub mod prompts;
pub mod remediate;
pub mod route;
pub mod spec;
pub mod task;

use crate::domain::models::CortexConfig;
use crate::domain::SystemClock;
use crate::infrastructure::Store;

/// Shared state every handler receives.
pub struct AppContext {
    pub store: Store,
    pub config: CortexConfig,
    pub clock: SystemClock,
}

impl AppContext {
    pub fn new(store: Store, config: CortexConfig) -> Self {
        Self {
            store,
            config,
            clock: SystemClock,
        }
    }
}
