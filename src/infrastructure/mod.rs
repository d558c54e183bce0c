//! Infrastructure layer: filesystem store, configuration, logging.

pub mod config;
pub mod logging;
pub mod store;

pub use config::ConfigLoader;
pub use store::{CoordinationPaths, ResourceLock, SpecState, Store};
