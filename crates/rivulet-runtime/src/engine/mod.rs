//! Network execution.
//!
//! - [`Engine`]: validates a flat tree and starts its workers
//! - [`EngineConfig`]: channel capacity settings
//! - [`Network`]: push/pull access to a running network

mod config;
mod executor;
mod network;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use executor::Engine;
pub use network::Network;

/// Tracing target for engine operations.
const TRACING_TARGET: &str = "rivulet_runtime::engine";
