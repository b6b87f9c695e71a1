//! Engine configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::port::{ChannelCapacity, DEFAULT_CHANNEL_SIZE};

/// Configuration for starting operator networks.
///
/// Read once per [`Engine::start`](super::Engine::start) and applied to every
/// channel of the network.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Capacity of every bounded channel.
    #[builder(default = "DEFAULT_CHANNEL_SIZE")]
    pub channel_size: usize,

    /// Use unbounded channels; takes precedence over `channel_size`.
    #[builder(default = "false")]
    pub channel_dynamic: bool,
}

impl EngineConfig {
    /// Returns the channel capacity policy.
    pub fn capacity(&self) -> ChannelCapacity {
        if self.channel_dynamic {
            return ChannelCapacity::Dynamic;
        }
        ChannelCapacity::bounded(self.channel_size).unwrap_or_default()
    }
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.channel_size == Some(0) {
            return Err("channel_size must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_size: DEFAULT_CHANNEL_SIZE,
            channel_dynamic: false,
        }
    }
}
