//! Run manifest.

use std::fs;
use std::path::Path;

use anyhow::Context;
use rivulet_runtime::definition::Properties;
use rivulet_runtime::engine::{EngineConfig, EngineConfigBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TRACING_TARGET_CONFIG;

/// Description of a single run.
///
/// # Example
///
/// ```yaml
/// operator: math.double
/// properties:
///   factor: 2
/// data:
///   in: [1, 2, 3]
/// channelSize: 16
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Name of the root operator definition.
    pub operator: String,

    /// Property values for the root operator.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,

    /// Data pushed through the network.
    #[serde(default)]
    pub data: ManifestData,

    /// Capacity of every channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_size: Option<usize>,

    /// Use unbounded channels; takes precedence over `channelSize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_dynamic: Option<bool>,
}

/// Input data of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestData {
    /// Values pushed into the root `main` in-port, in order.
    #[serde(rename = "in", default)]
    pub inputs: Vec<Value>,
}

impl Manifest {
    /// Reads a manifest, parsing `.json` files as JSON and anything else as YAML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).context("failed to read manifest")?;
        let is_json = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text).context("invalid JSON manifest")
        } else {
            serde_yaml::from_str(&text).context("invalid YAML manifest")
        }
    }

    /// Returns the engine configuration for this run.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut builder = EngineConfigBuilder::default();
        if let Some(size) = self.channel_size {
            builder.channel_size(size);
        }
        if let Some(dynamic) = self.channel_dynamic {
            builder.channel_dynamic(dynamic);
        }
        builder.build().context("invalid channel configuration")
    }

    /// Logs the manifest summary.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            operator = %self.operator,
            properties = self.properties.len(),
            inputs = self.data.inputs.len(),
            channel_size = ?self.channel_size,
            channel_dynamic = ?self.channel_dynamic,
            "Run manifest"
        );
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rivulet_runtime::port::ChannelCapacity;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        fs::write(
            &path,
            "operator: math.double\nproperties:\n  factor: 2\ndata:\n  in: [1, 2]\nchannelSize: 4\n",
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.operator, "math.double");
        assert_eq!(manifest.properties.get("factor"), Some(&json!(2)));
        assert_eq!(manifest.data.inputs, vec![json!(1), json!(2)]);
        assert_eq!(manifest.channel_size, Some(4));
        assert_eq!(manifest.channel_dynamic, None);
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"operator": "identity", "data": {"in": ["a"]}, "channelDynamic": true}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.operator, "identity");
        assert!(manifest.properties.is_empty());
        assert_eq!(manifest.channel_dynamic, Some(true));
    }

    #[test]
    fn test_missing_data_defaults_to_empty() {
        let manifest: Manifest = serde_yaml::from_str("operator: identity").unwrap();
        assert!(manifest.data.inputs.is_empty());
        assert_eq!(manifest.engine_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_engine_config() {
        let manifest: Manifest =
            serde_yaml::from_str("operator: x\nchannelSize: 3\nchannelDynamic: true").unwrap();
        assert_eq!(manifest.engine_config().unwrap().capacity(), ChannelCapacity::Dynamic);

        let manifest: Manifest = serde_yaml::from_str("operator: x\nchannelSize: 3").unwrap();
        assert_eq!(
            manifest.engine_config().unwrap().capacity(),
            ChannelCapacity::bounded(3).unwrap()
        );

        let manifest: Manifest = serde_yaml::from_str("operator: x\nchannelSize: 0").unwrap();
        assert!(manifest.engine_config().is_err());
    }
}
