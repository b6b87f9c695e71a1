//! Compiled artifact configuration.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

/// File name of the artifact when no path is given.
pub const DEFAULT_ARTIFACT: &str = "_rivulet.yaml";

/// Where the flattened definition is written after compilation.
///
/// The artifact is a resolved, primitive-only definition in YAML; it can be
/// inspected or loaded back as a named definition.
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize)]
#[must_use = "config does nothing unless you use it"]
pub struct ArtifactConfig {
    /// Path of the compiled artifact.
    ///
    /// Defaults to `_rivulet.yaml` next to the manifest.
    #[arg(long = "artifact", env = "RIVULET_ARTIFACT", conflicts_with = "no_artifact")]
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,

    /// Skip writing the compiled artifact.
    #[arg(long = "no-artifact", default_value_t = false)]
    #[serde(default)]
    pub no_artifact: bool,
}

impl ArtifactConfig {
    /// Resolves the artifact path against the manifest directory.
    pub fn path(&self, manifest_dir: &Path) -> Option<PathBuf> {
        if self.no_artifact {
            return None;
        }
        Some(
            self.artifact_path
                .clone()
                .unwrap_or_else(|| manifest_dir.join(DEFAULT_ARTIFACT)),
        )
    }
}
