//! CLI configuration management.
//!
//! This module defines the CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── manifest: PathBuf           # Run manifest (YAML or JSON)
//! ├── definitions: Option<PathBuf> # Root of named definition files
//! ├── log_format: LogFormat       # Text or JSON log lines on stderr
//! └── artifact: ArtifactConfig    # Compiled flat definition output
//! ```
//!
//! The run itself (operator, properties, input data, channel sizing) is
//! described by the [`Manifest`].
//!
//! # Example
//!
//! ```bash
//! # Run a manifest, writing the compiled definition next to it
//! rivulet flows/manifest.yaml
//!
//! # Or via environment variables, skipping the artifact
//! RIVULET_MANIFEST=flows/manifest.yaml rivulet --no-artifact
//! ```

mod artifact;
mod manifest;

use std::path::{Path, PathBuf};
use std::process;

pub use artifact::ArtifactConfig;
use clap::Parser;
pub use manifest::Manifest;
use serde::{Deserialize, Serialize};

use crate::telemetry::LogFormat;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "rivulet")]
#[command(about = "Compile and run flow-based operator networks")]
#[command(version)]
pub struct Cli {
    /// Path to the run manifest.
    #[arg(env = "RIVULET_MANIFEST", default_value = "manifest.yaml")]
    pub manifest: PathBuf,

    /// Directory that named definitions are looked up in.
    ///
    /// A dotted name `a.b.c` resolves to `a/b/c.json`, `.yaml` or `.yml`
    /// below this directory. Defaults to the manifest's directory.
    #[arg(long, env = "RIVULET_DEFINITIONS")]
    #[serde(default)]
    pub definitions: Option<PathBuf>,

    /// Format of the log lines written to stderr.
    #[arg(long, env = "RIVULET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    #[serde(default)]
    pub log_format: LogFormat,

    /// Compiled artifact output.
    #[clap(flatten)]
    pub artifact: ArtifactConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// Loading .env first lets clap's `env` defaults pick up its values.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Returns the directory containing the manifest.
    pub fn manifest_dir(&self) -> &Path {
        match self.manifest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Returns the root directory for named definitions.
    pub fn definitions_root(&self) -> PathBuf {
        self.definitions
            .clone()
            .unwrap_or_else(|| self.manifest_dir().to_path_buf())
    }

    /// Returns where the compiled artifact is written, if anywhere.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.artifact.path(self.manifest_dir())
    }

    /// Logs build information at debug level.
    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Logs the resolved configuration.
    pub fn log(&self) {
        Self::log_build_info();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            manifest = %self.manifest.display(),
            definitions = %self.definitions_root().display(),
            artifact = ?self.artifact_path(),
            log_format = ?self.log_format,
            "CLI configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
