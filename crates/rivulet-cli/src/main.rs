#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod pipeline;
mod telemetry;

use std::process;

use anyhow::Context;

use crate::config::{Cli, Manifest};
use crate::pipeline::Pipeline;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "rivulet_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "rivulet_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "rivulet_cli::config";
pub const TRACING_TARGET_PIPELINE: &str = "rivulet_cli::pipeline";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(cli.log_format)?;
    cli.log();

    let manifest = Manifest::load(&cli.manifest)
        .with_context(|| format!("failed to load manifest '{}'", cli.manifest.display()))?;
    manifest.log();

    let pipeline = Pipeline::new(&cli, &manifest);
    let tree = pipeline.prepare()?;
    let outputs = pipeline.execute(&tree).await?;
    pipeline::print_outputs(&outputs).context("failed to write outputs")?;

    Ok(())
}
