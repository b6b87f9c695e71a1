//! End-to-end run of a manifest.
//!
//! The run reads the root definition, specializes it with the manifest
//! properties, builds and compiles the hierarchical tree, writes the flat
//! artifact, rebuilds the flat tree from it, validates, and finally drives
//! the network with the manifest data.

use std::fs;
use std::io::{self, Write};

use anyhow::Context;
use rivulet_runtime::compiler::{compile, dataflow, define, validate};
use rivulet_runtime::definition::{MAIN_PORT, OperatorDef, specialize};
use rivulet_runtime::engine::Engine;
use rivulet_runtime::library::{FsDefinitionSource, Library};
use rivulet_runtime::operator::{BuildMode, Builder, OperatorTree};
use serde_json::Value;

use crate::TRACING_TARGET_PIPELINE;
use crate::config::{Cli, Manifest};

/// A single run of one manifest.
pub struct Pipeline<'a> {
    cli: &'a Cli,
    manifest: &'a Manifest,
    library: Library,
}

impl<'a> Pipeline<'a> {
    /// Creates a run resolving named definitions below the configured root.
    pub fn new(cli: &'a Cli, manifest: &'a Manifest) -> Self {
        let library =
            Library::with_builtins().with_source(FsDefinitionSource::new(cli.definitions_root()));
        Self {
            cli,
            manifest,
            library,
        }
    }

    /// Compiles the manifest operator into a validated flat tree.
    pub fn prepare(&self) -> anyhow::Result<OperatorTree> {
        let name = self.manifest.operator.as_str();
        let template = self
            .library
            .definition(name)
            .with_context(|| format!("failed to read operator '{name}'"))?;
        let resolved = specialize(&template, &self.manifest.properties)
            .with_context(|| format!("failed to specialize operator '{name}'"))?;

        let builder = Builder::new(&self.library);
        let mut tree = builder
            .build(name, &resolved, BuildMode::Hierarchical)
            .context("failed to build operator tree")?;
        tracing::info!(
            target: TRACING_TARGET_PIPELINE,
            operator = %name,
            operators = tree.len(),
            depth = tree.depth(),
            "Operator tree built"
        );

        let stats = compile(&mut tree).context("failed to compile operator tree")?;
        tracing::info!(
            target: TRACING_TARGET_PIPELINE,
            compiled = stats.compiled,
            depth = stats.depth,
            inlined = stats.inlined,
            "Operator tree compiled"
        );

        let flat = define(&tree).context("failed to serialize compiled tree")?;
        self.write_artifact(&flat)?;

        let tree = builder
            .build(name, &flat, BuildMode::Flat)
            .context("failed to rebuild compiled tree")?;
        validate(&tree).context("compiled network is incomplete")?;

        let flow = dataflow(&tree).context("failed to inspect dataflow")?;
        match flow.topological_order() {
            Some(order) => tracing::debug!(
                target: TRACING_TARGET_PIPELINE,
                links = flow.edge_count(),
                order = ?order,
                "Dataflow is acyclic"
            ),
            None => tracing::warn!(
                target: TRACING_TARGET_PIPELINE,
                links = flow.edge_count(),
                "Dataflow contains a feedback loop"
            ),
        }

        Ok(tree)
    }

    fn write_artifact(&self, flat: &OperatorDef) -> anyhow::Result<()> {
        let Some(path) = self.cli.artifact_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let yaml = flat.to_yaml().context("failed to encode artifact")?;
        fs::write(&path, yaml)
            .with_context(|| format!("failed to write artifact '{}'", path.display()))?;
        tracing::info!(
            target: TRACING_TARGET_PIPELINE,
            path = %path.display(),
            "Artifact written"
        );
        Ok(())
    }

    /// Starts the network and pushes every manifest input through `main`.
    ///
    /// Inputs are fed from a separate task so that a bounded network never
    /// waits on the reader for progress. Returns one output per input.
    pub async fn execute(&self, tree: &OperatorTree) -> anyhow::Result<Vec<Value>> {
        let engine = Engine::new(self.manifest.engine_config()?);
        let mut network = engine.start(tree).context("failed to start network")?;
        network.bufferize(MAIN_PORT)?;

        let writer = network.take_input(MAIN_PORT)?;
        let inputs = self.manifest.data.inputs.clone();
        let count = inputs.len();
        let feeder = tokio::spawn(async move {
            for (index, value) in inputs.into_iter().enumerate() {
                tracing::info!(target: TRACING_TARGET_PIPELINE, index, value = %value, "push");
                writer.push(value).await?;
            }
            writer.close();
            Ok::<_, rivulet_runtime::Error>(())
        });

        let mut outputs = Vec::with_capacity(count);
        for index in 0..count {
            match network.pull().await {
                Ok(value) => {
                    tracing::info!(target: TRACING_TARGET_PIPELINE, index, value = %value, "pull");
                    outputs.push(value);
                }
                Err(error) => {
                    feeder.abort();
                    network.shutdown().await.context("network failed")?;
                    return Err(error).context("failed to pull output");
                }
            }
        }

        feeder
            .await
            .context("input task failed")?
            .context("failed to push input")?;
        network.wait().await.context("network failed")?;
        Ok(outputs)
    }
}

/// Writes each output to stdout as one JSON value per line.
pub fn print_outputs(outputs: &[Value]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for value in outputs {
        serde_json::to_writer(&mut stdout, value)?;
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}
