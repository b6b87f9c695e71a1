//! Running operator networks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::TRACING_TARGET;
use crate::definition::MAIN_PORT;
use crate::error::{Error, Result};
use crate::port::{PortReader, PortWriter};
use crate::primitive::{Primitive, WorkerContext};

/// Runs one primitive worker to completion.
pub(super) async fn run_worker(
    operator: String,
    behavior: Arc<dyn Primitive>,
    ctx: WorkerContext,
) -> Result<()> {
    tracing::debug!(target: TRACING_TARGET, operator = %operator, "Worker started");

    match behavior.run(ctx).await {
        Ok(()) => {
            tracing::debug!(target: TRACING_TARGET, operator = %operator, "Worker finished");
            Ok(())
        }
        Err(error) if error.is_cancelled() => {
            tracing::debug!(target: TRACING_TARGET, operator = %operator, "Worker cancelled");
            Err(error)
        }
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET,
                operator = %operator,
                error = %error,
                "Worker failed"
            );
            Err(Error::Worker {
                operator,
                message: error.to_string(),
            })
        }
    }
}

/// A started operator network.
///
/// The root's in-ports are driven through [`PortWriter`]s and its out-ports
/// read through [`PortReader`]s. Dropping the network cancels its workers.
#[derive(Debug)]
pub struct Network {
    id: Uuid,
    name: String,
    inputs: BTreeMap<String, PortWriter>,
    outputs: BTreeMap<String, PortReader>,
    workers: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

impl Network {
    pub(super) fn new(
        id: Uuid,
        name: impl Into<String>,
        inputs: BTreeMap<String, PortWriter>,
        outputs: BTreeMap<String, PortReader>,
        workers: JoinSet<Result<()>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            inputs,
            outputs,
            workers,
            cancel,
        }
    }

    /// Returns the run identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the root operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of workers still tracked.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns the cancellation token shared by every worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the writer of a root in-port.
    pub fn input(&self, port: &str) -> Result<&PortWriter> {
        self.inputs
            .get(port)
            .ok_or_else(|| Error::unknown_port(&self.name, port))
    }

    /// Returns the reader of a root out-port.
    pub fn output(&mut self, port: &str) -> Result<&mut PortReader> {
        self.outputs
            .get_mut(port)
            .ok_or_else(|| Error::unknown_port(&self.name, port))
    }

    /// Detaches the writer of a root in-port, e.g. to drive it from another
    /// task.
    pub fn take_input(&mut self, port: &str) -> Result<PortWriter> {
        self.inputs
            .remove(port)
            .ok_or_else(|| Error::unknown_port(&self.name, port))
    }

    /// Detaches the reader of a root out-port.
    pub fn take_output(&mut self, port: &str) -> Result<PortReader> {
        self.outputs
            .remove(port)
            .ok_or_else(|| Error::unknown_port(&self.name, port))
    }

    /// Pushes a message into the `main` in-port.
    pub async fn push(&self, value: Value) -> Result<()> {
        self.input(MAIN_PORT)?.push(value).await
    }

    /// Pulls a message from the `main` out-port.
    pub async fn pull(&mut self) -> Result<Value> {
        self.output(MAIN_PORT)?.pull().await
    }

    /// Enables unbounded look-ahead on a root out-port.
    pub fn bufferize(&mut self, port: &str) -> Result<()> {
        self.output(port)?.bufferize();
        Ok(())
    }

    /// Closes a root in-port; consumers see the end of input once drained.
    pub fn close_input(&mut self, port: &str) -> Result<()> {
        self.take_input(port)?.close();
        Ok(())
    }

    /// Pushes `inputs` into `main` from a spawned task while pulling one
    /// output per input.
    ///
    /// Pushing and pulling concurrently keeps a bounded network from
    /// stalling when it holds fewer messages than the batch.
    pub async fn run_batch(&mut self, inputs: Vec<Value>) -> Result<Vec<Value>> {
        let writer = self.input(MAIN_PORT)?.clone();
        let count = inputs.len();
        let feeder = tokio::spawn(async move {
            for value in inputs {
                writer.push(value).await?;
            }
            Ok::<_, Error>(())
        });

        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            match self.pull().await {
                Ok(value) => outputs.push(value),
                Err(error) => {
                    feeder.abort();
                    return Err(self.failure().unwrap_or(error));
                }
            }
        }

        feeder
            .await
            .map_err(|e| Error::Internal(format!("input task failed: {e}")))??;
        Ok(outputs)
    }

    /// Returns the first error among workers that already finished.
    fn failure(&mut self) -> Option<Error> {
        let mut failure = None;
        while let Some(joined) = self.workers.try_join_next() {
            if let Err(error) = flatten_join(joined)
                && !error.is_cancelled()
            {
                failure.get_or_insert(error);
            }
        }
        failure
    }

    /// Closes every port and waits for all workers to finish.
    ///
    /// Returns the first worker failure.
    pub async fn wait(mut self) -> Result<()> {
        self.inputs.clear();
        self.outputs.clear();
        self.join().await
    }

    /// Cancels every worker and waits for them to stop.
    ///
    /// Returns the first worker failure other than cancellation.
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!(target: TRACING_TARGET, run = %self.id, "Shutting down network");
        self.cancel.cancel();
        self.join().await
    }

    async fn join(&mut self) -> Result<()> {
        let mut failure = None;
        while let Some(joined) = self.workers.join_next().await {
            if let Err(error) = flatten_join(joined)
                && !error.is_cancelled()
            {
                failure.get_or_insert(error);
            }
        }

        tracing::info!(
            target: TRACING_TARGET,
            run = %self.id,
            failed = failure.is_some(),
            "Network stopped"
        );
        failure.map_or(Ok(()), Err)
    }
}

fn flatten_join(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(error) if error.is_cancelled() => Err(Error::Cancelled),
        Err(error) => Err(Error::Internal(format!("worker task panicked: {error}"))),
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::compiler::{compile, define};
    use crate::definition::{Body, ChildRef, OperatorDef, PortShape};
    use crate::engine::{Engine, EngineConfigBuilder};
    use crate::operator::{BuildMode, Builder, OperatorTree};
    use crate::testing;

    fn flat_tree(def: &OperatorDef) -> OperatorTree {
        let library = testing::library();
        let builder = Builder::new(&library);
        let mut tree = builder.build("root", def, BuildMode::Hierarchical).unwrap();
        compile(&mut tree).unwrap();
        let flat = define(&tree).unwrap();
        builder.build("root", &flat, BuildMode::Flat).unwrap()
    }

    fn engine(size: usize) -> Engine {
        Engine::new(EngineConfigBuilder::default().channel_size(size).build().unwrap())
    }

    #[tokio::test]
    async fn test_identity_end_to_end() {
        let library = testing::library();
        let mut tree = Builder::new(&library)
            .build("root", &testing::nested(0), BuildMode::Hierarchical)
            .unwrap();
        let stats = compile(&mut tree).unwrap();
        assert_eq!((stats.compiled, stats.depth), (1, 0));

        let mut network = Engine::with_defaults().start(&tree).unwrap();
        for value in [1, 2, 3] {
            network.push(json!(value)).await.unwrap();
        }
        let mut pulled = Vec::new();
        for _ in 0..3 {
            pulled.push(network.pull().await.unwrap());
        }
        assert_eq!(pulled, vec![json!(1), json!(2), json!(3)]);
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_primitive_root() {
        let library = testing::library();
        let def = library.definition("identity").unwrap();
        let tree = Builder::new(&library)
            .build("identity", &def, BuildMode::Flat)
            .unwrap();

        let mut network = Engine::with_defaults().start(&tree).unwrap();
        assert_eq!(network.workers(), 1);
        network.push(json!("x")).await.unwrap();
        assert_eq!(network.pull().await.unwrap(), json!("x"));
        network.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity_one_pipeline() {
        let tree = flat_tree(&testing::nested_pipeline());
        let mut network = engine(1).start(&tree).unwrap();

        let inputs: Vec<Value> = (1..=5).map(|i| json!(format!("v{i}"))).collect();
        let outputs = tokio::time::timeout(Duration::from_secs(5), network.run_batch(inputs.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outputs, inputs);
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_flattening_preserves_behavior() {
        let library = testing::library();
        let inputs: Vec<Value> = (0..20).map(|i| json!(i)).collect();

        let hierarchical = Builder::new(&library)
            .build("root", &testing::nested_pipeline(), BuildMode::Hierarchical)
            .unwrap();
        let mut flattened = hierarchical.clone();
        compile(&mut flattened).unwrap();
        let mut network = engine(2).start(&flattened).unwrap();
        let direct = network.run_batch(inputs.clone()).await.unwrap();
        network.wait().await.unwrap();

        let rebuilt = flat_tree(&testing::nested_pipeline());
        let mut network = engine(2).start(&rebuilt).unwrap();
        let round_trip = network.run_batch(inputs.clone()).await.unwrap();
        network.wait().await.unwrap();

        assert_eq!(direct, inputs);
        assert_eq!(round_trip, direct);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_destination() {
        let tree = flat_tree(&testing::fan_out());
        let mut network = engine(1).start(&tree).unwrap();

        let outputs = network.run_batch(vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(
            outputs,
            vec![
                json!({"left": 1, "right": 1}),
                json!({"left": 2, "right": 2}),
            ]
        );
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_fan_out_to_child_inputs() {
        let tree = flat_tree(&testing::fan_out_children());
        let mut network = engine(1).start(&tree).unwrap();

        let inputs: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        let outputs = network.run_batch(inputs.clone()).await.unwrap();
        let expected: Vec<Value> = inputs
            .iter()
            .map(|value| json!({"left": value, "right": value}))
            .collect();
        assert_eq!(outputs, expected);
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_map_ports_split_and_assemble() {
        let def = OperatorDef::new("sum")
            .with_in(MAIN_PORT, PortShape::map([("a", PortShape::Number), ("b", PortShape::Number)]))
            .with_out(MAIN_PORT, PortShape::Number)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("add", "add"))
                    .connect(":main", &["add:main"])
                    .unwrap()
                    .connect("add:main", &[":main"])
                    .unwrap(),
            );
        let mut network = Engine::with_defaults().start(&flat_tree(&def)).unwrap();

        let outputs = network
            .run_batch(vec![json!({"a": 1, "b": 2}), json!({"a": 10, "b": -3})])
            .await
            .unwrap();
        assert_eq!(outputs, vec![json!(3), json!(7)]);

        let err = network.push(json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidMessage { .. }));
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_failure_is_reported() {
        let def = OperatorDef::new("sum")
            .with_in(MAIN_PORT, PortShape::map([("a", PortShape::Any), ("b", PortShape::Any)]))
            .with_out(MAIN_PORT, PortShape::Number)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("add", "add"))
                    .connect(":main", &["add:main"])
                    .unwrap()
                    .connect("add:main", &[":main"])
                    .unwrap(),
            );
        let mut network = Engine::with_defaults().start(&flat_tree(&def)).unwrap();

        network.push(json!({"a": "one", "b": 2})).await.unwrap();
        assert!(matches!(network.pull().await, Err(Error::Closed(_))));
        let err = network.wait().await.unwrap_err();
        assert!(matches!(err, Error::Worker { ref operator, .. } if operator == "add"));
    }

    #[tokio::test]
    async fn test_close_input_ends_workers() {
        let tree = flat_tree(&testing::nested_pipeline());
        let mut network = Engine::with_defaults().start(&tree).unwrap();
        network.push(json!(1)).await.unwrap();
        network.close_input(MAIN_PORT).unwrap();

        assert_eq!(network.pull().await.unwrap(), json!(1));
        assert!(matches!(network.pull().await, Err(Error::Closed(_))));
        assert!(matches!(network.push(json!(2)).await, Err(Error::UnknownPort { .. })));
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_workers() {
        let tree = flat_tree(&testing::nested_pipeline());
        let network = engine(1).start(&tree).unwrap();

        // Fill every channel so that the workers block on a full output.
        let writer = network.input(MAIN_PORT).unwrap().clone();
        let feeder = tokio::spawn(async move {
            let mut i = 0;
            loop {
                if writer.push(json!(i)).await.is_err() {
                    break;
                }
                i += 1;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(5), network.shutdown())
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), feeder)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bufferized_output() {
        let tree = flat_tree(&testing::nested_pipeline());
        let mut network = engine(1).start(&tree).unwrap();
        network.bufferize(MAIN_PORT).unwrap();

        for i in 0..10 {
            tokio::time::timeout(Duration::from_secs(5), network.push(json!(i)))
                .await
                .unwrap()
                .unwrap();
        }
        for i in 0..10 {
            assert_eq!(network.pull().await.unwrap(), json!(i));
        }
        network.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_split_handles() {
        let tree = flat_tree(&testing::nested_pipeline());
        let mut network = engine(1).start(&tree).unwrap();
        let writer = network.take_input(MAIN_PORT).unwrap();
        let mut reader = network.take_output(MAIN_PORT).unwrap();

        let feeder = tokio::spawn(async move {
            for i in 0..4 {
                writer.push(json!(i)).await.unwrap();
            }
        });
        let mut pulled = Vec::new();
        while let Some(value) = reader.recv().await.unwrap() {
            pulled.push(value);
        }
        feeder.await.unwrap();
        assert_eq!(pulled, (0..4).map(|i| json!(i)).collect::<Vec<_>>());
        network.wait().await.unwrap();
    }
}
