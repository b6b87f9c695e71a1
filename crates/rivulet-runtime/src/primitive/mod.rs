//! Primitive operator behaviors.
//!
//! A primitive is the only kind of operator that runs: its [`Primitive::run`]
//! is spawned as one worker per instance and talks to the rest of the
//! network through the port handles of its [`WorkerContext`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub mod builtin;

use crate::definition::{MAIN_PORT, OperatorDef, Properties};
use crate::error::{Error, Result};
use crate::port::{PortReader, PortWriter};

/// Behavior of a primitive operator.
#[async_trait]
pub trait Primitive: Send + Sync + 'static {
    /// Returns the definition template, whose name is the registry key.
    fn definition(&self) -> OperatorDef;

    /// Runs the worker until its inputs close or the network is cancelled.
    async fn run(&self, ctx: WorkerContext) -> Result<()>;
}

/// Ports and values handed to a running primitive.
pub struct WorkerContext {
    operator: String,
    values: Properties,
    inputs: BTreeMap<String, PortReader>,
    outputs: BTreeMap<String, PortWriter>,
    cancel: CancellationToken,
}

impl WorkerContext {
    pub(crate) fn new(
        operator: impl Into<String>,
        values: Properties,
        inputs: BTreeMap<String, PortReader>,
        outputs: BTreeMap<String, PortWriter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            operator: operator.into(),
            values,
            inputs,
            outputs,
            cancel,
        }
    }

    /// Returns the qualified operator name.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Returns a bound property value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns all bound property values.
    pub fn values(&self) -> &Properties {
        &self.values
    }

    /// Takes the reader of an in-port.
    pub fn take_input(&mut self, name: &str) -> Result<PortReader> {
        self.inputs
            .remove(name)
            .ok_or_else(|| Error::unknown_port(&self.operator, name))
    }

    /// Takes the writer of an out-port.
    pub fn take_output(&mut self, name: &str) -> Result<PortWriter> {
        self.outputs
            .remove(name)
            .ok_or_else(|| Error::unknown_port(&self.operator, name))
    }

    /// Returns the network's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("operator", &self.operator)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Primitive mapping each `main` input message to one `main` output message.
pub struct FnPrimitive<F> {
    definition: OperatorDef,
    func: F,
}

impl<F> FnPrimitive<F>
where
    F: Fn(&Properties, Value) -> Result<Value> + Send + Sync + 'static,
{
    /// Creates a primitive from a definition declaring `main` ports.
    pub fn new(definition: OperatorDef, func: F) -> Self {
        Self { definition, func }
    }
}

#[async_trait]
impl<F> Primitive for FnPrimitive<F>
where
    F: Fn(&Properties, Value) -> Result<Value> + Send + Sync + 'static,
{
    fn definition(&self) -> OperatorDef {
        self.definition.clone()
    }

    async fn run(&self, mut ctx: WorkerContext) -> Result<()> {
        let mut input = ctx.take_input(MAIN_PORT)?;
        let output = ctx.take_output(MAIN_PORT)?;

        while let Some(value) = input.recv().await? {
            let result = (self.func)(ctx.values(), value)?;
            output.push(result).await?;
        }
        Ok(())
    }
}

/// Primitive behaviors keyed by definition name.
#[derive(Clone, Default)]
pub struct PrimitiveRegistry {
    primitives: HashMap<String, Arc<dyn Primitive>>,
}

impl PrimitiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in primitives.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::identity());
        registry.register(builtin::constant());
        registry.register(builtin::add());
        registry
    }

    /// Registers a behavior under its definition name, replacing any
    /// previous one.
    pub fn register(&mut self, primitive: impl Primitive) {
        let primitive: Arc<dyn Primitive> = Arc::new(primitive);
        self.primitives.insert(primitive.definition().name, primitive);
    }

    /// Returns the behavior registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Primitive>> {
        self.primitives.get(name).cloned()
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered behaviors.
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

impl fmt::Debug for PrimitiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveRegistry")
            .field("primitives", &self.names())
            .finish()
    }
}
