//! Passes over operator trees.
//!
//! - [`compile`]: flattens composites into their primitives
//! - [`define`]: serializes a flat tree back into a definition
//! - [`validate`]: checks that every input of a flat tree is connected
//! - [`dataflow`]: operator-level graph view for inspection

mod dataflow;
mod define;
mod flatten;
mod validate;

pub use dataflow::{Dataflow, FlowEdge, FlowNode, dataflow};
pub use define::define;
pub use flatten::{CompileStats, compile};
pub use validate::validate;

/// Tracing target for compiler passes.
const TRACING_TARGET: &str = "rivulet_runtime::compiler";
