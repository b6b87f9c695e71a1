//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use rivulet_runtime::prelude::*;
//! ```

pub use crate::compiler::{CompileStats, compile, define, validate};
pub use crate::definition::{
    Body, ChildRef, Connection, MAIN_PORT, OperatorDef, PortRef, PortShape, Properties,
    PropertyDef, PropertyType, specialize,
};
pub use crate::engine::{Engine, EngineConfig, EngineConfigBuilder, Network};
pub use crate::error::{Error, Result};
pub use crate::library::{DefinitionSource, FsDefinitionSource, Library};
pub use crate::operator::{BuildMode, Builder, OperatorTree};
pub use crate::primitive::{FnPrimitive, Primitive, WorkerContext};
