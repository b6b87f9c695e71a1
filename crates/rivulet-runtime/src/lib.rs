#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod compiler;
pub mod definition;
pub mod engine;
mod error;
pub mod library;
pub mod operator;
pub mod port;
pub mod primitive;

#[doc(hidden)]
pub mod prelude;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "rivulet_runtime";
