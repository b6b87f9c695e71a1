//! Definition lookup and primitive behaviors.
//!
//! A [`Library`] answers two questions for the builder: which definition a
//! named child refers to, and which behavior backs a primitive definition.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod fs;

pub use fs::FsDefinitionSource;

use crate::definition::OperatorDef;
use crate::error::{Error, Result};
use crate::primitive::{Primitive, PrimitiveRegistry};

/// Tracing target for definition lookup.
const TRACING_TARGET: &str = "rivulet_runtime::library";

/// Reads operator definitions by name.
pub trait DefinitionSource: Send + Sync {
    /// Reads the definition named `name`.
    ///
    /// Fails with [`Error::Resolution`] if it cannot be located or read.
    fn read(&self, name: &str) -> Result<OperatorDef>;
}

/// Registered definitions and primitive behaviors, with an optional
/// fallback source for names that are not registered.
#[derive(Clone, Default)]
pub struct Library {
    primitives: PrimitiveRegistry,
    definitions: HashMap<String, OperatorDef>,
    source: Option<Arc<dyn DefinitionSource>>,
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a library with the built-in primitives registered.
    pub fn with_builtins() -> Self {
        Self {
            primitives: PrimitiveRegistry::with_builtins(),
            ..Self::default()
        }
    }

    /// Sets the fallback source for unregistered names.
    pub fn with_source(mut self, source: impl DefinitionSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Registers a primitive behavior.
    pub fn register_primitive(&mut self, primitive: impl Primitive) {
        self.primitives.register(primitive);
    }

    /// Registers a definition under its name.
    pub fn register_definition(&mut self, definition: OperatorDef) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    /// Returns the primitive registry.
    pub fn primitives(&self) -> &PrimitiveRegistry {
        &self.primitives
    }

    /// Returns the behavior backing the primitive definition `name`.
    pub fn primitive(&self, name: &str) -> Result<Arc<dyn Primitive>> {
        self.primitives
            .get(name)
            .ok_or_else(|| Error::resolution(name, "no primitive behavior registered"))
    }

    /// Resolves a definition by name.
    ///
    /// Registered definitions win over primitive templates, which win over
    /// the fallback source.
    pub fn definition(&self, name: &str) -> Result<OperatorDef> {
        if let Some(definition) = self.definitions.get(name) {
            return Ok(definition.clone());
        }
        if let Some(primitive) = self.primitives.get(name) {
            return Ok(primitive.definition());
        }
        match &self.source {
            Some(source) => {
                tracing::debug!(target: TRACING_TARGET, name = %name, "Reading definition");
                source.read(name)
            }
            None => Err(Error::resolution(name, "definition not found")),
        }
    }
}

impl DefinitionSource for Library {
    fn read(&self, name: &str) -> Result<OperatorDef> {
        self.definition(name)
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("primitives", &self.primitives)
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("source", &self.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Body, MAIN_PORT, PortShape};

    struct Fixed;

    impl DefinitionSource for Fixed {
        fn read(&self, name: &str) -> Result<OperatorDef> {
            match name {
                "from_source" => Ok(OperatorDef::new("from_source").with_body(Body::new())),
                _ => Err(Error::resolution(name, "unknown")),
            }
        }
    }

    #[test]
    fn test_lookup_order() {
        let mut library = Library::with_builtins().with_source(Fixed);
        library.register_definition(
            OperatorDef::new("identity").with_out(MAIN_PORT, PortShape::Number),
        );

        let shadowed = library.definition("identity").unwrap();
        assert_eq!(shadowed.out_ports[MAIN_PORT], PortShape::Number);
        assert_eq!(library.definition("add").unwrap().name, "add");
        assert!(library.definition("from_source").unwrap().is_composite());
        assert!(matches!(library.definition("nope"), Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_missing_primitive() {
        let library = Library::new();
        assert!(matches!(library.primitive("identity"), Err(Error::Resolution { .. })));
        assert!(matches!(library.definition("identity"), Err(Error::Resolution { .. })));
    }
}
