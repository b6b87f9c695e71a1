//! Operator tree construction and wiring.

use std::collections::HashMap;

use strum::{AsRefStr, Display};

use super::{Operator, OperatorId, OperatorKind, OperatorTree};
use crate::definition::{
    Body, ChildRef, Connection, OperatorDef, OperatorSource, PortRef, specialize, unescape,
};
use crate::error::{Error, Result};
use crate::library::Library;
use crate::port::{PortAddr, PortDirection, PortNode};

/// Tracing target for tree construction.
const TRACING_TARGET: &str = "rivulet_runtime::operator";

/// How the builder treats composite children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BuildMode {
    /// Specializes and builds every child recursively, keeping the hierarchy.
    #[default]
    Hierarchical,
    /// Expects resolved primitive children only, as produced by
    /// [`define`](crate::compiler::define).
    Flat,
}

/// Which end of a connection a port reference sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Source,
    Destination,
}

/// Instantiates operator trees from definitions.
#[derive(Debug, Clone, Copy)]
pub struct Builder<'a> {
    library: &'a Library,
}

impl<'a> Builder<'a> {
    /// Creates a builder resolving definitions and behaviors from `library`.
    pub fn new(library: &'a Library) -> Self {
        Self { library }
    }

    /// Builds and wires an operator tree rooted at `def`.
    ///
    /// The root definition is specialized with no properties first, so a
    /// template whose properties all have defaults is accepted as well.
    pub fn build(&self, name: &str, def: &OperatorDef, mode: BuildMode) -> Result<OperatorTree> {
        let def = if def.is_resolved() {
            def.clone()
        } else {
            specialize(def, &Default::default())?
        };

        tracing::debug!(
            target: TRACING_TARGET,
            operator = %name,
            definition = %def.name,
            mode = %mode,
            "Building operator tree"
        );

        let root = self.instantiate(name, def, None)?;
        let mut tree = OperatorTree::new(root);
        let root = tree.root();
        let mut stack = Vec::new();
        self.populate(&mut tree, root, mode, &mut stack)?;

        tracing::debug!(
            target: TRACING_TARGET,
            operator = %name,
            operators = tree.len(),
            "Operator tree built"
        );
        Ok(tree)
    }

    fn instantiate(
        &self,
        name: &str,
        def: OperatorDef,
        parent: Option<OperatorId>,
    ) -> Result<Operator> {
        let kind = if def.is_primitive() {
            OperatorKind::Primitive(self.library.primitive(&def.name)?)
        } else {
            OperatorKind::Composite {
                children: Vec::new(),
            }
        };
        Ok(Operator::new(name, def, parent, kind))
    }

    /// Builds the children of `id`, then wires its connections.
    fn populate(
        &self,
        tree: &mut OperatorTree,
        id: OperatorId,
        mode: BuildMode,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        let operator = tree.operator(id)?;
        let Some(body) = operator.definition().body.clone() else {
            return Ok(());
        };
        let definition = operator.definition().name.clone();
        stack.push(definition);

        let mut children = HashMap::with_capacity(body.children.len());
        for child in &body.children {
            validate_name(&child.name, mode)?;
            if children.contains_key(child.name.as_str()) {
                return Err(Error::InvalidDefinition(format!(
                    "duplicate child '{}' in '{}'",
                    child.name,
                    tree.qualified_name(id)
                )));
            }

            let def = self.child_definition(child, mode, stack)?;
            let child_id = tree.insert(self.instantiate(&child.name, def, Some(id))?);
            tree.children_mut(id)?.push(child_id);
            if mode == BuildMode::Hierarchical {
                self.populate(tree, child_id, mode, stack)?;
            }
            children.insert(child.name.as_str(), child_id);
        }

        self.wire(tree, id, &children, &body)?;
        stack.pop();
        Ok(())
    }

    fn child_definition(
        &self,
        child: &ChildRef,
        mode: BuildMode,
        stack: &[String],
    ) -> Result<OperatorDef> {
        let def = match &child.operator {
            OperatorSource::Inline(def) => def.as_ref().clone(),
            OperatorSource::Named(name) => {
                if stack.iter().any(|entered| entered == name) {
                    return Err(Error::StructuralCompile(format!(
                        "definition '{name}' contains itself through child '{}'",
                        child.name
                    )));
                }
                self.library.definition(name)?
            }
        };

        match mode {
            BuildMode::Hierarchical => specialize(&def, &unescape(&child.properties)),
            BuildMode::Flat if def.is_composite() => Err(Error::StructuralCompile(format!(
                "child '{}' of a flat definition is composite",
                child.name
            ))),
            BuildMode::Flat => Ok(def),
        }
    }

    fn wire(
        &self,
        tree: &mut OperatorTree,
        id: OperatorId,
        children: &HashMap<&str, OperatorId>,
        body: &Body,
    ) -> Result<()> {
        for connection in &body.connections {
            self.connect(tree, id, children, connection)?;
        }
        Ok(())
    }

    fn connect(
        &self,
        tree: &mut OperatorTree,
        id: OperatorId,
        children: &HashMap<&str, OperatorId>,
        connection: &Connection,
    ) -> Result<()> {
        let from = resolve(tree, id, children, &connection.from, End::Source)?;
        for to in &connection.to {
            let to_addr = resolve(tree, id, children, to, End::Destination)?;
            link_nodes(tree, &from, &to_addr, &connection.from, to)?;
            tracing::trace!(
                target: TRACING_TARGET,
                from = %connection.from,
                to = %to,
                "Connected ports"
            );
        }
        Ok(())
    }
}

fn validate_name(name: &str, mode: BuildMode) -> Result<()> {
    let forbidden: &[char] = match mode {
        BuildMode::Hierarchical => &['.', ':'],
        BuildMode::Flat => &[':'],
    };
    if name.is_empty() || name.contains(forbidden) {
        return Err(Error::InvalidDefinition(format!(
            "invalid operator name '{name}'"
        )));
    }
    Ok(())
}

/// Resolves a port reference to the address of an existing port node.
fn resolve(
    tree: &OperatorTree,
    id: OperatorId,
    children: &HashMap<&str, OperatorId>,
    port: &PortRef,
    end: End,
) -> Result<PortAddr> {
    let (operator, direction) = match (&port.operator, end) {
        (None, End::Source) => (id, PortDirection::In),
        (None, End::Destination) => (id, PortDirection::Out),
        (Some(name), end) => {
            let child = children.get(name.as_str()).copied().ok_or_else(|| {
                Error::unknown_port(
                    format!("{}.{name}", tree.qualified_name(id)),
                    port.port_path(),
                )
            })?;
            let direction = match end {
                End::Source => PortDirection::Out,
                End::Destination => PortDirection::In,
            };
            (child, direction)
        }
    };

    let path = port.segments();
    if tree.operator(operator)?.ports(direction).node(&path).is_none() {
        return Err(Error::unknown_port(
            tree.qualified_name(operator),
            port.port_path(),
        ));
    }
    Ok(PortAddr::new(operator, direction, path))
}

/// Links two port nodes leaf by leaf.
///
/// Leaves link directly; maps link pairwise and must have identical keys.
fn link_nodes(
    tree: &mut OperatorTree,
    from: &PortAddr,
    to: &PortAddr,
    from_ref: &PortRef,
    to_ref: &PortRef,
) -> Result<()> {
    let node = |addr: &PortAddr| -> Result<PortNode> {
        tree.operator(addr.operator)?
            .ports(addr.direction)
            .node(&addr.path)
            .cloned()
            .ok_or_else(|| Error::unknown_port(tree.qualified_name(addr.operator), addr.port_path()))
    };
    let mismatch = |reason: String| Error::PortShapeMismatch {
        from: from_ref.to_string(),
        to: to_ref.to_string(),
        reason,
    };

    let pairs = match (node(from)?, node(to)?) {
        (PortNode::Leaf(_), PortNode::Leaf(_)) => vec![Vec::new()],
        (PortNode::Map(_), PortNode::Leaf(_)) => {
            return Err(mismatch("map port connected to a leaf port".into()));
        }
        (PortNode::Leaf(_), PortNode::Map(_)) => {
            return Err(mismatch("leaf port connected to a map port".into()));
        }
        (source @ PortNode::Map(_), destination @ PortNode::Map(_)) => {
            let source_paths = source.leaf_paths();
            if source_paths != destination.leaf_paths() {
                return Err(mismatch("map ports have different keys".into()));
            }
            source_paths
        }
    };

    for path in pairs {
        tree.link(&from.join(&path), &to.join(&path))?;
    }
    Ok(())
}
