//! Operator instance trees.
//!
//! An [`OperatorTree`] is an arena of [`Operator`] nodes. Children are owned
//! by the arena and listed by id on their composite parent; the parent link
//! is a plain id used for lookup only.

use std::fmt;
use std::sync::Arc;

mod builder;
mod id;

pub use builder::{BuildMode, Builder};
pub use id::OperatorId;

use crate::definition::{OperatorDef, Properties};
use crate::error::{Error, Result};
use crate::port::{LeafPort, PortAddr, PortDirection, PortSet};
use crate::primitive::Primitive;

/// Primitive behavior or composite children.
#[derive(Clone)]
pub enum OperatorKind {
    /// Leaf operator with an externally supplied behavior.
    Primitive(Arc<dyn Primitive>),
    /// Operator with an internal graph of children, in declaration order.
    Composite {
        /// Child operators.
        children: Vec<OperatorId>,
    },
}

impl fmt::Debug for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(_) => f.write_str("Primitive"),
            Self::Composite { children } => {
                f.debug_struct("Composite").field("children", children).finish()
            }
        }
    }
}

/// A node of the live operator tree.
#[derive(Debug, Clone)]
pub struct Operator {
    name: String,
    definition: OperatorDef,
    parent: Option<OperatorId>,
    kind: OperatorKind,
    in_ports: PortSet,
    out_ports: PortSet,
}

impl Operator {
    pub(crate) fn new(
        name: impl Into<String>,
        definition: OperatorDef,
        parent: Option<OperatorId>,
        kind: OperatorKind,
    ) -> Self {
        let in_ports = PortSet::from_shapes(&definition.in_ports);
        let out_ports = PortSet::from_shapes(&definition.out_ports);
        Self {
            name: name.into(),
            definition,
            parent,
            kind,
            in_ports,
            out_ports,
        }
    }

    /// Returns the instance name, unique among its siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resolved definition.
    pub fn definition(&self) -> &OperatorDef {
        &self.definition
    }

    /// Returns the bound property values.
    pub fn values(&self) -> &Properties {
        &self.definition.values
    }

    /// Returns the enclosing composite.
    pub fn parent(&self) -> Option<OperatorId> {
        self.parent
    }

    /// Returns the operator kind.
    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    /// Returns whether this is a primitive operator.
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, OperatorKind::Primitive(_))
    }

    /// Returns the primitive behavior, if any.
    pub fn behavior(&self) -> Option<&Arc<dyn Primitive>> {
        match &self.kind {
            OperatorKind::Primitive(behavior) => Some(behavior),
            OperatorKind::Composite { .. } => None,
        }
    }

    /// Returns the ports in the given direction.
    pub fn ports(&self, direction: PortDirection) -> &PortSet {
        match direction {
            PortDirection::In => &self.in_ports,
            PortDirection::Out => &self.out_ports,
        }
    }

    fn ports_mut(&mut self, direction: PortDirection) -> &mut PortSet {
        match direction {
            PortDirection::In => &mut self.in_ports,
            PortDirection::Out => &mut self.out_ports,
        }
    }

    /// Returns the in-ports.
    pub fn in_ports(&self) -> &PortSet {
        &self.in_ports
    }

    /// Returns the out-ports.
    pub fn out_ports(&self) -> &PortSet {
        &self.out_ports
    }

    /// Moves this operator under `parent`, prefixing its name.
    pub(crate) fn reparent(&mut self, parent: OperatorId, prefix: &str) {
        self.name = format!("{prefix}.{}", self.name);
        self.parent = Some(parent);
    }

    fn children(&self) -> &[OperatorId] {
        match &self.kind {
            OperatorKind::Composite { children } => children,
            OperatorKind::Primitive(_) => &[],
        }
    }
}

/// Arena of operators with a designated root.
#[derive(Debug, Clone)]
pub struct OperatorTree {
    nodes: Vec<Option<Operator>>,
    root: OperatorId,
}

impl OperatorTree {
    pub(crate) fn new(root: Operator) -> Self {
        Self {
            nodes: vec![Some(root)],
            root: OperatorId::from(0),
        }
    }

    pub(crate) fn insert(&mut self, operator: Operator) -> OperatorId {
        self.nodes.push(Some(operator));
        OperatorId::from(self.nodes.len() - 1)
    }

    pub(crate) fn remove(&mut self, id: OperatorId) -> Option<Operator> {
        self.nodes.get_mut(id.index())?.take()
    }

    /// Returns the root operator id.
    pub fn root(&self) -> OperatorId {
        self.root
    }

    /// Returns an operator.
    pub fn get(&self, id: OperatorId) -> Option<&Operator> {
        self.nodes.get(id.index())?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: OperatorId) -> Option<&mut Operator> {
        self.nodes.get_mut(id.index())?.as_mut()
    }

    /// Returns an operator, failing if it is not in the tree.
    pub fn operator(&self, id: OperatorId) -> Result<&Operator> {
        self.get(id)
            .ok_or_else(|| Error::StructuralCompile(format!("operator {id} is not in the tree")))
    }

    pub(crate) fn operator_mut(&mut self, id: OperatorId) -> Result<&mut Operator> {
        self.get_mut(id)
            .ok_or_else(|| Error::StructuralCompile(format!("operator {id} is not in the tree")))
    }

    /// Returns the number of live operators.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Returns whether the tree has no operators.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the children of an operator in declaration order.
    pub fn children(&self, id: OperatorId) -> &[OperatorId] {
        self.get(id).map(Operator::children).unwrap_or_default()
    }

    pub(crate) fn children_mut(&mut self, id: OperatorId) -> Result<&mut Vec<OperatorId>> {
        match &mut self.operator_mut(id)?.kind {
            OperatorKind::Composite { children } => Ok(children),
            OperatorKind::Primitive(_) => Err(Error::StructuralCompile(format!(
                "primitive {id} cannot have children"
            ))),
        }
    }

    /// Returns every primitive operator in depth-first declaration order.
    pub fn primitives(&self) -> Vec<OperatorId> {
        let mut primitives = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(operator) = self.get(id) else { continue };
            match &operator.kind {
                OperatorKind::Primitive(_) => primitives.push(id),
                OperatorKind::Composite { children } => stack.extend(children.iter().rev()),
            }
        }
        primitives
    }

    /// Returns whether no composite is left below the root.
    pub fn is_flat(&self) -> bool {
        self.children(self.root)
            .iter()
            .all(|&child| self.get(child).is_some_and(Operator::is_primitive))
    }

    /// Returns the composite nesting depth below the root.
    ///
    /// A root whose children are all primitives has depth 0; every composite
    /// level between the root and a primitive adds one.
    pub fn depth(&self) -> usize {
        self.nesting(self.root)
    }

    fn nesting(&self, id: OperatorId) -> usize {
        self.children(id)
            .iter()
            .filter(|&&child| self.get(child).is_some_and(|op| !op.is_primitive()))
            .map(|&child| 1 + self.nesting(child))
            .max()
            .unwrap_or(0)
    }

    /// Returns the dotted name of an operator relative to the root.
    ///
    /// The root itself is named by its own name.
    pub fn qualified_name(&self, id: OperatorId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(operator) = self.get(id) else { break };
            if id == self.root && !names.is_empty() {
                break;
            }
            names.push(operator.name.as_str());
            current = operator.parent;
        }
        names.reverse();
        names.join(".")
    }

    /// Renders a port address as `operator:port.key`.
    pub fn describe(&self, addr: &PortAddr) -> String {
        format!("{}:{}", self.qualified_name(addr.operator), addr.port_path())
    }

    /// Returns the leaf at a port address.
    pub fn leaf(&self, addr: &PortAddr) -> Option<&LeafPort> {
        self.get(addr.operator)?.ports(addr.direction).leaf(&addr.path)
    }

    pub(crate) fn leaf_mut(&mut self, addr: &PortAddr) -> Result<&mut LeafPort> {
        let description = self.describe(addr);
        self.get_mut(addr.operator)
            .and_then(|operator| operator.ports_mut(addr.direction).leaf_mut(&addr.path))
            .ok_or_else(|| Error::StructuralCompile(format!("no leaf port at '{description}'")))
    }

    /// Records a link from a producing leaf to a consuming leaf.
    pub(crate) fn link(&mut self, from: &PortAddr, to: &PortAddr) -> Result<()> {
        let destination = self.leaf_mut(to)?;
        if destination.source.is_some() {
            return Err(Error::PortAlreadyConnected {
                operator: self.qualified_name(to.operator),
                port: to.port_path(),
            });
        }
        destination.source = Some(from.clone());
        self.leaf_mut(from)?.destinations.push(to.clone());
        Ok(())
    }

    /// Returns all leaf addresses of an operator, in-ports first.
    pub fn leaf_addrs(&self, id: OperatorId) -> Vec<PortAddr> {
        let Some(operator) = self.get(id) else {
            return Vec::new();
        };
        [PortDirection::In, PortDirection::Out]
            .into_iter()
            .flat_map(|direction| {
                operator
                    .ports(direction)
                    .leaves()
                    .into_iter()
                    .map(move |(path, _)| PortAddr::new(id, direction, path))
            })
            .collect()
    }

    /// Returns every link as `(source, destination)`.
    ///
    /// Sources are visited operator by operator, root first, then the
    /// primitives in declaration order; destinations keep connection order.
    pub fn links(&self) -> Vec<(PortAddr, PortAddr)> {
        let mut operators = vec![self.root];
        let mut stack: Vec<OperatorId> = self.children(self.root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            operators.push(id);
            stack.extend(self.children(id).iter().rev());
        }

        let mut links = Vec::new();
        for id in operators {
            for addr in self.leaf_addrs(id) {
                if let Some(leaf) = self.leaf(&addr) {
                    for destination in &leaf.destinations {
                        links.push((addr.clone(), destination.clone()));
                    }
                }
            }
        }
        links
    }
}
