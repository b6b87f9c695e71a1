//! Ports, channels and the handles that move messages through them.
//!
//! Ports are declared on operators as a [`PortSet`] of named [`PortNode`]s.
//! Every leaf records its logical links: at most one `source` and an ordered
//! list of `destinations`. Channels exist only once a network is started,
//! when each linked consumer leaf receives its own channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

mod channel;
mod handle;

pub use channel::{ChannelCapacity, DEFAULT_CHANNEL_SIZE};
pub(crate) use channel::{ChannelReceiver, ChannelSender, channel};
pub use handle::{PortReader, PortWriter};
pub(crate) use handle::{ReaderNode, WriterNode};

use crate::definition::PortShape;
use crate::operator::OperatorId;

/// Direction of a port relative to its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortDirection {
    /// Consumes messages.
    In,
    /// Produces messages.
    Out,
}

/// Address of a port node inside an operator tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortAddr {
    /// Operator owning the port.
    pub operator: OperatorId,
    /// Which port set of the operator.
    pub direction: PortDirection,
    /// Port name followed by map keys.
    pub path: Vec<String>,
}

impl PortAddr {
    /// Creates a port address.
    pub fn new(operator: OperatorId, direction: PortDirection, path: Vec<String>) -> Self {
        Self {
            operator,
            direction,
            path,
        }
    }

    /// Returns the address of a node below this one.
    pub fn join(&self, rest: &[String]) -> Self {
        let mut path = self.path.clone();
        path.extend_from_slice(rest);
        Self::new(self.operator, self.direction, path)
    }

    /// Returns the dotted port path.
    pub fn port_path(&self) -> String {
        self.path.join(".")
    }
}

/// A port backed by a single channel, with its logical links.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafPort {
    /// Declared shape of the leaf.
    pub shape: PortShape,
    /// Producer feeding this leaf.
    pub source: Option<PortAddr>,
    /// Consumers fed by this leaf, in connection order.
    pub destinations: Vec<PortAddr>,
}

impl LeafPort {
    fn new(shape: PortShape) -> Self {
        Self {
            shape,
            source: None,
            destinations: Vec::new(),
        }
    }
}

/// A port or a map of sub-ports.
#[derive(Debug, Clone, PartialEq)]
pub enum PortNode {
    /// Port carried by one channel.
    Leaf(LeafPort),
    /// Named sub-ports.
    Map(BTreeMap<String, PortNode>),
}

impl PortNode {
    fn from_shape(shape: &PortShape) -> Self {
        match shape {
            PortShape::Map { entries } => Self::Map(
                entries
                    .iter()
                    .map(|(key, shape)| (key.clone(), Self::from_shape(shape)))
                    .collect(),
            ),
            leaf => Self::Leaf(LeafPort::new(leaf.clone())),
        }
    }

    /// Returns the relative paths and leaves below this node, in key order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &LeafPort)> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(
        &'a self,
        prefix: &mut Vec<String>,
        leaves: &mut Vec<(Vec<String>, &'a LeafPort)>,
    ) {
        match self {
            Self::Leaf(leaf) => leaves.push((prefix.clone(), leaf)),
            Self::Map(entries) => {
                for (key, node) in entries {
                    prefix.push(key.clone());
                    node.collect_leaves(prefix, leaves);
                    prefix.pop();
                }
            }
        }
    }

    /// Returns the relative paths of all leaves below this node.
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        self.leaves().into_iter().map(|(path, _)| path).collect()
    }

    fn get(&self, path: &[String]) -> Option<&PortNode> {
        let Some((key, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Self::Map(entries) => entries.get(key)?.get(rest),
            Self::Leaf(_) => None,
        }
    }

    fn get_mut(&mut self, path: &[String]) -> Option<&mut PortNode> {
        let Some((key, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Self::Map(entries) => entries.get_mut(key)?.get_mut(rest),
            Self::Leaf(_) => None,
        }
    }
}

/// The in-ports or out-ports of an operator, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortSet {
    ports: BTreeMap<String, PortNode>,
}

impl PortSet {
    /// Creates the ports declared by a definition.
    pub fn from_shapes(shapes: &BTreeMap<String, PortShape>) -> Self {
        Self {
            ports: shapes
                .iter()
                .map(|(name, shape)| (name.clone(), PortNode::from_shape(shape)))
                .collect(),
        }
    }

    /// Returns the port names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Returns the node at `path` (port name first).
    pub fn node(&self, path: &[String]) -> Option<&PortNode> {
        let (name, rest) = path.split_first()?;
        self.ports.get(name)?.get(rest)
    }

    /// Returns the leaf at `path`.
    pub fn leaf(&self, path: &[String]) -> Option<&LeafPort> {
        match self.node(path)? {
            PortNode::Leaf(leaf) => Some(leaf),
            PortNode::Map(_) => None,
        }
    }

    pub(crate) fn leaf_mut(&mut self, path: &[String]) -> Option<&mut LeafPort> {
        let (name, rest) = path.split_first()?;
        match self.ports.get_mut(name)?.get_mut(rest)? {
            PortNode::Leaf(leaf) => Some(leaf),
            PortNode::Map(_) => None,
        }
    }

    /// Returns every leaf with its full path, ports in name order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &LeafPort)> {
        self.ports
            .iter()
            .flat_map(|(name, node)| {
                node.leaves().into_iter().map(move |(mut path, leaf)| {
                    path.insert(0, name.clone());
                    (path, leaf)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> PortSet {
        let mut shapes = BTreeMap::new();
        shapes.insert("main".to_string(), PortShape::map([("a", PortShape::Number), ("b", PortShape::Any)]));
        shapes.insert("side".to_string(), PortShape::stream(PortShape::Number));
        PortSet::from_shapes(&shapes)
    }

    #[test]
    fn test_port_set_leaves() {
        let ports = ports();
        let paths: Vec<String> = ports.leaves().into_iter().map(|(p, _)| p.join(".")).collect();
        assert_eq!(paths, vec!["main.a", "main.b", "side"]);
        assert_eq!(ports.names().collect::<Vec<_>>(), vec!["main", "side"]);
    }

    #[test]
    fn test_port_set_lookup() {
        let mut ports = ports();
        let main = vec!["main".to_string()];
        assert!(matches!(ports.node(&main), Some(PortNode::Map(_))));
        assert!(ports.leaf(&main).is_none());

        let leaf = vec!["main".to_string(), "a".to_string()];
        assert_eq!(ports.leaf(&leaf).unwrap().shape, PortShape::Number);
        ports.leaf_mut(&leaf).unwrap().destinations.push(PortAddr::new(
            OperatorId::from(3),
            PortDirection::In,
            vec!["main".into()],
        ));
        assert_eq!(ports.leaf(&leaf).unwrap().destinations.len(), 1);

        assert!(ports.node(&["missing".to_string()]).is_none());
        assert!(ports.node(&["side".to_string(), "x".to_string()]).is_none());
    }

    #[test]
    fn test_stream_is_single_leaf() {
        let ports = ports();
        let side = ports.node(&["side".to_string()]).unwrap();
        assert_eq!(side.leaf_paths(), vec![Vec::<String>::new()]);
    }
}
