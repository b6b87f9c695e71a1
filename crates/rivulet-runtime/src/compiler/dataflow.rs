//! Operator-level dataflow view of a flat tree.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::operator::{OperatorId, OperatorTree};

/// Node of a [`Dataflow`] graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FlowNode {
    /// The root's in-ports, driven externally.
    Input,
    /// The root's out-ports, read externally.
    Output,
    /// A primitive operator.
    Operator(String),
}

/// Edge of a [`Dataflow`] graph: one leaf link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Dotted path of the producing port.
    pub from_port: String,
    /// Dotted path of the consuming port.
    pub to_port: String,
}

/// Directed graph of primitives and the root boundary.
#[derive(Debug, Clone, Default)]
pub struct Dataflow {
    graph: DiGraph<FlowNode, FlowEdge>,
}

impl Dataflow {
    /// Returns the number of nodes, boundary included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of leaf links.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns whether messages can flow around a feedback loop.
    pub fn has_feedback(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Returns operator names in dependency order, or `None` with feedback.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let order = toposort(&self.graph, None).ok()?;
        Some(
            order
                .into_iter()
                .filter_map(|index| match &self.graph[index] {
                    FlowNode::Operator(name) => Some(name.clone()),
                    FlowNode::Input | FlowNode::Output => None,
                })
                .collect(),
        )
    }

    /// Returns the underlying petgraph.
    pub fn inner(&self) -> &DiGraph<FlowNode, FlowEdge> {
        &self.graph
    }
}

/// Builds the dataflow view of a flat tree.
pub fn dataflow(tree: &OperatorTree) -> Result<Dataflow> {
    if !tree.is_flat() {
        return Err(Error::StructuralCompile(
            "dataflow requires a flat tree".into(),
        ));
    }

    let mut graph = DiGraph::new();
    let root = tree.root();
    let input = graph.add_node(FlowNode::Input);
    let output = graph.add_node(FlowNode::Output);

    let mut indices: HashMap<OperatorId, NodeIndex> = HashMap::new();
    for &child in tree.children(root) {
        let name = tree.operator(child)?.name().to_owned();
        indices.insert(child, graph.add_node(FlowNode::Operator(name)));
    }

    for (from, to) in tree.links() {
        let source = if from.operator == root {
            input
        } else {
            *indices.get(&from.operator).ok_or_else(|| {
                Error::StructuralCompile(format!("link from unknown operator {}", from.operator))
            })?
        };
        let target = if to.operator == root {
            output
        } else {
            *indices.get(&to.operator).ok_or_else(|| {
                Error::StructuralCompile(format!("link to unknown operator {}", to.operator))
            })?
        };
        graph.add_edge(
            source,
            target,
            FlowEdge {
                from_port: from.port_path(),
                to_port: to.port_path(),
            },
        );
    }

    Ok(Dataflow { graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::definition::{Body, ChildRef, MAIN_PORT, OperatorDef, PortShape};
    use crate::operator::{BuildMode, Builder};
    use crate::testing;

    #[test]
    fn test_pipeline_order() {
        let library = testing::library();
        let mut tree = Builder::new(&library)
            .build("root", &testing::nested_pipeline(), BuildMode::Hierarchical)
            .unwrap();
        compile(&mut tree).unwrap();

        let flow = dataflow(&tree).unwrap();
        assert_eq!(flow.node_count(), 5);
        assert_eq!(flow.edge_count(), 4);
        assert!(!flow.has_feedback());
        assert_eq!(
            flow.topological_order().unwrap(),
            vec!["first", "rest.second", "rest.deeper.third"]
        );
    }

    #[test]
    fn test_feedback_loop() {
        let def = OperatorDef::new("loop")
            .with_out(MAIN_PORT, PortShape::Any)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("a", "identity"))
                    .with_child(ChildRef::named("b", "identity"))
                    .connect("a:main", &["b:main"])
                    .unwrap()
                    .connect("b:main", &["a:main", ":main"])
                    .unwrap(),
            );
        let library = testing::library();
        let tree = Builder::new(&library)
            .build("loop", &def, BuildMode::Hierarchical)
            .unwrap();

        let flow = dataflow(&tree).unwrap();
        assert!(flow.has_feedback());
        assert!(flow.topological_order().is_none());
    }
}
