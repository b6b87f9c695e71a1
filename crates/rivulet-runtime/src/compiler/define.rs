//! Serialization of flat operator trees back into definitions.

use std::collections::BTreeMap;

use crate::definition::{Body, ChildRef, Connection, OperatorDef, PortRef};
use crate::error::{Error, Result};
use crate::operator::OperatorTree;
use crate::port::PortAddr;

/// Converts a flat tree into a resolved definition.
///
/// Every primitive becomes an inline child and every link a connection at
/// leaf granularity, grouped by source. Building the result in
/// [`BuildMode::Flat`](crate::operator::BuildMode::Flat) reproduces the same
/// ports, links and primitives. A primitive root yields its own definition.
pub fn define(tree: &OperatorTree) -> Result<OperatorDef> {
    if !tree.is_flat() {
        return Err(Error::StructuralCompile(
            "cannot define a tree that still contains composites".into(),
        ));
    }

    let root = tree.operator(tree.root())?;
    if root.is_primitive() {
        return Ok(root.definition().clone());
    }

    let mut body = Body::new();
    for &child in tree.children(tree.root()) {
        let operator = tree.operator(child)?;
        body = body.with_child(ChildRef::inline(operator.name(), operator.definition().clone()));
    }

    let mut grouped: Vec<(PortAddr, Vec<PortRef>)> = Vec::new();
    let mut index: BTreeMap<PortAddr, usize> = BTreeMap::new();
    for (from, to) in tree.links() {
        let to = port_ref(tree, &to)?;
        match index.get(&from) {
            Some(&i) => grouped[i].1.push(to),
            None => {
                index.insert(from.clone(), grouped.len());
                grouped.push((from, vec![to]));
            }
        }
    }
    for (from, to) in grouped {
        body = body.with_connection(Connection::new(port_ref(tree, &from)?, to));
    }

    let definition = root.definition();
    Ok(OperatorDef {
        name: definition.name.clone(),
        description: definition.description.clone(),
        in_ports: definition.in_ports.clone(),
        out_ports: definition.out_ports.clone(),
        properties: BTreeMap::new(),
        values: definition.values.clone(),
        body: Some(body),
    })
}

fn port_ref(tree: &OperatorTree, addr: &PortAddr) -> Result<PortRef> {
    let operator = if addr.operator == tree.root() {
        None
    } else {
        Some(tree.operator(addr.operator)?.name().to_owned())
    };
    Ok(PortRef::from_segments(operator, &addr.path))
}
