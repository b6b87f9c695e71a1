//! Inlining of composite operators.

use serde::{Deserialize, Serialize};

use super::TRACING_TARGET;
use crate::error::{Error, Result};
use crate::operator::{OperatorId, OperatorTree};
use crate::port::PortAddr;

/// Metrics reported by [`compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompileStats {
    /// Primitive operators after flattening.
    pub compiled: usize,
    /// Composite nesting depth below the root before flattening.
    pub depth: usize,
    /// Composites removed.
    pub inlined: usize,
}

/// Flattens the tree in place until the root's children are all primitives.
///
/// Composites are inlined bottom-up. Each inlined child is renamed
/// `composite.child` and takes the composite's position in its parent. Links
/// through the composite's boundary are rewired to connect the inner and
/// outer ports directly; a boundary without an inner or outer counterpart
/// leaves the other side dangling. Compiling a flat tree changes nothing.
pub fn compile(tree: &mut OperatorTree) -> Result<CompileStats> {
    let depth = tree.depth();
    let mut inlined = 0;
    flatten(tree, tree.root(), &mut inlined)?;

    let stats = CompileStats {
        compiled: tree.primitives().len(),
        depth,
        inlined,
    };
    tracing::info!(
        target: TRACING_TARGET,
        operator = %tree.qualified_name(tree.root()),
        compiled = stats.compiled,
        depth = stats.depth,
        inlined = stats.inlined,
        "Compiled operator tree"
    );
    Ok(stats)
}

fn flatten(tree: &mut OperatorTree, id: OperatorId, inlined: &mut usize) -> Result<()> {
    let children = tree.children(id).to_vec();
    for child in children {
        if tree.operator(child)?.is_primitive() {
            continue;
        }
        flatten(tree, child, inlined)?;
        inline(tree, id, child)?;
        *inlined += 1;
    }
    Ok(())
}

/// Replaces `composite` by its (already primitive) children inside `parent`.
fn inline(tree: &mut OperatorTree, parent: OperatorId, composite: OperatorId) -> Result<()> {
    for addr in tree.leaf_addrs(composite) {
        bypass(tree, &addr)?;
    }

    let prefix = tree.operator(composite)?.name().to_owned();
    let inner = tree.children(composite).to_vec();
    for &child in &inner {
        tree.operator_mut(child)?.reparent(parent, &prefix);
    }

    let siblings = tree.children_mut(parent)?;
    let position = siblings
        .iter()
        .position(|&sibling| sibling == composite)
        .ok_or_else(|| {
            Error::StructuralCompile(format!("{composite} is not a child of {parent}"))
        })?;
    siblings.splice(position..=position, inner);
    tree.remove(composite);

    tracing::debug!(
        target: TRACING_TARGET,
        composite = %prefix,
        "Inlined composite operator"
    );
    Ok(())
}

/// Removes a boundary leaf from the link graph, connecting its source to each
/// of its destinations in its place.
fn bypass(tree: &mut OperatorTree, addr: &PortAddr) -> Result<()> {
    let leaf = tree.leaf_mut(addr)?;
    let source = leaf.source.take();
    let destinations = std::mem::take(&mut leaf.destinations);

    if let Some(source) = &source {
        let description = tree.describe(addr);
        let upstream = tree.leaf_mut(source)?;
        let position = upstream
            .destinations
            .iter()
            .position(|destination| destination == addr)
            .ok_or_else(|| {
                Error::StructuralCompile(format!("link target '{description}' not found"))
            })?;
        upstream
            .destinations
            .splice(position..=position, destinations.iter().cloned());
    }

    for destination in &destinations {
        tree.leaf_mut(destination)?.source = source.clone();
    }
    Ok(())
}
