//! Connectivity checks on flat trees.

use super::TRACING_TARGET;
use crate::error::{Error, Result};
use crate::operator::OperatorTree;

/// Checks that a flat tree is ready to run.
///
/// Every in-port leaf of every primitive needs a source, visited in child
/// declaration order and port name order, and so does every out-port leaf of
/// the root. The first violation is reported as [`Error::UnconnectedPort`].
/// A primitive root is driven directly and always passes.
pub fn validate(tree: &OperatorTree) -> Result<()> {
    if !tree.is_flat() {
        return Err(Error::StructuralCompile(
            "cannot validate a tree that still contains composites".into(),
        ));
    }

    let root = tree.operator(tree.root())?;
    if root.is_primitive() {
        return Ok(());
    }

    for id in tree.primitives() {
        let operator = tree.operator(id)?;
        for (path, leaf) in operator.in_ports().leaves() {
            if leaf.source.is_none() {
                return Err(Error::unconnected_port(
                    tree.qualified_name(id),
                    path.join("."),
                ));
            }
        }
    }

    for (path, leaf) in root.out_ports().leaves() {
        if leaf.source.is_none() {
            return Err(Error::unconnected_port(root.name(), path.join(".")));
        }
    }

    tracing::debug!(
        target: TRACING_TARGET,
        operator = %root.name(),
        primitives = tree.children(tree.root()).len(),
        "Operator tree validated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::definition::{Body, ChildRef, MAIN_PORT, OperatorDef, PortShape};
    use crate::operator::{BuildMode, Builder};
    use crate::testing;

    fn flat(def: &OperatorDef) -> OperatorTree {
        let library = testing::library();
        let mut tree = Builder::new(&library)
            .build("root", def, BuildMode::Hierarchical)
            .unwrap();
        compile(&mut tree).unwrap();
        tree
    }

    #[test]
    fn test_connected_pipeline() {
        validate(&flat(&testing::nested_pipeline())).unwrap();
        validate(&flat(&testing::passthrough())).unwrap();
    }

    #[test]
    fn test_unconnected_inner_input() {
        let err = validate(&flat(&testing::unconnected_inner())).unwrap_err();
        assert!(matches!(
            err,
            Error::UnconnectedPort { ref operator, ref port } if operator == "wrap.step" && port == "main"
        ));
    }

    #[test]
    fn test_unconnected_map_entry() {
        let def = OperatorDef::new("partial")
            .with_in(MAIN_PORT, PortShape::Number)
            .with_out(MAIN_PORT, PortShape::Number)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("add", "add"))
                    .connect(":main", &["add:main.a"])
                    .unwrap()
                    .connect("add:main", &[":main"])
                    .unwrap(),
            );

        let err = validate(&flat(&def)).unwrap_err();
        assert!(matches!(
            err,
            Error::UnconnectedPort { ref operator, ref port } if operator == "add" && port == "main.b"
        ));
    }

    #[test]
    fn test_unconnected_root_output() {
        let def = OperatorDef::new("sink")
            .with_in(MAIN_PORT, PortShape::Any)
            .with_out(MAIN_PORT, PortShape::Any)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("a", "identity"))
                    .connect(":main", &["a:main"])
                    .unwrap(),
            );

        let err = validate(&flat(&def)).unwrap_err();
        assert!(matches!(
            err,
            Error::UnconnectedPort { ref operator, ref port } if operator == "root" && port == "main"
        ));
    }

    #[test]
    fn test_first_violation_in_declaration_order() {
        let def = OperatorDef::new("two")
            .with_out(MAIN_PORT, PortShape::Any)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("z", "identity"))
                    .with_child(ChildRef::named("a", "identity"))
                    .connect("a:main", &[":main"])
                    .unwrap(),
            );

        let err = validate(&flat(&def)).unwrap_err();
        assert!(matches!(err, Error::UnconnectedPort { ref operator, .. } if operator == "z"));
    }

    #[test]
    fn test_hierarchical_tree_rejected() {
        let library = testing::library();
        let tree = Builder::new(&library)
            .build("root", &testing::nested(1), BuildMode::Hierarchical)
            .unwrap();
        assert!(matches!(validate(&tree), Err(Error::StructuralCompile(_))));
    }
}
