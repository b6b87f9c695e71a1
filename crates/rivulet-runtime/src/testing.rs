//! Shared definitions for unit tests.

use crate::definition::{Body, ChildRef, MAIN_PORT, OperatorDef, PortShape};
use crate::library::Library;

pub fn library() -> Library {
    Library::with_builtins()
}

fn boundary(name: &str) -> OperatorDef {
    OperatorDef::new(name)
        .with_in(MAIN_PORT, PortShape::Any)
        .with_out(MAIN_PORT, PortShape::Any)
}

/// Connects `:main -> child:main -> :main` for a single child.
fn wrap(name: &str, child: ChildRef) -> OperatorDef {
    let port = format!("{}:main", child.name);
    boundary(name).with_body(
        Body::new()
            .with_child(child)
            .connect(":main", &[port.as_str()])
            .unwrap()
            .connect(&port, &[":main"])
            .unwrap(),
    )
}

/// `root > level0 > ... > level{depth-1} > step`, where `step` is an identity.
pub fn nested(depth: usize) -> OperatorDef {
    let mut child = ChildRef::named("step", "identity");
    for level in (0..depth).rev() {
        let name = format!("level{level}");
        child = ChildRef::inline(name.clone(), wrap(&name, child));
    }
    wrap("nested", child)
}

/// `first -> rest(second -> deeper(third))`, three identities in sequence.
pub fn nested_pipeline() -> OperatorDef {
    let deeper = wrap("deeper", ChildRef::named("third", "identity"));
    let rest = boundary("rest").with_body(
        Body::new()
            .with_child(ChildRef::named("second", "identity"))
            .with_child(ChildRef::inline("deeper", deeper))
            .connect(":main", &["second:main"])
            .unwrap()
            .connect("second:main", &["deeper:main"])
            .unwrap()
            .connect("deeper:main", &[":main"])
            .unwrap(),
    );

    boundary("pipeline").with_body(
        Body::new()
            .with_child(ChildRef::named("first", "identity"))
            .with_child(ChildRef::inline("rest", rest))
            .connect(":main", &["first:main"])
            .unwrap()
            .connect("first:main", &["rest:main"])
            .unwrap()
            .connect("rest:main", &[":main"])
            .unwrap(),
    )
}

/// `a -> mid -> b`, where `mid` forwards its boundary without children.
pub fn passthrough() -> OperatorDef {
    let mid = boundary("mid").with_body(Body::new().connect(":main", &[":main"]).unwrap());
    boundary("passthrough").with_body(
        Body::new()
            .with_child(ChildRef::named("a", "identity"))
            .with_child(ChildRef::inline("mid", mid))
            .with_child(ChildRef::named("b", "identity"))
            .connect(":main", &["a:main"])
            .unwrap()
            .connect("a:main", &["mid:main"])
            .unwrap()
            .connect("mid:main", &["b:main"])
            .unwrap()
            .connect("b:main", &[":main"])
            .unwrap(),
    )
}

/// A composite whose inner `step` input is never connected.
pub fn unconnected_inner() -> OperatorDef {
    let wrap = boundary("wrap").with_body(
        Body::new()
            .with_child(ChildRef::named("step", "identity"))
            .connect("step:main", &[":main"])
            .unwrap(),
    );
    boundary("outer").with_body(
        Body::new()
            .with_child(ChildRef::inline("wrap", wrap))
            .connect(":main", &["wrap:main"])
            .unwrap()
            .connect("wrap:main", &[":main"])
            .unwrap(),
    )
}

/// One identity feeding both entries of a map-shaped root output.
pub fn fan_out() -> OperatorDef {
    OperatorDef::new("fan_out")
        .with_in(MAIN_PORT, PortShape::Any)
        .with_out(
            MAIN_PORT,
            PortShape::map([("left", PortShape::Any), ("right", PortShape::Any)]),
        )
        .with_body(
            Body::new()
                .with_child(ChildRef::named("split", "identity"))
                .connect(":main", &["split:main"])
                .unwrap()
                .connect("split:main", &[":main.left", ":main.right"])
                .unwrap(),
        )
}

/// `split` feeding two children: `a` straight to `:main.left`, and the
/// composite `b(inner)` to `:main.right`.
pub fn fan_out_children() -> OperatorDef {
    OperatorDef::new("fan_out_children")
        .with_in(MAIN_PORT, PortShape::Any)
        .with_out(
            MAIN_PORT,
            PortShape::map([("left", PortShape::Any), ("right", PortShape::Any)]),
        )
        .with_body(
            Body::new()
                .with_child(ChildRef::named("split", "identity"))
                .with_child(ChildRef::named("a", "identity"))
                .with_child(ChildRef::inline("b", wrap("b", ChildRef::named("inner", "identity"))))
                .connect(":main", &["split:main"])
                .unwrap()
                .connect("split:main", &["a:main", "b:main"])
                .unwrap()
                .connect("a:main", &[":main.left"])
                .unwrap()
                .connect("b:main", &[":main.right"])
                .unwrap(),
        )
}
