//! Property specialization.
//!
//! Binds concrete property values into a definition template:
//! - map entry keys (and port names) of the form `{prop}` expand into one
//!   entry per key listed by the property
//! - `"$prop"` strings in child property bindings are replaced by values;
//!   `"$$"` escapes stay in place until the builder hands the bindings to
//!   the child
//! - `{prop}` segments in connection port references expand into one
//!   connection per key; the same placeholder expands in lockstep across
//!   the source and all destinations of a connection
//! - `when` conditions select children and connections

use std::collections::{BTreeMap, HashMap, HashSet};
use std::iter;

use serde_json::Value;

use super::{Body, ChildRef, Connection, OperatorDef, PortRef, PortShape, Properties, is_truthy};
use crate::error::{Error, Result};

/// Tracing target for specialization.
const TRACING_TARGET: &str = "rivulet_runtime::definition";

/// Produces a resolved copy of `def` with `properties` bound.
///
/// Every declared property takes the supplied value, else its default; a
/// property with neither fails with [`Error::UnresolvedProperty`]. The result
/// has no declared properties left and carries the bound values in
/// [`OperatorDef::values`], so specializing it again is a no-op.
///
/// Child definitions are not specialized here; the graph builder does that
/// with each child's own bindings.
pub fn specialize(def: &OperatorDef, properties: &Properties) -> Result<OperatorDef> {
    let values = bind_values(def, properties)?;
    let scope = Scope {
        operator: &def.name,
        values: &values,
    };

    let in_ports = scope.expand_ports(&def.in_ports)?;
    let out_ports = scope.expand_ports(&def.out_ports)?;
    let body = def
        .body
        .as_ref()
        .map(|body| scope.specialize_body(body))
        .transpose()?;

    let resolved = OperatorDef {
        name: def.name.clone(),
        description: def.description.clone(),
        in_ports,
        out_ports,
        properties: BTreeMap::new(),
        values,
        body,
    };
    resolved.check_ports()?;
    Ok(resolved)
}

fn bind_values(def: &OperatorDef, properties: &Properties) -> Result<Properties> {
    let mut values = def.values.clone();

    for (name, declared) in &def.properties {
        let value = properties
            .get(name)
            .or(declared.default.as_ref())
            .or_else(|| def.values.get(name))
            .cloned()
            .ok_or_else(|| Error::UnresolvedProperty {
                operator: def.name.clone(),
                property: name.clone(),
            })?;

        if !declared.kind.accepts(&value) {
            return Err(Error::InvalidDefinition(format!(
                "property '{name}' of '{}' expects a {} value, got {value}",
                def.name,
                declared.kind.as_ref()
            )));
        }

        values.insert(name.clone(), value);
    }

    for (name, value) in properties {
        if def.properties.contains_key(name) {
            continue;
        }
        if def.values.contains_key(name) {
            values.insert(name.clone(), value.clone());
            continue;
        }
        tracing::debug!(
            target: TRACING_TARGET,
            operator = %def.name,
            property = %name,
            "Ignoring undeclared property"
        );
    }

    Ok(values)
}

/// Strips one `$` from every `"$$..."` string in child bindings.
pub(crate) fn unescape(properties: &Properties) -> Properties {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), unescape_value(value)))
        .collect()
}

fn unescape_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.starts_with("$$") => Value::String(s[1..].to_owned()),
        Value::Array(items) => Value::Array(items.iter().map(unescape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unescape_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Returns the property name of a `{name}` placeholder.
fn placeholder(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')?
        .strip_suffix('}')
        .filter(|name| !name.is_empty())
}

struct Scope<'a> {
    operator: &'a str,
    values: &'a Properties,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| Error::UnresolvedProperty {
                operator: self.operator.to_owned(),
                property: name.to_owned(),
            })
    }

    /// Returns the keys a `{name}` placeholder expands to.
    fn keys(&self, name: &str) -> Result<Vec<String>> {
        let invalid = |value: &Value| {
            Error::InvalidDefinition(format!(
                "property '{name}' of '{}' cannot expand into port keys: {value}",
                self.operator
            ))
        };

        match self.lookup(name)? {
            Value::String(key) => Ok(vec![key.clone()]),
            Value::Number(count) => {
                let count = count.as_u64().ok_or_else(|| invalid(&Value::Number(count.clone())))?;
                Ok((0..count).map(|i| i.to_string()).collect())
            }
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(key) => Ok(key.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(invalid(other)),
                })
                .collect(),
            other => Err(invalid(other)),
        }
    }

    fn expand_key(&self, key: &str) -> Result<Vec<String>> {
        match placeholder(key) {
            Some(name) => self.keys(name),
            None => Ok(vec![key.to_owned()]),
        }
    }

    fn expand_ports(
        &self,
        ports: &BTreeMap<String, PortShape>,
    ) -> Result<BTreeMap<String, PortShape>> {
        let mut expanded = BTreeMap::new();
        for (key, shape) in ports {
            let shape = self.expand_shape(shape)?;
            for key in self.expand_key(key)? {
                expanded.insert(key, shape.clone());
            }
        }
        Ok(expanded)
    }

    fn expand_shape(&self, shape: &PortShape) -> Result<PortShape> {
        Ok(match shape {
            PortShape::Map { entries } => PortShape::Map {
                entries: self.expand_ports(entries)?,
            },
            PortShape::Stream { element } => PortShape::stream(self.expand_shape(element)?),
            leaf => leaf.clone(),
        })
    }

    /// Replaces `"$name"` strings with property values; `"$$"` strings are
    /// left escaped.
    fn substitute(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) if s.starts_with("$$") => value.clone(),
            Value::String(s) if s.len() > 1 && s.starts_with('$') => self.lookup(&s[1..])?.clone(),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.substitute(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.substitute(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    fn condition(&self, when: Option<&Value>) -> Result<bool> {
        match when {
            None => Ok(true),
            Some(value) => Ok(is_truthy(&self.substitute(value)?)),
        }
    }

    fn specialize_body(&self, body: &Body) -> Result<Body> {
        let mut children = Vec::with_capacity(body.children.len());
        let mut deselected = HashSet::new();

        for child in &body.children {
            if !self.condition(child.when.as_ref())? {
                tracing::debug!(
                    target: TRACING_TARGET,
                    operator = %self.operator,
                    child = %child.name,
                    "Child deselected"
                );
                deselected.insert(child.name.as_str());
                continue;
            }

            let properties = child
                .properties
                .iter()
                .map(|(name, value)| Ok((name.clone(), self.substitute(value)?)))
                .collect::<Result<Properties>>()?;

            children.push(ChildRef {
                name: child.name.clone(),
                operator: child.operator.clone(),
                properties,
                when: None,
            });
        }

        let is_deselected = |port: &PortRef| {
            port.operator
                .as_deref()
                .is_some_and(|name| deselected.contains(name))
        };

        let mut connections = Vec::with_capacity(body.connections.len());
        for connection in &body.connections {
            if !self.condition(connection.when.as_ref())? || is_deselected(&connection.from) {
                continue;
            }

            let to: Vec<PortRef> = connection
                .to
                .iter()
                .filter(|port| !is_deselected(port))
                .cloned()
                .collect();
            if to.is_empty() {
                continue;
            }

            connections.extend(self.expand_connection(&connection.from, &to)?);
        }

        Ok(Body {
            children,
            connections,
        })
    }

    fn expand_connection(&self, from: &PortRef, to: &[PortRef]) -> Result<Vec<Connection>> {
        let mut names: Vec<&str> = Vec::new();
        for port in iter::once(from).chain(to) {
            for segment in iter::once(&port.port).chain(&port.path) {
                if let Some(name) = placeholder(segment)
                    && !names.contains(&name)
                {
                    names.push(name);
                }
            }
        }

        if names.is_empty() {
            return Ok(vec![Connection::new(from.clone(), to.iter().cloned())]);
        }

        let keys = names
            .iter()
            .map(|name| self.keys(name))
            .collect::<Result<Vec<_>>>()?;
        if keys.iter().any(Vec::is_empty) {
            return Ok(Vec::new());
        }

        let mut connections = Vec::new();
        let mut cursor = vec![0usize; names.len()];
        loop {
            let binding: HashMap<&str, &str> = names
                .iter()
                .zip(&cursor)
                .zip(&keys)
                .map(|((name, &i), keys)| (*name, keys[i].as_str()))
                .collect();
            let bind = |port: &PortRef| bind_port(port, &binding);
            connections.push(Connection::new(bind(from), to.iter().map(bind)));

            let mut position = names.len();
            loop {
                if position == 0 {
                    return Ok(connections);
                }
                position -= 1;
                cursor[position] += 1;
                if cursor[position] < keys[position].len() {
                    break;
                }
                cursor[position] = 0;
            }
        }
    }
}

fn bind_port(port: &PortRef, binding: &HashMap<&str, &str>) -> PortRef {
    let bind = |segment: &String| -> String {
        placeholder(segment)
            .and_then(|name| binding.get(name))
            .map_or_else(|| segment.clone(), |key| (*key).to_owned())
    };

    PortRef {
        operator: port.operator.clone(),
        port: bind(&port.port),
        path: port.path.iter().map(bind).collect(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::definition::{MAIN_PORT, PropertyDef, PropertyType};

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    fn pipeline() -> OperatorDef {
        OperatorDef::new("pipeline")
            .with_in(MAIN_PORT, PortShape::Number)
            .with_out(MAIN_PORT, PortShape::Number)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("a", "identity"))
                    .connect(":main", &["a:main"])
                    .unwrap()
                    .connect("a:main", &[":main"])
                    .unwrap(),
            )
    }

    #[test]
    fn test_resolved_definition_is_unchanged() {
        let def = pipeline();
        let resolved = specialize(&def, &Properties::new()).unwrap();
        assert_eq!(resolved, def);
        assert_eq!(specialize(&resolved, &Properties::new()).unwrap(), resolved);
    }

    #[test]
    fn test_missing_property_is_unresolved() {
        let def = OperatorDef::new("constant")
            .with_property("value", PropertyDef::required(PropertyType::Any));
        let err = specialize(&def, &Properties::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedProperty { ref operator, ref property }
                if operator == "constant" && property == "value"
        ));
    }

    #[test]
    fn test_default_and_supplied_values() {
        let def = OperatorDef::new("op")
            .with_property("a", PropertyDef::with_default(PropertyType::Number, 1))
            .with_property("b", PropertyDef::with_default(PropertyType::Number, 2));

        let resolved = specialize(&def, &props(json!({"b": 5, "extra": true}))).unwrap();
        assert!(resolved.properties.is_empty());
        assert_eq!(resolved.values, props(json!({"a": 1, "b": 5})));

        let again = specialize(&resolved, &Properties::new()).unwrap();
        assert_eq!(again, resolved);
    }

    #[test]
    fn test_property_type_mismatch() {
        let def = OperatorDef::new("op")
            .with_property("count", PropertyDef::required(PropertyType::Number));
        let err = specialize(&def, &props(json!({"count": "three"}))).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn test_map_arity_from_list() {
        let def = OperatorDef::new("sum")
            .with_property("inputs", PropertyDef::required(PropertyType::List))
            .with_in(MAIN_PORT, PortShape::map([("{inputs}", PortShape::Number)]));

        let resolved = specialize(&def, &props(json!({"inputs": ["x", "y", "z"]}))).unwrap();
        assert_eq!(
            resolved.in_ports[MAIN_PORT],
            PortShape::map([
                ("x", PortShape::Number),
                ("y", PortShape::Number),
                ("z", PortShape::Number),
            ])
        );
    }

    #[test]
    fn test_map_arity_from_count() {
        let def = OperatorDef::new("fan")
            .with_property("width", PropertyDef::required(PropertyType::Number))
            .with_out(MAIN_PORT, PortShape::map([("{width}", PortShape::Any)]));

        let resolved = specialize(&def, &props(json!({"width": 2}))).unwrap();
        assert_eq!(
            resolved.out_ports[MAIN_PORT],
            PortShape::map([("0", PortShape::Any), ("1", PortShape::Any)])
        );
    }

    #[test]
    fn test_expanded_keys_must_be_referenceable() {
        let def = OperatorDef::new("sum")
            .with_property("inputs", PropertyDef::required(PropertyType::List))
            .with_in(MAIN_PORT, PortShape::map([("{inputs}", PortShape::Number)]));

        for keys in [json!(["v1.2"]), json!(["a:b"]), json!([""])] {
            let err = specialize(&def, &props(json!({"inputs": keys}))).unwrap_err();
            assert!(matches!(err, Error::InvalidDefinition(_)), "{keys}: {err}");
        }
    }

    #[test]
    fn test_undeclared_placeholder_fails() {
        let def = OperatorDef::new("bad").with_in(MAIN_PORT, PortShape::map([("{nope}", PortShape::Any)]));
        let err = specialize(&def, &Properties::new()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedProperty { ref property, .. } if property == "nope"));
    }

    #[test]
    fn test_child_bindings_are_substituted() {
        let def = OperatorDef::new("wrapper")
            .with_property("v", PropertyDef::required(PropertyType::Any))
            .with_body(
                Body::new().with_child(
                    ChildRef::named("c", "constant")
                        .with_property("value", "$v")
                        .with_property("label", "$$v")
                        .with_property("nested", json!({"list": ["$v", 1]})),
                ),
            );

        let resolved = specialize(&def, &props(json!({"v": 42}))).unwrap();
        let child = &resolved.body.unwrap().children[0];
        assert_eq!(child.properties["value"], json!(42));
        assert_eq!(child.properties["label"], json!("$$v"));
        assert_eq!(child.properties["nested"], json!({"list": [42, 1]}));
        assert_eq!(unescape(&child.properties)["label"], json!("$v"));
    }

    #[test]
    fn test_escaped_binding_survives_respecialization() {
        let def = OperatorDef::new("wrapper")
            .with_property("v", PropertyDef::required(PropertyType::Any))
            .with_body(
                Body::new().with_child(ChildRef::named("c", "constant").with_property("label", "$$v")),
            );

        let once = specialize(&def, &props(json!({"v": 42}))).unwrap();
        let twice = specialize(&once, &Properties::new()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_when_selects_alternatives() {
        let def = OperatorDef::new("switchable")
            .with_property("fast", PropertyDef::with_default(PropertyType::Boolean, false))
            .with_in(MAIN_PORT, PortShape::Any)
            .with_out(MAIN_PORT, PortShape::Any)
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("fast", "identity").with_when("$fast"))
                    .with_child(ChildRef::named("slow", "identity").with_when(json!({"not": "used"})))
                    .connect(":main", &["fast:main", "slow:main"])
                    .unwrap()
                    .connect("fast:main", &[":main"])
                    .unwrap()
                    .connect("slow:main", &[":main"])
                    .unwrap(),
            );

        let body = specialize(&def, &Properties::new()).unwrap().body.unwrap();
        let names: Vec<_> = body.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["slow"]);
        assert_eq!(body.connections.len(), 2);
        assert_eq!(body.connections[0].to, vec![PortRef::child("slow", "main")]);
        assert_eq!(body.connections[1].from, PortRef::child("slow", "main"));
    }

    #[test]
    fn test_connection_placeholders_expand_in_lockstep() {
        let def = OperatorDef::new("router")
            .with_property("keys", PropertyDef::required(PropertyType::List))
            .with_in(MAIN_PORT, PortShape::map([("{keys}", PortShape::Any)]))
            .with_body(
                Body::new()
                    .with_child(ChildRef::named("sink", "collect"))
                    .connect(":main.{keys}", &["sink:main.{keys}"])
                    .unwrap(),
            );

        let body = specialize(&def, &props(json!({"keys": ["a", "b"]})))
            .unwrap()
            .body
            .unwrap();
        let rendered: Vec<String> = body
            .connections
            .iter()
            .map(|c| format!("{} -> {}", c.from, c.to[0]))
            .collect();
        assert_eq!(rendered, vec![":main.a -> sink:main.a", ":main.b -> sink:main.b"]);
    }
}
