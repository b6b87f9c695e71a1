//! Operator definition types.
//!
//! Definitions are the serializable description of an operator:
//! - [`OperatorDef`]: ports, properties and, for composites, a [`Body`]
//! - [`ChildRef`]: a child operator instance inside a body
//! - [`Connection`]: routing from one source port to one or more destinations
//! - [`PortShape`]: the shape of the messages a port carries
//!
//! Definitions are templates until they pass through [`specialize`], which
//! binds property values and expands placeholders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod port_ref;
mod property;
mod shape;
mod specialize;

pub use port_ref::PortRef;
pub(crate) use property::is_truthy;
pub use property::{Properties, PropertyDef, PropertyType};
pub use shape::{PortShape, is_valid_key};
pub use specialize::specialize;
pub(crate) use specialize::unescape;

use crate::error::{Error, Result};

/// Name of the port pair driven by the execution entry point.
pub const MAIN_PORT: &str = "main";

/// Serializable operator definition.
///
/// A definition without a body is primitive: its behavior is supplied by a
/// registered [`Primitive`](crate::primitive::Primitive) with the same name.
/// A definition with a body is composite and has no behavior of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    /// Definition name, also the behavior lookup key for primitives.
    pub name: String,
    /// Description of what this operator does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// In-ports keyed by name.
    #[serde(rename = "in", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub in_ports: BTreeMap<String, PortShape>,
    /// Out-ports keyed by name.
    #[serde(rename = "out", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub out_ports: BTreeMap<String, PortShape>,
    /// Declared properties that still need a value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyDef>,
    /// Property values bound by specialization.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: Properties,
    /// Internal graph of a composite operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl OperatorDef {
    /// Creates an empty definition with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares an in-port.
    pub fn with_in(mut self, name: impl Into<String>, shape: PortShape) -> Self {
        self.in_ports.insert(name.into(), shape);
        self
    }

    /// Declares an out-port.
    pub fn with_out(mut self, name: impl Into<String>, shape: PortShape) -> Self {
        self.out_ports.insert(name.into(), shape);
        self
    }

    /// Declares a property.
    pub fn with_property(mut self, name: impl Into<String>, property: PropertyDef) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Sets the body, making this definition composite.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns whether this definition is primitive.
    pub const fn is_primitive(&self) -> bool {
        self.body.is_none()
    }

    /// Returns whether this definition is composite.
    pub const fn is_composite(&self) -> bool {
        self.body.is_some()
    }

    /// Returns whether no declared property is left without a value.
    pub fn is_resolved(&self) -> bool {
        self.properties.is_empty()
    }

    /// Checks that every port name and map key, including those of inline
    /// children, can be written as a port reference.
    pub fn check_ports(&self) -> Result<()> {
        for (port, shape) in self.in_ports.iter().chain(&self.out_ports) {
            let invalid = if is_valid_key(port) {
                shape.invalid_key()
            } else {
                Some(port.as_str())
            };
            if let Some(key) = invalid {
                return Err(Error::InvalidDefinition(format!(
                    "operator '{}' has an invalid port key '{key}' on port '{port}'",
                    self.name
                )));
            }
        }

        let Some(body) = &self.body else {
            return Ok(());
        };
        for child in &body.children {
            if let OperatorSource::Inline(def) = &child.operator {
                def.check_ports()?;
            }
        }
        Ok(())
    }

    /// Parses a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: Self = serde_json::from_str(json)?;
        def.check_ports()?;
        Ok(def)
    }

    /// Parses a definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(yaml)?;
        def.check_ports()?;
        Ok(def)
    }

    /// Serializes the definition to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes the definition to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Internal graph of a composite operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Child operator instances, in declaration order.
    #[serde(default)]
    pub children: Vec<ChildRef>,
    /// Connections among child ports and the own boundary.
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Body {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child.
    pub fn with_child(mut self, child: ChildRef) -> Self {
        self.children.push(child);
        self
    }

    /// Adds a connection.
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Adds a connection parsed from port reference strings.
    pub fn connect(self, from: &str, to: &[&str]) -> Result<Self> {
        let from = from.parse()?;
        let to = to.iter().map(|s| s.parse()).collect::<Result<Vec<PortRef>>>()?;
        Ok(self.with_connection(Connection::new(from, to)))
    }
}

/// Reference to a child operator inside a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    /// Instance name, unique within the body.
    pub name: String,
    /// The child's definition, inline or by name.
    pub operator: OperatorSource,
    /// Property bindings; `"$name"` refers to an enclosing property.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    /// Condition selecting whether the child is part of the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
}

impl ChildRef {
    /// Creates a child referencing a definition by name.
    pub fn named(name: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator: OperatorSource::Named(operator.into()),
            properties: Properties::new(),
            when: None,
        }
    }

    /// Creates a child with an inline definition.
    pub fn inline(name: impl Into<String>, definition: OperatorDef) -> Self {
        Self {
            name: name.into(),
            operator: OperatorSource::Inline(Box::new(definition)),
            properties: Properties::new(),
            when: None,
        }
    }

    /// Binds a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Sets the selection condition.
    pub fn with_when(mut self, when: impl Into<Value>) -> Self {
        self.when = Some(when.into());
        self
    }
}

/// Where a child's definition comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorSource {
    /// Resolved through a [`DefinitionSource`](crate::library::DefinitionSource).
    Named(String),
    /// Nested definition.
    Inline(Box<OperatorDef>),
}

/// Routing from one source port to one or more destination ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Producing port.
    pub from: PortRef,
    /// Consuming ports.
    pub to: Vec<PortRef>,
    /// Condition selecting whether the connection is part of the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
}

impl Connection {
    /// Creates a connection.
    pub fn new(from: PortRef, to: impl IntoIterator<Item = PortRef>) -> Self {
        Self {
            from,
            to: to.into_iter().collect(),
            when: None,
        }
    }

    /// Sets the selection condition.
    pub fn with_when(mut self, when: impl Into<Value>) -> Self {
        self.when = Some(when.into());
        self
    }
}
