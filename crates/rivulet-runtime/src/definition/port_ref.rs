//! Port references used in connections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Reference to a port, written as `operator:port(.key)*`.
///
/// An empty operator segment (`:main`) refers to the boundary of the
/// definition that declares the connection. Whether the reference denotes an
/// in-port or an out-port follows from its position in the connection: a
/// boundary source is an in-port, a child source an out-port, and the other
/// way around for destinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRef {
    /// Child operator name, `None` for the own boundary.
    pub operator: Option<String>,
    /// Port name.
    pub port: String,
    /// Keys into a map-shaped port.
    pub path: Vec<String>,
}

impl PortRef {
    /// Creates a reference to a port on the own boundary.
    pub fn boundary(port: impl Into<String>) -> Self {
        Self {
            operator: None,
            port: port.into(),
            path: Vec::new(),
        }
    }

    /// Creates a reference to a port of a child operator.
    pub fn child(operator: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            operator: Some(operator.into()),
            port: port.into(),
            path: Vec::new(),
        }
    }

    /// Appends a key into a map-shaped port.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.path.push(key.into());
        self
    }

    /// Returns whether this refers to the own boundary.
    pub const fn is_boundary(&self) -> bool {
        self.operator.is_none()
    }

    /// Returns the port name followed by the map keys.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(self.path.len() + 1);
        segments.push(self.port.clone());
        segments.extend(self.path.iter().cloned());
        segments
    }

    /// Builds a reference from a full segment list (port name first).
    pub(crate) fn from_segments(operator: Option<String>, segments: &[String]) -> Self {
        let (port, path) = segments
            .split_first()
            .map(|(port, path)| (port.clone(), path.to_vec()))
            .unwrap_or_default();
        Self {
            operator,
            port,
            path,
        }
    }

    /// Returns the dotted port path without the operator.
    pub fn port_path(&self) -> String {
        self.segments().join(".")
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.operator.as_deref().unwrap_or_default(),
            self.port_path()
        )
    }
}

impl FromStr for PortRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((operator, port)) = s.split_once(':') else {
            return Err(Error::InvalidDefinition(format!(
                "port reference '{s}' must have the form 'operator:port'"
            )));
        };

        let segments: Vec<String> = port.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidDefinition(format!(
                "port reference '{s}' has an empty port segment"
            )));
        }

        let operator = (!operator.is_empty()).then(|| operator.to_owned());
        Ok(Self::from_segments(operator, &segments))
    }
}

impl TryFrom<String> for PortRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRef> for String {
    fn from(value: PortRef) -> Self {
        value.to_string()
    }
}
