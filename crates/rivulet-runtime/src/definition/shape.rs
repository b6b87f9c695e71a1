//! Port shape types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::AsRefStr;

/// Shape of the messages a port carries.
///
/// `Map` ports group named sub-ports; every other shape is a leaf that is
/// backed by exactly one channel at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortShape {
    /// Any primitive value.
    #[default]
    Any,
    /// A number.
    Number,
    /// A string.
    String,
    /// A boolean.
    Boolean,
    /// A signal without meaningful content.
    Trigger,
    /// An ordered sequence of values, carried as one array message.
    Stream {
        /// Shape of each element.
        element: Box<PortShape>,
    },
    /// A keyed mapping of sub-ports.
    Map {
        /// Sub-port shapes keyed by name.
        entries: BTreeMap<String, PortShape>,
    },
}

/// Returns whether `key` can name a port or a map entry.
///
/// Port references join keys with `.` after an `operator:` prefix, so a key
/// is non-empty and contains neither separator.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(['.', ':'])
}

impl PortShape {
    /// Creates a stream shape.
    pub fn stream(element: PortShape) -> Self {
        Self::Stream {
            element: Box::new(element),
        }
    }

    /// Creates a map shape from `(key, shape)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, PortShape)>) -> Self {
        Self::Map {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Returns whether this shape is backed by a single channel.
    pub const fn is_leaf(&self) -> bool {
        !matches!(self, Self::Map { .. })
    }

    /// Returns the sub-shape at `path`, or `None` if any key is missing.
    pub fn get(&self, path: &[String]) -> Option<&PortShape> {
        let Some((key, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Self::Map { entries } => entries.get(key)?.get(rest),
            _ => None,
        }
    }

    /// Returns the first map key below this shape that is not a valid key.
    pub fn invalid_key(&self) -> Option<&str> {
        match self {
            Self::Map { entries } => entries.iter().find_map(|(key, shape)| {
                if is_valid_key(key) {
                    shape.invalid_key()
                } else {
                    Some(key.as_str())
                }
            }),
            Self::Stream { element } => element.invalid_key(),
            _ => None,
        }
    }

    /// Returns the relative paths of all leaves below this shape.
    ///
    /// A leaf shape yields a single empty path.
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        match self {
            Self::Map { entries } => entries
                .iter()
                .flat_map(|(key, shape)| {
                    shape.leaf_paths().into_iter().map(move |mut path| {
                        path.insert(0, key.clone());
                        path
                    })
                })
                .collect(),
            _ => vec![Vec::new()],
        }
    }
}
