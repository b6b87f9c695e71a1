//! Error types for operator resolution, compilation and execution.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while resolving, building, compiling or running
/// an operator network.
#[derive(Debug, Error)]
pub enum Error {
    /// A definition could not be located or read.
    #[error("cannot resolve operator '{name}': {reason}")]
    Resolution {
        /// Name of the requested definition.
        name: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Specialization is missing a required property value.
    #[error("operator '{operator}' has no value for property '{property}'")]
    UnresolvedProperty {
        /// Name of the definition being specialized.
        operator: String,
        /// Name of the missing property.
        property: String,
    },

    /// A connection references a port that does not exist.
    #[error("operator '{operator}' has no port '{port}'")]
    UnknownPort {
        /// Operator that was searched.
        operator: String,
        /// Port path that was requested.
        port: String,
    },

    /// A destination port already has a producer.
    #[error("port '{port}' of operator '{operator}' is already connected")]
    PortAlreadyConnected {
        /// Operator owning the port.
        operator: String,
        /// Port path.
        port: String,
    },

    /// Two ports cannot be connected because their shapes differ.
    #[error("cannot connect '{from}' to '{to}': {reason}")]
    PortShapeMismatch {
        /// Source port reference.
        from: String,
        /// Destination port reference.
        to: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// An input of the flattened network has no producer.
    #[error("port '{port}' of operator '{operator}' is not connected")]
    UnconnectedPort {
        /// Operator owning the port.
        operator: String,
        /// Port path.
        port: String,
    },

    /// An internal invariant of the operator tree was violated.
    #[error("structural compile error: {0}")]
    StructuralCompile(String),

    /// A definition is malformed.
    #[error("invalid operator definition: {0}")]
    InvalidDefinition(String),

    /// A message does not fit the shape of the port it was sent to.
    #[error("invalid message for port '{port}': {reason}")]
    InvalidMessage {
        /// Port the message was addressed to.
        port: String,
        /// Description of the problem.
        reason: String,
    },

    /// The port has no counterpart left to exchange messages with.
    #[error("port '{0}' is closed")]
    Closed(String),

    /// The network was shut down while the operation was pending.
    #[error("network execution cancelled")]
    Cancelled,

    /// A primitive worker returned an error.
    #[error("operator '{operator}' failed: {message}")]
    Worker {
        /// Qualified name of the failed operator.
        operator: String,
        /// Error message.
        message: String,
    },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a resolution error.
    pub fn resolution(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Resolution {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unknown port error.
    pub fn unknown_port(operator: impl Into<String>, port: impl Into<String>) -> Self {
        Self::UnknownPort {
            operator: operator.into(),
            port: port.into(),
        }
    }

    /// Creates an unconnected port error.
    pub fn unconnected_port(operator: impl Into<String>, port: impl Into<String>) -> Self {
        Self::UnconnectedPort {
            operator: operator.into(),
            port: port.into(),
        }
    }

    /// Creates an invalid message error.
    pub fn invalid_message(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            port: port.into(),
            reason: reason.into(),
        }
    }

    /// Returns whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
