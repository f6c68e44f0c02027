//! Error types for the CADENCE runtime
//!
//! Setup, lifecycle and configuration problems are reported as [`CadenceError`].
//! Failures of a single command invocation are *not* errors; they are returned
//! as [`crate::command::ExecutionResult`] values.

use crate::core::TaskState;
use thiserror::Error;

/// Main error type for CADENCE operations
#[derive(Debug, Error)]
pub enum CadenceError {
    /// I/O errors (config files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON conversion errors (component parameters)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A name is already taken within its namespace
    #[error("{kind} '{name}' already exists in '{owner}'")]
    DuplicateName {
        kind: &'static str,
        name: String,
        owner: String,
    },

    /// A component is not registered
    #[error("Component '{0}' not found")]
    ComponentNotFound(String),

    /// An interface is not declared on a component
    #[error("Interface '{interface}' not found on component '{component}'")]
    InterfaceNotFound { component: String, interface: String },

    /// Connect could not resolve every name; nothing was bound
    #[error("Connect '{required}' -> '{provided}' failed, unresolved: {}", .unresolved.join(", "))]
    ConnectFailed {
        required: String,
        provided: String,
        unresolved: Vec<String>,
    },

    /// The required interface is already bound to a provided interface
    #[error("Required interface '{required}' is already connected to '{provided}'")]
    AlreadyConnected { required: String, provided: String },

    /// The required interface is not connected
    #[error("Required interface '{0}' is not connected")]
    NotConnected(String),

    /// Connect/Disconnect attempted while a component is running
    #[error("Cannot change connections of '{0}' while it is running")]
    ConnectWhileActive(String),

    /// Mandatory required interfaces left unconnected at start
    #[error("Task '{task}' has unconnected mandatory required interfaces: {}", .interfaces.join(", "))]
    UnconnectedInterfaces { task: String, interfaces: Vec<String> },

    /// Lifecycle operation not allowed in the current state
    #[error("Task '{task}': cannot {operation} while {state}")]
    InvalidState {
        task: String,
        operation: &'static str,
        state: TaskState,
    },

    /// State table misuse
    #[error("State table error: {0}")]
    StateTable(String),

    /// A state index no longer addresses the row it was taken for
    #[error("Stale state index: tick {ticks} at now={now}, buffer length {length}")]
    StaleIndex { ticks: u64, now: u64, length: usize },

    /// Typed access with the wrong type
    #[error("Type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Thread could not be created
    #[error("Failed to spawn thread for '{task}': {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation is not supported on this platform
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Internal runtime errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for CADENCE results
pub type CadenceResult<T> = Result<T, CadenceError>;

impl CadenceError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CadenceError::Config(msg.into())
    }

    /// Create a state table error
    pub fn state_table<S: Into<String>>(msg: S) -> Self {
        CadenceError::StateTable(msg.into())
    }

    pub(crate) fn invalid_state(task: &str, operation: &'static str, state: TaskState) -> Self {
        CadenceError::InvalidState {
            task: task.to_string(),
            operation,
            state,
        }
    }
}
