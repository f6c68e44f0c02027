//! Provided and required interfaces and the Connect operation

pub mod provided;
pub mod required;

pub use provided::{InterfaceProvided, ProvidedInterfaceBuilder};
pub use required::{InterfaceRequired, RequiredInterfaceBuilder};

use crate::command::{Command, FunctionSlot};
use crate::error::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a task may start while a required interface is unconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    #[default]
    Mandatory,
    Optional,
}

/// Shape and payload types of one command, function or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescription {
    pub name: String,
    pub kind: &'static str,
    pub argument: Option<String>,
    pub response: Option<String>,
}

impl CommandDescription {
    pub(crate) fn of(command: &Command) -> Self {
        Self {
            name: command.name().to_string(),
            kind: command.kind().as_str(),
            argument: command.argument_type().map(|p| p.name().to_string()),
            response: command.response_type().map(|p| p.name().to_string()),
        }
    }

    pub(crate) fn of_function(slot: &FunctionSlot) -> Self {
        Self {
            name: slot.name().to_string(),
            kind: slot.kind().as_str(),
            argument: slot.argument_type().map(|p| p.name().to_string()),
            response: slot.response_type().map(|p| p.name().to_string()),
        }
    }
}

/// Introspection record of an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescription {
    pub name: String,
    /// Commands (provided side) or functions (required side)
    pub commands: Vec<CommandDescription>,
    /// Events (provided side) or event handlers (required side)
    pub events: Vec<CommandDescription>,
}

pub(crate) fn check_name(
    names: &mut HashSet<String>,
    kind: &'static str,
    name: &str,
    owner: &str,
) -> CadenceResult<()> {
    if !names.insert(name.to_string()) {
        return Err(CadenceError::DuplicateName {
            kind,
            name: name.to_string(),
            owner: owner.to_string(),
        });
    }
    Ok(())
}
