//! # CADENCE Core
//!
//! The runtime of the CADENCE component framework.
//!
//! Independently scheduled components exchange data and invoke operations on
//! each other through named, typed interfaces. This crate provides:
//!
//! - **Communication**: bounded queues and the per-task command mailbox
//! - **State**: tick-indexed state tables with one writer and lock-free readers
//! - **Commands**: typed commands, functions and events
//! - **Interfaces**: provided/required interfaces and the Connect operation
//! - **Scheduling**: the task state machine and its execution loop
//! - **Manager**: a registry fanning lifecycle operations over components
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cadence_core::{
//!     Component, ComponentManager, ProvidedInterfaceBuilder, Task, TaskConfig, TaskContext,
//! };
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: u64,
//! }
//!
//! impl Component for Counter {
//!     fn run(&mut self, _ctx: &mut TaskContext<'_>) {
//!         self.count += 1;
//!     }
//! }
//!
//! fn main() -> cadence_core::CadenceResult<()> {
//!     let mut control = ProvidedInterfaceBuilder::<Counter>::new("Control");
//!     control.add_command_void("Reset", |c: &mut Counter| c.count = 0)?;
//!
//!     let manager = ComponentManager::new();
//!     manager.add(
//!         Task::builder("counter", Counter::default())
//!             .config(TaskConfig::periodic(Duration::from_millis(10)))
//!             .provided(control)
//!             .build()?,
//!     )?;
//!     manager.create_all()?;
//!     manager.start_all()?;
//!     manager.cleanup(Some(Duration::from_secs(1)))
//! }
//! ```

pub mod command;
pub mod communication;
pub mod core;
pub mod error;
pub mod interface;
pub mod manager;
pub mod params;
pub mod scheduling;
pub mod state;

// Re-export commonly used types for easy access
pub use command::{
    CallMode, CommandOutcome, EventVoid, EventWrite, ExecutionResult, FunctionQualifiedRead,
    FunctionRead, FunctionVoid, FunctionWrite, FunctionWriteReturn,
};
pub use communication::{Mailbox, MailboxSender, Queue};
pub use core::{Component, TaskContext, TaskState};
pub use error::{CadenceError, CadenceResult};
pub use interface::{
    InterfaceProvided, InterfaceRequired, ProvidedInterfaceBuilder, Requirement,
    RequiredInterfaceBuilder,
};
pub use manager::{ComponentManager, KillHandle, ManagedComponent};
pub use params::ComponentParams;
pub use scheduling::{ManagerConfig, SchedulingDiscipline, Task, TaskBuilder, TaskConfig, TaskStats};
pub use state::{CycleState, StateAccessor, StateDataId, StateIndex, StateTable, StateTableView};
