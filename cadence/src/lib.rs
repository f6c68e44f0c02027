//! # CADENCE - component runtime for real-time control
//!
//! Components run as tasks with their own scheduling discipline, publish
//! their state through tick-indexed state tables and call each other through
//! named, typed interfaces.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cadence::prelude::*;
//!
//! struct Heartbeat;
//!
//! impl Component for Heartbeat {
//!     fn run(&mut self, ctx: &mut TaskContext<'_>) {
//!         if ctx.cycle() >= 50 {
//!             ctx.request_kill();
//!         }
//!     }
//! }
//!
//! fn main() -> AnyResult<()> {
//!     let manager = ComponentManager::new();
//!     manager.add(
//!         Task::builder("heartbeat", Heartbeat)
//!             .config(TaskConfig::periodic(Duration::from_millis(100)))
//!             .build()?,
//!     )?;
//!     manager.install_signal_handler()?;
//!     manager.create_all()?;
//!     manager.start_all()?;
//!     manager.wait_for_state_all(TaskState::Finished, None);
//!     Ok(())
//! }
//! ```

pub use cadence_core::{self, *};

/// The CADENCE prelude - everything you need to get started
pub mod prelude {
    // Components and tasks
    pub use cadence_core::core::{Component, TaskContext, TaskState};
    pub use cadence_core::scheduling::{SchedulingDiscipline, Task, TaskConfig};

    // Interfaces
    pub use cadence_core::command::{
        EventVoid, EventWrite, ExecutionResult, FunctionQualifiedRead, FunctionRead,
        FunctionVoid, FunctionWrite, FunctionWriteReturn,
    };
    pub use cadence_core::interface::{
        ProvidedInterfaceBuilder, Requirement, RequiredInterfaceBuilder,
    };

    // State
    pub use cadence_core::state::{CycleState, StateAccessor, StateDataId, StateTable};

    // Management
    pub use cadence_core::manager::ComponentManager;
    pub use cadence_core::params::ComponentParams;
    pub use cadence_core::scheduling::ManagerConfig;

    // Error types
    pub use cadence_core::error::{CadenceError, CadenceResult};
    pub type Result<T> = CadenceResult<T>;

    // Common std types
    pub use std::sync::Arc;
    pub use std::time::{Duration, Instant};

    // Common traits
    pub use serde::{Deserialize, Serialize};

    // Re-export anyhow for error handling
    pub use anyhow::{anyhow, bail, ensure, Context, Result as AnyResult};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get CADENCE version
pub fn version() -> &'static str {
    VERSION
}
