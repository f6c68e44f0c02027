//! # Core types and traits for the CADENCE runtime
//!
//! - **Component**: the trait user code implements
//! - **TaskContext**: what the hooks see of their task during execution
//! - **TaskState**: the lifecycle state machine
//!
//! ## Component Lifecycle
//!
//! 1. **Construction** - interfaces and state slots are declared
//! 2. **Create** - `configure()` runs and the state table is finalized
//! 3. **Start** - `startup()` runs on the execution thread, then `run()` every cycle
//! 4. **Kill** - the loop finishes its cycle and `cleanup()` runs

pub mod component;
pub mod state;

pub use component::{Component, TaskContext};
pub use state::TaskState;
