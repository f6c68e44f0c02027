//! Task execution: configuration, the per-task loop and OS scheduling controls

pub mod config;
pub mod realtime;
pub mod task;
pub mod timing;

pub use config::{
    DisciplineKind, ManagerConfig, SchedulingDiscipline, TaskConfig, TaskSection,
    DEFAULT_MAILBOX_SIZE, DEFAULT_STATE_TABLE_SIZE,
};
pub use task::{Task, TaskBuilder, STATE_CHANGED_EVENT, SYSTEM_INTERFACE};
pub use timing::{CycleTimer, TaskStats, Wakeup};
