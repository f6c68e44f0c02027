//! Typed invocation objects and the client-side handles bound to them

#[allow(clippy::module_inception)]
pub mod command;
pub mod event;
pub mod function;
pub mod payload;
pub mod result;

pub use command::{CallMode, Command, CommandKind, InlineFn};
pub use event::{EventVoid, EventWrite};
pub use function::{
    FunctionQualifiedRead, FunctionRead, FunctionSlot, FunctionVoid, FunctionWrite,
    FunctionWriteReturn,
};
pub use payload::{Payload, PayloadType};
pub use result::{CommandOutcome, ExecutionResult};
