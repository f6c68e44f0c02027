use super::payload::Payload;
use std::fmt;

/// Outcome of a single command invocation.
///
/// These are ordinary values, never panics or `Err`s of the crate error type:
/// the caller decides whether to drop, retry or propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionResult {
    /// Executed inline, or accepted by the target mailbox
    CommandSucceeded,
    /// The command exists but is disabled; nothing happened
    CommandDisabled,
    /// The argument does not match the command prototype; the callable was not invoked
    InvalidInputType,
    /// The response type requested by the caller does not match the command
    InvalidOutputType,
    /// The target mailbox is full
    MailboxFull,
    /// The function has not been bound by a successful Connect
    FunctionNotBound,
    /// A blocking call was issued from the thread that would have to execute it
    WouldDeadlock,
    /// A blocking call did not complete in time
    Timeout,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::CommandSucceeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandSucceeded => "COMMAND_SUCCEEDED",
            Self::CommandDisabled => "COMMAND_DISABLED",
            Self::InvalidInputType => "INVALID_INPUT_TYPE",
            Self::InvalidOutputType => "INVALID_OUTPUT_TYPE",
            Self::MailboxFull => "MAILBOX_FULL",
            Self::FunctionNotBound => "FUNCTION_NOT_BOUND",
            Self::WouldDeadlock => "WOULD_DEADLOCK",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`Command::execute`](super::Command::execute) plus the response payload, if any
pub struct CommandOutcome {
    pub result: ExecutionResult,
    pub response: Option<Payload>,
}

impl CommandOutcome {
    pub fn succeeded(response: Option<Payload>) -> Self {
        Self {
            result: ExecutionResult::CommandSucceeded,
            response,
        }
    }

    pub fn failed(result: ExecutionResult) -> Self {
        Self {
            result,
            response: None,
        }
    }

    /// Take the response as a concrete type
    pub fn into_response<R: 'static>(self) -> Result<R, ExecutionResult> {
        if !self.result.is_ok() {
            return Err(self.result);
        }
        match self.response.map(|payload| payload.downcast::<R>()) {
            Some(Ok(value)) => Ok(*value),
            _ => Err(ExecutionResult::InvalidOutputType),
        }
    }
}

impl From<ExecutionResult> for CommandOutcome {
    fn from(result: ExecutionResult) -> Self {
        CommandOutcome::failed(result)
    }
}

impl fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandOutcome")
            .field("result", &self.result)
            .field("has_response", &self.response.is_some())
            .finish()
    }
}
