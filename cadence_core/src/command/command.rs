use super::payload::{CloneFn, Payload, PayloadType};
use super::result::{CommandOutcome, ExecutionResult};
use crate::communication::mailbox::{Completion, MailboxEntry, MailboxSender, QueuedFn};
use arc_swap::ArcSwap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The closed set of call shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// No argument, no response
    Void,
    /// One argument, no response
    Write,
    /// No argument, one response
    Read,
    /// One argument, one response
    QualifiedRead,
    /// One argument, waits for a confirmation value
    WriteReturn,
}

impl CommandKind {
    pub fn has_argument(&self) -> bool {
        matches!(self, Self::Write | Self::QualifiedRead | Self::WriteReturn)
    }

    pub fn has_response(&self) -> bool {
        matches!(self, Self::Read | Self::QualifiedRead | Self::WriteReturn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Write => "write",
            Self::Read => "read",
            Self::QualifiedRead => "qualified-read",
            Self::WriteReturn => "write-return",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller wants to wait for a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Enqueue and return; shapes with a response still wait for it
    NonBlocking,
    /// Wait until the target thread executed the command
    Blocking,
    /// Like `Blocking`, giving up after the duration
    BlockingTimeout(Duration),
}

/// Body of a command executed on the caller's thread
pub type InlineFn = Arc<dyn Fn(Option<&dyn Any>) -> Option<Payload> + Send + Sync>;

enum CommandTarget {
    Inline(InlineFn),
    Queued {
        mailbox: MailboxSender,
        call: QueuedFn,
        clone_argument: Option<CloneFn>,
    },
    Multicast(ArcSwap<Vec<Arc<Command>>>),
}

/// Named, typed invocation descriptor exposed by a provided interface.
///
/// A command either runs inline on the caller's thread, or is queued into
/// the mailbox of the task that owns it and executed there with exclusive
/// access to the component. Multicast commands forward to every listener.
pub struct Command {
    name: Arc<str>,
    kind: CommandKind,
    argument: Option<PayloadType>,
    response: Option<PayloadType>,
    enabled: AtomicBool,
    target: CommandTarget,
}

impl Command {
    pub fn inline(
        name: &str,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
        body: InlineFn,
    ) -> Arc<Self> {
        Arc::new(Self::new(name, kind, argument, response, CommandTarget::Inline(body)))
    }

    pub fn queued(
        name: &str,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
        mailbox: MailboxSender,
        call: QueuedFn,
        clone_argument: Option<CloneFn>,
    ) -> Arc<Self> {
        Arc::new(Self::new(
            name,
            kind,
            argument,
            response,
            CommandTarget::Queued {
                mailbox,
                call,
                clone_argument,
            },
        ))
    }

    /// Event command fanning out to listeners; `argument` is `None` for void events
    pub fn multicast(name: &str, argument: Option<PayloadType>) -> Arc<Self> {
        let kind = if argument.is_some() {
            CommandKind::Write
        } else {
            CommandKind::Void
        };
        Arc::new(Self::new(
            name,
            kind,
            argument,
            None,
            CommandTarget::Multicast(ArcSwap::from_pointee(Vec::new())),
        ))
    }

    fn new(
        name: &str,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
        target: CommandTarget,
    ) -> Self {
        debug_assert_eq!(kind.has_argument(), argument.is_some());
        Self {
            name: Arc::from(name),
            kind,
            argument,
            response,
            enabled: AtomicBool::new(true),
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn argument_type(&self) -> Option<PayloadType> {
        self.argument
    }

    pub fn response_type(&self) -> Option<PayloadType> {
        self.response
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.target, CommandTarget::Queued { .. })
    }

    pub fn is_multicast(&self) -> bool {
        matches!(self.target, CommandTarget::Multicast(_))
    }

    /// Check an argument against the prototype without executing anything
    pub fn accepts(&self, argument: Option<&dyn Any>) -> bool {
        match (self.argument, argument) {
            (None, None) => true,
            (Some(proto), Some(value)) => proto.matches(value),
            _ => false,
        }
    }

    /// Invoke the command.
    ///
    /// A disabled command returns `CommandDisabled` and a mistyped argument
    /// returns `InvalidInputType`; in both cases the callable is not invoked.
    pub fn execute(&self, argument: Option<&dyn Any>, mode: CallMode) -> CommandOutcome {
        if !self.is_enabled() {
            return ExecutionResult::CommandDisabled.into();
        }
        if !self.accepts(argument) {
            log::debug!(
                "Command '{}' rejected argument: expected {}",
                self.name,
                self.argument
                    .map(|proto| proto.name())
                    .unwrap_or("no argument")
            );
            return ExecutionResult::InvalidInputType.into();
        }

        match &self.target {
            CommandTarget::Inline(body) => CommandOutcome::succeeded(body(argument)),
            CommandTarget::Queued {
                mailbox,
                call,
                clone_argument,
            } => self.enqueue(mailbox, call, *clone_argument, argument, mode),
            CommandTarget::Multicast(listeners) => {
                let listeners = listeners.load();
                for listener in listeners.iter() {
                    let outcome = listener.execute(argument, CallMode::NonBlocking);
                    if !outcome.result.is_ok() {
                        log::debug!(
                            "Event '{}': listener '{}' returned {}",
                            self.name,
                            listener.name(),
                            outcome.result
                        );
                    }
                }
                CommandOutcome::succeeded(None)
            }
        }
    }

    fn enqueue(
        &self,
        mailbox: &MailboxSender,
        call: &QueuedFn,
        clone_argument: Option<CloneFn>,
        argument: Option<&dyn Any>,
        mode: CallMode,
    ) -> CommandOutcome {
        if mailbox.is_closed() {
            return ExecutionResult::CommandDisabled.into();
        }
        let payload = match (argument, clone_argument) {
            (Some(value), Some(clone)) => match clone(value) {
                Some(payload) => Some(payload),
                None => return ExecutionResult::InvalidInputType.into(),
            },
            _ => None,
        };

        let wait = match mode {
            CallMode::NonBlocking if !self.kind.has_response() => None,
            CallMode::NonBlocking | CallMode::Blocking => Some(None),
            CallMode::BlockingTimeout(timeout) => Some(Some(timeout)),
        };

        let refused = |mailbox: &MailboxSender| {
            if mailbox.is_closed() {
                ExecutionResult::CommandDisabled
            } else {
                ExecutionResult::MailboxFull
            }
        };

        match wait {
            None => {
                let entry = MailboxEntry::new(self.name.clone(), call.clone(), payload, None);
                match mailbox.put(entry) {
                    Ok(()) => CommandOutcome::succeeded(None),
                    Err(_) => refused(mailbox).into(),
                }
            }
            Some(timeout) => {
                if mailbox.is_owner_thread() {
                    log::warn!(
                        "Command '{}': blocking call from its own execution thread refused",
                        self.name
                    );
                    return ExecutionResult::WouldDeadlock.into();
                }
                let completion = Completion::new();
                let entry = MailboxEntry::new(
                    self.name.clone(),
                    call.clone(),
                    payload,
                    Some(completion.clone()),
                );
                if mailbox.put(entry).is_err() {
                    return refused(mailbox).into();
                }
                completion
                    .wait(timeout)
                    .unwrap_or_else(|| ExecutionResult::Timeout.into())
            }
        }
    }

    /// Add a listener to a multicast command; false if not multicast or already present
    pub fn add_listener(&self, listener: Arc<Command>) -> bool {
        let CommandTarget::Multicast(listeners) = &self.target else {
            return false;
        };
        let mut added = false;
        listeners.rcu(|current| {
            added = !current.iter().any(|l| Arc::ptr_eq(l, &listener));
            if !added {
                return Arc::clone(current);
            }
            let mut next = Vec::clone(current);
            next.push(listener.clone());
            Arc::new(next)
        });
        added
    }

    /// Remove a listener from a multicast command
    pub fn remove_listener(&self, listener: &Arc<Command>) -> bool {
        let CommandTarget::Multicast(listeners) = &self.target else {
            return false;
        };
        let mut removed = false;
        listeners.rcu(|current| {
            let next: Vec<Arc<Command>> = current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn listener_count(&self) -> usize {
        match &self.target {
            CommandTarget::Multicast(listeners) => listeners.load().len(),
            _ => 0,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("argument", &self.argument)
            .field("response", &self.response)
            .field("enabled", &self.is_enabled())
            .field("queued", &self.is_queued())
            .finish()
    }
}
