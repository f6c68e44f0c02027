use super::{check_name, CommandDescription, InterfaceDescription};
use crate::command::payload::{clone_payload, CloneFn};
use crate::command::{Command, CommandKind, EventVoid, EventWrite, Payload, PayloadType};
use crate::communication::mailbox::{MailboxSender, QueuedFn};
use crate::error::CadenceResult;
use crate::state::{StateAccessor, StateValue};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

enum Declaration {
    // Needs the owning task's mailbox before it can exist.
    Queued {
        name: String,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
        call: QueuedFn,
        clone_argument: Option<CloneFn>,
    },
    Ready(Arc<Command>),
}

/// Declares the commands and events a component of type `C` offers.
///
/// Queued commands run on the owning task's thread with `&mut C`; inline
/// commands run on the caller's thread and may only capture thread-safe
/// state such as [`StateAccessor`]s.
pub struct ProvidedInterfaceBuilder<C> {
    name: String,
    names: HashSet<String>,
    commands: Vec<Declaration>,
    events: Vec<Arc<Command>>,
    _marker: PhantomData<fn(&mut C)>,
}

impl<C: Any> ProvidedInterfaceBuilder<C> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            names: HashSet::new(),
            commands: Vec::new(),
            events: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn claim(&mut self, name: &str) -> CadenceResult<()> {
        check_name(&mut self.names, "command", name, &self.name)
    }

    fn queued(
        &mut self,
        name: &str,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
        call: QueuedFn,
        clone_argument: Option<CloneFn>,
    ) -> CadenceResult<&mut Self> {
        self.claim(name)?;
        self.commands.push(Declaration::Queued {
            name: name.to_string(),
            kind,
            argument,
            response,
            call,
            clone_argument,
        });
        Ok(self)
    }

    fn ready(&mut self, command: Arc<Command>) -> CadenceResult<&mut Self> {
        self.claim(command.name())?;
        self.commands.push(Declaration::Ready(command));
        Ok(self)
    }

    /// Zero-argument command executed on the owning task's thread
    pub fn add_command_void<F>(&mut self, name: &str, handler: F) -> CadenceResult<&mut Self>
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        let call: QueuedFn = Arc::new(move |target: &mut dyn Any, _: Option<&dyn Any>| {
            handler(target.downcast_mut::<C>()?);
            None
        });
        self.queued(name, CommandKind::Void, None, None, call, None)
    }

    /// One-argument command executed on the owning task's thread
    pub fn add_command_write<A, F>(&mut self, name: &str, handler: F) -> CadenceResult<&mut Self>
    where
        A: Any + Clone + Send + Sync,
        F: Fn(&mut C, &A) + Send + Sync + 'static,
    {
        let call: QueuedFn = Arc::new(move |target: &mut dyn Any, argument: Option<&dyn Any>| {
            let argument = argument?.downcast_ref::<A>()?;
            handler(target.downcast_mut::<C>()?, argument);
            None
        });
        self.queued(
            name,
            CommandKind::Write,
            Some(PayloadType::of::<A>()),
            None,
            call,
            Some(clone_payload::<A>),
        )
    }

    /// Queued command whose caller waits for the returned confirmation
    pub fn add_command_write_return<A, R, F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> CadenceResult<&mut Self>
    where
        A: Any + Clone + Send + Sync,
        R: Any + Send,
        F: Fn(&mut C, &A) -> R + Send + Sync + 'static,
    {
        let call: QueuedFn = Arc::new(move |target: &mut dyn Any, argument: Option<&dyn Any>| {
            let argument = argument?.downcast_ref::<A>()?;
            let response = handler(target.downcast_mut::<C>()?, argument);
            Some(Box::new(response) as Payload)
        });
        self.queued(
            name,
            CommandKind::WriteReturn,
            Some(PayloadType::of::<A>()),
            Some(PayloadType::of::<R>()),
            call,
            Some(clone_payload::<A>),
        )
    }

    /// Read command executed on the caller's thread
    pub fn add_command_read<R, F>(&mut self, name: &str, reader: F) -> CadenceResult<&mut Self>
    where
        R: Any + Send,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.ready(Command::inline(
            name,
            CommandKind::Read,
            None,
            Some(PayloadType::of::<R>()),
            Arc::new(move |_: Option<&dyn Any>| Some(Box::new(reader()) as Payload)),
        ))
    }

    /// Qualified read executed on the caller's thread
    pub fn add_command_qualified_read<A, R, F>(
        &mut self,
        name: &str,
        reader: F,
    ) -> CadenceResult<&mut Self>
    where
        A: Any + Send + Sync,
        R: Any + Send,
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.ready(Command::inline(
            name,
            CommandKind::QualifiedRead,
            Some(PayloadType::of::<A>()),
            Some(PayloadType::of::<R>()),
            Arc::new(move |argument: Option<&dyn Any>| {
                let argument = argument?.downcast_ref::<A>()?;
                Some(Box::new(reader(argument)) as Payload)
            }),
        ))
    }

    /// Read command returning the latest committed value of a state slot.
    ///
    /// Before the first advance it returns the slot's initial value.
    pub fn add_command_read_state<T: StateValue>(
        &mut self,
        name: &str,
        accessor: StateAccessor<T>,
    ) -> CadenceResult<&mut Self> {
        self.add_command_read(name, move || T::clone(&accessor.latest_or_initial()))
    }

    /// Zero-argument command executed on the caller's thread
    pub fn add_command_void_inline<F>(&mut self, name: &str, handler: F) -> CadenceResult<&mut Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ready(Command::inline(
            name,
            CommandKind::Void,
            None,
            None,
            Arc::new(move |_: Option<&dyn Any>| {
                handler();
                None
            }),
        ))
    }

    /// One-argument command executed on the caller's thread
    pub fn add_command_write_inline<A, F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> CadenceResult<&mut Self>
    where
        A: Any + Send + Sync,
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.ready(Command::inline(
            name,
            CommandKind::Write,
            Some(PayloadType::of::<A>()),
            None,
            Arc::new(move |argument: Option<&dyn Any>| {
                if let Some(argument) = argument.and_then(|a| a.downcast_ref::<A>()) {
                    handler(argument);
                }
                None
            }),
        ))
    }

    /// Declare a void event; keep the handle to fire it
    pub fn add_event_void(&mut self, name: &str) -> CadenceResult<EventVoid> {
        check_name(&mut self.names, "event", name, &self.name)?;
        let event = EventVoid::new(name);
        self.events.push(event.command().clone());
        Ok(event)
    }

    /// Declare an event carrying a `T`; keep the handle to fire it
    pub fn add_event_write<T: Any + Send + Sync>(&mut self, name: &str) -> CadenceResult<EventWrite<T>> {
        check_name(&mut self.names, "event", name, &self.name)?;
        let event = EventWrite::new(name);
        self.events.push(event.command().clone());
        Ok(event)
    }

    /// Materialize the interface, binding queued commands to `mailbox`
    pub(crate) fn build(self, owner: &str, mailbox: &MailboxSender) -> Arc<InterfaceProvided> {
        let commands = self
            .commands
            .into_iter()
            .map(|declaration| match declaration {
                Declaration::Queued {
                    name,
                    kind,
                    argument,
                    response,
                    call,
                    clone_argument,
                } => Command::queued(
                    &name,
                    kind,
                    argument,
                    response,
                    mailbox.clone(),
                    call,
                    clone_argument,
                ),
                Declaration::Ready(command) => command,
            })
            .collect();
        Arc::new(InterfaceProvided {
            name: self.name,
            owner: owner.to_string(),
            commands,
            events: self.events,
        })
    }
}

impl<C> fmt::Debug for ProvidedInterfaceBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedInterfaceBuilder")
            .field("name", &self.name)
            .field("commands", &self.commands.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Server half of a named contract: commands plus event multicasters
pub struct InterfaceProvided {
    name: String,
    owner: String,
    commands: Vec<Arc<Command>>,
    events: Vec<Arc<Command>>,
}

impl InterfaceProvided {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the component that owns the interface
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn command(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.iter().find(|c| c.name() == name).cloned()
    }

    pub fn event(&self, name: &str) -> Option<Arc<Command>> {
        self.events.iter().find(|e| e.name() == name).cloned()
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name()).collect()
    }

    /// Disable every command; bindings on the client side stay in place
    pub fn disable_all(&self) {
        for command in &self.commands {
            command.disable();
        }
    }

    pub fn enable_all(&self) {
        for command in &self.commands {
            command.enable();
        }
    }

    pub fn describe(&self) -> InterfaceDescription {
        InterfaceDescription {
            name: self.name.clone(),
            commands: self
                .commands
                .iter()
                .map(|c| CommandDescription::of(c))
                .collect(),
            events: self.events.iter().map(|e| CommandDescription::of(e)).collect(),
        }
    }
}

impl fmt::Debug for InterfaceProvided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceProvided")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("commands", &self.command_names())
            .field("events", &self.event_names())
            .finish()
    }
}
