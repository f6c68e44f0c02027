use super::provided::InterfaceProvided;
use super::{check_name, CommandDescription, InterfaceDescription, Requirement};
use crate::command::payload::{clone_payload, CloneFn};
use crate::command::{
    Command, CommandKind, FunctionQualifiedRead, FunctionRead, FunctionSlot, FunctionVoid,
    FunctionWrite, FunctionWriteReturn, PayloadType,
};
use crate::communication::mailbox::{MailboxSender, QueuedFn};
use crate::error::{CadenceError, CadenceResult};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

enum HandlerDeclaration {
    // Runs on the listener's thread, drained from the interface's event mailbox.
    Queued {
        name: String,
        argument: Option<PayloadType>,
        call: QueuedFn,
        clone_argument: Option<CloneFn>,
    },
    Inline(Arc<Command>),
}

/// Declares the functions and event handlers a component of type `C` needs.
///
/// Function handles are returned immediately so the component can store
/// them; they stay unbound until Connect.
pub struct RequiredInterfaceBuilder<C> {
    name: String,
    requirement: Requirement,
    names: HashSet<String>,
    functions: Vec<Arc<FunctionSlot>>,
    handlers: Vec<HandlerDeclaration>,
    _marker: PhantomData<fn(&mut C)>,
}

impl<C: Any> RequiredInterfaceBuilder<C> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            requirement: Requirement::Mandatory,
            names: HashSet::new(),
            functions: Vec::new(),
            handlers: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional interfaces do not prevent the task from starting unconnected
    pub fn requirement(&mut self, requirement: Requirement) -> &mut Self {
        self.requirement = requirement;
        self
    }

    fn register(&mut self, slot: &Arc<FunctionSlot>) -> CadenceResult<()> {
        check_name(&mut self.names, "function", slot.name(), &self.name)?;
        self.functions.push(slot.clone());
        Ok(())
    }

    pub fn add_function_void(&mut self, name: &str) -> CadenceResult<FunctionVoid> {
        let function = FunctionVoid::new(name);
        self.register(function.slot())?;
        Ok(function)
    }

    pub fn add_function_write<A: Any + Send + Sync>(
        &mut self,
        name: &str,
    ) -> CadenceResult<FunctionWrite<A>> {
        let function = FunctionWrite::new(name);
        self.register(function.slot())?;
        Ok(function)
    }

    pub fn add_function_read<R: Any + Send>(&mut self, name: &str) -> CadenceResult<FunctionRead<R>> {
        let function = FunctionRead::new(name);
        self.register(function.slot())?;
        Ok(function)
    }

    pub fn add_function_qualified_read<A: Any + Send + Sync, R: Any + Send>(
        &mut self,
        name: &str,
    ) -> CadenceResult<FunctionQualifiedRead<A, R>> {
        let function = FunctionQualifiedRead::new(name);
        self.register(function.slot())?;
        Ok(function)
    }

    pub fn add_function_write_return<A: Any + Send + Sync, R: Any + Send>(
        &mut self,
        name: &str,
    ) -> CadenceResult<FunctionWriteReturn<A, R>> {
        let function = FunctionWriteReturn::new(name);
        self.register(function.slot())?;
        Ok(function)
    }

    /// Void event handler run on this component's thread
    pub fn add_event_handler_void<F>(&mut self, name: &str, handler: F) -> CadenceResult<&mut Self>
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        check_name(&mut self.names, "event handler", name, &self.name)?;
        let call: QueuedFn = Arc::new(move |target: &mut dyn Any, _: Option<&dyn Any>| {
            handler(target.downcast_mut::<C>()?);
            None
        });
        self.handlers.push(HandlerDeclaration::Queued {
            name: name.to_string(),
            argument: None,
            call,
            clone_argument: None,
        });
        Ok(self)
    }

    /// Event handler receiving a `T`, run on this component's thread
    pub fn add_event_handler_write<T, F>(&mut self, name: &str, handler: F) -> CadenceResult<&mut Self>
    where
        T: Any + Clone + Send + Sync,
        F: Fn(&mut C, &T) + Send + Sync + 'static,
    {
        check_name(&mut self.names, "event handler", name, &self.name)?;
        let call: QueuedFn = Arc::new(move |target: &mut dyn Any, argument: Option<&dyn Any>| {
            let payload = argument?.downcast_ref::<T>()?;
            handler(target.downcast_mut::<C>()?, payload);
            None
        });
        self.handlers.push(HandlerDeclaration::Queued {
            name: name.to_string(),
            argument: Some(PayloadType::of::<T>()),
            call,
            clone_argument: Some(clone_payload::<T>),
        });
        Ok(self)
    }

    /// Void event handler run on the emitter's thread
    pub fn add_event_handler_void_inline<F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> CadenceResult<&mut Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        check_name(&mut self.names, "event handler", name, &self.name)?;
        self.handlers.push(HandlerDeclaration::Inline(Command::inline(
            name,
            CommandKind::Void,
            None,
            None,
            Arc::new(move |_: Option<&dyn Any>| {
                handler();
                None
            }),
        )));
        Ok(self)
    }

    /// Event handler receiving a `T`, run on the emitter's thread
    pub fn add_event_handler_write_inline<T, F>(
        &mut self,
        name: &str,
        handler: F,
    ) -> CadenceResult<&mut Self>
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        check_name(&mut self.names, "event handler", name, &self.name)?;
        self.handlers.push(HandlerDeclaration::Inline(Command::inline(
            name,
            CommandKind::Write,
            Some(PayloadType::of::<T>()),
            None,
            Arc::new(move |argument: Option<&dyn Any>| {
                if let Some(payload) = argument.and_then(|a| a.downcast_ref::<T>()) {
                    handler(payload);
                }
                None
            }),
        )));
        Ok(self)
    }

    /// Whether any handler needs the event mailbox
    pub(crate) fn has_queued_handlers(&self) -> bool {
        self.handlers
            .iter()
            .any(|h| matches!(h, HandlerDeclaration::Queued { .. }))
    }

    /// Materialize the interface; queued handlers post into `events`
    pub(crate) fn build(self, owner: &str, events: &MailboxSender) -> Arc<InterfaceRequired> {
        let handlers = self
            .handlers
            .into_iter()
            .map(|handler| match handler {
                HandlerDeclaration::Queued {
                    name,
                    argument,
                    call,
                    clone_argument,
                } => {
                    let kind = if argument.is_some() {
                        CommandKind::Write
                    } else {
                        CommandKind::Void
                    };
                    Command::queued(
                        &name,
                        kind,
                        argument,
                        None,
                        events.clone(),
                        call,
                        clone_argument,
                    )
                }
                HandlerDeclaration::Inline(command) => command,
            })
            .collect();
        Arc::new(InterfaceRequired {
            name: self.name,
            owner: owner.to_string(),
            requirement: self.requirement,
            functions: self.functions,
            handlers,
            connection: Mutex::new(None),
        })
    }
}

impl<C> fmt::Debug for RequiredInterfaceBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequiredInterfaceBuilder")
            .field("name", &self.name)
            .field("requirement", &self.requirement)
            .field("functions", &self.functions.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Client half of a named contract: functions plus event handlers
pub struct InterfaceRequired {
    name: String,
    owner: String,
    requirement: Requirement,
    functions: Vec<Arc<FunctionSlot>>,
    handlers: Vec<Arc<Command>>,
    connection: Mutex<Option<Arc<InterfaceProvided>>>,
}

impl InterfaceRequired {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    fn qualified(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Bind every function and handler by name against `provided`.
    ///
    /// Either everything binds or nothing does; the error lists every name
    /// that could not be resolved.
    pub fn connect(&self, provided: &Arc<InterfaceProvided>) -> CadenceResult<()> {
        let mut connection = self.connection.lock();
        let target = format!("{}.{}", provided.owner(), provided.name());
        if let Some(current) = connection.as_ref() {
            return Err(CadenceError::AlreadyConnected {
                required: self.qualified(),
                provided: format!("{}.{}", current.owner(), current.name()),
            });
        }

        let mut unresolved = Vec::new();
        let mut commands = Vec::with_capacity(self.functions.len());
        for slot in &self.functions {
            match provided.command(slot.name()) {
                Some(command) if slot.can_bind(&command) => commands.push(command),
                Some(command) => unresolved.push(format!(
                    "function '{}' ({} vs {})",
                    slot.name(),
                    slot.kind(),
                    command.kind()
                )),
                None => unresolved.push(format!("function '{}'", slot.name())),
            }
        }
        let mut events = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            match provided.event(handler.name()) {
                Some(event) if event.argument_type() == handler.argument_type() => {
                    events.push(event)
                }
                Some(event) => unresolved.push(format!(
                    "event handler '{}' ({} vs {})",
                    handler.name(),
                    describe_type(handler.argument_type()),
                    describe_type(event.argument_type())
                )),
                None => unresolved.push(format!("event handler '{}'", handler.name())),
            }
        }

        if !unresolved.is_empty() {
            log::error!(
                "Connect {} -> {} failed, unresolved: {}",
                self.qualified(),
                target,
                unresolved.join(", ")
            );
            return Err(CadenceError::ConnectFailed {
                required: self.qualified(),
                provided: target,
                unresolved,
            });
        }

        for (slot, command) in self.functions.iter().zip(commands) {
            slot.bind(Some(command));
        }
        for (handler, event) in self.handlers.iter().zip(events) {
            event.add_listener(handler.clone());
        }
        *connection = Some(provided.clone());
        log::info!("Connected {} -> {}", self.qualified(), target);
        Ok(())
    }

    /// Unbind every function and remove every handler from its event
    pub fn disconnect(&self) -> CadenceResult<()> {
        let mut connection = self.connection.lock();
        let Some(provided) = connection.take() else {
            return Err(CadenceError::NotConnected(self.qualified()));
        };
        for slot in &self.functions {
            slot.unbind();
        }
        for handler in &self.handlers {
            if let Some(event) = provided.event(handler.name()) {
                event.remove_listener(handler);
            }
        }
        log::info!(
            "Disconnected {} from {}.{}",
            self.qualified(),
            provided.owner(),
            provided.name()
        );
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// `(component, interface)` this interface is connected to
    pub fn connected_to(&self) -> Option<(String, String)> {
        self.connection
            .lock()
            .as_ref()
            .map(|p| (p.owner().to_string(), p.name().to_string()))
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name()).collect()
    }

    pub fn event_handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Stop delivering events to this component
    pub(crate) fn disable_handlers(&self) {
        for handler in &self.handlers {
            handler.disable();
        }
    }

    pub fn describe(&self) -> InterfaceDescription {
        InterfaceDescription {
            name: self.name.clone(),
            commands: self
                .functions
                .iter()
                .map(|slot| CommandDescription::of_function(slot))
                .collect(),
            events: self
                .handlers
                .iter()
                .map(|h| CommandDescription::of(h))
                .collect(),
        }
    }
}

fn describe_type(payload: Option<PayloadType>) -> &'static str {
    payload.map(|p| p.name()).unwrap_or("void")
}

impl fmt::Debug for InterfaceRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceRequired")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("requirement", &self.requirement)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecutionResult;
    use crate::communication::mailbox::Mailbox;
    use crate::interface::ProvidedInterfaceBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Server;
    struct Client {
        events: usize,
    }

    fn server() -> (Arc<InterfaceProvided>, Mailbox) {
        let mut builder = ProvidedInterfaceBuilder::<Server>::new("Prov");
        builder
            .add_command_read("GetPosition", || 1.5f64)
            .unwrap()
            .add_command_void_inline("Ping", || {})
            .unwrap();
        builder.add_event_void("Stopped").unwrap();
        let mailbox = Mailbox::new("server", 8);
        (builder.build("server", &mailbox.sender()), mailbox)
    }

    #[test]
    fn connect_binds_every_name() {
        let (provided, _mailbox) = server();
        let mut builder = RequiredInterfaceBuilder::<Client>::new("Req");
        let get = builder.add_function_read::<f64>("GetPosition").unwrap();
        let ping = builder.add_function_void("Ping").unwrap();
        let events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());

        required.connect(&provided).unwrap();
        assert!(required.is_connected());
        assert_eq!(get.execute(), Ok(1.5));
        assert_eq!(ping.execute(), ExecutionResult::CommandSucceeded);
        assert_eq!(
            required.connected_to(),
            Some(("server".to_string(), "Prov".to_string()))
        );
    }

    #[test]
    fn missing_name_leaves_everything_unbound() {
        let (provided, _mailbox) = server();
        let mut builder = RequiredInterfaceBuilder::<Client>::new("Req");
        let get = builder.add_function_read::<f64>("GetPosition").unwrap();
        let missing = builder.add_function_void("Home").unwrap();
        let events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());

        match required.connect(&provided) {
            Err(CadenceError::ConnectFailed { unresolved, .. }) => {
                assert_eq!(unresolved, vec!["function 'Home'".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!get.is_bound());
        assert!(!missing.is_bound());
        assert!(!required.is_connected());
    }

    #[test]
    fn shape_mismatch_fails_connect() {
        let (provided, _mailbox) = server();
        let mut builder = RequiredInterfaceBuilder::<Client>::new("Req");
        let wrong = builder.add_function_write::<f64>("GetPosition").unwrap();
        let events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());
        assert!(required.connect(&provided).is_err());
        assert!(!wrong.is_bound());
    }

    #[test]
    fn queued_handler_runs_on_drain_and_disconnect_removes_it() {
        let (provided, _mailbox) = server();
        let mut builder = RequiredInterfaceBuilder::<Client>::new("Req");
        builder
            .add_event_handler_void("Stopped", |c: &mut Client| c.events += 1)
            .unwrap();
        let mut events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());
        required.connect(&provided).unwrap();

        let stopped = provided.event("Stopped").unwrap();
        assert_eq!(stopped.listener_count(), 1);
        stopped.execute(None, crate::command::CallMode::NonBlocking);

        let mut client = Client { events: 0 };
        assert_eq!(client.events, 0);
        events.execute_all(&mut client);
        assert_eq!(client.events, 1);

        required.disconnect().unwrap();
        assert_eq!(stopped.listener_count(), 0);
        assert!(required.disconnect().is_err());
        required.connect(&provided).unwrap();
        assert_eq!(stopped.listener_count(), 1);
    }

    #[test]
    fn inline_handler_runs_on_emitter_thread() {
        let (provided, _mailbox) = server();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut builder = RequiredInterfaceBuilder::<Client>::new("Req");
        builder
            .add_event_handler_void_inline("Stopped", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());
        required.connect(&provided).unwrap();

        provided
            .event("Stopped")
            .unwrap()
            .execute(None, crate::command::CallMode::NonBlocking);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_twice_is_refused() {
        let (provided, _mailbox) = server();
        let builder = RequiredInterfaceBuilder::<Client>::new("Req");
        let events = Mailbox::new("client-events", 8);
        let required = builder.build("client", &events.sender());
        required.connect(&provided).unwrap();
        assert!(matches!(
            required.connect(&provided),
            Err(CadenceError::AlreadyConnected { .. })
        ));
    }
}
