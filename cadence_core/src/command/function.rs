use super::command::{CallMode, Command, CommandKind};
use super::payload::PayloadType;
use super::result::{CommandOutcome, ExecutionResult};
use arc_swap::ArcSwapOption;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Untyped client-side binding point shared by every typed function handle.
///
/// A slot is empty until Connect binds it to exactly one [`Command`]; after
/// that every invocation goes straight to the bound command.
pub struct FunctionSlot {
    name: Arc<str>,
    kind: CommandKind,
    argument: Option<PayloadType>,
    response: Option<PayloadType>,
    command: ArcSwapOption<Command>,
}

impl FunctionSlot {
    pub(crate) fn new(
        name: &str,
        kind: CommandKind,
        argument: Option<PayloadType>,
        response: Option<PayloadType>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            kind,
            argument,
            response,
            command: ArcSwapOption::empty(),
        })
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

    /// True if `command` has the call shape this function expects
    pub fn can_bind(&self, command: &Command) -> bool {
        command.kind() == self.kind
    }

    /// Bind to a command. Fails on `None` or on a shape mismatch.
    pub fn bind(&self, command: Option<Arc<Command>>) -> bool {
        let Some(command) = command else {
            return false;
        };
        if !self.can_bind(&command) {
            log::debug!(
                "Function '{}' ({}) cannot bind {} command '{}'",
                self.name,
                self.kind,
                command.kind(),
                command.name()
            );
            return false;
        }
        self.command.store(Some(command));
        true
    }

    pub fn unbind(&self) {
        self.command.store(None);
    }

    pub fn is_bound(&self) -> bool {
        self.command.load().is_some()
    }

    pub fn bound_command(&self) -> Option<Arc<Command>> {
        self.command.load_full()
    }

    /// Invoke the bound command with an untyped argument
    pub fn execute_raw(&self, argument: Option<&dyn Any>, mode: CallMode) -> CommandOutcome {
        match self.command.load_full() {
            Some(command) => command.execute(argument, mode),
            None => ExecutionResult::FunctionNotBound.into(),
        }
    }

    fn execute_for<R: 'static>(
        &self,
        argument: Option<&dyn Any>,
        mode: CallMode,
    ) -> Result<R, ExecutionResult> {
        let Some(command) = self.command.load_full() else {
            return Err(ExecutionResult::FunctionNotBound);
        };
        if command.response_type() != Some(PayloadType::of::<R>()) {
            return Err(ExecutionResult::InvalidOutputType);
        }
        command.execute(argument, mode).into_response::<R>()
    }
}

impl fmt::Debug for FunctionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSlot")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bound", &self.is_bound())
            .finish()
    }
}

macro_rules! impl_handle_common {
    ($handle:ident $(, $param:ident)*) => {
        impl<$($param),*> $handle<$($param),*> {
            pub fn name(&self) -> &str {
                self.slot.name()
            }

            pub fn is_bound(&self) -> bool {
                self.slot.is_bound()
            }

            /// The binding point, as registered on a required interface
            pub fn slot(&self) -> &Arc<FunctionSlot> {
                &self.slot
            }
        }

        impl<$($param),*> Clone for $handle<$($param),*> {
            fn clone(&self) -> Self {
                Self {
                    slot: self.slot.clone(),
                    _marker: PhantomData,
                }
            }
        }

        impl<$($param),*> fmt::Debug for $handle<$($param),*> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($handle)).field(&self.slot).finish()
            }
        }
    };
}

/// Handle for a zero-argument command
pub struct FunctionVoid {
    slot: Arc<FunctionSlot>,
    _marker: PhantomData<()>,
}

impl FunctionVoid {
    pub fn new(name: &str) -> Self {
        Self {
            slot: FunctionSlot::new(name, CommandKind::Void, None, None),
            _marker: PhantomData,
        }
    }

    /// Queue (or run inline) and return immediately
    pub fn execute(&self) -> ExecutionResult {
        self.slot.execute_raw(None, CallMode::NonBlocking).result
    }

    /// Wait until the provider executed the command
    pub fn execute_blocking(&self) -> ExecutionResult {
        self.slot.execute_raw(None, CallMode::Blocking).result
    }

    pub fn execute_blocking_timeout(&self, timeout: Duration) -> ExecutionResult {
        self.slot
            .execute_raw(None, CallMode::BlockingTimeout(timeout))
            .result
    }
}

impl_handle_common!(FunctionVoid);

/// Handle for a one-argument command without response
pub struct FunctionWrite<A> {
    slot: Arc<FunctionSlot>,
    _marker: PhantomData<fn(&A)>,
}

impl<A: Any + Send + Sync> FunctionWrite<A> {
    pub fn new(name: &str) -> Self {
        Self {
            slot: FunctionSlot::new(
                name,
                CommandKind::Write,
                Some(PayloadType::of::<A>()),
                None,
            ),
            _marker: PhantomData,
        }
    }

    pub fn execute(&self, argument: &A) -> ExecutionResult {
        self.slot
            .execute_raw(Some(argument as &dyn Any), CallMode::NonBlocking)
            .result
    }

    pub fn execute_blocking(&self, argument: &A) -> ExecutionResult {
        self.slot.execute_raw(Some(argument as &dyn Any), CallMode::Blocking).result
    }

    pub fn execute_blocking_timeout(&self, argument: &A, timeout: Duration) -> ExecutionResult {
        self.slot
            .execute_raw(Some(argument as &dyn Any), CallMode::BlockingTimeout(timeout))
            .result
    }
}

impl_handle_common!(FunctionWrite, A);

/// Handle for a command returning a value
pub struct FunctionRead<R> {
    slot: Arc<FunctionSlot>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Any + Send> FunctionRead<R> {
    pub fn new(name: &str) -> Self {
        Self {
            slot: FunctionSlot::new(name, CommandKind::Read, None, Some(PayloadType::of::<R>())),
            _marker: PhantomData,
        }
    }

    pub fn execute(&self) -> Result<R, ExecutionResult> {
        self.slot.execute_for::<R>(None, CallMode::Blocking)
    }

    /// Give up after `timeout` if the provider queues reads
    pub fn execute_timeout(&self, timeout: Duration) -> Result<R, ExecutionResult> {
        self.slot.execute_for::<R>(None, CallMode::BlockingTimeout(timeout))
    }
}

impl_handle_common!(FunctionRead, R);

/// Handle for a command taking an argument and returning a value
pub struct FunctionQualifiedRead<A, R> {
    slot: Arc<FunctionSlot>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A: Any + Send + Sync, R: Any + Send> FunctionQualifiedRead<A, R> {
    pub fn new(name: &str) -> Self {
        Self {
            slot: FunctionSlot::new(
                name,
                CommandKind::QualifiedRead,
                Some(PayloadType::of::<A>()),
                Some(PayloadType::of::<R>()),
            ),
            _marker: PhantomData,
        }
    }

    pub fn execute(&self, argument: &A) -> Result<R, ExecutionResult> {
        self.slot.execute_for::<R>(Some(argument as &dyn Any), CallMode::Blocking)
    }

    pub fn execute_timeout(&self, argument: &A, timeout: Duration) -> Result<R, ExecutionResult> {
        self.slot
            .execute_for::<R>(Some(argument as &dyn Any), CallMode::BlockingTimeout(timeout))
    }
}

impl_handle_common!(FunctionQualifiedRead, A, R);

/// Handle for a one-argument command that answers with a confirmation value.
///
/// The call always waits for the provider's thread to execute it.
pub struct FunctionWriteReturn<A, R> {
    slot: Arc<FunctionSlot>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A: Any + Send + Sync, R: Any + Send> FunctionWriteReturn<A, R> {
    pub fn new(name: &str) -> Self {
        Self {
            slot: FunctionSlot::new(
                name,
                CommandKind::WriteReturn,
                Some(PayloadType::of::<A>()),
                Some(PayloadType::of::<R>()),
            ),
            _marker: PhantomData,
        }
    }

    pub fn execute(&self, argument: &A) -> Result<R, ExecutionResult> {
        self.slot.execute_for::<R>(Some(argument as &dyn Any), CallMode::Blocking)
    }

    pub fn execute_timeout(&self, argument: &A, timeout: Duration) -> Result<R, ExecutionResult> {
        self.slot
            .execute_for::<R>(Some(argument as &dyn Any), CallMode::BlockingTimeout(timeout))
    }
}

impl_handle_common!(FunctionWriteReturn, A, R);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn inline_read(value: i64) -> Arc<Command> {
        Command::inline(
            "GetValue",
            CommandKind::Read,
            None,
            Some(PayloadType::of::<i64>()),
            Arc::new(move |_: Option<&dyn Any>| Some(Box::new(value) as super::super::Payload)),
        )
    }

    #[test]
    fn unbound_function_reports_not_bound() {
        let f = FunctionWrite::<f64>::new("SetGoal");
        assert!(!f.is_bound());
        assert_eq!(f.execute(&1.0), ExecutionResult::FunctionNotBound);
        let r = FunctionRead::<i64>::new("GetValue");
        assert_eq!(r.execute(), Err(ExecutionResult::FunctionNotBound));
    }

    #[test]
    fn bind_fails_on_none_and_on_shape_mismatch() {
        let f = FunctionWrite::<i64>::new("GetValue");
        assert!(!f.slot().bind(None));
        assert!(!f.slot().bind(Some(inline_read(3))));
        assert!(!f.is_bound());

        let r = FunctionRead::<i64>::new("GetValue");
        assert!(r.slot().bind(Some(inline_read(3))));
        assert_eq!(r.execute(), Ok(3));

        r.slot().unbind();
        assert_eq!(r.execute(), Err(ExecutionResult::FunctionNotBound));
    }

    #[test]
    fn read_with_wrong_response_type_is_refused() {
        let r = FunctionRead::<String>::new("GetValue");
        assert!(r.slot().bind(Some(inline_read(3))));
        assert_eq!(r.execute(), Err(ExecutionResult::InvalidOutputType));
    }

    #[test]
    fn write_with_wrong_argument_type_never_runs() {
        let total = Arc::new(AtomicI64::new(0));
        let sink = total.clone();
        let command = Command::inline(
            "Add",
            CommandKind::Write,
            Some(PayloadType::of::<i64>()),
            None,
            Arc::new(move |argument: Option<&dyn Any>| {
                if let Some(v) = argument.and_then(|a| a.downcast_ref::<i64>()) {
                    sink.fetch_add(*v, Ordering::SeqCst);
                }
                None
            }),
        );

        let good = FunctionWrite::<i64>::new("Add");
        let bad = FunctionWrite::<i32>::new("Add");
        assert!(good.slot().bind(Some(command.clone())));
        assert!(bad.slot().bind(Some(command)));

        assert_eq!(good.execute(&4), ExecutionResult::CommandSucceeded);
        assert_eq!(bad.execute(&4), ExecutionResult::InvalidInputType);
        assert_eq!(total.load(Ordering::SeqCst), 4);
    }
}
