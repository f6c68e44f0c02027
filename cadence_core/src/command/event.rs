use super::command::{CallMode, Command};
use super::payload::PayloadType;
use super::result::ExecutionResult;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Emitter side of a void event declared on a provided interface
#[derive(Clone)]
pub struct EventVoid {
    multicast: Arc<Command>,
}

impl EventVoid {
    pub fn new(name: &str) -> Self {
        Self {
            multicast: Command::multicast(name, None),
        }
    }

    /// Deliver to every connected handler without waiting for any of them
    pub fn fire(&self) -> ExecutionResult {
        self.multicast.execute(None, CallMode::NonBlocking).result
    }

    pub fn name(&self) -> &str {
        self.multicast.name()
    }

    pub fn listener_count(&self) -> usize {
        self.multicast.listener_count()
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.multicast
    }
}

impl fmt::Debug for EventVoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventVoid")
            .field("name", &self.name())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Emitter side of an event carrying a payload
pub struct EventWrite<T> {
    multicast: Arc<Command>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> EventWrite<T> {
    pub fn new(name: &str) -> Self {
        Self {
            multicast: Command::multicast(name, Some(PayloadType::of::<T>())),
            _marker: PhantomData,
        }
    }

    /// Deliver `payload` to every connected handler without waiting for any of them
    pub fn fire(&self, payload: &T) -> ExecutionResult {
        self.multicast
            .execute(Some(payload as &dyn Any), CallMode::NonBlocking)
            .result
    }
}

impl<T> EventWrite<T> {
    pub fn name(&self) -> &str {
        self.multicast.name()
    }

    pub fn listener_count(&self) -> usize {
        self.multicast.listener_count()
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.multicast
    }
}

impl<T> Clone for EventWrite<T> {
    fn clone(&self) -> Self {
        Self {
            multicast: self.multicast.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EventWrite<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWrite")
            .field("name", &self.name())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
