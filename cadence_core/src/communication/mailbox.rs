use super::queue::{Consumer, Producer, Queue};
use crate::command::{CommandOutcome, ExecutionResult, Payload};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Type-erased body of a queued command.
///
/// Receives the owning component as `&mut dyn Any` and the (already
/// type-checked) argument, returns the response payload if the command shape
/// has one.
pub type QueuedFn = Arc<dyn Fn(&mut dyn Any, Option<&dyn Any>) -> Option<Payload> + Send + Sync>;

/// One-shot rendezvous used by blocking calls
pub struct Completion {
    outcome: Mutex<Option<CommandOutcome>>,
    ready: Condvar,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    /// Store the outcome and release the waiting caller
    pub fn complete(&self, outcome: CommandOutcome) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.ready.notify_all();
        }
    }

    /// Block until completed; `None` timeout waits forever
    pub fn wait(&self, timeout: Option<Duration>) -> Option<CommandOutcome> {
        let mut slot = self.outcome.lock();
        match timeout {
            None => {
                while slot.is_none() {
                    self.ready.wait(&mut slot);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while slot.is_none() {
                    if self.ready.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        slot.take()
    }
}

/// A pending command invocation with its payload
pub struct MailboxEntry {
    command: Arc<str>,
    call: QueuedFn,
    argument: Option<Payload>,
    completion: Option<Arc<Completion>>,
}

impl MailboxEntry {
    pub fn new(
        command: Arc<str>,
        call: QueuedFn,
        argument: Option<Payload>,
        completion: Option<Arc<Completion>>,
    ) -> Self {
        Self {
            command,
            call,
            argument,
            completion,
        }
    }

    pub fn command_name(&self) -> &str {
        &self.command
    }

    pub fn is_blocking(&self) -> bool {
        self.completion.is_some()
    }

    fn execute(self, target: &mut dyn Any) {
        let argument = self.argument.as_deref().map(|a| a as &dyn Any);
        let response = (self.call)(target, argument);
        if let Some(completion) = self.completion {
            completion.complete(CommandOutcome::succeeded(response));
        }
    }

    fn abandon(self, result: ExecutionResult) {
        if let Some(completion) = self.completion {
            completion.complete(CommandOutcome::failed(result));
        }
    }
}

impl fmt::Debug for MailboxEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxEntry")
            .field("command", &self.command)
            .field("blocking", &self.is_blocking())
            .finish_non_exhaustive()
    }
}

type NotifyFn = Box<dyn Fn() + Send + Sync>;
type PostDequeueFn = Box<dyn FnMut(&str) + Send>;

struct MailboxShared {
    name: String,
    capacity: usize,
    // Producers are serialized here; the ring behind it is SPSC.
    producer: Mutex<Producer<MailboxEntry>>,
    notify: OnceCell<NotifyFn>,
    owner: OnceCell<ThreadId>,
    closed: AtomicBool,
    refused: AtomicU64,
}

/// Cloneable enqueue side of a [`Mailbox`]; any number of threads may hold one
#[derive(Clone)]
pub struct MailboxSender {
    shared: Arc<MailboxShared>,
}

impl MailboxSender {
    /// Enqueue an invocation. A full or closed mailbox hands the entry back.
    pub fn put(&self, entry: MailboxEntry) -> Result<(), MailboxEntry> {
        {
            let mut producer = self.shared.producer.lock();
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(entry);
            }
            if let Err(entry) = producer.put(entry) {
                self.shared.refused.fetch_add(1, Ordering::Relaxed);
                log::trace!(
                    "Mailbox '{}' full ({} entries), refused '{}'",
                    self.shared.name,
                    self.shared.capacity,
                    entry.command_name()
                );
                return Err(entry);
            }
        }
        if let Some(notify) = self.shared.notify.get() {
            notify();
        }
        Ok(())
    }

    /// Install the wake-up callback fired after every successful `put`
    pub fn set_notify<F>(&self, notify: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.notify.set(Box::new(notify)).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.producer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of entries refused because the mailbox was full
    pub fn refused(&self) -> u64 {
        self.shared.refused.load(Ordering::Relaxed)
    }

    /// True when called from the thread that drains this mailbox
    pub fn is_owner_thread(&self) -> bool {
        self.shared
            .owner
            .get()
            .is_some_and(|owner| *owner == std::thread::current().id())
    }
}

impl fmt::Debug for MailboxSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}

/// Bounded queue of pending command invocations, drained by its owning task.
///
/// Only the holder of the `Mailbox` executes entries; producers go through
/// [`MailboxSender`] handles.
pub struct Mailbox {
    shared: Arc<MailboxShared>,
    consumer: Consumer<MailboxEntry>,
    post_dequeue: Option<PostDequeueFn>,
    executed: u64,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (producer, consumer) = Queue::new(capacity).split();
        Self {
            shared: Arc::new(MailboxShared {
                name: name.into(),
                capacity,
                producer: Mutex::new(producer),
                notify: OnceCell::new(),
                owner: OnceCell::new(),
                closed: AtomicBool::new(false),
                refused: AtomicU64::new(0),
            }),
            consumer,
            post_dequeue: None,
            executed: 0,
        }
    }

    pub fn sender(&self) -> MailboxSender {
        MailboxSender {
            shared: self.shared.clone(),
        }
    }

    /// Callback fired after each dequeued command finished executing
    pub fn set_post_dequeue<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.post_dequeue = Some(Box::new(callback));
    }

    /// Record the calling thread as the execution thread of this mailbox
    pub fn bind_to_current_thread(&self) {
        let current = std::thread::current().id();
        if let Err(previous) = self.shared.owner.set(current) {
            if previous != current {
                log::warn!(
                    "Mailbox '{}' already bound to another thread",
                    self.shared.name
                );
            }
        }
    }

    /// Execute the oldest entry; false if the mailbox was empty
    pub fn execute_next(&mut self, target: &mut dyn Any) -> bool {
        let Some(entry) = self.consumer.get() else {
            return false;
        };
        let name = entry.command.clone();
        entry.execute(target);
        self.executed += 1;
        if let Some(callback) = self.post_dequeue.as_mut() {
            callback(&name);
        }
        true
    }

    /// Execute the entries queued at call time, in FIFO order
    pub fn execute_all(&mut self, target: &mut dyn Any) -> usize {
        let pending = self.consumer.len();
        let mut count = 0;
        while count < pending && self.execute_next(target) {
            count += 1;
        }
        count
    }

    /// Refuse further entries and fail the pending ones with `result`
    pub fn close(&mut self, result: ExecutionResult) -> usize {
        {
            let _producer = self.shared.producer.lock();
            self.shared.closed.store(true, Ordering::Release);
        }
        let mut abandoned = 0;
        while let Some(entry) = self.consumer.get() {
            entry.abandon(result);
            abandoned += 1;
        }
        if abandoned > 0 {
            log::debug!(
                "Mailbox '{}' closed with {} pending entr(ies)",
                self.shared.name,
                abandoned
            );
        }
        abandoned
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Name of the oldest pending command
    pub fn peek(&mut self) -> Option<&str> {
        self.consumer.peek().map(|entry| entry.command_name())
    }

    /// Total number of entries executed so far
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.shared.name)
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}
