//! Bounded queues and the command mailboxes built on them

pub mod mailbox;
pub mod queue;

pub use mailbox::{Completion, Mailbox, MailboxEntry, MailboxSender, QueuedFn};
pub use queue::{Consumer, Producer, Queue};
