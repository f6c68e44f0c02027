use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity ring storage shared by the two ends of a queue.
///
/// `head` and `tail` run over `0..2 * capacity` so that a full ring and an
/// empty ring can be told apart without wasting a slot.
struct Ring<T> {
    head: CachePadded<AtomicUsize>, // Producer writes here
    tail: CachePadded<AtomicUsize>, // Consumer reads here
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Items are moved between threads. A `&T` is only handed out through
// `&mut` handles, so a shared ring never exposes an item to two threads.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn next(&self, counter: usize) -> usize {
        let next = counter + 1;
        if next == 2 * self.capacity() {
            0
        } else {
            next
        }
    }

    #[inline]
    fn slot(&self, counter: usize) -> &UnsafeCell<MaybeUninit<T>> {
        let cap = self.capacity();
        &self.slots[if counter >= cap { counter - cap } else { counter }]
    }

    #[inline]
    fn distance(&self, head: usize, tail: usize) -> usize {
        let span = 2 * self.capacity();
        (head + span - tail) % span.max(1)
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        self.distance(head, tail)
    }

    /// # Safety
    /// Only one thread may act as producer at a time.
    unsafe fn push(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if self.distance(head, tail) >= self.capacity() {
            return Err(item);
        }
        (*self.slot(head).get()).write(item);
        self.head.store(self.next(head), Ordering::Release);
        Ok(())
    }

    /// # Safety
    /// Only one thread may act as consumer at a time.
    unsafe fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let item = (*self.slot(tail).get()).assume_init_read();
        self.tail.store(self.next(tail), Ordering::Release);
        Some(item)
    }

    /// # Safety
    /// Only the consumer may peek; the returned reference is invalidated by `pop`.
    unsafe fn peek(&self) -> Option<&T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        Some((*self.slot(tail).get()).assume_init_ref())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Exclusive access: both ends are gone.
        while unsafe { self.pop() }.is_some() {}
    }
}

/// Bounded single-producer/single-consumer ring buffer.
///
/// `put` never blocks and never grows the buffer: when the queue is full the
/// item is handed back to the caller, who decides whether to drop, retry or
/// propagate. Owned as a whole it can be used from one thread, or
/// [`split`](Queue::split) into a [`Producer`] and a [`Consumer`] that may live
/// on different threads.
pub struct Queue<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Ring::with_capacity(capacity)),
        }
    }

    /// Append an item; returns it back if the queue is full
    pub fn put(&mut self, item: T) -> Result<(), T> {
        // &mut self: this handle is both producer and consumer.
        unsafe { self.ring.push(item) }
    }

    /// Remove the oldest item
    pub fn get(&mut self) -> Option<T> {
        unsafe { self.ring.pop() }
    }

    /// Look at the oldest item without removing it
    pub fn peek(&mut self) -> Option<&T> {
        unsafe { self.ring.peek() }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Change the capacity. Every queued item is discarded.
    pub fn set_size(&mut self, capacity: usize) {
        if !self.is_empty() {
            log::debug!(
                "Queue resized from {} to {}, discarding {} queued item(s)",
                self.capacity(),
                capacity,
                self.len()
            );
        }
        self.ring = Arc::new(Ring::with_capacity(capacity));
    }

    /// Split into the two ends so producer and consumer can run on different threads
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        (
            Producer {
                ring: self.ring.clone(),
            },
            Consumer { ring: self.ring },
        )
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Writing end of a split [`Queue`]
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Producer<T> {
    /// Append an item; returns it back if the queue is full
    pub fn put(&mut self, item: T) -> Result<(), T> {
        unsafe { self.ring.push(item) }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.ring.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading end of a split [`Queue`]
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Consumer<T> {
    /// Remove the oldest item
    pub fn get(&mut self) -> Option<T> {
        unsafe { self.ring.pop() }
    }

    /// Look at the oldest item without removing it
    pub fn peek(&mut self) -> Option<&T> {
        unsafe { self.ring.peek() }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
