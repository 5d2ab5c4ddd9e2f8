//! Channels for communicating between tasks.
//!
//! A [`Channel`] hands values from senders to receivers in the order the
//! sends were accepted. Its [`Capacity`] decides when `send` suspends:
//! - [`Capacity::Rendezvous`] never buffers; a send waits until a receiver
//!   takes the value,
//! - [`Capacity::Buffered`] accepts up to `n` values before sends wait,
//! - [`Capacity::Unbounded`] always accepts; sends never wait.
//!
//! `recv` waits while the channel is empty. Once the channel is closed,
//! buffered values can still be received; after that `recv` fails with
//! [`Error::ChannelClosed`](crate::Error::ChannelClosed).
//!
//! ## Design notes
//!
//! - Channels are single-threaded (`Rc`-based) and cheap to clone; every
//!   clone refers to the same channel.
//! - Waiting senders and receivers are queued FIFO. A value is handed to a
//!   waiting receiver in one step, so it is never observable in flight.
//! - `send` and `recv` are suspension points: they fail with
//!   [`Error::Cancelled`](crate::Error::Cancelled) once the current task is
//!   cancelled, and a cancelled waiter leaves its queue.

mod future;

pub use future::{RecvFuture, SendFuture};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::task::Waker;

use tracing::debug;

/// How many values a channel holds before `send` suspends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// No buffer: each send waits for a receiver.
    Rendezvous,
    /// Up to `n` buffered values, `n >= 1`.
    Buffered(usize),
    /// No limit: sends never wait.
    Unbounded,
}

/// Error returned by [`Channel::try_send`]. Gives the value back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrySendError<T> {
    /// No receiver is waiting and the buffer is full.
    #[error("channel is full")]
    Full(T),

    /// The channel is closed.
    #[error("channel is closed")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) | TrySendError::Closed(value) => value,
        }
    }
}

/// Error returned by [`Channel::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    /// Nothing is buffered and no sender is waiting.
    #[error("channel is empty")]
    Empty,

    /// The channel is closed and drained.
    #[error("channel is closed")]
    Closed,
}

/// Progress of a queued send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Waiting,
    /// The value was handed over.
    Done,
    Closed,
}

/// A waiting sender or receiver.
///
/// For a sender `value` holds the value to deliver; for a receiver it is
/// filled in place by the hand-off.
struct Slot<T> {
    status: Status,
    value: Option<T>,
    waker: Option<Waker>,
}

type SlotRef<T> = Rc<RefCell<Slot<T>>>;

impl<T> Slot<T> {
    fn waiting(value: Option<T>, waker: Waker) -> SlotRef<T> {
        Rc::new(RefCell::new(Slot {
            status: Status::Waiting,
            value,
            waker: Some(waker),
        }))
    }

    /// Replaces the stored waker unless it would wake the same task.
    fn refresh_waker(&mut self, waker: &Waker) {
        match &self.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => self.waker = Some(waker.clone()),
        }
    }

    fn finish(&mut self, status: Status) {
        self.status = status;
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

struct Inner<T> {
    capacity: Capacity,
    buffer: VecDeque<T>,

    /// Senders waiting for room or for a receiver, oldest first.
    senders: VecDeque<SlotRef<T>>,

    /// Receivers waiting for a value, oldest first.
    receivers: VecDeque<SlotRef<T>>,

    closed: bool,
}

impl<T> Inner<T> {
    fn has_room(&self) -> bool {
        match self.capacity {
            Capacity::Rendezvous => false,
            Capacity::Buffered(n) => self.buffer.len() < n,
            Capacity::Unbounded => true,
        }
    }

    /// Accepts `value` without waiting: hands it to the oldest waiting
    /// receiver, or buffers it if there is room.
    fn offer(&mut self, value: T) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(value));
        }

        if let Some(receiver) = self.receivers.pop_front() {
            let mut receiver = receiver.borrow_mut();
            receiver.value = Some(value);
            receiver.finish(Status::Done);
            return Ok(());
        }

        if self.has_room() {
            self.buffer.push_back(value);
            return Ok(());
        }

        Err(TrySendError::Full(value))
    }

    /// Takes the value of the oldest waiting sender and resumes it.
    fn pop_sender(&mut self) -> Option<T> {
        while let Some(sender) = self.senders.pop_front() {
            let mut sender = sender.borrow_mut();
            if let Some(value) = sender.value.take() {
                sender.finish(Status::Done);
                return Some(value);
            }
        }
        None
    }

    /// Takes the oldest value without waiting.
    ///
    /// A buffered value frees a slot, which the oldest waiting sender fills
    /// right away.
    fn take(&mut self) -> Result<T, TryRecvError> {
        if let Some(value) = self.buffer.pop_front() {
            if let Some(refill) = self.pop_sender() {
                self.buffer.push_back(refill);
            }
            return Ok(value);
        }

        if let Some(value) = self.pop_sender() {
            return Ok(value);
        }

        if self.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Gives back a value whose receiver went away before observing it.
    ///
    /// Returns the value if nobody can take it.
    fn redeliver(&mut self, value: T) -> Option<T> {
        if let Some(receiver) = self.receivers.pop_front() {
            let mut receiver = receiver.borrow_mut();
            receiver.value = Some(value);
            receiver.finish(Status::Done);
            return None;
        }

        if self.has_room() {
            self.buffer.push_front(value);
            return None;
        }

        Some(value)
    }

    fn remove(queue: &mut VecDeque<SlotRef<T>>, slot: &SlotRef<T>) {
        queue.retain(|queued| !Rc::ptr_eq(queued, slot));
    }

    fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;

        let receivers = self.receivers.len();
        let senders = self.senders.len();

        for receiver in self.receivers.drain(..) {
            receiver.borrow_mut().finish(Status::Closed);
        }
        for sender in self.senders.drain(..) {
            sender.borrow_mut().finish(Status::Closed);
        }

        debug!(receivers, senders, "channel closed");
        true
    }
}

/// A FIFO channel between tasks.
///
/// Cloning a `Channel` yields another handle to the same channel; the
/// channel is freed once every handle (and every pending operation) is
/// dropped.
///
/// # Examples
///
/// ```rust,ignore
/// let channel = Channel::new(Capacity::Buffered(4));
///
/// let sender = channel.clone();
/// strand::spawn(async move {
///     for x in 1..=5 {
///         sender.send(x * x).await?;
///     }
///     sender.close();
///     Ok(())
/// });
///
/// while let Ok(value) = channel.recv().await {
///     println!("{value}");
/// }
/// ```
pub struct Channel<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Channel<T> {
    /// Creates a channel with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics on `Capacity::Buffered(0)`; use `Capacity::Rendezvous`.
    pub fn new(capacity: Capacity) -> Self {
        assert!(
            capacity != Capacity::Buffered(0),
            "a buffered channel needs room for at least one value"
        );

        Self {
            inner: Rc::new(RefCell::new(Inner {
                capacity,
                buffer: VecDeque::new(),
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Creates a channel without a buffer.
    pub fn rendezvous() -> Self {
        Self::new(Capacity::Rendezvous)
    }

    /// Creates a channel buffering up to `n` values.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn buffered(n: usize) -> Self {
        Self::new(Capacity::Buffered(n))
    }

    /// Creates a channel whose sends never wait.
    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded)
    }

    /// Sends `value`, waiting for room or for a receiver if needed.
    ///
    /// Resolves to [`Error::ChannelClosed`](crate::Error::ChannelClosed)
    /// if the channel is closed before the value is taken; the value is
    /// dropped in that case.
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        SendFuture::new(self, value)
    }

    /// Receives the oldest value, waiting while the channel is empty.
    ///
    /// Resolves to [`Error::ChannelClosed`](crate::Error::ChannelClosed)
    /// once the channel is closed and drained.
    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture::new(self)
    }

    /// Sends `value` if that is possible without waiting.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.inner.borrow_mut().offer(value)
    }

    /// Receives a value if one is available without waiting.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.inner.borrow_mut().take()
    }

    /// Closes the channel.
    ///
    /// Waiting receivers resume with `ChannelClosed`, waiting senders fail
    /// and their values are dropped. Values already buffered can still be
    /// received. Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        self.inner.borrow_mut().close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().buffer.is_empty()
    }

    pub fn capacity(&self) -> Capacity {
        self.inner.borrow().capacity
    }

    /// Number of senders suspended in `send`.
    pub fn pending_senders(&self) -> usize {
        self.inner.borrow().senders.len()
    }

    /// Number of receivers suspended in `recv`.
    pub fn pending_receivers(&self) -> usize {
        self.inner.borrow().receivers.len()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();

        f.debug_struct("Channel")
            .field("capacity", &inner.capacity)
            .field("len", &inner.buffer.len())
            .field("senders", &inner.senders.len())
            .field("receivers", &inner.receivers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;
    use std::pin::pin;
    use std::task::{Context, Poll};

    fn poll_once<F: Future>(future: std::pin::Pin<&mut F>) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        future.poll(&mut cx)
    }

    #[test]
    fn buffered_accepts_up_to_capacity() {
        let channel = Channel::buffered(2);

        assert_eq!(channel.try_send("a"), Ok(()));
        assert_eq!(channel.try_send("b"), Ok(()));
        assert_eq!(channel.try_send("c"), Err(TrySendError::Full("c")));
        assert_eq!(channel.len(), 2);

        assert_eq!(channel.try_recv(), Ok("a"));
        assert_eq!(channel.try_recv(), Ok("b"));
        assert_eq!(channel.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn rendezvous_never_buffers() {
        let channel = Channel::rendezvous();

        assert_eq!(channel.try_send(1), Err(TrySendError::Full(1)));
        assert!(channel.is_empty());
    }

    #[test]
    fn waiting_sender_refills_freed_slot() {
        let channel = Channel::buffered(1);
        channel.try_send(1).unwrap();

        let mut send = pin!(channel.send(2));
        assert!(poll_once(send.as_mut()).is_pending());
        assert_eq!(channel.pending_senders(), 1);

        assert_eq!(channel.try_recv(), Ok(1));
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.pending_senders(), 0);
        assert!(matches!(poll_once(send.as_mut()), Poll::Ready(Ok(()))));

        assert_eq!(channel.try_recv(), Ok(2));
    }

    #[test]
    fn send_hands_off_to_waiting_receiver() {
        let channel = Channel::rendezvous();

        let mut recv = pin!(channel.recv());
        assert!(poll_once(recv.as_mut()).is_pending());
        assert_eq!(channel.pending_receivers(), 1);

        assert_eq!(channel.try_send(7), Ok(()));
        assert_eq!(channel.pending_receivers(), 0);
        assert!(matches!(poll_once(recv.as_mut()), Poll::Ready(Ok(7))));
    }

    #[test]
    fn dropped_sender_leaves_the_queue() {
        let channel = Channel::rendezvous();

        {
            let mut send = pin!(channel.send("lost"));
            assert!(poll_once(send.as_mut()).is_pending());
            assert_eq!(channel.pending_senders(), 1);
        }

        assert_eq!(channel.pending_senders(), 0);
        assert_eq!(channel.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn dropped_receiver_passes_value_on() {
        let channel = Channel::rendezvous();

        let mut first = Box::pin(channel.recv());
        let mut second = pin!(channel.recv());
        assert!(poll_once(first.as_mut()).is_pending());
        assert!(poll_once(second.as_mut()).is_pending());

        channel.try_send(5).unwrap();
        drop(first);

        assert!(matches!(poll_once(second.as_mut()), Poll::Ready(Ok(5))));
    }

    #[test]
    fn close_wakes_waiters_and_keeps_buffer() {
        let channel = Channel::buffered(1);
        channel.try_send(1).unwrap();

        let mut send = pin!(channel.send(2));
        assert!(poll_once(send.as_mut()).is_pending());

        assert!(channel.close());
        assert!(!channel.close());
        assert!(matches!(
            poll_once(send.as_mut()),
            Poll::Ready(Err(crate::Error::ChannelClosed))
        ));

        assert_eq!(channel.try_send(3), Err(TrySendError::Closed(3)));
        assert_eq!(channel.try_recv(), Ok(1));
        assert_eq!(channel.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    #[should_panic(expected = "at least one value")]
    fn zero_buffer_is_rejected() {
        let _ = Channel::<u8>::buffered(0);
    }
}
