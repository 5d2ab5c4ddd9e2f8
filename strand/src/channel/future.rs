use super::{Channel, Inner, Slot, SlotRef, Status, TryRecvError, TrySendError};
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::task::SuspendReason;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tracing::debug;

/// Future returned by [`Channel::send`].
///
/// Dropping it while it waits withdraws the value from the channel.
pub struct SendFuture<'a, T> {
    channel: &'a Channel<T>,

    /// The value, until it is accepted or queued.
    value: Option<T>,

    /// Queue entry while waiting for a receiver.
    slot: Option<SlotRef<T>>,
}

impl<'a, T> SendFuture<'a, T> {
    pub(super) fn new(channel: &'a Channel<T>, value: T) -> Self {
        Self {
            channel,
            value: Some(value),
            slot: None,
        }
    }

    fn withdraw(&mut self) {
        if let Some(slot) = self.slot.take() {
            Inner::remove(&mut self.channel.inner.borrow_mut().senders, &slot);
        }
    }
}

impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<()>;

    /// A value already handed over completes the send even if the task was
    /// cancelled meanwhile; a send still waiting gives way to cancellation.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = this.slot.clone() {
            let status = slot.borrow().status;

            match status {
                Status::Done => {
                    this.slot = None;
                    return Poll::Ready(Ok(()));
                }
                Status::Closed => {
                    this.slot = None;
                    return Poll::Ready(Err(Error::ChannelClosed));
                }
                Status::Waiting if context::is_cancelled() => {
                    this.withdraw();
                    return Poll::Ready(Err(Error::Cancelled));
                }
                Status::Waiting => {
                    slot.borrow_mut().refresh_waker(cx.waker());
                    context::suspend(SuspendReason::Send);
                    return Poll::Pending;
                }
            }
        }

        if context::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        let value = this.value.take().expect("SendFuture polled after completion");
        let mut inner = this.channel.inner.borrow_mut();

        match inner.offer(value) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(TrySendError::Closed(value)) => {
                drop(inner);
                drop(value);
                Poll::Ready(Err(Error::ChannelClosed))
            }
            Err(TrySendError::Full(value)) => {
                let slot = Slot::waiting(Some(value), cx.waker().clone());
                inner.senders.push_back(slot.clone());
                this.slot = Some(slot);

                context::suspend(SuspendReason::Send);
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        let waiting = self
            .slot
            .as_ref()
            .is_some_and(|slot| slot.borrow().status == Status::Waiting);

        if waiting {
            self.withdraw();
        }
    }
}

/// Future returned by [`Channel::recv`].
///
/// Dropping it while it waits leaves the receiver queue. A value handed to
/// it but never observed is passed on to the next receiver.
pub struct RecvFuture<'a, T> {
    channel: &'a Channel<T>,

    /// Queue entry while waiting for a value.
    slot: Option<SlotRef<T>>,
}

impl<'a, T> RecvFuture<'a, T> {
    pub(super) fn new(channel: &'a Channel<T>) -> Self {
        Self {
            channel,
            slot: None,
        }
    }
}

impl<T> Unpin for RecvFuture<'_, T> {}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = this.slot.clone() {
            let (status, value) = {
                let mut slot = slot.borrow_mut();
                (slot.status, slot.value.take())
            };

            match (status, value) {
                (Status::Done, Some(value)) => {
                    this.slot = None;
                    return Poll::Ready(Ok(value));
                }
                (Status::Waiting, _) if context::is_cancelled() => {
                    this.slot = None;
                    Inner::remove(&mut this.channel.inner.borrow_mut().receivers, &slot);
                    return Poll::Ready(Err(Error::Cancelled));
                }
                (Status::Waiting, _) => {
                    slot.borrow_mut().refresh_waker(cx.waker());
                    context::suspend(SuspendReason::Receive);
                    return Poll::Pending;
                }
                _ => {
                    this.slot = None;
                    return Poll::Ready(Err(Error::ChannelClosed));
                }
            }
        }

        if context::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        let mut inner = this.channel.inner.borrow_mut();

        match inner.take() {
            Ok(value) => Poll::Ready(Ok(value)),
            Err(TryRecvError::Closed) => Poll::Ready(Err(Error::ChannelClosed)),
            Err(TryRecvError::Empty) => {
                let slot = Slot::waiting(None, cx.waker().clone());
                inner.receivers.push_back(slot.clone());
                this.slot = Some(slot);

                context::suspend(SuspendReason::Receive);
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for RecvFuture<'_, T> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };

        let (status, value) = {
            let mut slot = slot.borrow_mut();
            (slot.status, slot.value.take())
        };

        match (status, value) {
            (Status::Waiting, _) => {
                Inner::remove(&mut self.channel.inner.borrow_mut().receivers, &slot);
            }
            (Status::Done, Some(value)) => {
                let unclaimed = self.channel.inner.borrow_mut().redeliver(value);
                if unclaimed.is_some() {
                    debug!("receiver dropped with an undelivered value, discarding it");
                }
            }
            _ => {}
        }
    }
}
