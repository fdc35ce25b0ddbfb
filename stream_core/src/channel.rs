//! Ordered hand-off of text segments from a producer to a consumer.
//!
//! One [`SegmentSender`], one [`SegmentReceiver`]. Segments come out in the
//! order they went in. The receiver ends once the sender is closed and
//! every buffered segment has been taken.
//!
//! `push` never waits. `send` waits while `capacity` segments sent through it
//! are still buffered, which gives a producer backpressure when it wants it.

use std::{
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Lifecycle of a channel. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing pushed yet.
    Open,
    /// At least one segment pushed, not closed.
    Accepting,
    /// Closed; the receiver may still hold buffered segments.
    Closed,
    /// Closed and fully drained.
    Done,
}

struct Item {
    segment: String,
    // released when the receiver takes the segment
    _permit: Option<OwnedSemaphorePermit>,
}

struct Inner {
    tx: Option<mpsc::UnboundedSender<Item>>,
    pushed: usize,
    taken: usize,
    closes: usize,
    state: ChannelState,
}

struct Shared {
    inner: Mutex<Inner>,
    permits: Arc<Semaphore>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // the guarded data stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Open a fresh channel. `capacity` bounds only [`SegmentSender::send`].
pub fn open(capacity: usize) -> (SegmentSender, SegmentReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            tx: Some(tx),
            pushed: 0,
            taken: 0,
            closes: 0,
            state: ChannelState::Open,
        }),
        permits: Arc::new(Semaphore::new(capacity.max(1))),
    });
    (
        SegmentSender {
            shared: Arc::clone(&shared),
        },
        SegmentReceiver {
            rx,
            shared,
            received: 0,
        },
    )
}

/// Producer half. Dropping it closes the channel.
pub struct SegmentSender {
    shared: Arc<Shared>,
}

impl SegmentSender {
    /// Append a segment without waiting.
    ///
    /// Returns `false`, and does nothing else, if the channel is closed or the
    /// receiver is gone.
    pub fn push(&self, segment: impl Into<String>) -> bool {
        self.enqueue(segment.into(), None)
    }

    /// Append a segment, waiting for buffer space first.
    pub async fn send(&self, segment: impl Into<String>) -> bool {
        if self.is_closed() {
            debug!("send after close ignored");
            return false;
        }
        let permit = match Arc::clone(&self.shared.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("receiver dropped; segment discarded");
                return false;
            }
        };
        self.enqueue(segment.into(), Some(permit))
    }

    fn enqueue(&self, segment: String, permit: Option<OwnedSemaphorePermit>) -> bool {
        let mut inner = self.shared.lock();
        let Some(tx) = inner.tx.as_ref() else {
            debug!("push after close ignored");
            return false;
        };
        if tx
            .send(Item {
                segment,
                _permit: permit,
            })
            .is_err()
        {
            debug!("receiver dropped; segment discarded");
            return false;
        }
        inner.pushed += 1;
        if inner.state == ChannelState::Open {
            inner.state = ChannelState::Accepting;
        }
        true
    }

    /// Signal that no more segments will arrive.
    ///
    /// Returns `true` only for the call that actually closed the channel.
    pub fn close(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.tx.take().is_none() {
            return false;
        }
        inner.closes += 1;
        if inner.state != ChannelState::Done {
            inner.state = ChannelState::Closed;
        }
        debug!(pushed = inner.pushed, "segment channel closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().tx.is_none()
    }

    /// Segments accepted so far.
    pub fn pushed(&self) -> usize {
        self.shared.lock().pushed
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    /// A read-only view of this channel that outlives both halves.
    pub fn watch(&self) -> ChannelWatch {
        ChannelWatch {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for SegmentSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SegmentSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("SegmentSender")
            .field("state", &inner.state)
            .field("pushed", &inner.pushed)
            .finish()
    }
}

/// Observes a channel's lifecycle without taking part in it.
#[derive(Clone)]
pub struct ChannelWatch {
    shared: Arc<Shared>,
}

impl ChannelWatch {
    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    pub fn pushed(&self) -> usize {
        self.shared.lock().pushed
    }

    /// Times the channel was closed. Never more than one.
    pub fn closes(&self) -> usize {
        self.shared.lock().closes
    }

    /// Segments handed to the channel but not yet taken by the receiver.
    pub fn backlog(&self) -> usize {
        let inner = self.shared.lock();
        inner.pushed.saturating_sub(inner.taken)
    }
}

impl std::fmt::Debug for ChannelWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWatch")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Consumer half; a [`Stream`] of segments in push order.
pub struct SegmentReceiver {
    rx: mpsc::UnboundedReceiver<Item>,
    shared: Arc<Shared>,
    received: usize,
}

impl SegmentReceiver {
    /// Next segment, or `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<String> {
        futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Segments taken so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }
}

impl Stream for SegmentReceiver {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                self.received += 1;
                self.shared.lock().taken += 1;
                Poll::Ready(Some(item.segment))
            }
            Poll::Ready(None) => {
                self.shared.lock().state = ChannelState::Done;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SegmentReceiver {
    fn drop(&mut self) {
        // wake senders blocked in `send`
        self.shared.permits.close();
    }
}

impl std::fmt::Debug for SegmentReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReceiver")
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}
