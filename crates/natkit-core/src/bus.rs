//! The Bus: a single-consumer, many-producer, order-preserving-per-producer
//! queue. It is the only synchronization primitive exchanged between
//! threads anywhere in natkit — a gateway's internal state is touched only
//! by the gateway's own thread, and every other thread (callers, worker
//! threads) reaches it exclusively by enqueuing an immutable message here.
//!
//! `send` never blocks and never fails while at least one receiver handle
//! is alive; there is no peek, no cancel, and no visible close on the
//! producer side. Shutdown is an in-band message (`Kill`), not a bus
//! operation.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// The producer handle for a bus. Cheap to clone; every clone preserves
/// FIFO order relative to sends from that same clone, but sends from two
/// different clones may interleave arbitrarily.
#[derive(Debug)]
pub struct Bus<T> {
    tx: Sender<T>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// A send failed only because every receiver has already been dropped —
/// the gateway that owned the other end is gone. Callers that observe this
/// treat it the same as having already received a terminal event for every
/// id they were tracking.
#[derive(Debug, thiserror::Error)]
#[error("bus receiver has been dropped; the owning gateway has shut down")]
pub struct Disconnected;

impl<T> Bus<T> {
    /// Enqueue `message` for the single consumer of this bus. Never blocks.
    /// Fails only if the consumer side has been dropped entirely.
    pub fn send(&self, message: T) -> Result<(), Disconnected> {
        self.tx.send(message).map_err(|_| Disconnected)
    }
}

/// The single-consumer half. Owned by exactly one gateway thread; never
/// cloned, never shared.
pub struct Inbox<T> {
    rx: Receiver<T>,
}

impl<T> Inbox<T> {
    /// Block until a message is available or every producer has dropped
    /// its [`Bus`] handle.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Block up to `timeout` for a message; used by reactors that must also
    /// service a selector on the same thread.
    pub fn recv_timeout(&self, timeout: Duration) -> RecvOutcome<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => RecvOutcome::Message(message),
            Err(RecvTimeoutError::Timeout) => RecvOutcome::Timeout,
            Err(RecvTimeoutError::Disconnected) => RecvOutcome::Disconnected,
        }
    }

    /// Drain every message currently queued without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        })
    }
}

pub enum RecvOutcome<T> {
    Message(T),
    Timeout,
    Disconnected,
}

/// Create a fresh bus: the returned [`Bus`] is the producer handle callers
/// clone and hand out; the [`Inbox`] is kept by the single consumer.
pub fn channel<T>() -> (Bus<T>, Inbox<T>) {
    let (tx, rx) = mpsc::channel();
    (Bus { tx }, Inbox { rx })
}
