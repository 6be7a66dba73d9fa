//! Bounded work queue between search workers and download workers.
//!
//! A full queue blocks producers (backpressure); every wait is bounded by a
//! timeout so callers can re-check cancellation between waits.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::shutdown::CancelToken;

/// Create a queue holding at most `capacity` items.
///
/// The receiving side reports [`PopError::Closed`] once every sender has been
/// dropped and the queue is drained.
pub fn bounded<T>(capacity: usize) -> (WorkSender<T>, WorkReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (WorkSender { tx }, WorkReceiver { rx })
}

/// Push failure; the item is handed back to the caller.
#[derive(Debug)]
pub enum PushError<T> {
    /// Cancellation observed while waiting for room
    Cancelled(T),
    /// All receivers are gone
    Closed(T),
}

/// Pop failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the timeout
    Timeout,
    /// All senders are gone and the queue is empty
    Closed,
}

/// Producer handle. Cloned once per search worker.
#[derive(Debug)]
pub struct WorkSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for WorkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> WorkSender<T> {
    /// Block until there is room, waking every `wait` to check `cancel`.
    pub fn push(&self, item: T, wait: Duration, cancel: &CancelToken) -> Result<(), PushError<T>> {
        let mut item = item;
        loop {
            if cancel.is_cancelled() {
                return Err(PushError::Cancelled(item));
            }
            match self.tx.send_timeout(item, wait) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => return Err(PushError::Closed(back)),
            }
        }
    }

    /// Non-blocking push; returns the item when the queue is full or closed.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Consumer handle. Cloned once per download worker.
#[derive(Debug)]
pub struct WorkReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for WorkReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> WorkReceiver<T> {
    /// Wait at most `wait` for the next item
    pub fn pop(&self, wait: Duration) -> Result<T, PopError> {
        self.rx.recv_timeout(wait).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Timeout,
            RecvTimeoutError::Disconnected => PopError::Closed,
        })
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
