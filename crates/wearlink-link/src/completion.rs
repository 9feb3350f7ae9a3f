use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::{LinkError, Result};

/// Single-consumer handle for the eventual outcome of an asynchronous
/// operation. Resolved exactly once by the link; waitable from any
/// thread.
pub struct Completion<T> {
    rx: Receiver<Result<T>>,
}

pub(crate) struct CompletionSender<T> {
    tx: Sender<Result<T>>,
}

pub(crate) fn completion_pair<T>() -> (CompletionSender<T>, Completion<T>) {
    let (tx, rx) = channel();
    (CompletionSender { tx }, Completion { rx })
}

impl<T> Completion<T> {
    /// Block until the operation resolves.
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            // Sender dropped without resolving; only happens on teardown.
            Err(_) => Err(LinkError::Disconnected),
        }
    }

    /// Block until the operation resolves or `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Disconnected),
        }
    }

    /// Non-blocking poll. `None` while still outstanding.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(std::sync::mpsc::TryRecvError::Empty) => None,
            Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                Some(Err(LinkError::Disconnected))
            }
        }
    }
}

impl<T> CompletionSender<T> {
    /// Resolve the completion. The waiter may already be gone; that is
    /// not an error.
    pub(crate) fn resolve(self, outcome: Result<T>) {
        let _ = self.tx.send(outcome);
    }
}
