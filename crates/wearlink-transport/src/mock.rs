use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::NotifyTransport;

/// In-memory board harness used by workspace tests and examples.
///
/// Scripted behavior: canned response frames keyed by a command prefix
/// are delivered as notifications when a matching command is written.
/// Tests drive the board side through the paired [`BoardHandle`].
pub struct MockBoard {
    state: Arc<Mutex<BoardState>>,
    notifications: Option<Receiver<Bytes>>,
}

/// Test-side control handle for a [`MockBoard`].
#[derive(Clone)]
pub struct BoardHandle {
    state: Arc<Mutex<BoardState>>,
}

struct BoardState {
    connected: bool,
    drop_writes: bool,
    written: Vec<Bytes>,
    replies: Vec<(Vec<u8>, VecDeque<Bytes>)>,
    notify: Option<Sender<Bytes>>,
}

impl MockBoard {
    /// Create a disconnected board plus its control handle.
    pub fn new() -> (Self, BoardHandle) {
        let state = Arc::new(Mutex::new(BoardState {
            connected: false,
            drop_writes: false,
            written: Vec::new(),
            replies: Vec::new(),
            notify: None,
        }));
        let board = Self {
            state: Arc::clone(&state),
            notifications: None,
        };
        (board, BoardHandle { state })
    }
}

impl NotifyTransport for MockBoard {
    fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("board state poisoned");
        if state.connected {
            return Err(TransportError::AlreadyConnected);
        }
        let (tx, rx) = channel();
        state.connected = true;
        state.notify = Some(tx);
        self.notifications = Some(rx);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("board state poisoned");
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.connected = false;
        // Dropping the sender ends the notification stream.
        state.notify = None;
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("board state poisoned");
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.written.push(Bytes::copy_from_slice(frame));
        if state.drop_writes {
            trace!(len = frame.len(), "mock board dropping write");
            return Ok(());
        }

        let mut response = None;
        for (prefix, queue) in &mut state.replies {
            if frame.starts_with(prefix) {
                response = queue.pop_front();
                break;
            }
        }
        if let Some(frame) = response {
            if let Some(notify) = &state.notify {
                let _ = notify.send(frame);
            }
        }
        Ok(())
    }

    fn take_notifications(&mut self) -> Result<Receiver<Bytes>> {
        if !self.state.lock().expect("board state poisoned").connected {
            return Err(TransportError::NotConnected);
        }
        self.notifications
            .take()
            .ok_or(TransportError::NotificationsTaken)
    }
}

impl BoardHandle {
    /// Queue a canned response frame for commands starting with `prefix`.
    ///
    /// Responses for the same prefix are consumed in FIFO order, one per
    /// matching write.
    pub fn reply_to(&self, prefix: &[u8], response: &[u8]) {
        let mut state = self.state.lock().expect("board state poisoned");
        let response = Bytes::copy_from_slice(response);
        for (existing, queue) in &mut state.replies {
            if existing == prefix {
                queue.push_back(response);
                return;
            }
        }
        let mut queue = VecDeque::new();
        queue.push_back(response);
        state.replies.push((prefix.to_vec(), queue));
    }

    /// Push an unsolicited notification frame to the host.
    pub fn inject(&self, frame: &[u8]) {
        let state = self.state.lock().expect("board state poisoned");
        if let Some(notify) = &state.notify {
            let _ = notify.send(Bytes::copy_from_slice(frame));
        }
    }

    /// All command frames written so far, in order.
    pub fn written(&self) -> Vec<Bytes> {
        self.state
            .lock()
            .expect("board state poisoned")
            .written
            .clone()
    }

    /// Number of command frames written so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().expect("board state poisoned").written.len()
    }

    /// Silently swallow subsequent writes (no canned responses fire).
    pub fn set_drop_writes(&self, drop: bool) {
        self.state.lock().expect("board state poisoned").drop_writes = drop;
    }

    /// Whether the host side is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().expect("board state poisoned").connected
    }

    /// Simulate a link loss initiated by the board side.
    pub fn drop_link(&self) {
        let mut state = self.state.lock().expect("board state poisoned");
        state.connected = false;
        state.notify = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_connection() {
        let (mut board, _handle) = MockBoard::new();
        let err = board.write(&[0x01]).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[test]
    fn canned_reply_arrives_as_notification() {
        let (mut board, handle) = MockBoard::new();
        board.connect().unwrap();
        let rx = board.take_notifications().unwrap();

        handle.reply_to(&[0x03, 0x00], &[0x03, 0x80, 0x01]);
        board.write(&[0x03, 0x00]).unwrap();

        let frame = rx.recv().unwrap();
        assert_eq!(frame.as_ref(), &[0x03, 0x80, 0x01]);
    }

    #[test]
    fn replies_consumed_in_fifo_order() {
        let (mut board, handle) = MockBoard::new();
        board.connect().unwrap();
        let rx = board.take_notifications().unwrap();

        handle.reply_to(&[0x09], &[0x09, 0x80, 0x01]);
        handle.reply_to(&[0x09], &[0x09, 0x80, 0x02]);
        board.write(&[0x09, 0x02]).unwrap();
        board.write(&[0x09, 0x02]).unwrap();

        assert_eq!(rx.recv().unwrap().as_ref(), &[0x09, 0x80, 0x01]);
        assert_eq!(rx.recv().unwrap().as_ref(), &[0x09, 0x80, 0x02]);
    }

    #[test]
    fn drop_writes_suppresses_replies() {
        let (mut board, handle) = MockBoard::new();
        board.connect().unwrap();
        let rx = board.take_notifications().unwrap();

        handle.reply_to(&[0x03], &[0x03, 0x80]);
        handle.set_drop_writes(true);
        board.write(&[0x03, 0x00]).unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.write_count(), 1);
    }

    #[test]
    fn disconnect_ends_notification_stream() {
        let (mut board, handle) = MockBoard::new();
        board.connect().unwrap();
        let rx = board.take_notifications().unwrap();

        handle.inject(&[0x0b, 0x87, 0x00]);
        board.disconnect().unwrap();

        assert_eq!(rx.recv().unwrap().as_ref(), &[0x0b, 0x87, 0x00]);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn notifications_taken_only_once() {
        let (mut board, _handle) = MockBoard::new();
        board.connect().unwrap();
        let _rx = board.take_notifications().unwrap();
        let err = board.take_notifications().unwrap_err();
        assert!(matches!(err, TransportError::NotificationsTaken));
    }
}
