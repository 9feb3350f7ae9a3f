use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};
use wearlink_transport::NotifyTransport;
use wearlink_wire::Command;

use crate::completion::{completion_pair, Completion, CompletionSender};
use crate::error::{LinkError, Result};

/// Consumer of inbound frames that match no outstanding request.
pub trait NotificationSink: Send {
    fn on_frame(&mut self, frame: Bytes);

    /// Called once when the link drops, after all pending requests have
    /// been failed.
    fn on_disconnect(&mut self) {}
}

/// Configuration for the correlated link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Default deadline for requests expecting a response.
    pub response_timeout: Duration,
    /// How often the sweeper thread scans for expired requests.
    pub sweep_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(50),
        }
    }
}

struct Pending {
    seq: u64,
    prefix: Vec<u8>,
    deadline: Instant,
    timeout: Duration,
    tx: CompletionSender<Bytes>,
}

struct Shared {
    pending: Mutex<Vec<Pending>>,
    sink: Mutex<Option<Box<dyn NotificationSink>>>,
    connected: AtomicBool,
}

/// Correlated command link to one board.
///
/// All inbound frames are handled serially on one dispatcher thread:
/// prefix matching against the pending table, then sink delivery for
/// unmatched frames. Outbound commands go out in issuance order.
pub struct Link {
    transport: Mutex<Box<dyn NotifyTransport>>,
    shared: Arc<Shared>,
    config: LinkConfig,
    next_seq: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    sweeper_stop: Mutex<Option<Sender<()>>>,
}

impl Link {
    /// Connect the transport and start the dispatcher and sweeper threads.
    pub fn open(mut transport: Box<dyn NotifyTransport>, config: LinkConfig) -> Result<Self> {
        transport.connect()?;
        let notifications = transport.take_notifications()?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            connected: AtomicBool::new(true),
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("wearlink-dispatch".into())
                .spawn(move || {
                    for frame in notifications.iter() {
                        shared.dispatch(frame);
                    }
                    shared.stream_ended();
                })
                .map_err(wearlink_transport::TransportError::Io)?
        };

        let (stop_tx, stop_rx) = channel();
        let sweeper = {
            let shared = Arc::clone(&shared);
            let interval = config.sweep_interval;
            std::thread::Builder::new()
                .name("wearlink-sweep".into())
                .spawn(move || loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => shared.expire(Instant::now()),
                        _ => break,
                    }
                })
                .map_err(wearlink_transport::TransportError::Io)?
        };

        Ok(Self {
            transport: Mutex::new(transport),
            shared,
            config,
            next_seq: AtomicU64::new(1),
            dispatcher: Mutex::new(Some(dispatcher)),
            sweeper: Mutex::new(Some(sweeper)),
            sweeper_stop: Mutex::new(Some(stop_tx)),
        })
    }

    /// Register the consumer for unmatched notification frames.
    pub fn set_sink(&self, sink: Box<dyn NotificationSink>) {
        *self.shared.sink.lock().expect("sink lock poisoned") = Some(sink);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Fire-and-forget command.
    pub fn send(&self, command: &Command) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        trace!(
            module = command.address.module,
            register = command.address.register,
            len = command.payload.len(),
            "sending command"
        );
        self.transport
            .lock()
            .expect("transport lock poisoned")
            .write(&command.to_bytes())?;
        Ok(())
    }

    /// Send a command expecting a response whose leading bytes match the
    /// command's response prefix.
    pub fn request(
        &self,
        command: &Command,
        timeout: Option<Duration>,
    ) -> Result<Completion<Bytes>> {
        self.request_with_prefix(command, command.response_prefix(), timeout)
    }

    /// Send a command expecting a response matched by an explicit prefix.
    pub fn request_with_prefix(
        &self,
        command: &Command,
        prefix: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Completion<Bytes>> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        let timeout = timeout.unwrap_or(self.config.response_timeout);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, completion) = completion_pair();

        // Register before writing so a fast response cannot race past the
        // pending table.
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .push(Pending {
                seq,
                prefix,
                deadline: Instant::now() + timeout,
                timeout,
                tx,
            });

        let write_result = self
            .transport
            .lock()
            .expect("transport lock poisoned")
            .write(&command.to_bytes());

        if let Err(err) = write_result {
            let mut pending = self.shared.pending.lock().expect("pending lock poisoned");
            if let Some(pos) = pending.iter().position(|p| p.seq == seq) {
                pending.remove(pos);
            }
            return Err(err.into());
        }
        Ok(completion)
    }

    /// Tear the link down. Every outstanding request resolves with
    /// [`LinkError::Disconnected`].
    pub fn disconnect(&self) -> Result<()> {
        if !self.shared.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("disconnecting link");
        // Ends the notification stream; the dispatcher fails all pending
        // entries on its way out.
        self.transport
            .lock()
            .expect("transport lock poisoned")
            .disconnect()?;
        self.join_workers();
        Ok(())
    }

    fn join_workers(&self) {
        drop(self.sweeper_stop.lock().expect("stop lock poisoned").take());
        if let Some(handle) = self
            .dispatcher
            .lock()
            .expect("dispatcher lock poisoned")
            .take()
        {
            let _ = handle.join();
        }
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        let _ = self.disconnect();
        self.join_workers();
    }
}

impl Shared {
    fn dispatch(&self, frame: Bytes) {
        let matched = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            let mut best: Option<(usize, usize)> = None;
            for (idx, entry) in pending.iter().enumerate() {
                if frame.starts_with(&entry.prefix) {
                    let len = entry.prefix.len();
                    // Longest prefix wins; first entry wins a length tie.
                    if best.map_or(true, |(_, best_len)| len > best_len) {
                        best = Some((idx, len));
                    }
                }
            }
            best.map(|(idx, _)| pending.remove(idx))
        };

        match matched {
            Some(entry) => {
                trace!(prefix = ?entry.prefix, "response matched");
                entry.tx.resolve(Ok(frame));
            }
            None => {
                let mut sink = self.sink.lock().expect("sink lock poisoned");
                match sink.as_mut() {
                    Some(sink) => sink.on_frame(frame),
                    None => warn!(len = frame.len(), "dropping frame: no sink registered"),
                }
            }
        }
    }

    fn expire(&self, now: Instant) {
        let expired: Vec<Pending> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            let mut expired = Vec::new();
            let mut idx = 0;
            while idx < pending.len() {
                if pending[idx].deadline <= now {
                    expired.push(pending.remove(idx));
                } else {
                    idx += 1;
                }
            }
            expired
        };
        for entry in expired {
            debug!(prefix = ?entry.prefix, timeout = ?entry.timeout, "request timed out");
            entry.tx.resolve(Err(LinkError::Timeout(entry.timeout)));
        }
    }

    fn stream_ended(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing pending requests on disconnect");
        }
        for entry in drained {
            entry.tx.resolve(Err(LinkError::Disconnected));
        }
        if let Some(sink) = self.sink.lock().expect("sink lock poisoned").as_mut() {
            sink.on_disconnect();
        }
    }
}
