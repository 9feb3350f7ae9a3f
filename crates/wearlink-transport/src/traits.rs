use std::sync::mpsc::Receiver;

use bytes::Bytes;

use crate::error::Result;

/// A notification-based wireless link to a sensor board.
///
/// Contract assumed by the layers above:
/// - `write` delivers command frames at least once, in issuance order.
/// - Notifications arrive ordered and at most once per connection.
/// - Dropping the notification sender (on disconnect) is the only
///   end-of-stream signal; there is no in-band close frame.
pub trait NotifyTransport: Send {
    /// Establish the connection.
    fn connect(&mut self) -> Result<()>;

    /// Tear the connection down. Ends the notification stream.
    fn disconnect(&mut self) -> Result<()>;

    /// Write one command frame to the board.
    fn write(&mut self, frame: &[u8]) -> Result<()>;

    /// Take the inbound notification stream for this connection.
    ///
    /// May be called once per connection; the receiver ends when the
    /// connection does.
    fn take_notifications(&mut self) -> Result<Receiver<Bytes>>;
}
