/// Errors that can occur at the wireless transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is not connected.
    #[error("transport not connected")]
    NotConnected,

    /// The transport is already connected.
    #[error("transport already connected")]
    AlreadyConnected,

    /// The notification receiver was already handed out for this connection.
    #[error("notification stream already taken for this connection")]
    NotificationsTaken,

    /// A write to the link failed.
    #[error("link write failed: {0}")]
    WriteFailed(String),

    /// An I/O error occurred on the underlying link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
