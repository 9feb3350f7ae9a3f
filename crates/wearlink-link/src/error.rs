use std::time::Duration;

/// Errors that can occur on the correlated link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No response arrived within the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The link dropped while the operation was outstanding.
    #[error("link disconnected")]
    Disconnected,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wearlink_transport::TransportError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] wearlink_wire::WireError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
