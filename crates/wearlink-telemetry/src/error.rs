use std::time::Duration;

/// Errors that can occur while decoding telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The frame's address matches no registered source.
    #[error("no source registered for {module:#04x}/{register:#04x}")]
    UnknownSource { module: u8, register: u8 },

    /// A log entry references a logger no route owns.
    #[error("log entry for unknown logger {logger_id}")]
    UnknownLogEntry { logger_id: u8 },

    /// The payload is shorter than the source's sample layout requires.
    /// Fatal to this sample only, never to the connection.
    #[error("short payload for '{source_name}' ({len} bytes, need {expected})")]
    ShortPayload {
        source_name: String,
        len: usize,
        expected: usize,
    },

    /// A download session is already running.
    #[error("log download already in progress")]
    DownloadInProgress,

    /// The download session did not finish within the deadline.
    #[error("log download timed out after {0:?}")]
    Timeout(Duration),

    /// The link dropped while the session was active.
    #[error("link disconnected")]
    Disconnected,

    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] wearlink_link::LinkError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] wearlink_wire::WireError),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
