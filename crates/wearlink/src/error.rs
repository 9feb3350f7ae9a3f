use wearlink_link::LinkError;
use wearlink_pipeline::RouteError;
use wearlink_telemetry::TelemetryError;
use wearlink_transport::TransportError;

/// Top-level error for device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Persisted-state blob failed to serialize or parse.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The board answered discovery but does not implement a module this
    /// SDK cannot work without.
    #[error("board does not implement required module {module:#04x}")]
    MissingModule { module: u8 },
}

pub type Result<T> = std::result::Result<T, DeviceError>;
