use bytes::Bytes;

use crate::error::{Result, TelemetryError};

/// One decoded telemetry sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Stable identifier of the originating source (sensor name or
    /// processor-chain identifier).
    pub source: String,
    /// Microseconds since the connect-time epoch.
    pub timestamp_us: u64,
    /// Raw bytes of this single sample.
    pub data: Bytes,
    /// Scaled per-component values, little-endian integers times the
    /// source's live scale.
    pub values: Vec<f64>,
    /// Sequence count from an account(count) header, if present.
    pub seq: Option<u32>,
    /// Position within a packed frame; 0 for unpacked samples.
    pub sub_index: u8,
}

/// One entry read back during a log download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub logger_id: u8,
    pub tick: u32,
    pub payload: Bytes,
}

impl LogEntry {
    /// Parse the payload of a readout notification:
    /// `[logger id, tick u32 LE, payload...]`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 5 {
            return Err(TelemetryError::ShortPayload {
                source_name: "log entry".to_string(),
                len: payload.len(),
                expected: 5,
            });
        }
        let tick = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
        Ok(Self {
            logger_id: payload[0],
            tick,
            payload: Bytes::copy_from_slice(&payload[5..]),
        })
    }
}
