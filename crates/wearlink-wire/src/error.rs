/// Errors that can occur while encoding or decoding command frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame is shorter than the two-byte module/register header.
    #[error("frame too short ({len} bytes, need at least 2)")]
    ShortFrame { len: usize },

    /// A module-info payload could not be parsed.
    #[error("malformed module info for module {module:#04x}")]
    InvalidModuleInfo { module: u8 },
}

pub type Result<T> = std::result::Result<T, WireError>;
