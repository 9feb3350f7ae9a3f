/// Errors raised while compiling, removing, or reconstructing routes.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// An id pool ran out during compilation. The partial chain is
    /// rolled back before this is returned.
    #[error("{pool} pool exhausted")]
    ResourceExhausted { pool: &'static str },

    /// Names are unique across the whole route graph.
    #[error("name '{0}' is already in use")]
    DuplicateName(String),

    /// `split().index(n)` with `n` outside the upstream component count.
    #[error("split index {index} out of bounds for {components} components")]
    SplitIndexOutOfBounds { index: u8, components: u8 },

    /// `index(n)` without a preceding `split()`.
    #[error("index() requires a preceding split()")]
    IndexWithoutSplit,

    /// Pack count above the source's per-frame maximum.
    #[error("pack count {requested} exceeds source maximum {max}")]
    PackTooLarge { requested: u8, max: u8 },

    /// Pack and account cannot share one frame: the accounting header
    /// leaves no room for a full pack.
    #[error("pack and account cannot be combined")]
    PackAccountConflict,

    /// A fuse stage referenced a name no node carries.
    #[error("no node named '{0}'")]
    UnresolvedName(String),

    /// Unbalanced or empty multicast block.
    #[error("malformed multicast: {0}")]
    MalformedMulticast(&'static str),

    /// A stage was used in a position where it has no meaning.
    #[error("invalid stage: {0}")]
    InvalidStage(&'static str),

    /// Route handle that no longer resolves to a live route.
    #[error("no route with id {0}")]
    UnknownRoute(u32),

    /// Device reported a processor tag absent from the operation table.
    /// Reconstruction fails rather than guessing.
    #[error("unknown processor tag {tag:#04x}")]
    UnknownProcessorTag { tag: u8 },

    /// A chain entry references an upstream node the device did not report.
    #[error("chain references missing node {id}")]
    MissingChainNode { id: u8 },

    /// Device-reported chain is rooted at an address outside the source
    /// catalog.
    #[error("unknown source address {module:#04x}/{register:#04x}")]
    UnknownSourceAddress { module: u8, register: u8 },

    /// Readback payload too short to be a chain or logger entry.
    #[error("malformed readback entry ({len} bytes)")]
    MalformedReadback { len: usize },

    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] wearlink_link::LinkError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] wearlink_wire::WireError),

    /// Decoder registration error.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] wearlink_telemetry::TelemetryError),
}

pub type Result<T> = std::result::Result<T, RouteError>;
