//! Operation tags for data-processor nodes.
//!
//! This table is the single authority mapping wire tags to operation
//! kinds. The route compiler encodes through it and the anonymous route
//! reconstructor decodes through it, so a new operation kind is added
//! here exactly once.

/// Kind of one on-device pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Passthrough,
    Accumulate,
    Lowpass,
    Highpass,
    Comparison,
    Limit,
    Map,
    Delay,
    Delta,
    Threshold,
    Buffer,
    Pack,
    Account,
    Fuse,
}

impl OpKind {
    /// Wire tag carried in the processor config bytes.
    pub fn tag(self) -> u8 {
        match self {
            OpKind::Passthrough => 0x01,
            OpKind::Accumulate => 0x02,
            OpKind::Lowpass => 0x03,
            OpKind::Highpass => 0x04,
            OpKind::Comparison => 0x06,
            OpKind::Limit => 0x08,
            OpKind::Map => 0x09,
            OpKind::Delay => 0x0a,
            OpKind::Delta => 0x0c,
            OpKind::Threshold => 0x0d,
            OpKind::Buffer => 0x0f,
            OpKind::Pack => 0x10,
            OpKind::Account => 0x11,
            OpKind::Fuse => 0x1b,
        }
    }

    /// Inverse of [`OpKind::tag`]. `None` for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => OpKind::Passthrough,
            0x02 => OpKind::Accumulate,
            0x03 => OpKind::Lowpass,
            0x04 => OpKind::Highpass,
            0x06 => OpKind::Comparison,
            0x08 => OpKind::Limit,
            0x09 => OpKind::Map,
            0x0a => OpKind::Delay,
            0x0c => OpKind::Delta,
            0x0d => OpKind::Threshold,
            0x0f => OpKind::Buffer,
            0x10 => OpKind::Pack,
            0x11 => OpKind::Account,
            0x1b => OpKind::Fuse,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Passthrough => "passthrough",
            OpKind::Accumulate => "accumulate",
            OpKind::Lowpass => "lowpass",
            OpKind::Highpass => "highpass",
            OpKind::Comparison => "comparison",
            OpKind::Limit => "limit",
            OpKind::Map => "map",
            OpKind::Delay => "delay",
            OpKind::Delta => "delta",
            OpKind::Threshold => "threshold",
            OpKind::Buffer => "buffer",
            OpKind::Pack => "pack",
            OpKind::Account => "account",
            OpKind::Fuse => "fuse",
        }
    }
}

/// Header mode of an account stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountMode {
    /// Monotonically increasing sample count.
    Count,
    /// Device tick at capture time.
    Time,
}

impl AccountMode {
    pub fn value(self) -> u8 {
        match self {
            AccountMode::Count => 0x00,
            AccountMode::Time => 0x01,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(AccountMode::Count),
            0x01 => Some(AccountMode::Time),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccountMode::Count => "count",
            AccountMode::Time => "time",
        }
    }
}

/// Function applied by a map stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapFunction {
    Add,
    Multiply,
    Divide,
    Abs,
    Rms,
    Rss,
    Sqrt,
}

impl MapFunction {
    pub fn value(self) -> u8 {
        match self {
            MapFunction::Add => 0x00,
            MapFunction::Multiply => 0x01,
            MapFunction::Divide => 0x02,
            MapFunction::Abs => 0x05,
            MapFunction::Rms => 0x06,
            MapFunction::Rss => 0x07,
            MapFunction::Sqrt => 0x08,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(MapFunction::Add),
            0x01 => Some(MapFunction::Multiply),
            0x02 => Some(MapFunction::Divide),
            0x05 => Some(MapFunction::Abs),
            0x06 => Some(MapFunction::Rms),
            0x07 => Some(MapFunction::Rss),
            0x08 => Some(MapFunction::Sqrt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MapFunction::Add => "add",
            MapFunction::Multiply => "multiply",
            MapFunction::Divide => "divide",
            MapFunction::Abs => "abs",
            MapFunction::Rms => "rms",
            MapFunction::Rss => "rss",
            MapFunction::Sqrt => "sqrt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[OpKind] = &[
        OpKind::Passthrough,
        OpKind::Accumulate,
        OpKind::Lowpass,
        OpKind::Highpass,
        OpKind::Comparison,
        OpKind::Limit,
        OpKind::Map,
        OpKind::Delay,
        OpKind::Delta,
        OpKind::Threshold,
        OpKind::Buffer,
        OpKind::Pack,
        OpKind::Account,
        OpKind::Fuse,
    ];

    #[test]
    fn tags_roundtrip() {
        for &kind in ALL {
            assert_eq!(OpKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn tags_unique() {
        let mut seen = std::collections::HashSet::new();
        for &kind in ALL {
            assert!(seen.insert(kind.tag()), "duplicate tag for {kind:?}");
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(OpKind::from_tag(0x7e), None);
    }

    #[test]
    fn account_modes_roundtrip() {
        for mode in [AccountMode::Count, AccountMode::Time] {
            assert_eq!(AccountMode::from_value(mode.value()), Some(mode));
        }
        assert_eq!(AccountMode::from_value(0x02), None);
    }

    #[test]
    fn map_functions_roundtrip() {
        for func in [
            MapFunction::Add,
            MapFunction::Multiply,
            MapFunction::Divide,
            MapFunction::Abs,
            MapFunction::Rms,
            MapFunction::Rss,
            MapFunction::Sqrt,
        ] {
            assert_eq!(MapFunction::from_value(func.value()), Some(func));
        }
    }
}
