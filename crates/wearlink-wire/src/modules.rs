//! Module and register tables for the known board subsystems.
//!
//! Module ids are fixed across board revisions; which modules are
//! actually present is discovered at connect time by reading each
//! module's INFO register.

use bytes::Bytes;

use crate::error::{Result, WireError};

pub const SWITCH: u8 = 0x01;
pub const LED: u8 = 0x02;
pub const ACCELEROMETER: u8 = 0x03;
pub const TEMPERATURE: u8 = 0x04;
pub const GPIO: u8 = 0x05;
pub const DATA_PROCESSOR: u8 = 0x09;
pub const EVENT: u8 = 0x0a;
pub const LOGGING: u8 = 0x0b;
pub const TIMER: u8 = 0x0c;
pub const MACRO: u8 = 0x0f;
pub const SETTINGS: u8 = 0x11;
pub const DEBUG: u8 = 0xfe;

/// INFO register, readable on every module.
pub const INFO: u8 = 0x00;

/// Implementation byte reported by a present-but-unsupported module.
pub const NO_IMPLEMENTATION: u8 = 0xff;

/// Candidate module ids probed during connection-time discovery.
pub const DISCOVERY_RANGE: std::ops::RangeInclusive<u8> = SWITCH..=SETTINGS;

/// Registers of the data-processor engine.
pub mod data_processor {
    /// Create one processor node.
    pub const ADD: u8 = 0x02;
    /// Per-node output notifications; payload starts with the node id.
    pub const NOTIFY: u8 = 0x03;
    /// Read a buffer node's current state.
    pub const STATE: u8 = 0x04;
    /// Edit a live node parameter.
    pub const PARAMETER: u8 = 0x05;
    /// Remove one processor node.
    pub const REMOVE: u8 = 0x06;
    /// Enable/disable output notifications for one node.
    pub const NOTIFY_ENABLE: u8 = 0x07;
    /// Read back one node's configuration.
    pub const READ_CONFIG: u8 = 0x08;
}

/// Registers of the logger engine.
pub mod logging {
    pub const ENABLE: u8 = 0x01;
    /// Attach a logger to a data source.
    pub const TRIGGER: u8 = 0x02;
    pub const REMOVE: u8 = 0x03;
    /// Current device tick.
    pub const TIME: u8 = 0x04;
    /// Start a download session.
    pub const READOUT: u8 = 0x06;
    /// One log entry: `[logger id, tick u32 LE, payload]`.
    pub const READOUT_NOTIFY: u8 = 0x07;
    /// Entries remaining, u32 LE. Zero concludes the session.
    pub const READOUT_PROGRESS: u8 = 0x08;
}

/// Registers of the event engine.
pub mod event {
    /// Register an event entry for a source address.
    pub const ENTRY: u8 = 0x02;
    /// Event fired; payload starts with the event id.
    pub const NOTIFY: u8 = 0x03;
    pub const REMOVE: u8 = 0x04;
}

pub mod switch {
    pub const STATE: u8 = 0x01;
}

pub mod accelerometer {
    pub const CONFIG: u8 = 0x03;
    pub const DATA: u8 = 0x04;
}

pub mod temperature {
    pub const VALUE: u8 = 0x01;
}

pub mod gpio {
    /// Analog read; frames carry the pin number as a sub-index.
    pub const ANALOG: u8 = 0x03;
}

/// Human-readable name for a module id.
pub fn module_name(id: u8) -> &'static str {
    match id {
        SWITCH => "switch",
        LED => "led",
        ACCELEROMETER => "accelerometer",
        TEMPERATURE => "temperature",
        GPIO => "gpio",
        DATA_PROCESSOR => "data-processor",
        EVENT => "event",
        LOGGING => "logging",
        TIMER => "timer",
        MACRO => "macro",
        SETTINGS => "settings",
        DEBUG => "debug",
        _ => "unknown",
    }
}

/// Parsed module-info discovery response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub module: u8,
    /// `None` when the board reports the module as not implemented.
    pub implementation: Option<u8>,
    pub revision: u8,
    /// Capability bytes following the revision, module-specific.
    pub extra: Bytes,
}

impl ModuleInfo {
    /// Parse the payload of an INFO response for `module`.
    pub fn parse(module: u8, payload: &[u8]) -> Result<Self> {
        let implementation = *payload
            .first()
            .ok_or(WireError::InvalidModuleInfo { module })?;
        if implementation == NO_IMPLEMENTATION {
            return Ok(Self {
                module,
                implementation: None,
                revision: 0,
                extra: Bytes::new(),
            });
        }
        Ok(Self {
            module,
            implementation: Some(implementation),
            revision: payload.get(1).copied().unwrap_or(0),
            extra: Bytes::copy_from_slice(payload.get(2..).unwrap_or(&[])),
        })
    }

    /// Whether the board implements this module.
    pub fn is_present(&self) -> bool {
        self.implementation.is_some()
    }
}
