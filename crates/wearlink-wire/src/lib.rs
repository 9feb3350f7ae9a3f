//! Command frame codec for wearlink sensor boards.
//!
//! Every frame on the wire is `[module, register, payload...]`. The high
//! bit of the register byte distinguishes a response/notification from a
//! request. This crate owns that layout plus the shared vocabulary the
//! rest of the workspace builds on: module ids, register tables, the
//! module-info discovery payload, and the authoritative operation-tag
//! table used by both the route compiler and the route reconstructor.

pub mod codec;
pub mod error;
pub mod modules;
pub mod ops;

pub use codec::{Address, Command, HEADER_SIZE, RESPONSE_FLAG};
pub use error::{Result, WireError};
pub use modules::{module_name, ModuleInfo, DISCOVERY_RANGE, INFO, NO_IMPLEMENTATION};
pub use ops::{AccountMode, MapFunction, OpKind};
