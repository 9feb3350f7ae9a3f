//! Transport boundary for the wireless link to a sensor board.
//!
//! The SDK never talks to a radio directly. It writes opaque command
//! frames and receives ordered, at-most-once notification frames through
//! the [`NotifyTransport`] trait. Everything above this crate is
//! transport-agnostic; everything below it (GATT plumbing, pairing,
//! characteristic discovery) lives in the integrating application.
//!
//! [`MockBoard`] is the in-process harness used throughout the workspace
//! tests: a scriptable board that answers command prefixes with canned
//! response frames and lets tests inject unsolicited notifications.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::{Result, TransportError};
pub use mock::{BoardHandle, MockBoard};
pub use traits::NotifyTransport;
