//! Request/response correlation over the notification-based link.
//!
//! Boards answer commands with notification frames; nothing on the wire
//! ties a response to its request except the leading address bytes. The
//! [`Link`] keeps a table of outstanding requests keyed by response
//! prefix, resolves the first (longest-prefix) match, enforces deadlines
//! from an independent sweeper thread, and fails every outstanding
//! request when the link drops. Frames that match no pending request are
//! handed to the registered [`NotificationSink`] — in a full SDK stack,
//! the telemetry decoder.

pub mod completion;
pub mod discovery;
pub mod error;
pub mod link;

pub use completion::Completion;
pub use discovery::{discover_modules, ModuleDirectory};
pub use error::{LinkError, Result};
pub use link::{Link, LinkConfig, NotificationSink};
