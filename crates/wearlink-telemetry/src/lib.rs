//! Telemetry decoding for wearlink sensor boards.
//!
//! Turns raw notification and log frames into typed [`Sample`]s. The
//! decoder looks up the originating source by wire address, reads that
//! source's *live* configuration (scale and layout are mutable at
//! runtime), splits packed multi-sample frames, reconstructs timestamps
//! from 32-bit device ticks across rollover, and demultiplexes log
//! entries to the routes that own their loggers.

pub mod decoder;
pub mod download;
pub mod error;
pub mod sample;
pub mod timebase;

pub use decoder::{Decoder, Env, FrameLayout, SampleHandler, SourceConfig, SourceKey};
pub use download::{download_log, DownloadConfig, DownloadSinks, DownloadSummary};
pub use error::{Result, TelemetryError};
pub use sample::{LogEntry, Sample};
pub use timebase::TickTracker;
