//! Host-side SDK for wearlink sensor boards.
//!
//! A board exposes raw sensors plus an on-device data-processor engine,
//! logger engine, and event engine over a notification-based wireless
//! link. This crate connects them under one [`Device`]: describe a
//! pipeline with [`RouteSpec`], compile it onto the board with
//! [`Device::build_route`], then stream its output live, persist it to
//! the on-device log for later download, or react to its events.
//!
//! ```no_run
//! use wearlink::{DataSource, Device, DeviceConfig, MapFunction, RouteSpec};
//! # fn transport() -> Box<dyn wearlink::NotifyTransport> { unimplemented!() }
//!
//! # fn main() -> wearlink::Result<()> {
//! let device = Device::connect(transport(), DeviceConfig::default())?;
//! device.build_route(
//!     RouteSpec::new(DataSource::acceleration())
//!         .map(MapFunction::Rms)
//!         .stream(|sample, _| println!("{}: {:?}", sample.source, sample.values)),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! Data logged in an earlier session stays decodable: either restore a
//! [`Device::snapshot`] blob, or let [`Device::reconstruct_routes`]
//! rebuild the routes from the chain state the board itself reports.

mod device;
mod error;

pub use device::{Device, DeviceConfig};
pub use error::{DeviceError, Result};

pub use wearlink_link::{Link, LinkConfig, LinkError, ModuleDirectory};
pub use wearlink_pipeline::{
    ComparisonOp, DataSource, ReconstructedRoute, RouteError, RouteId, RouteSpec,
};
pub use wearlink_telemetry::{
    Decoder, DownloadConfig, DownloadSinks, DownloadSummary, Env, LogEntry, Sample,
    TelemetryError,
};
pub use wearlink_transport::{BoardHandle, MockBoard, NotifyTransport, TransportError};
pub use wearlink_wire::{AccountMode, MapFunction, ModuleInfo, OpKind};
