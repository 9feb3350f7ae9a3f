//! Route compiler and lifecycle manager for wearlink sensor boards.
//!
//! A route is a chain of on-device data-processor nodes fed by one raw
//! source, terminated by any mix of live streams, loggers, and event
//! reactions. [`RouteSpec`] describes the chain, [`RouteGraph`] compiles
//! it into processor allocations and wire commands, tracks shared nodes
//! and subscriptions across routes, and tears everything down in reverse
//! creation order.
//!
//! [`reconstruct`] rebuilds routes from device-reported state alone,
//! for decoding data logged in a previous session; [`snapshot`] does
//! the same through a host-side blob saved at disconnect.

mod builder;
pub mod error;
pub mod graph;
pub mod pool;
pub mod reconstruct;
pub mod snapshot;
pub mod sources;
pub mod spec;

pub use error::{Result, RouteError};
pub use graph::{NodeSource, ProcessorNode, Route, RouteGraph, RouteId};
pub use pool::{
    IdPool, ResourcePools, MAX_EVENTS, MAX_LOGGERS, MAX_PROCESSORS, MAX_TIMERS,
};
pub use reconstruct::{
    fetch_chain, fetch_loggers, reconstruct_routes, ChainEntry, LoggerBinding,
    ReconstructedRoute,
};
pub use snapshot::{GraphSnapshot, LoggerSnapshot, NodeSnapshot};
pub use sources::DataSource;
pub use spec::{ComparisonOp, Reaction, RouteSpec};
