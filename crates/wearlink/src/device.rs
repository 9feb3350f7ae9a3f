use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};
use wearlink_link::{discover_modules, Link, LinkConfig, ModuleDirectory};
use wearlink_pipeline::{
    fetch_chain, fetch_loggers, GraphSnapshot, ReconstructedRoute, RouteGraph, RouteId, RouteSpec,
};
use wearlink_telemetry::{Decoder, DownloadConfig, DownloadSinks, DownloadSummary};
use wearlink_transport::NotifyTransport;
use wearlink_wire::modules::{DATA_PROCESSOR, DISCOVERY_RANGE, LOGGING};

use crate::error::{DeviceError, Result};

/// Connection-time configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub link: LinkConfig,
    /// Per-module deadline during connection-time discovery.
    pub discovery_timeout: Duration,
    /// Duration of one device tick. Timestamps of logged and accounted
    /// samples are reconstructed from tick counts at this rate.
    pub tick_period_us: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            discovery_timeout: Duration::from_millis(500),
            tick_period_us: 1_000,
        }
    }
}

/// One connected sensor board.
///
/// Owns the correlated link, the telemetry decoder (installed as the
/// link's notification sink), and the route graph. Route compilation and
/// removal are serialized by an internal mutex; everything else is safe
/// to call from any thread.
pub struct Device {
    link: Link,
    decoder: Decoder,
    graph: Mutex<RouteGraph>,
    modules: ModuleDirectory,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").finish_non_exhaustive()
    }
}

impl Device {
    /// Connect the transport, probe the board's modules, and wire the
    /// decoder into the notification path.
    ///
    /// Fails if the board lacks the data-processor or logging engine;
    /// nothing else in this SDK is usable without them.
    pub fn connect(transport: Box<dyn NotifyTransport>, config: DeviceConfig) -> Result<Self> {
        let link = Link::open(transport, config.link)?;
        let decoder = Decoder::new(config.tick_period_us);
        link.set_sink(Box::new(decoder.clone()));

        let mandatory = [DATA_PROCESSOR, LOGGING];
        let mut modules = ModuleDirectory::new();
        discover_modules(
            &link,
            DISCOVERY_RANGE,
            &mandatory,
            config.discovery_timeout,
            &mut modules,
        )?;
        for module in mandatory {
            if !modules.is_present(module) {
                return Err(DeviceError::MissingModule { module });
            }
        }
        info!(modules = modules.len(), "board connected");

        Ok(Self {
            link,
            decoder,
            graph: Mutex::new(RouteGraph::new()),
            modules,
        })
    }

    /// Modules the board reported during discovery.
    pub fn modules(&self) -> &ModuleDirectory {
        &self.modules
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Compile a route onto the board. On any failure the partially
    /// created chain is rolled back and nothing is leaked.
    pub fn build_route(&self, spec: RouteSpec) -> Result<RouteId> {
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        Ok(graph.build_route(&self.link, &self.decoder, spec)?)
    }

    /// Tear a route down, freeing every id it held.
    pub fn remove_route(&self, id: RouteId) -> Result<()> {
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        Ok(graph.remove_route(&self.link, &self.decoder, id)?)
    }

    /// Identifier of a live route's final stage.
    pub fn route_identifier(&self, id: RouteId) -> Option<String> {
        let graph = self.graph.lock().expect("graph lock poisoned");
        graph.route(id).map(|r| r.identifier().to_string())
    }

    /// Decoder subscriber ids of a live route's stream terminals.
    pub fn route_subscribers(&self, id: RouteId) -> Option<Vec<u64>> {
        let graph = self.graph.lock().expect("graph lock poisoned");
        graph.route(id).map(|r| r.subscribers().to_vec())
    }

    /// Drain the on-device log through the decoder. Blocks until the
    /// board reports the end of the session or the configured deadline
    /// passes.
    pub fn download_log(
        &self,
        config: DownloadConfig,
        sinks: DownloadSinks,
    ) -> Result<DownloadSummary> {
        Ok(wearlink_telemetry::download_log(
            &self.link,
            &self.decoder,
            config,
            sinks,
        )?)
    }

    /// Opaque persisted-state blob of the route graph, for decoding this
    /// session's logged data in a later one.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let graph = self.graph.lock().expect("graph lock poisoned");
        Ok(serde_json::to_vec(&graph.snapshot())?)
    }

    /// Rebuild route-graph and decoder state from a blob produced by
    /// [`Device::snapshot`] in an earlier session.
    pub fn restore(&self, blob: &[u8]) -> Result<()> {
        let snapshot: GraphSnapshot = serde_json::from_slice(blob)?;
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        Ok(graph.restore(&snapshot, &self.decoder)?)
    }

    /// Rebuild routes from device-reported chain state alone, with no
    /// snapshot. The reported ids are reserved so new routes cannot
    /// collide with chains left from an earlier session.
    pub fn reconstruct_routes(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<ReconstructedRoute>> {
        let entries = fetch_chain(&self.link, timeout)?;
        let loggers = fetch_loggers(&self.link, timeout)?;
        let routes = wearlink_pipeline::reconstruct_routes(&entries, &loggers)?;
        debug!(count = routes.len(), "reconstructed routes");
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        graph.adopt(&routes, &self.decoder)?;
        Ok(routes)
    }

    /// Drop the connection. Every in-flight request and any active log
    /// download fails with a disconnect error.
    pub fn disconnect(&self) -> Result<()> {
        Ok(self.link.disconnect()?)
    }
}
