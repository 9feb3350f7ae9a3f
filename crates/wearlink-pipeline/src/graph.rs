use std::collections::HashMap;

use tracing::debug;
use wearlink_link::Link;
use wearlink_telemetry::{Decoder, FrameLayout, SourceConfig, SourceKey};
use wearlink_wire::modules::{data_processor, event, logging};
use wearlink_wire::{modules, Address, Command, OpKind};

use crate::error::{Result, RouteError};
use crate::pool::ResourcePools;
use crate::snapshot::{GraphSnapshot, LoggerSnapshot, NodeSnapshot};

pub type RouteId = u32;

/// Where one processor node reads its input from.
#[derive(Debug, Clone)]
pub struct NodeSource {
    pub module: u8,
    pub register: u8,
    /// Instance id (upstream node id, GPIO pin); absent for plain sources.
    pub index: Option<u8>,
    /// Byte offset into the upstream sample.
    pub offset: u8,
    /// Bytes consumed per sample.
    pub length: u8,
}

/// One live on-device pipeline stage.
#[derive(Debug, Clone)]
pub struct ProcessorNode {
    pub id: u8,
    pub kind: OpKind,
    pub params: Vec<u8>,
    pub source: NodeSource,
    /// Upstream processor node, if the input is another node's output.
    pub upstream: Option<u8>,
    pub name: Option<String>,
    pub identifier: String,
    /// Downstream attachments: child nodes, loggers, events,
    /// subscriptions. A node with consumers cannot be freed.
    pub(crate) consumers: u32,
    pub(crate) route: Option<RouteId>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoggerRecord {
    pub id: u8,
    pub key: SourceKey,
    pub identifier: String,
    pub config: SourceConfig,
    pub layout: FrameLayout,
}

/// A compiled pipeline: its nodes in creation order plus the host-side
/// registrations made for it.
pub struct Route {
    pub(crate) nodes: Vec<u8>,
    /// One entry per terminal attachment to a node (logger, event,
    /// stream); each holds one consumer reference on that node.
    pub(crate) attachments: Vec<u8>,
    pub(crate) loggers: Vec<LoggerRecord>,
    pub(crate) events: Vec<u8>,
    pub(crate) subscribers: Vec<u64>,
    pub(crate) subscriptions: Vec<Address>,
    pub(crate) notify_enabled: Vec<u8>,
    pub(crate) sources: Vec<SourceKey>,
    pub(crate) identifier: String,
}

impl Route {
    /// Identifier of the route's final stage.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Node ids in creation order.
    pub fn nodes(&self) -> &[u8] {
        &self.nodes
    }

    /// Decoder subscriber ids, one per `stream()` terminal, in call order.
    pub fn subscribers(&self) -> &[u64] {
        &self.subscribers
    }

    pub fn logger_ids(&self) -> Vec<u8> {
        self.loggers.iter().map(|l| l.id).collect()
    }
}

/// All processor-chain state for one board connection.
///
/// Owns the id pools; route compilation and removal go through here so
/// shared nodes and pool accounting stay consistent. Not reentrant:
/// callers serialize builds (the facade holds this behind a mutex).
pub struct RouteGraph {
    pub(crate) pools: ResourcePools,
    pub(crate) nodes: HashMap<u8, ProcessorNode>,
    pub(crate) names: HashMap<String, u8>,
    pub(crate) routes: HashMap<RouteId, Route>,
    /// Wire-level subscription refcounts, so two routes streaming the
    /// same address share one subscribe/unsubscribe pair.
    pub(crate) subscriptions: HashMap<Address, u32>,
    /// Decoder source registrations shared across routes.
    pub(crate) source_refs: HashMap<SourceKey, u32>,
    next_route: RouteId,
}

impl RouteGraph {
    pub fn new() -> Self {
        Self {
            pools: ResourcePools::new(),
            nodes: HashMap::new(),
            names: HashMap::new(),
            routes: HashMap::new(),
            subscriptions: HashMap::new(),
            source_refs: HashMap::new(),
            next_route: 1,
        }
    }

    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(&id)
    }

    pub fn node(&self, id: u8) -> Option<&ProcessorNode> {
        self.nodes.get(&id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&ProcessorNode> {
        self.names.get(name).and_then(|id| self.nodes.get(id))
    }

    pub(crate) fn next_route_id(&mut self) -> RouteId {
        let id = self.next_route;
        self.next_route += 1;
        id
    }

    /// Track one more subscription to `address`; true if the wire-level
    /// subscribe command must actually be sent.
    pub(crate) fn add_subscription(&mut self, address: Address) -> bool {
        let count = self.subscriptions.entry(address).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop one subscription; true if the unsubscribe must be sent.
    pub(crate) fn release_subscription(&mut self, address: Address) -> bool {
        let count = self
            .subscriptions
            .get_mut(&address)
            .expect("subscription refcount missing");
        *count -= 1;
        if *count == 0 {
            self.subscriptions.remove(&address);
            return true;
        }
        false
    }

    pub(crate) fn retain_source(&mut self, key: SourceKey) {
        *self.source_refs.entry(key).or_insert(0) += 1;
    }

    /// Drop one source reference; true if the decoder registration
    /// should be removed.
    pub(crate) fn release_source(&mut self, key: &SourceKey) -> bool {
        let count = self
            .source_refs
            .get_mut(key)
            .expect("source refcount missing");
        *count -= 1;
        if *count == 0 {
            self.source_refs.remove(key);
            return true;
        }
        false
    }

    /// Tear a route down: inverse unsubscribes, logger and event
    /// removal, then node removal consumers-before-producers. Nodes
    /// shared via multicast are freed only when their last consumer
    /// goes.
    pub fn remove_route(&mut self, link: &Link, decoder: &Decoder, id: RouteId) -> Result<()> {
        let route = self
            .routes
            .remove(&id)
            .ok_or(RouteError::UnknownRoute(id))?;
        debug!(route = id, identifier = %route.identifier, "removing route");

        for &node in &route.notify_enabled {
            link.send(&Command::new(
                modules::DATA_PROCESSOR,
                data_processor::NOTIFY_ENABLE,
                vec![node, 0x00],
            ))?;
        }
        for address in &route.subscriptions {
            if self.release_subscription(*address) {
                link.send(&Command::unsubscribe(*address))?;
            }
        }
        for subscriber in &route.subscribers {
            decoder.remove_subscriber(*subscriber);
        }
        for logger in &route.loggers {
            link.send(&Command::new(
                modules::LOGGING,
                logging::REMOVE,
                vec![logger.id],
            ))?;
            decoder.remove_logger(logger.id);
            self.pools.loggers.free(logger.id);
        }
        for &event_id in &route.events {
            link.send(&Command::new(modules::EVENT, event::REMOVE, vec![event_id]))?;
            decoder.remove_reaction(event_id);
            self.pools.events.free(event_id);
        }
        for key in &route.sources {
            if self.release_source(key) {
                decoder.remove_source(key);
            }
        }
        for &node in &route.attachments {
            let node = self.nodes.get_mut(&node).expect("attached node missing");
            node.consumers -= 1;
        }
        for &node in &route.nodes {
            self.nodes.get_mut(&node).expect("route node missing").route = None;
        }
        for &node in route.nodes.iter().rev() {
            self.try_release(link, node)?;
        }
        // Cross-route references (fuse) may have just dropped the last
        // consumer of a node whose own route is already gone.
        for &node in &route.attachments {
            self.try_release(link, node)?;
        }
        Ok(())
    }

    /// Free `id` and walk up its chain, removing every node whose last
    /// consumer just went and whose owning route is gone.
    pub(crate) fn try_release(&mut self, link: &Link, id: u8) -> Result<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let releasable = match self.nodes.get(&id) {
                Some(node) => node.route.is_none() && node.consumers == 0,
                None => false,
            };
            if !releasable {
                return Ok(());
            }
            let node = self.nodes.remove(&id).expect("node checked above");
            link.send(&Command::new(
                modules::DATA_PROCESSOR,
                data_processor::REMOVE,
                vec![id],
            ))?;
            if let Some(name) = &node.name {
                self.names.remove(name);
            }
            self.pools.processors.free(id);
            current = node.upstream;
            if let Some(up) = node.upstream {
                let up = self.nodes.get_mut(&up).expect("upstream node missing");
                up.consumers -= 1;
            }
        }
        Ok(())
    }

    /// Serializable image of the graph: every live node plus every
    /// active logger binding, enough to decode that logger's entries in
    /// a later session.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|node| NodeSnapshot {
                id: node.id,
                tag: node.kind.tag(),
                params: node.params.clone(),
                src_module: node.source.module,
                src_register: node.source.register,
                src_index: node.source.index,
                offset: node.source.offset,
                length: node.source.length,
                name: node.name.clone(),
                identifier: node.identifier.clone(),
            })
            .collect();
        nodes.sort_by_key(|n| n.id);

        let mut loggers: Vec<LoggerSnapshot> = self
            .routes
            .values()
            .flat_map(|route| route.loggers.iter())
            .map(LoggerSnapshot::from_record)
            .collect();
        loggers.sort_by_key(|l| l.id);

        GraphSnapshot { nodes, loggers }
    }

    /// Rebuild graph and decoder state from a snapshot taken in an
    /// earlier session. Pool ids named by the snapshot are reserved;
    /// logger sources are re-registered so downloaded entries decode.
    pub fn restore(&mut self, snapshot: &GraphSnapshot, decoder: &Decoder) -> Result<()> {
        for node in &snapshot.nodes {
            let kind = OpKind::from_tag(node.tag)
                .ok_or(RouteError::UnknownProcessorTag { tag: node.tag })?;
            self.pools.processors.reserve(node.id)?;
            let upstream = (node.src_module == modules::DATA_PROCESSOR
                && node.src_register == data_processor::NOTIFY)
                .then_some(node.src_index)
                .flatten();
            if let Some(name) = &node.name {
                self.names.insert(name.clone(), node.id);
            }
            self.nodes.insert(
                node.id,
                ProcessorNode {
                    id: node.id,
                    kind,
                    params: node.params.clone(),
                    source: NodeSource {
                        module: node.src_module,
                        register: node.src_register,
                        index: node.src_index,
                        offset: node.offset,
                        length: node.length,
                    },
                    upstream,
                    name: node.name.clone(),
                    identifier: node.identifier.clone(),
                    consumers: 0,
                    route: None,
                },
            );
        }
        let upstream_links: Vec<u8> = self.nodes.values().filter_map(|n| n.upstream).collect();
        for up in upstream_links {
            if let Some(node) = self.nodes.get_mut(&up) {
                node.consumers += 1;
            }
        }

        for logger in &snapshot.loggers {
            self.pools.loggers.reserve(logger.id)?;
            let key = logger.key();
            decoder.ensure_source(key, &logger.identifier, logger.config(), logger.layout());
            decoder.register_logger(logger.id, key);
            self.retain_source(key);
        }
        Ok(())
    }

    /// Fold device-reported routes into the graph: reserve the board ids
    /// they occupy and register their loggers with the decoder. Chains
    /// sharing an upstream node reserve it once.
    pub fn adopt(
        &mut self,
        routes: &[crate::reconstruct::ReconstructedRoute],
        decoder: &Decoder,
    ) -> Result<()> {
        let mut reserved = std::collections::HashSet::new();
        for route in routes {
            for &id in &route.nodes {
                if reserved.insert(id) {
                    self.pools.processors.reserve(id)?;
                }
            }
            self.pools.loggers.reserve(route.logger_id)?;
            decoder.ensure_source(route.key, &route.identifier, route.config.clone(), route.layout);
            decoder.register_logger(route.logger_id, route.key);
            self.retain_source(route.key);
        }
        Ok(())
    }
}

impl Default for RouteGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wearlink_link::LinkConfig;
    use wearlink_transport::{BoardHandle, MockBoard};
    use wearlink_wire::MapFunction;

    use crate::sources::DataSource;
    use crate::spec::RouteSpec;

    use super::*;

    fn harness() -> (Link, Decoder, RouteGraph, BoardHandle) {
        let (board, handle) = MockBoard::new();
        let link = Link::open(
            Box::new(board),
            LinkConfig {
                response_timeout: Duration::from_millis(100),
                sweep_interval: Duration::from_millis(5),
            },
        )
        .unwrap();
        (link, Decoder::new(1000), RouteGraph::new(), handle)
    }

    #[test]
    fn remove_restores_every_pool() {
        let (link, decoder, mut graph, _handle) = harness();
        let processors = graph.pools().processors.available();
        let loggers = graph.pools().loggers.available();

        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .accumulate()
            .log();
        let route = graph.build_route(&link, &decoder, spec).unwrap();
        assert_eq!(graph.pools().processors.available(), processors - 2);
        assert_eq!(graph.pools().loggers.available(), loggers - 1);

        graph.remove_route(&link, &decoder, route).unwrap();
        assert_eq!(graph.pools().processors.available(), processors);
        assert_eq!(graph.pools().loggers.available(), loggers);
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn removal_emits_consumers_before_producers() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .accumulate()
            .log();
        let route = graph.build_route(&link, &decoder, spec).unwrap();
        let before = handle.write_count();

        graph.remove_route(&link, &decoder, route).unwrap();
        let written = handle.written();
        let removals: Vec<&[u8]> = written[before..].iter().map(|f| f.as_ref()).collect();

        // Logger first, then accumulate (id 1), then rms (id 0).
        assert_eq!(
            removals,
            vec![
                &[modules::LOGGING, logging::REMOVE, 0][..],
                &[modules::DATA_PROCESSOR, data_processor::REMOVE, 1][..],
                &[modules::DATA_PROCESSOR, data_processor::REMOVE, 0][..],
            ]
        );
    }

    #[test]
    fn multicast_upstream_freed_after_last_branch() {
        let (link, decoder, mut graph, _handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .multicast()
            .to()
            .accumulate()
            .log()
            .to()
            .delta(100)
            .log()
            .end_multicast();
        let route = graph.build_route(&link, &decoder, spec).unwrap();

        // rms node (id 0) is shared by both branches.
        assert_eq!(graph.node(0).unwrap().consumers, 2);

        graph.remove_route(&link, &decoder, route).unwrap();
        assert!(graph.node(0).is_none());
        assert_eq!(
            graph.pools().processors.available(),
            usize::from(crate::pool::MAX_PROCESSORS)
        );
    }

    #[test]
    fn removing_unknown_route_is_an_error() {
        let (link, decoder, mut graph, _handle) = harness();
        assert!(matches!(
            graph.remove_route(&link, &decoder, 42),
            Err(RouteError::UnknownRoute(42))
        ));
    }

    #[test]
    fn shared_raw_subscription_survives_first_removal() {
        let (link, decoder, mut graph, handle) = harness();
        let first = graph
            .build_route(
                &link,
                &decoder,
                RouteSpec::new(DataSource::acceleration()).stream(|_, _| {}),
            )
            .unwrap();
        let second = graph
            .build_route(
                &link,
                &decoder,
                RouteSpec::new(DataSource::acceleration()).stream(|_, _| {}),
            )
            .unwrap();

        // One subscribe on the wire for both routes.
        let subscribe = [
            modules::ACCELEROMETER,
            wearlink_wire::modules::accelerometer::DATA,
            0x01,
        ];
        let count = |frames: &[bytes::Bytes], needle: &[u8]| {
            frames.iter().filter(|f| f.as_ref() == needle).count()
        };
        assert_eq!(count(&handle.written(), &subscribe), 1);

        graph.remove_route(&link, &decoder, first).unwrap();
        let unsubscribe = [
            modules::ACCELEROMETER,
            wearlink_wire::modules::accelerometer::DATA,
            0x00,
        ];
        assert_eq!(count(&handle.written(), &unsubscribe), 0);

        graph.remove_route(&link, &decoder, second).unwrap();
        assert_eq!(count(&handle.written(), &unsubscribe), 1);
    }
}
