//! Route compilation: validate a pipeline description, then allocate
//! ids and emit one configuration command per node, with full rollback
//! if anything fails mid-emission.

use std::collections::HashSet;

use tracing::{debug, trace};
use wearlink_link::Link;
use wearlink_telemetry::{Decoder, FrameLayout, SourceConfig, SourceKey};
use wearlink_wire::modules::{data_processor, event, logging};
use wearlink_wire::{modules, Address, Command, OpKind};

use crate::error::{Result, RouteError};
use crate::graph::{LoggerRecord, NodeSource, ProcessorNode, Route, RouteGraph, RouteId};
use crate::sources::DataSource;
use crate::spec::{RouteSpec, Stage};

/// Compile-time view of "where the next stage reads from".
#[derive(Clone)]
struct Upstream {
    module: u8,
    register: u8,
    index: Option<u8>,
    offset: u8,
    /// Set when the input is another processor node's output.
    node: Option<u8>,
    components: u8,
    component_size: u8,
    signed: bool,
    scale: f64,
    period_us: u32,
    layout: FrameLayout,
    ident: String,
}

impl Upstream {
    fn from_source(source: &DataSource) -> Self {
        Self {
            module: source.module,
            register: source.register,
            index: source.index,
            offset: 0,
            node: None,
            components: source.components,
            component_size: source.component_size,
            signed: source.signed,
            scale: source.scale,
            period_us: source.period_us,
            layout: FrameLayout::default(),
            ident: source.identifier(),
        }
    }

    fn length(&self) -> u8 {
        self.components * self.component_size
    }

    fn key(&self) -> SourceKey {
        match (self.node, self.index) {
            (Some(id), _) => {
                SourceKey::indexed(modules::DATA_PROCESSOR, data_processor::NOTIFY, id)
            }
            (None, Some(index)) => SourceKey::indexed(self.module, self.register, index),
            (None, None) => SourceKey::new(self.module, self.register),
        }
    }

    fn config(&self) -> SourceConfig {
        SourceConfig {
            scale: self.scale,
            components: self.components,
            component_size: self.component_size,
            signed: self.signed,
            period_us: self.period_us,
        }
    }
}

/// Validation-pass mirror of the upstream context. No ids, no commands.
#[derive(Clone)]
struct Sim {
    components: u8,
    split: Option<u8>,
    packed: bool,
    accounted: bool,
    has_node: bool,
}

impl RouteGraph {
    /// Compile `spec` into a live route.
    ///
    /// Validation runs in full before any id is allocated or any command
    /// is sent, so bounds and naming errors leave the board untouched.
    /// Failures after that point (pool exhaustion, link loss) roll the
    /// partial chain back: removal commands for every created node, all
    /// ids returned to their pools.
    pub fn build_route(&mut self, link: &Link, decoder: &Decoder, spec: RouteSpec) -> Result<RouteId> {
        self.validate(&spec)?;

        let mut route = Route {
            nodes: Vec::new(),
            attachments: Vec::new(),
            loggers: Vec::new(),
            events: Vec::new(),
            subscribers: Vec::new(),
            subscriptions: Vec::new(),
            notify_enabled: Vec::new(),
            sources: Vec::new(),
            identifier: String::new(),
        };
        match self.emit(link, decoder, spec, &mut route) {
            Ok(()) => {
                let id = self.next_route_id();
                for &node in &route.nodes {
                    self.nodes.get_mut(&node).expect("emitted node missing").route = Some(id);
                }
                debug!(route = id, identifier = %route.identifier, nodes = route.nodes.len(), "route built");
                self.routes.insert(id, route);
                Ok(id)
            }
            Err(err) => {
                self.rollback(link, decoder, route);
                Err(err)
            }
        }
    }

    fn validate(&self, spec: &RouteSpec) -> Result<()> {
        let mut sim = Sim {
            components: spec.source.components,
            split: None,
            packed: false,
            accounted: false,
            has_node: false,
        };
        let mut stack: Vec<Sim> = Vec::new();
        let mut branches: Vec<u32> = Vec::new();
        let mut local_names: HashSet<&str> = HashSet::new();

        for stage in &spec.stages {
            match stage {
                Stage::Split => sim.split = Some(sim.components),
                Stage::Index(n) => {
                    let components = sim.split.take().ok_or(RouteError::IndexWithoutSplit)?;
                    if *n >= components {
                        return Err(RouteError::SplitIndexOutOfBounds {
                            index: *n,
                            components,
                        });
                    }
                    sim.components = 1;
                }
                Stage::Multicast => {
                    stack.push(sim.clone());
                    branches.push(0);
                }
                Stage::To => {
                    let base = stack
                        .last()
                        .ok_or(RouteError::MalformedMulticast("to() outside multicast"))?;
                    sim = base.clone();
                    *branches.last_mut().expect("stack and branches in step") += 1;
                }
                Stage::EndMulticast => {
                    let count = branches
                        .pop()
                        .ok_or(RouteError::MalformedMulticast("end without multicast"))?;
                    if count == 0 {
                        return Err(RouteError::MalformedMulticast("multicast with no branches"));
                    }
                    sim = stack.pop().expect("stack and branches in step");
                }
                Stage::Fuse(names) => {
                    for name in names {
                        if !self.names.contains_key(name) && !local_names.contains(name.as_str()) {
                            return Err(RouteError::UnresolvedName(name.clone()));
                        }
                    }
                    sim.has_node = true;
                }
                Stage::Pack(count) => {
                    if sim.accounted {
                        return Err(RouteError::PackAccountConflict);
                    }
                    if *count == 0 || *count > spec.source.max_pack {
                        return Err(RouteError::PackTooLarge {
                            requested: *count,
                            max: spec.source.max_pack,
                        });
                    }
                    sim.packed = true;
                    sim.has_node = true;
                }
                Stage::Account(_) => {
                    if sim.packed {
                        return Err(RouteError::PackAccountConflict);
                    }
                    sim.accounted = true;
                    sim.has_node = true;
                }
                Stage::Name(name) => {
                    if !sim.has_node {
                        return Err(RouteError::InvalidStage("name() requires a node"));
                    }
                    if self.names.contains_key(name) || !local_names.insert(name.as_str()) {
                        return Err(RouteError::DuplicateName(name.clone()));
                    }
                }
                Stage::Stream(_) | Stage::Log | Stage::React(_) => {}
                linear => {
                    sim.components = linear.output_components(sim.components);
                    sim.split = None;
                    sim.has_node = true;
                }
            }
        }
        if !stack.is_empty() {
            return Err(RouteError::MalformedMulticast("unterminated multicast"));
        }
        Ok(())
    }

    fn emit(
        &mut self,
        link: &Link,
        decoder: &Decoder,
        spec: RouteSpec,
        route: &mut Route,
    ) -> Result<()> {
        let RouteSpec {
            source,
            stages,
            mut handlers,
            mut reactions,
        } = spec;
        let mut upstream = Upstream::from_source(&source);
        let mut stack: Vec<Upstream> = Vec::new();

        for stage in stages {
            match stage {
                Stage::Split => {}
                Stage::Index(n) => {
                    upstream.offset = n * upstream.component_size;
                    upstream.components = 1;
                    upstream.ident.push_str(&format!("[{n}]"));
                }
                Stage::Multicast => stack.push(upstream.clone()),
                Stage::To => {
                    upstream = stack.last().expect("validated multicast").clone();
                }
                Stage::EndMulticast => {
                    upstream = stack.pop().expect("validated multicast");
                }
                Stage::Fuse(names) => {
                    let mut refs = Vec::with_capacity(names.len());
                    let mut params = vec![names.len() as u8];
                    for name in &names {
                        let id = *self
                            .names
                            .get(name)
                            .ok_or_else(|| RouteError::UnresolvedName(name.clone()))?;
                        params.push(id);
                        refs.push(id);
                    }
                    let extra: u8 = refs
                        .iter()
                        .map(|id| {
                            let length = self.nodes[id].source.length;
                            length / upstream.component_size.max(1)
                        })
                        .sum();
                    let components = upstream.components + extra;
                    self.create_node(link, route, &mut upstream, OpKind::Fuse, params, "fuse", components)?;
                    for id in refs {
                        self.nodes.get_mut(&id).expect("fused node missing").consumers += 1;
                        route.attachments.push(id);
                    }
                }
                Stage::Pack(count) => {
                    let components = upstream.components;
                    self.create_node(link, route, &mut upstream, OpKind::Pack, vec![count], "pack", components)?;
                    upstream.layout.pack_count = Some(count);
                }
                Stage::Account(mode) => {
                    let components = upstream.components;
                    self.create_node(
                        link,
                        route,
                        &mut upstream,
                        OpKind::Account,
                        vec![mode.value()],
                        mode.name(),
                        components,
                    )?;
                    upstream.layout.account = Some(mode);
                }
                Stage::Buffer => {
                    let components = upstream.components;
                    self.create_node(link, route, &mut upstream, OpKind::Buffer, Vec::new(), "buffer", components)?;
                }
                Stage::Name(name) => {
                    let id = *route.nodes.last().expect("validated: name follows a node");
                    let node = self.nodes.get_mut(&id).expect("named node missing");
                    node.name = Some(name.clone());
                    self.names.insert(name, id);
                }
                Stage::Stream(idx) => {
                    let key = upstream.key();
                    self.register_source(decoder, route, &upstream, key);
                    let handler = handlers[idx].take().expect("handler emitted once");
                    let subscriber = decoder.add_subscriber(&key, handler)?;
                    route.subscribers.push(subscriber);

                    if let Some(id) = upstream.node {
                        link.send(&Command::new(
                            modules::DATA_PROCESSOR,
                            data_processor::NOTIFY_ENABLE,
                            vec![id, 0x01],
                        ))?;
                        route.notify_enabled.push(id);
                        let address =
                            Address::new(modules::DATA_PROCESSOR, data_processor::NOTIFY);
                        if self.add_subscription(address) {
                            link.send(&Command::subscribe(address))?;
                        }
                        route.subscriptions.push(address);
                        self.nodes.get_mut(&id).expect("streamed node missing").consumers += 1;
                        route.attachments.push(id);
                    } else {
                        let address = Address::new(upstream.module, upstream.register);
                        if self.add_subscription(address) {
                            link.send(&Command::subscribe(address))?;
                        }
                        route.subscriptions.push(address);
                    }
                }
                Stage::Log => {
                    let logger = self.pools.loggers.allocate()?;
                    let payload = vec![
                        logger,
                        upstream.module,
                        upstream.register,
                        upstream.index.unwrap_or(0xff),
                        upstream.offset,
                        upstream.length(),
                    ];
                    if let Err(err) =
                        link.send(&Command::new(modules::LOGGING, logging::TRIGGER, payload))
                    {
                        self.pools.loggers.free(logger);
                        return Err(err.into());
                    }
                    let key = upstream.key();
                    self.register_source(decoder, route, &upstream, key);
                    decoder.register_logger(logger, key);
                    route.loggers.push(LoggerRecord {
                        id: logger,
                        key,
                        identifier: upstream.ident.clone(),
                        config: upstream.config(),
                        layout: upstream.layout,
                    });
                    if let Some(id) = upstream.node {
                        self.nodes.get_mut(&id).expect("logged node missing").consumers += 1;
                        route.attachments.push(id);
                    }
                }
                Stage::React(idx) => {
                    let event_id = self.pools.events.allocate()?;
                    let payload = vec![
                        event_id,
                        upstream.module,
                        upstream.register,
                        upstream.index.unwrap_or(0xff),
                    ];
                    if let Err(err) =
                        link.send(&Command::new(modules::EVENT, event::ENTRY, payload))
                    {
                        self.pools.events.free(event_id);
                        return Err(err.into());
                    }
                    let reaction = reactions[idx].take().expect("reaction emitted once");
                    decoder.register_reaction(event_id, reaction);
                    route.events.push(event_id);
                    if let Some(id) = upstream.node {
                        self.nodes.get_mut(&id).expect("reacted node missing").consumers += 1;
                        route.attachments.push(id);
                    }
                }
                linear => {
                    let (kind, params, segment) =
                        linear.processor().expect("validated linear stage");
                    let components = linear.output_components(upstream.components);
                    self.create_node(link, route, &mut upstream, kind, params, segment, components)?;
                }
            }
        }
        route.identifier = upstream.ident;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_node(
        &mut self,
        link: &Link,
        route: &mut Route,
        upstream: &mut Upstream,
        kind: OpKind,
        params: Vec<u8>,
        segment: &str,
        components: u8,
    ) -> Result<u8> {
        let id = self.pools.processors.allocate()?;
        let mut payload = vec![
            id,
            upstream.module,
            upstream.register,
            upstream.index.unwrap_or(0xff),
            upstream.offset,
            upstream.length(),
            kind.tag(),
        ];
        payload.extend_from_slice(&params);
        if let Err(err) = link.send(&Command::new(
            modules::DATA_PROCESSOR,
            data_processor::ADD,
            payload,
        )) {
            self.pools.processors.free(id);
            return Err(err.into());
        }
        trace!(id, kind = kind.name(), "created processor node");

        let identifier = format!("{}:{segment}?id={id}", upstream.ident);
        if let Some(up) = upstream.node {
            self.nodes.get_mut(&up).expect("upstream node missing").consumers += 1;
        }
        self.nodes.insert(
            id,
            ProcessorNode {
                id,
                kind,
                params,
                source: NodeSource {
                    module: upstream.module,
                    register: upstream.register,
                    index: upstream.index,
                    offset: upstream.offset,
                    length: upstream.length(),
                },
                upstream: upstream.node,
                name: None,
                identifier: identifier.clone(),
                consumers: 0,
                route: None,
            },
        );
        route.nodes.push(id);

        upstream.module = modules::DATA_PROCESSOR;
        upstream.register = data_processor::NOTIFY;
        upstream.index = Some(id);
        upstream.offset = 0;
        upstream.node = Some(id);
        upstream.components = components;
        upstream.ident = identifier;
        Ok(id)
    }

    fn register_source(
        &mut self,
        decoder: &Decoder,
        route: &mut Route,
        upstream: &Upstream,
        key: SourceKey,
    ) {
        decoder.ensure_source(key, &upstream.ident, upstream.config(), upstream.layout);
        self.retain_source(key);
        route.sources.push(key);
    }

    /// Undo a partially emitted route: every registration reversed,
    /// removal commands sent best-effort, all ids freed.
    fn rollback(&mut self, link: &Link, decoder: &Decoder, route: Route) {
        debug!(nodes = route.nodes.len(), "rolling back partially built route");
        for &node in &route.notify_enabled {
            let _ = link.send(&Command::new(
                modules::DATA_PROCESSOR,
                data_processor::NOTIFY_ENABLE,
                vec![node, 0x00],
            ));
        }
        for address in &route.subscriptions {
            if self.release_subscription(*address) {
                let _ = link.send(&Command::unsubscribe(*address));
            }
        }
        for &subscriber in &route.subscribers {
            decoder.remove_subscriber(subscriber);
        }
        for logger in &route.loggers {
            let _ = link.send(&Command::new(
                modules::LOGGING,
                logging::REMOVE,
                vec![logger.id],
            ));
            decoder.remove_logger(logger.id);
            self.pools.loggers.free(logger.id);
        }
        for &event_id in &route.events {
            let _ = link.send(&Command::new(modules::EVENT, event::REMOVE, vec![event_id]));
            decoder.remove_reaction(event_id);
            self.pools.events.free(event_id);
        }
        for key in &route.sources {
            if self.release_source(key) {
                decoder.remove_source(key);
            }
        }
        for &node in &route.attachments {
            if let Some(node) = self.nodes.get_mut(&node) {
                node.consumers -= 1;
            }
        }
        for &id in route.nodes.iter().rev() {
            let node = self.nodes.remove(&id).expect("rolled-back node missing");
            let _ = link.send(&Command::new(
                modules::DATA_PROCESSOR,
                data_processor::REMOVE,
                vec![id],
            ));
            if let Some(name) = &node.name {
                self.names.remove(name);
            }
            self.pools.processors.free(id);
            if let Some(up) = node.upstream {
                if let Some(up) = self.nodes.get_mut(&up) {
                    up.consumers -= 1;
                }
            }
        }
        for &node in &route.attachments {
            let _ = self.try_release(link, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use bytes::Bytes;
    use wearlink_link::LinkConfig;
    use wearlink_transport::{BoardHandle, MockBoard};
    use wearlink_wire::modules::accelerometer;
    use wearlink_wire::{AccountMode, MapFunction};

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
    fn rms_log_route_emits_exactly_two_commands() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .log();
        graph.build_route(&link, &decoder, spec).unwrap();

        let written = handle.written();
        assert_eq!(written.len(), 2);
        // Create the rms node reading 6 bytes of raw acceleration.
        assert_eq!(
            written[0].as_ref(),
            &[
                modules::DATA_PROCESSOR,
                data_processor::ADD,
                0x00,
                modules::ACCELEROMETER,
                accelerometer::DATA,
                0xff,
                0x00,
                0x06,
                OpKind::Map.tag(),
                MapFunction::Rms.value(),
            ]
        );
        // Attach the logger to the rms node's output.
        assert_eq!(
            written[1].as_ref(),
            &[
                modules::LOGGING,
                logging::TRIGGER,
                0x00,
                modules::DATA_PROCESSOR,
                data_processor::NOTIFY,
                0x00,
                0x00,
                0x02,
            ]
        );
    }

    #[test]
    fn identifier_concatenates_stage_names_and_ids() {
        let (link, decoder, mut graph, _handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .accumulate()
            .account(AccountMode::Time)
            .log();
        let route = graph.build_route(&link, &decoder, spec).unwrap();
        assert_eq!(
            graph.route(route).unwrap().identifier(),
            "acceleration:rms?id=0:accumulate?id=1:time?id=2"
        );
    }

    #[test]
    fn split_index_bounds_checked_before_any_command() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .split()
            .index(3)
            .log();
        let err = graph.build_route(&link, &decoder, spec).unwrap_err();
        assert!(matches!(
            err,
            RouteError::SplitIndexOutOfBounds {
                index: 3,
                components: 3
            }
        ));
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn index_requires_split() {
        let (link, decoder, mut graph, _handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration()).index(0).log();
        assert!(matches!(
            graph.build_route(&link, &decoder, spec),
            Err(RouteError::IndexWithoutSplit)
        ));
    }

    #[test]
    fn split_index_selects_component_offset() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .split()
            .index(2)
            .accumulate()
            .log();
        graph.build_route(&link, &decoder, spec).unwrap();

        // The accumulate node reads 2 bytes at offset 4 (the z axis).
        let written = handle.written();
        assert_eq!(written[0][6], 0x04);
        assert_eq!(written[0][7], 0x02);
    }

    #[test]
    fn pack_beyond_source_maximum_rejected() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration()).pack(5).log();
        assert!(matches!(
            graph.build_route(&link, &decoder, spec),
            Err(RouteError::PackTooLarge {
                requested: 5,
                max: 4
            })
        ));
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn pack_account_conflict_in_either_order() {
        let (link, decoder, mut graph, handle) = harness();
        let packed_first = RouteSpec::new(DataSource::acceleration())
            .pack(2)
            .account(AccountMode::Count)
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, packed_first),
            Err(RouteError::PackAccountConflict)
        ));

        let accounted_first = RouteSpec::new(DataSource::acceleration())
            .account(AccountMode::Time)
            .pack(2)
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, accounted_first),
            Err(RouteError::PackAccountConflict)
        ));
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn duplicate_names_rejected_within_and_across_routes() {
        let (link, decoder, mut graph, handle) = harness();
        let twice = RouteSpec::new(DataSource::acceleration())
            .accumulate()
            .name("sum")
            .delta(10)
            .name("sum")
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, twice),
            Err(RouteError::DuplicateName(name)) if name == "sum"
        ));
        assert_eq!(handle.write_count(), 0);

        let first = RouteSpec::new(DataSource::acceleration())
            .accumulate()
            .name("sum")
            .log();
        graph.build_route(&link, &decoder, first).unwrap();
        let before = handle.write_count();

        let second = RouteSpec::new(DataSource::temperature())
            .accumulate()
            .name("sum")
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, second),
            Err(RouteError::DuplicateName(_))
        ));
        assert_eq!(handle.write_count(), before);
    }

    #[test]
    fn exhaustion_rolls_back_partial_chain() {
        let (link, decoder, mut graph, handle) = harness();
        // Leave exactly one processor id free.
        for _ in 0..crate::pool::MAX_PROCESSORS - 1 {
            graph.pools.processors.allocate().unwrap();
        }

        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .accumulate()
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, spec),
            Err(RouteError::ResourceExhausted { pool: "processor" })
        ));

        // The one created node was removed on the wire and its id freed.
        assert_eq!(graph.pools().processors.available(), 1);
        assert!(graph.nodes.is_empty());
        let written = handle.written();
        assert_eq!(
            written.last().unwrap().as_ref(),
            &[modules::DATA_PROCESSOR, data_processor::REMOVE, 27]
        );
    }

    #[test]
    fn fuse_requires_resolvable_names() {
        let (link, decoder, mut graph, handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .fuse(&["missing"])
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, spec),
            Err(RouteError::UnresolvedName(name)) if name == "missing"
        ));
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn fused_node_outlives_its_own_route() {
        let (link, decoder, mut graph, _handle) = harness();
        let named = RouteSpec::new(DataSource::temperature())
            .accumulate()
            .name("temp-sum")
            .log();
        let first = graph.build_route(&link, &decoder, named).unwrap();
        let temp_node = graph.node_by_name("temp-sum").unwrap().id;

        let fusing = RouteSpec::new(DataSource::acceleration())
            .fuse(&["temp-sum"])
            .log();
        let second = graph.build_route(&link, &decoder, fusing).unwrap();

        // The named node is still referenced by the fuse stage.
        graph.remove_route(&link, &decoder, first).unwrap();
        assert!(graph.node(temp_node).is_some());

        graph.remove_route(&link, &decoder, second).unwrap();
        assert!(graph.node(temp_node).is_none());
        assert_eq!(
            graph.pools().processors.available(),
            usize::from(crate::pool::MAX_PROCESSORS)
        );
    }

    #[test]
    fn unterminated_multicast_rejected() {
        let (link, decoder, mut graph, _handle) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .multicast()
            .to()
            .accumulate()
            .log();
        assert!(matches!(
            graph.build_route(&link, &decoder, spec),
            Err(RouteError::MalformedMulticast(_))
        ));
    }

    #[test]
    fn streamed_processor_chain_reaches_handler() {
        let (link, decoder, mut graph, handle) = harness();
        link.set_sink(Box::new(decoder.clone()));

        let (tx, rx) = channel();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .stream(move |sample, _env| {
                let _ = tx.send((sample.source.clone(), sample.values.clone()));
            });
        graph.build_route(&link, &decoder, spec).unwrap();

        // Node notifications are enabled and the processor output is
        // subscribed.
        let written = handle.written();
        assert!(written.iter().any(|f| f.as_ref()
            == [
                modules::DATA_PROCESSOR,
                data_processor::NOTIFY_ENABLE,
                0x00,
                0x01
            ]));
        assert!(written
            .iter()
            .any(|f| f.as_ref() == [modules::DATA_PROCESSOR, data_processor::NOTIFY, 0x01]));

        // Board emits one rms value through node 0.
        handle.inject(&[
            modules::DATA_PROCESSOR,
            data_processor::NOTIFY | 0x80,
            0x00,
            0x00,
            0x08,
        ]);
        let (source, values) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(source, "acceleration:rms?id=0");
        assert_eq!(values, vec![2048.0 / 2048.0]);
    }

    #[test]
    fn react_wires_event_entry_and_callback() {
        let (link, decoder, mut graph, handle) = harness();
        link.set_sink(Box::new(decoder.clone()));

        let (tx, rx) = channel();
        let spec = RouteSpec::new(DataSource::acceleration())
            .threshold(1000)
            .react(move || {
                let _ = tx.send(());
            });
        graph.build_route(&link, &decoder, spec).unwrap();

        let written = handle.written();
        assert_eq!(
            written[1].as_ref(),
            &[
                modules::EVENT,
                event::ENTRY,
                0x00,
                modules::DATA_PROCESSOR,
                data_processor::NOTIFY,
                0x00
            ]
        );

        handle.inject(&Bytes::from_static(&[
            modules::EVENT,
            event::NOTIFY | 0x80,
            0x00,
        ]));
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }
}
