//! Serializable image of the route graph, for carrying logger decode
//! state across sessions. The facade wraps this in an opaque byte blob;
//! the field layout here is an implementation detail.

use serde::{Deserialize, Serialize};
use wearlink_telemetry::{FrameLayout, SourceConfig, SourceKey};
use wearlink_wire::AccountMode;

use crate::graph::LoggerRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub loggers: Vec<LoggerSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: u8,
    pub tag: u8,
    pub params: Vec<u8>,
    pub src_module: u8,
    pub src_register: u8,
    pub src_index: Option<u8>,
    pub offset: u8,
    pub length: u8,
    pub name: Option<String>,
    pub identifier: String,
}

/// Everything needed to decode one logger's entries in a later session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSnapshot {
    pub id: u8,
    pub identifier: String,
    pub module: u8,
    pub register: u8,
    pub index: Option<u8>,
    pub scale: f64,
    pub components: u8,
    pub component_size: u8,
    pub signed: bool,
    pub period_us: u32,
    pub pack_count: Option<u8>,
    /// Account header mode as its wire value, if the stream is accounted.
    pub account: Option<u8>,
}

impl LoggerSnapshot {
    pub(crate) fn from_record(record: &LoggerRecord) -> Self {
        Self {
            id: record.id,
            identifier: record.identifier.clone(),
            module: record.key.module,
            register: record.key.register,
            index: record.key.index,
            scale: record.config.scale,
            components: record.config.components,
            component_size: record.config.component_size,
            signed: record.config.signed,
            period_us: record.config.period_us,
            pack_count: record.layout.pack_count,
            account: record.layout.account.map(AccountMode::value),
        }
    }

    pub fn key(&self) -> SourceKey {
        match self.index {
            Some(index) => SourceKey::indexed(self.module, self.register, index),
            None => SourceKey::new(self.module, self.register),
        }
    }

    pub fn config(&self) -> SourceConfig {
        SourceConfig {
            scale: self.scale,
            components: self.components,
            component_size: self.component_size,
            signed: self.signed,
            period_us: self.period_us,
        }
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            pack_count: self.pack_count,
            account: self.account.and_then(AccountMode::from_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wearlink_link::{Link, LinkConfig};
    use wearlink_telemetry::Decoder;
    use wearlink_transport::MockBoard;
    use wearlink_wire::MapFunction;

    use crate::graph::RouteGraph;
    use crate::sources::DataSource;
    use crate::spec::RouteSpec;

    use super::*;

    fn harness() -> (Link, Decoder, RouteGraph) {
        let (board, _handle) = MockBoard::new();
        let link = Link::open(
            Box::new(board),
            LinkConfig {
                response_timeout: Duration::from_millis(100),
                sweep_interval: Duration::from_millis(5),
            },
        )
        .unwrap();
        (link, Decoder::new(1000), RouteGraph::new())
    }

    #[test]
    fn snapshot_serializes_and_parses_back() {
        let (link, decoder, mut graph) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .account(wearlink_wire::AccountMode::Time)
            .log();
        graph.build_route(&link, &decoder, spec).unwrap();

        let snapshot = graph.snapshot();
        let blob = serde_json::to_vec(&snapshot).unwrap();
        let parsed: GraphSnapshot = serde_json::from_slice(&blob).unwrap();

        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.loggers.len(), 1);
        assert_eq!(
            parsed.loggers[0].identifier,
            "acceleration:rms?id=0:time?id=1"
        );
        assert_eq!(parsed.loggers[0].layout().account, Some(AccountMode::Time));
    }

    #[test]
    fn restore_rebuilds_decode_state_in_a_fresh_session() {
        let (link, decoder, mut graph) = harness();
        let spec = RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .account(wearlink_wire::AccountMode::Time)
            .log();
        graph.build_route(&link, &decoder, spec).unwrap();
        let snapshot = graph.snapshot();

        // Fresh connection, no route-building code available.
        let (_link2, decoder2, mut graph2) = harness();
        graph2.restore(&snapshot, &decoder2).unwrap();

        // Snapshot ids are reserved, not reissued.
        assert_eq!(
            graph2.pools().processors.available(),
            usize::from(crate::pool::MAX_PROCESSORS) - 2
        );
        assert_eq!(
            graph2.pools().loggers.available(),
            usize::from(crate::pool::MAX_LOGGERS) - 1
        );

        // Logged entries from the old session decode with the restored
        // configuration.
        let entry = wearlink_telemetry::LogEntry {
            logger_id: 0,
            tick: 500,
            payload: bytes::Bytes::from_static(&[0x00, 0x08]),
        };
        let sample = decoder2.decode_log(&entry).unwrap();
        assert_eq!(sample.source, "acceleration:rms?id=0:time?id=1");
        assert_eq!(sample.values, vec![1.0]);
    }

    #[test]
    fn restore_rejects_unknown_tags() {
        let (_link, decoder, mut graph) = harness();
        let snapshot = GraphSnapshot {
            nodes: vec![NodeSnapshot {
                id: 0,
                tag: 0x7e,
                params: vec![],
                src_module: 0x03,
                src_register: 0x04,
                src_index: None,
                offset: 0,
                length: 6,
                name: None,
                identifier: "acceleration:?".to_string(),
            }],
            loggers: vec![],
        };
        assert!(matches!(
            graph.restore(&snapshot, &decoder),
            Err(crate::RouteError::UnknownProcessorTag { tag: 0x7e })
        ));
    }
}
