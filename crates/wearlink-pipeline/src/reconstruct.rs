//! Route reconstruction from device state alone.
//!
//! A board that logged data in a previous session still holds its
//! processor chain and logger bindings. Reading those back and matching
//! each node's tag against the operation table rebuilds enough of the
//! route to decode the logged entries, without the route-building code
//! that created them. Unknown tags fail reconstruction; guessing would
//! silently mis-decode data.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use wearlink_link::Link;
use wearlink_telemetry::{FrameLayout, SourceConfig, SourceKey};
use wearlink_wire::modules::{data_processor, logging};
use wearlink_wire::{modules, AccountMode, Command, MapFunction, OpKind, RESPONSE_FLAG};

use crate::error::{Result, RouteError};
use crate::pool::{MAX_LOGGERS, MAX_PROCESSORS};
use crate::sources;

/// One processor slot read back from the board. Mirrors the creation
/// command: `[id, src_module, src_register, src_index, offset, length,
/// tag, params…]`.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub id: u8,
    pub src_module: u8,
    pub src_register: u8,
    pub src_index: Option<u8>,
    pub offset: u8,
    pub length: u8,
    pub tag: u8,
    pub params: Bytes,
}

impl ChainEntry {
    /// `None` for an empty slot (0xff in place of the source module).
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        if payload.len() >= 2 && payload[1] == 0xff {
            return Ok(None);
        }
        if payload.len() < 7 {
            return Err(RouteError::MalformedReadback { len: payload.len() });
        }
        Ok(Some(Self {
            id: payload[0],
            src_module: payload[1],
            src_register: payload[2],
            src_index: (payload[3] != 0xff).then_some(payload[3]),
            offset: payload[4],
            length: payload[5],
            tag: payload[6],
            params: Bytes::copy_from_slice(&payload[7..]),
        }))
    }
}

/// One logger slot read back from the board: the source address it
/// records from.
#[derive(Debug, Clone)]
pub struct LoggerBinding {
    pub id: u8,
    pub src_module: u8,
    pub src_register: u8,
    pub src_index: Option<u8>,
    pub offset: u8,
    pub length: u8,
}

impl LoggerBinding {
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        if payload.len() >= 2 && payload[1] == 0xff {
            return Ok(None);
        }
        if payload.len() < 6 {
            return Err(RouteError::MalformedReadback { len: payload.len() });
        }
        Ok(Some(Self {
            id: payload[0],
            src_module: payload[1],
            src_register: payload[2],
            src_index: (payload[3] != 0xff).then_some(payload[3]),
            offset: payload[4],
            length: payload[5],
        }))
    }
}

/// Read every processor slot's configuration. All requests go out
/// before the first response is awaited.
pub fn fetch_chain(link: &Link, timeout: Option<Duration>) -> Result<Vec<ChainEntry>> {
    let mut completions = Vec::with_capacity(usize::from(MAX_PROCESSORS));
    for id in 0..MAX_PROCESSORS {
        let cmd = Command::new(
            modules::DATA_PROCESSOR,
            data_processor::READ_CONFIG,
            vec![id],
        );
        let prefix = vec![
            modules::DATA_PROCESSOR,
            data_processor::READ_CONFIG | RESPONSE_FLAG,
            id,
        ];
        completions.push(link.request_with_prefix(&cmd, prefix, timeout)?);
    }

    let mut entries = Vec::new();
    for completion in completions {
        let frame = completion.wait()?;
        let response = Command::decode(&frame)?;
        if let Some(entry) = ChainEntry::parse(&response.payload)? {
            entries.push(entry);
        }
    }
    debug!(count = entries.len(), "read processor chain");
    Ok(entries)
}

/// Read every logger slot's trigger binding. A write register is read
/// by addressing it with the response bit set.
pub fn fetch_loggers(link: &Link, timeout: Option<Duration>) -> Result<Vec<LoggerBinding>> {
    let mut completions = Vec::with_capacity(usize::from(MAX_LOGGERS));
    for id in 0..MAX_LOGGERS {
        let cmd = Command::new(
            modules::LOGGING,
            logging::TRIGGER | RESPONSE_FLAG,
            vec![id],
        );
        let prefix = vec![modules::LOGGING, logging::TRIGGER | RESPONSE_FLAG, id];
        completions.push(link.request_with_prefix(&cmd, prefix, timeout)?);
    }

    let mut bindings = Vec::new();
    for completion in completions {
        let frame = completion.wait()?;
        let response = Command::decode(&frame)?;
        if let Some(binding) = LoggerBinding::parse(&response.payload)? {
            bindings.push(binding);
        }
    }
    debug!(count = bindings.len(), "read logger bindings");
    Ok(bindings)
}

/// A route rebuilt from device state: enough to re-register its logger
/// with the decoder and download last session's data.
#[derive(Debug, Clone)]
pub struct ReconstructedRoute {
    pub logger_id: u8,
    /// Deterministic identifier: source plus `:op?id=N` per stage.
    pub identifier: String,
    pub key: SourceKey,
    pub config: SourceConfig,
    pub layout: FrameLayout,
    /// Chain node ids, root first.
    pub nodes: Vec<u8>,
}

/// Rebuild one route per logger binding by walking each binding's
/// source back to a catalog root through the reported chain entries.
pub fn reconstruct_routes(
    entries: &[ChainEntry],
    loggers: &[LoggerBinding],
) -> Result<Vec<ReconstructedRoute>> {
    let by_id: HashMap<u8, &ChainEntry> = entries.iter().map(|e| (e.id, e)).collect();

    let mut routes = Vec::with_capacity(loggers.len());
    for binding in loggers {
        let mut chain: Vec<&ChainEntry> = Vec::new();
        let mut module = binding.src_module;
        let mut register = binding.src_register;
        let mut index = binding.src_index;
        while module == modules::DATA_PROCESSOR && register == data_processor::NOTIFY {
            let id = index.ok_or(RouteError::MalformedReadback { len: 0 })?;
            let entry = *by_id
                .get(&id)
                .ok_or(RouteError::MissingChainNode { id })?;
            chain.push(entry);
            module = entry.src_module;
            register = entry.src_register;
            index = entry.src_index;
        }
        let source = sources::resolve(module, register, index)
            .ok_or(RouteError::UnknownSourceAddress { module, register })?;
        chain.reverse();

        let mut identifier = source.identifier();
        let mut components = source.components;
        let mut layout = FrameLayout::default();
        for entry in &chain {
            let kind = OpKind::from_tag(entry.tag)
                .ok_or(RouteError::UnknownProcessorTag { tag: entry.tag })?;
            if entry.offset != 0 && source.component_size > 0 {
                // A non-zero read offset is a split-index selection.
                identifier.push_str(&format!("[{}]", entry.offset / source.component_size));
                components = 1;
            }
            let segment = match kind {
                OpKind::Map => {
                    let value = first_param(entry)?;
                    let function = MapFunction::from_value(value)
                        .ok_or(RouteError::UnknownProcessorTag { tag: entry.tag })?;
                    if matches!(function, MapFunction::Rms | MapFunction::Rss) {
                        components = 1;
                    }
                    function.name()
                }
                OpKind::Account => {
                    let mode = AccountMode::from_value(first_param(entry)?)
                        .ok_or(RouteError::UnknownProcessorTag { tag: entry.tag })?;
                    layout.account = Some(mode);
                    mode.name()
                }
                OpKind::Pack => {
                    layout.pack_count = Some(first_param(entry)?);
                    "pack"
                }
                other => other.name(),
            };
            identifier.push_str(&format!(":{segment}?id={}", entry.id));
        }

        let key = match chain.last() {
            Some(last) => {
                SourceKey::indexed(modules::DATA_PROCESSOR, data_processor::NOTIFY, last.id)
            }
            None => source.key(),
        };
        routes.push(ReconstructedRoute {
            logger_id: binding.id,
            identifier,
            key,
            config: SourceConfig {
                scale: source.scale,
                components,
                component_size: source.component_size,
                signed: source.signed,
                period_us: source.period_us,
            },
            layout,
            nodes: chain.iter().map(|e| e.id).collect(),
        });
    }
    Ok(routes)
}

fn first_param(entry: &ChainEntry) -> Result<u8> {
    entry
        .params
        .first()
        .copied()
        .ok_or(RouteError::MalformedReadback { len: 0 })
}
