use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tracing::{trace, warn};
use wearlink_link::NotificationSink;
use wearlink_wire::modules;
use wearlink_wire::{AccountMode, Command};

use crate::download::{DownloadSinks, DownloadSummary};
use crate::error::{Result, TelemetryError};
use crate::sample::{LogEntry, Sample};
use crate::timebase::TickTracker;

/// Identity of one telemetry source: wire address plus an optional
/// sub-index for multi-instance sources (processor outputs keyed by node
/// id, GPIO frames keyed by pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub module: u8,
    pub register: u8,
    pub index: Option<u8>,
}

impl SourceKey {
    pub fn new(module: u8, register: u8) -> Self {
        Self {
            module,
            register: register & !wearlink_wire::RESPONSE_FLAG,
            index: None,
        }
    }

    pub fn indexed(module: u8, register: u8, index: u8) -> Self {
        Self {
            index: Some(index),
            ..Self::new(module, register)
        }
    }
}

/// Live per-source interpretation parameters. Mutable at runtime; the
/// decoder reads through the shared handle on every decode, never a
/// value captured at route-creation time.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Multiplier applied to each raw component value.
    pub scale: f64,
    pub components: u8,
    pub component_size: u8,
    pub signed: bool,
    /// Nominal sampling period, for inter-sample spacing of packed data.
    pub period_us: u32,
}

impl SourceConfig {
    pub fn sample_width(&self) -> usize {
        usize::from(self.components) * usize::from(self.component_size)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            components: 1,
            component_size: 1,
            signed: false,
            period_us: 0,
        }
    }
}

/// Frame-level layout of one source's notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameLayout {
    /// Maximum samples packed into one frame, if the stream is packed.
    pub pack_count: Option<u8>,
    /// Header mode, if the stream is accounted.
    pub account: Option<AccountMode>,
}

/// Opaque per-subscriber host-side state threaded through callbacks.
pub struct Env(pub Option<Box<dyn Any + Send>>);

/// Subscriber callback invoked once per decoded sample.
pub type SampleHandler = Box<dyn FnMut(&Sample, &mut Env) + Send>;

struct Subscriber {
    handler: SampleHandler,
    env: Env,
}

struct SourceEntry {
    label: String,
    config: Arc<Mutex<SourceConfig>>,
    layout: FrameLayout,
    ticks: TickTracker,
    subscribers: Vec<u64>,
}

pub(crate) struct DownloadState {
    pub(crate) sinks: DownloadSinks,
    pub(crate) entries: u64,
    pub(crate) unknown: u64,
    pub(crate) done: Sender<Result<DownloadSummary>>,
}

struct DecoderInner {
    epoch: Instant,
    tick_period_us: u64,
    sources: HashMap<SourceKey, SourceEntry>,
    indexed: HashSet<(u8, u8)>,
    loggers: HashMap<u8, SourceKey>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
    reactions: HashMap<u8, Box<dyn FnMut() + Send>>,
    download: Option<DownloadState>,
}

/// Telemetry decoder for one board connection.
///
/// Cheap to clone; clones share state. Registered as the link's
/// notification sink, so all decoding runs on the serialized dispatcher
/// context.
#[derive(Clone)]
pub struct Decoder {
    inner: Arc<Mutex<DecoderInner>>,
}

impl Decoder {
    /// `tick_period_us` is the wall-clock length of one device tick.
    /// The epoch for all timestamps is the moment of construction
    /// (connect time).
    pub fn new(tick_period_us: u64) -> Self {
        let mut indexed = HashSet::new();
        // Processor outputs and GPIO frames carry their instance id as
        // the first payload byte.
        indexed.insert((modules::DATA_PROCESSOR, modules::data_processor::NOTIFY));
        indexed.insert((modules::GPIO, modules::gpio::ANALOG));
        Self {
            inner: Arc::new(Mutex::new(DecoderInner {
                epoch: Instant::now(),
                tick_period_us,
                sources: HashMap::new(),
                indexed,
                loggers: HashMap::new(),
                subscribers: HashMap::new(),
                next_subscriber: 1,
                reactions: HashMap::new(),
                download: None,
            })),
        }
    }

    /// Register a source, or return the existing live-config handle if
    /// the key is already known.
    pub fn ensure_source(
        &self,
        key: SourceKey,
        label: &str,
        config: SourceConfig,
        layout: FrameLayout,
    ) -> Arc<Mutex<SourceConfig>> {
        let mut inner = self.lock();
        let entry = inner.sources.entry(key).or_insert_with(|| SourceEntry {
            label: label.to_string(),
            config: Arc::new(Mutex::new(config)),
            layout,
            ticks: TickTracker::new(),
            subscribers: Vec::new(),
        });
        Arc::clone(&entry.config)
    }

    pub fn remove_source(&self, key: &SourceKey) {
        let mut inner = self.lock();
        if let Some(entry) = inner.sources.remove(key) {
            for id in entry.subscribers {
                inner.subscribers.remove(&id);
            }
        }
    }

    pub fn source_label(&self, key: &SourceKey) -> Option<String> {
        self.lock().sources.get(key).map(|e| e.label.clone())
    }

    /// Attach a sample handler to a registered source.
    pub fn add_subscriber(&self, key: &SourceKey, handler: SampleHandler) -> Result<u64> {
        let mut inner = self.lock();
        if !inner.sources.contains_key(key) {
            return Err(TelemetryError::UnknownSource {
                module: key.module,
                register: key.register,
            });
        }
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                handler,
                env: Env(None),
            },
        );
        inner
            .sources
            .get_mut(key)
            .expect("source checked above")
            .subscribers
            .push(id);
        Ok(id)
    }

    pub fn remove_subscriber(&self, id: u64) {
        let mut inner = self.lock();
        inner.subscribers.remove(&id);
        for entry in inner.sources.values_mut() {
            entry.subscribers.retain(|&sub| sub != id);
        }
    }

    /// Replace a subscriber's environment slot.
    pub fn set_env(&self, id: u64, value: Option<Box<dyn Any + Send>>) {
        if let Some(sub) = self.lock().subscribers.get_mut(&id) {
            sub.env = Env(value);
        }
    }

    /// Associate a logger id with the source whose configuration decodes
    /// its entries.
    pub fn register_logger(&self, logger_id: u8, key: SourceKey) {
        self.lock().loggers.insert(logger_id, key);
    }

    pub fn remove_logger(&self, logger_id: u8) {
        self.lock().loggers.remove(&logger_id);
    }

    /// Register a host-side reaction fired on an event notification.
    pub fn register_reaction(&self, event_id: u8, reaction: Box<dyn FnMut() + Send>) {
        self.lock().reactions.insert(event_id, reaction);
    }

    pub fn remove_reaction(&self, event_id: u8) {
        self.lock().reactions.remove(&event_id);
    }

    /// Decode a notification frame into typed samples.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<Sample>> {
        self.decode_with_key(frame).map(|(_, samples)| samples)
    }

    fn decode_with_key(&self, frame: &[u8]) -> Result<(SourceKey, Vec<Sample>)> {
        let cmd = Command::decode(frame)?;
        let module = cmd.address.module;
        let register = cmd.address.register_id();

        let mut inner = self.lock();
        let (key, payload) = if inner.indexed.contains(&(module, register)) {
            let index = *cmd.payload.first().ok_or(TelemetryError::ShortPayload {
                source_name: format!("{}/{register:#04x}", modules::module_name(module)),
                len: 0,
                expected: 1,
            })?;
            (
                SourceKey::indexed(module, register, index),
                cmd.payload.slice(1..),
            )
        } else {
            (SourceKey::new(module, register), cmd.payload.clone())
        };

        let arrival_us = inner.epoch.elapsed().as_micros() as u64;
        let tick_period_us = inner.tick_period_us;
        let entry = inner
            .sources
            .get_mut(&key)
            .ok_or(TelemetryError::UnknownSource { module, register })?;

        let config = entry
            .config
            .lock()
            .expect("source config lock poisoned")
            .clone();
        let label = entry.label.clone();
        let layout = entry.layout;

        let (timestamp_us, seq, data) = match layout.account {
            Some(mode) => {
                if payload.len() < 4 {
                    return Err(TelemetryError::ShortPayload {
                        source_name: label,
                        len: payload.len(),
                        expected: 4,
                    });
                }
                let header =
                    u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let rest = payload.slice(4..);
                match mode {
                    AccountMode::Count => (arrival_us, Some(header), rest),
                    AccountMode::Time => {
                        let extended = entry.ticks.extend(header);
                        (extended * tick_period_us, None, rest)
                    }
                }
            }
            None => (arrival_us, None, payload),
        };

        let samples = split_samples(&label, &config, layout, &data, timestamp_us, seq)?;
        trace!(source = %label, count = samples.len(), "decoded frame");
        Ok((key, samples))
    }

    /// Decode one downloaded log entry using the owning route's live
    /// configuration.
    pub fn decode_log(&self, entry: &LogEntry) -> Result<Sample> {
        let mut inner = self.lock();
        let key = *inner
            .loggers
            .get(&entry.logger_id)
            .ok_or(TelemetryError::UnknownLogEntry {
                logger_id: entry.logger_id,
            })?;
        let tick_period_us = inner.tick_period_us;
        let source = inner
            .sources
            .get_mut(&key)
            .ok_or(TelemetryError::UnknownLogEntry {
                logger_id: entry.logger_id,
            })?;

        let config = source
            .config
            .lock()
            .expect("source config lock poisoned")
            .clone();
        let width = config.sample_width();
        if entry.payload.len() < width {
            return Err(TelemetryError::ShortPayload {
                source_name: source.label.clone(),
                len: entry.payload.len(),
                expected: width,
            });
        }
        let timestamp_us = source.ticks.extend(entry.tick) * tick_period_us;
        let data = entry.payload.slice(..width);
        Ok(Sample {
            source: source.label.clone(),
            timestamp_us,
            values: component_values(&data, &config),
            data,
            seq: None,
            sub_index: 0,
        })
    }

    /// Begin a download session. Resolved through the returned receiver
    /// when the board reports zero entries remaining, the link drops, or
    /// the session is cancelled.
    pub fn begin_download(
        &self,
        sinks: DownloadSinks,
    ) -> Result<Receiver<Result<DownloadSummary>>> {
        let mut inner = self.lock();
        if inner.download.is_some() {
            return Err(TelemetryError::DownloadInProgress);
        }
        let (done, rx) = channel();
        inner.download = Some(DownloadState {
            sinks,
            entries: 0,
            unknown: 0,
            done,
        });
        Ok(rx)
    }

    /// Abort the active download session, if any.
    pub fn cancel_download(&self, reason: TelemetryError) {
        if let Some(state) = self.lock().download.take() {
            let _ = state.done.send(Err(reason));
        }
    }

    /// Full inbound dispatch: log readout traffic, event reactions, then
    /// plain data frames fanned out to subscribers.
    pub fn handle_frame(&self, frame: &Bytes) -> Result<()> {
        let cmd = Command::decode(frame)?;
        let module = cmd.address.module;
        let register = cmd.address.register_id();

        if module == modules::LOGGING && register == modules::logging::READOUT_NOTIFY {
            return self.handle_log_frame(&cmd.payload);
        }
        if module == modules::LOGGING && register == modules::logging::READOUT_PROGRESS {
            return self.handle_progress(&cmd.payload);
        }
        if module == modules::EVENT && register == modules::event::NOTIFY {
            return self.handle_event(&cmd.payload);
        }
        self.handle_data(frame)
    }

    fn handle_data(&self, frame: &[u8]) -> Result<()> {
        let (key, samples) = self.decode_with_key(frame)?;
        let subscriber_ids = {
            let inner = self.lock();
            inner
                .sources
                .get(&key)
                .map(|entry| entry.subscribers.clone())
                .unwrap_or_default()
        };

        for sample in &samples {
            for &id in &subscriber_ids {
                // Lift the subscriber out while its handler runs so the
                // handler may call back into the decoder.
                let taken = self.lock().subscribers.remove(&id);
                if let Some(mut sub) = taken {
                    (sub.handler)(sample, &mut sub.env);
                    self.lock().subscribers.insert(id, sub);
                }
            }
        }
        Ok(())
    }

    fn handle_log_frame(&self, payload: &Bytes) -> Result<()> {
        let decoded = LogEntry::parse(payload).and_then(|entry| self.decode_log(&entry));

        let taken = self.lock().download.take();
        let Some(mut state) = taken else {
            warn!("log entry outside a download session");
            return Ok(());
        };

        match decoded {
            Ok(sample) => {
                state.entries += 1;
                (state.sinks.on_sample)(sample);
            }
            Err(err) => {
                state.unknown += 1;
                (state.sinks.on_error)(err);
            }
        }
        self.lock().download = Some(state);
        Ok(())
    }

    fn handle_progress(&self, payload: &Bytes) -> Result<()> {
        if payload.len() < 4 {
            return Err(TelemetryError::ShortPayload {
                source_name: "readout progress".to_string(),
                len: payload.len(),
                expected: 4,
            });
        }
        let remaining = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);

        let taken = self.lock().download.take();
        let Some(mut state) = taken else {
            return Ok(());
        };

        if remaining == 0 {
            let summary = DownloadSummary {
                entries: state.entries,
                unknown: state.unknown,
            };
            let _ = state.done.send(Ok(summary));
            return Ok(());
        }
        (state.sinks.on_progress)(remaining);
        self.lock().download = Some(state);
        Ok(())
    }

    fn handle_event(&self, payload: &Bytes) -> Result<()> {
        let Some(&event_id) = payload.first() else {
            return Err(TelemetryError::ShortPayload {
                source_name: "event".to_string(),
                len: 0,
                expected: 1,
            });
        };
        let taken = self.lock().reactions.remove(&event_id);
        if let Some(mut reaction) = taken {
            reaction();
            self.lock().reactions.entry(event_id).or_insert(reaction);
        } else {
            warn!(event_id, "event for unknown reaction");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DecoderInner> {
        self.inner.lock().expect("decoder lock poisoned")
    }
}

impl NotificationSink for Decoder {
    fn on_frame(&mut self, frame: Bytes) {
        // A malformed frame is fatal to that sample, never the link.
        if let Err(err) = self.handle_frame(&frame) {
            warn!(%err, "dropping undecodable frame");
        }
    }

    fn on_disconnect(&mut self) {
        self.cancel_download(TelemetryError::Disconnected);
    }
}

fn split_samples(
    label: &str,
    config: &SourceConfig,
    layout: FrameLayout,
    data: &Bytes,
    timestamp_us: u64,
    seq: Option<u32>,
) -> Result<Vec<Sample>> {
    let width = config.sample_width();
    let short = |len| TelemetryError::ShortPayload {
        source_name: label.to_string(),
        len,
        expected: width,
    };
    if width == 0 || data.len() < width {
        return Err(short(data.len()));
    }

    let count = match layout.pack_count {
        Some(_) => {
            if data.len() % width != 0 {
                return Err(short(data.len()));
            }
            data.len() / width
        }
        None => {
            if data.len() != width {
                return Err(short(data.len()));
            }
            1
        }
    };

    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        let chunk = data.slice(i * width..(i + 1) * width);
        samples.push(Sample {
            source: label.to_string(),
            timestamp_us,
            values: component_values(&chunk, config),
            data: chunk,
            seq,
            sub_index: i as u8,
        });
    }
    Ok(samples)
}

fn component_values(data: &Bytes, config: &SourceConfig) -> Vec<f64> {
    let size = usize::from(config.component_size);
    data.chunks(size)
        .map(|chunk| raw_component(chunk, config.signed) as f64 * config.scale)
        .collect()
}

fn raw_component(bytes: &[u8], signed: bool) -> i64 {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= u64::from(*byte) << (8 * i);
    }
    let bits = bytes.len() * 8;
    if signed && bits < 64 {
        let sign = 1u64 << (bits - 1);
        if value & sign != 0 {
            return (value as i64) - (1i64 << bits);
        }
    }
    value as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use wearlink_wire::modules::{accelerometer, ACCELEROMETER, DATA_PROCESSOR};

    fn accel_config() -> SourceConfig {
        SourceConfig {
            scale: 0.5,
            components: 3,
            component_size: 2,
            signed: true,
            period_us: 10_000,
        }
    }

    fn accel_key() -> SourceKey {
        SourceKey::new(ACCELEROMETER, accelerometer::DATA)
    }

    #[test]
    fn decodes_plain_vector_sample() {
        let decoder = Decoder::new(1000);
        decoder.ensure_source(accel_key(), "acceleration", accel_config(), FrameLayout::default());

        // x=1, y=-2, z=256, little-endian i16.
        let frame = [
            ACCELEROMETER,
            accelerometer::DATA | 0x80,
            0x01, 0x00, 0xfe, 0xff, 0x00, 0x01,
        ];
        let samples = decoder.decode(&frame).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].values, vec![0.5, -1.0, 128.0]);
        assert_eq!(samples[0].sub_index, 0);
        assert_eq!(samples[0].source, "acceleration");
    }

    #[test]
    fn unknown_source_rejected() {
        let decoder = Decoder::new(1000);
        let err = decoder
            .decode(&[ACCELEROMETER, accelerometer::DATA | 0x80, 0x00])
            .unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownSource { .. }));
    }

    #[test]
    fn packed_frame_splits_with_sub_indices() {
        let decoder = Decoder::new(1000);
        let key = SourceKey::indexed(
            DATA_PROCESSOR,
            modules::data_processor::NOTIFY,
            4,
        );
        decoder.ensure_source(
            key,
            "acceleration:pack?id=4",
            SourceConfig {
                scale: 1.0,
                components: 1,
                component_size: 2,
                signed: false,
                period_us: 5_000,
            },
            FrameLayout {
                pack_count: Some(4),
                account: None,
            },
        );

        let frame = [
            DATA_PROCESSOR,
            modules::data_processor::NOTIFY | 0x80,
            0x04, // node id
            0x0a, 0x00, 0x0b, 0x00, 0x0c, 0x00,
        ];
        let samples = decoder.decode(&frame).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(
            samples.iter().map(|s| s.sub_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(samples[2].values, vec![12.0]);
        // All share the frame's nominal timestamp.
        assert!(samples.iter().all(|s| s.timestamp_us == samples[0].timestamp_us));
    }

    #[test]
    fn accounted_count_header_becomes_seq() {
        let decoder = Decoder::new(1000);
        let key = SourceKey::indexed(DATA_PROCESSOR, modules::data_processor::NOTIFY, 1);
        decoder.ensure_source(
            key,
            "temperature:account?id=1",
            SourceConfig {
                scale: 1.0,
                components: 1,
                component_size: 2,
                signed: true,
                period_us: 0,
            },
            FrameLayout {
                pack_count: None,
                account: Some(AccountMode::Count),
            },
        );

        let frame = [
            DATA_PROCESSOR,
            modules::data_processor::NOTIFY | 0x80,
            0x01,
            0x2a, 0x00, 0x00, 0x00, // count = 42
            0x10, 0x00,
        ];
        let samples = decoder.decode(&frame).unwrap();
        assert_eq!(samples[0].seq, Some(42));
        assert_eq!(samples[0].values, vec![16.0]);
    }

    #[test]
    fn tick_timestamps_monotonic_across_wrap() {
        let decoder = Decoder::new(1000);
        let key = SourceKey::indexed(DATA_PROCESSOR, modules::data_processor::NOTIFY, 2);
        decoder.ensure_source(
            key,
            "switch:account?id=2",
            SourceConfig {
                scale: 1.0,
                components: 1,
                component_size: 1,
                signed: false,
                period_us: 0,
            },
            FrameLayout {
                pack_count: None,
                account: Some(AccountMode::Time),
            },
        );

        let frame_at = |tick: u32| {
            let t = tick.to_le_bytes();
            vec![
                DATA_PROCESSOR,
                modules::data_processor::NOTIFY | 0x80,
                0x02,
                t[0], t[1], t[2], t[3],
                0x01,
            ]
        };

        let first = decoder.decode(&frame_at(0xFFFF_FFF5)).unwrap();
        let second = decoder.decode(&frame_at(0x0000_0005)).unwrap();
        assert!(second[0].timestamp_us > first[0].timestamp_us);
        assert_eq!(second[0].timestamp_us - first[0].timestamp_us, 0x10 * 1000);
    }

    #[test]
    fn decode_reads_live_config() {
        let decoder = Decoder::new(1000);
        let config =
            decoder.ensure_source(accel_key(), "acceleration", accel_config(), FrameLayout::default());

        let frame = [
            ACCELEROMETER,
            accelerometer::DATA | 0x80,
            0x02, 0x00, 0x02, 0x00, 0x02, 0x00,
        ];
        assert_eq!(decoder.decode(&frame).unwrap()[0].values, vec![1.0, 1.0, 1.0]);

        // A range change updates the shared handle; the decoder must see it.
        config.lock().unwrap().scale = 2.0;
        assert_eq!(decoder.decode(&frame).unwrap()[0].values, vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn decode_idempotent_when_config_untouched() {
        let decoder = Decoder::new(1000);
        let config =
            decoder.ensure_source(accel_key(), "acceleration", accel_config(), FrameLayout::default());

        let frame = [
            ACCELEROMETER,
            accelerometer::DATA | 0x80,
            0x03, 0x00, 0x04, 0x00, 0x05, 0x00,
        ];
        let before = decoder.decode(&frame).unwrap();
        // An unrelated read of the config is not a scale-changing write.
        let _ = config.lock().unwrap().clone();
        let after = decoder.decode(&frame).unwrap();
        assert_eq!(before[0].values, after[0].values);
        assert_eq!(before[0].data, after[0].data);
    }

    #[test]
    fn short_payload_fatal_to_sample_only() {
        let decoder = Decoder::new(1000);
        decoder.ensure_source(accel_key(), "acceleration", accel_config(), FrameLayout::default());

        let short = [ACCELEROMETER, accelerometer::DATA | 0x80, 0x01, 0x00];
        assert!(matches!(
            decoder.decode(&short),
            Err(TelemetryError::ShortPayload { .. })
        ));

        // The decoder still works for the next, well-formed frame.
        let ok = [
            ACCELEROMETER,
            accelerometer::DATA | 0x80,
            0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
        ];
        assert!(decoder.decode(&ok).is_ok());
    }

    #[test]
    fn subscribers_receive_samples_with_env() {
        let decoder = Decoder::new(1000);
        decoder.ensure_source(accel_key(), "acceleration", accel_config(), FrameLayout::default());

        let (tx, rx) = channel();
        let id = decoder
            .add_subscriber(
                &accel_key(),
                Box::new(move |sample, env| {
                    let count = env
                        .0
                        .get_or_insert_with(|| Box::new(0u32))
                        .downcast_mut::<u32>()
                        .expect("env holds a counter");
                    *count += 1;
                    let _ = tx.send((sample.values.clone(), *count));
                }),
            )
            .unwrap();

        let frame = Bytes::from_static(&[
            ACCELEROMETER,
            accelerometer::DATA | 0x80,
            0x02, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        decoder.handle_frame(&frame).unwrap();
        decoder.handle_frame(&frame).unwrap();

        assert_eq!(rx.recv().unwrap(), (vec![1.0, 0.0, 0.0], 1));
        assert_eq!(rx.recv().unwrap().1, 2);

        decoder.remove_subscriber(id);
        decoder.handle_frame(&frame).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn log_entries_demultiplex_across_loggers() {
        let decoder = Decoder::new(1000);
        let accel = decoder.ensure_source(
            accel_key(),
            "acceleration",
            accel_config(),
            FrameLayout::default(),
        );
        let _ = accel;
        let temp_key = SourceKey::new(modules::TEMPERATURE, modules::temperature::VALUE);
        decoder.ensure_source(
            temp_key,
            "temperature",
            SourceConfig {
                scale: 0.125,
                components: 1,
                component_size: 2,
                signed: true,
                period_us: 0,
            },
            FrameLayout::default(),
        );
        decoder.register_logger(0, accel_key());
        decoder.register_logger(1, temp_key);

        // Interleaved entries; loggers need not be contiguous.
        let a1 = decoder
            .decode_log(&LogEntry {
                logger_id: 0,
                tick: 100,
                payload: Bytes::from_static(&[1, 0, 2, 0, 3, 0]),
            })
            .unwrap();
        let t1 = decoder
            .decode_log(&LogEntry {
                logger_id: 1,
                tick: 150,
                payload: Bytes::from_static(&[0x10, 0x00]),
            })
            .unwrap();
        let a2 = decoder
            .decode_log(&LogEntry {
                logger_id: 0,
                tick: 200,
                payload: Bytes::from_static(&[4, 0, 5, 0, 6, 0]),
            })
            .unwrap();

        assert_eq!(a1.source, "acceleration");
        assert_eq!(t1.source, "temperature");
        assert_eq!(t1.values, vec![2.0]);
        assert_eq!(a2.timestamp_us - a1.timestamp_us, 100 * 1000);
    }

    #[test]
    fn unknown_logger_reported() {
        let decoder = Decoder::new(1000);
        let err = decoder
            .decode_log(&LogEntry {
                logger_id: 9,
                tick: 0,
                payload: Bytes::from_static(&[0x00]),
            })
            .unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownLogEntry { logger_id: 9 }));
    }

    #[test]
    fn reactions_fire_on_event_notifications() {
        let decoder = Decoder::new(1000);
        let (tx, rx) = channel();
        decoder.register_reaction(
            3,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        let frame = Bytes::from_static(&[modules::EVENT, modules::event::NOTIFY | 0x80, 0x03]);
        decoder.handle_frame(&frame).unwrap();
        rx.try_recv().unwrap();
    }
}
