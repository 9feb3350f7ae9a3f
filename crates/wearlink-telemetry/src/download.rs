use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tracing::info;
use wearlink_link::Link;
use wearlink_wire::modules::{logging, LOGGING};
use wearlink_wire::Command;

use crate::decoder::Decoder;
use crate::error::{Result, TelemetryError};
use crate::sample::Sample;

/// Parameters for a log download session.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Entries between board-side progress notifications.
    pub progress_interval: u32,
    /// Overall deadline for the session.
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            progress_interval: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Callbacks driven while a download session runs. All of them are
/// invoked on the link's dispatcher context.
pub struct DownloadSinks {
    pub on_sample: Box<dyn FnMut(Sample) + Send>,
    pub on_progress: Box<dyn FnMut(u32) + Send>,
    pub on_error: Box<dyn FnMut(TelemetryError) + Send>,
}

impl DownloadSinks {
    /// Sample sink with no-op progress and error callbacks.
    pub fn new(on_sample: impl FnMut(Sample) + Send + 'static) -> Self {
        Self {
            on_sample: Box::new(on_sample),
            on_progress: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }

    pub fn with_progress(mut self, on_progress: impl FnMut(u32) + Send + 'static) -> Self {
        self.on_progress = Box::new(on_progress);
        self
    }

    pub fn with_error(mut self, on_error: impl FnMut(TelemetryError) + Send + 'static) -> Self {
        self.on_error = Box::new(on_error);
        self
    }
}

/// Totals reported when a download session concludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Entries decoded and delivered to `on_sample`.
    pub entries: u64,
    /// Entries that could not be decoded (unknown logger, short payload).
    pub unknown: u64,
}

/// Download the board's log, blocking until the board reports zero
/// entries remaining.
///
/// The decoder must be registered as the link's notification sink, and
/// every logger expected in the readout must already be mapped to its
/// source. Entries from unmapped loggers are reported through `on_error`
/// and counted in the summary; they never abort the session.
pub fn download_log(
    link: &Link,
    decoder: &Decoder,
    config: DownloadConfig,
    sinks: DownloadSinks,
) -> Result<DownloadSummary> {
    let done = decoder.begin_download(sinks)?;

    let start = Command::new(
        LOGGING,
        logging::READOUT,
        config.progress_interval.to_le_bytes().to_vec(),
    );
    if let Err(err) = link.send(&start) {
        decoder.cancel_download(TelemetryError::Disconnected);
        let _ = done.try_recv();
        return Err(err.into());
    }

    match done.recv_timeout(config.timeout) {
        Ok(result) => {
            if let Ok(summary) = &result {
                info!(
                    entries = summary.entries,
                    unknown = summary.unknown,
                    "log download complete"
                );
            }
            result
        }
        Err(RecvTimeoutError::Timeout) => {
            decoder.cancel_download(TelemetryError::Timeout(config.timeout));
            let _ = done.try_recv();
            Err(TelemetryError::Timeout(config.timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(TelemetryError::Disconnected),
    }
}
