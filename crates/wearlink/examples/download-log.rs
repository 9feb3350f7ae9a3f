//! Download logged samples from a scripted in-memory board.
//!
//! Run with:
//!   cargo run --example download-log
//!
//! The board is scripted to hold two logged rms samples; the route is
//! compiled first so the decoder knows how to interpret logger 0's
//! entries.

use std::thread;
use std::time::Duration;

use wearlink::{
    DataSource, Device, DeviceConfig, DownloadConfig, DownloadSinks, MapFunction, MockBoard,
    RouteSpec,
};
use wearlink_wire::modules::{logging, DISCOVERY_RANGE, LOGGING};
use wearlink_wire::{INFO, RESPONSE_FLAG};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (board, handle) = MockBoard::new();
    for module in DISCOVERY_RANGE {
        handle.reply_to(
            &[module, INFO],
            &[module, INFO | RESPONSE_FLAG, 0x01, 0x00],
        );
    }

    let device = Device::connect(Box::new(board), DeviceConfig::default())?;
    device.build_route(
        RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .log(),
    )?;

    // Simulate the board draining its log once the readout starts.
    let injector = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        for (tick, raw) in [(100u32, 0x0800u16), (110, 0x0400)] {
            let mut frame = vec![LOGGING, logging::READOUT_NOTIFY | RESPONSE_FLAG, 0x00];
            frame.extend_from_slice(&tick.to_le_bytes());
            frame.extend_from_slice(&raw.to_le_bytes());
            handle.inject(&frame);
        }
        let mut end = vec![LOGGING, logging::READOUT_PROGRESS | RESPONSE_FLAG];
        end.extend_from_slice(&0u32.to_le_bytes());
        handle.inject(&end);
    });

    let sinks = DownloadSinks::new(|sample| {
        eprintln!(
            "{} @ {}us: {:?}",
            sample.source, sample.timestamp_us, sample.values
        );
    })
    .with_progress(|remaining| eprintln!("{remaining} entries remaining"));

    let summary = device.download_log(
        DownloadConfig {
            progress_interval: 1,
            timeout: Duration::from_secs(5),
        },
        sinks,
    )?;
    eprintln!("Downloaded {} entries ({} unknown)", summary.entries, summary.unknown);

    injector.join().expect("injector thread panicked");
    device.disconnect()?;
    Ok(())
}
