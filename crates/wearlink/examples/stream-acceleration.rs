//! Stream RMS acceleration from a scripted in-memory board.
//!
//! Run with:
//!   cargo run --example stream-acceleration
//!
//! Against real hardware, replace [`MockBoard`] with a transport for
//! your wireless stack; everything else stays the same.

use std::sync::mpsc::channel;
use std::time::Duration;

use wearlink::{DataSource, Device, DeviceConfig, MapFunction, MockBoard, RouteSpec};
use wearlink_wire::modules::{data_processor, DATA_PROCESSOR, DISCOVERY_RANGE};
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
    eprintln!("Connected; {} modules discovered", device.modules().len());

    let (tx, rx) = channel();
    let route = device.build_route(
        RouteSpec::new(DataSource::acceleration())
            .map(MapFunction::Rms)
            .stream(move |sample, _| {
                let _ = tx.send(format!("{}: {:?}", sample.source, sample.values));
            }),
    )?;
    eprintln!("Route built: {}", device.route_identifier(route).unwrap());

    // The scripted board reports three rms samples from processor node 0.
    for raw in [0x0800u16, 0x0400, 0x0200] {
        let [lo, hi] = raw.to_le_bytes();
        handle.inject(&[
            DATA_PROCESSOR,
            data_processor::NOTIFY | RESPONSE_FLAG,
            0x00,
            lo,
            hi,
        ]);
    }

    for _ in 0..3 {
        eprintln!("{}", rx.recv_timeout(Duration::from_secs(1))?);
    }

    device.remove_route(route)?;
    device.disconnect()?;
    Ok(())
}
