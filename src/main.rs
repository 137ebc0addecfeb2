//! # RF433 Loopback
//!
//! Host-side loopback of the 433 MHz link layer.
//!
//! Sends a handful of records through a simulated wire with the configured
//! link parameters, replays the recorded waveform into a receiver whose clock
//! runs slightly off, and reports what came through.
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/link.toml
//! RUST_LOG=rf433_link=debug cargo run
//! ```
//!
//! Expected output:
//! ```text
//! INFO rf433_loopback: RF433 loopback v0.1.0 starting...
//! INFO rf433_loopback: Link: 3000 bit/s, Normal link, Crc8 checksum
//! INFO rf433_loopback: Received 0x01020304 (4 bytes)
//! ```

use anyhow::{Context, Result};
use tracing::{info, warn};

use rf433_link::config::Config;
use rf433_link::hal::sim::SimWire;
use rf433_link::link::receiver::Receiver;
use rf433_link::link::transmitter::Transmitter;

/// Receiver clock error applied in the loopback (0.5% fast)
const RX_SKEW_PPM: i32 = 5_000;

/// Receiver poll interval in microseconds
const POLL_INTERVAL_US: u64 = 10;

/// Quiet time between two frames in microseconds
const FRAME_GAP_US: u64 = 50_000;

/// Records sent in every run
const RECORDS: [u32; 4] = [0x0102_0304, 0, 0xDEAD_BEEF, u32::MAX];

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("RF433 loopback v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };
    config.validate()?;

    info!(
        "Link: {} bit/s, {:?} link, {:?} checksum",
        config.link.bit_rate, config.link.quality, config.link.checksum
    );

    let wire = SimWire::new();
    let mut tx = Transmitter::new(
        wire.tx_pin(),
        wire.delay(),
        wire.clock(),
        &config.link,
        config.transmitter.buffer_capacity,
    )?;

    for record in RECORDS {
        info!("Sending 0x{:08X} ({} us on air)", record, tx.airtime_us(4 + config.link.checksum.len()));
        tx.send_data(&record)?;
        wire.advance_us(FRAME_GAP_US);
    }

    let mut rx = Receiver::new(
        wire.rx_pin(),
        wire.clock_with(0, RX_SKEW_PPM),
        &config.link,
        config.receiver.buffer_capacity,
    )?;

    let end_ns = wire.end_ns() + FRAME_GAP_US * 1_000;
    wire.rewind();

    let mut received = Vec::new();
    while wire.now_ns() < end_ns {
        if rx.has_data()? {
            let record: u32 = rx.read_record()?;
            info!("Received 0x{:08X} ({} bytes)", record, rx.size());
            received.push(record);
        }
        wire.advance_us(POLL_INTERVAL_US);
    }

    if received == RECORDS {
        info!("All {} records came through", RECORDS.len());
    } else {
        warn!("Received {} of {} records", received.len(), RECORDS.len());
    }

    Ok(())
}
