//! Replay synthesized transmissions through the full decode pipeline
//!
//! Run with: cargo run --example replay -- [probe1] [probe2]
//!
//! Each argument is a reading to encode (between -532 and 491). The edge
//! stream is fed from a plain thread, the way a GPIO callback would deliver
//! it; timestamps come from the synthesizer rather than the wall clock.

use std::time::Duration;
use thermo_rf_decode::protocol::FRAME_BITS;
use thermo_rf_decode::{
    frame_channel, DecoderConfig, EdgeDecoder, EdgeHandler, EdgeSynthesizer, Error, Frame,
    FrameLayout, ReadingMonitor, Result,
};

const DIGIT_NIBBLES: [u8; 4] = [0x5, 0x6, 0x9, 0xA];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let probe1 = parse_reading(args.first().map(String::as_str).unwrap_or("72"))?;
    let probe2 = parse_reading(args.get(1).map(String::as_str).unwrap_or("-40"))?;

    println!("Replay");
    println!("======\n");
    println!("Encoding probe 1 = {}, probe 2 = {}\n", probe1, probe2);

    let config = DecoderConfig::from_env()?;
    let (tx, rx) = frame_channel(&config.queue);
    let monitor = ReadingMonitor::spawn(rx, config.layout);
    let _callback = monitor.on_reading(|readings| {
        println!(
            "[{}] probe 1: {:?}  probe 2: {:?}  data: {}",
            readings.received_at.format("%H:%M:%S%.3f"),
            readings.probe1,
            readings.probe2,
            readings.nibbles
        );
    });

    let frame = encode_readings(probe1, probe2, &config.layout);
    let synth = EdgeSynthesizer::default();
    let thresholds = config.thresholds;

    let producer = std::thread::spawn(move || {
        let mut handler = EdgeHandler::new(EdgeDecoder::new(thresholds), tx);
        let mut offset = Duration::ZERO;

        // The transmitter repeats its frame; send three copies.
        for _ in 0..3 {
            let events = synth.encode(&frame, offset);
            for event in &events {
                if let Err(e) = handler.handle(*event) {
                    eprintln!("Edge handler stopped: {}", e);
                    return;
                }
            }
            offset = events.last().map(|e| e.timestamp).unwrap_or(offset)
                + Duration::from_millis(100);
            std::thread::sleep(Duration::from_millis(100));
        }

        let stats = handler.sink().stats();
        println!(
            "\nDecoder: {} edges, {} frames, {} preamble errors, {} data errors",
            stats.edges, stats.frames_completed, stats.preamble_errors, stats.data_errors
        );
        handler.close();
    });

    tokio::task::spawn_blocking(move || producer.join())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
        .map_err(|_| Error::Internal("producer thread panicked".to_string()))?;

    monitor.join().await?;
    // Let the callback task print the last reading.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Frames interpreted: {}", monitor.frames_processed());

    Ok(())
}

fn parse_reading(raw: &str) -> Result<i32> {
    let value: i32 = raw.parse().map_err(|_| Error::InvalidParameter {
        name: "reading".to_string(),
        value: raw.to_string(),
    })?;
    let calibrated = value + FrameLayout::CALIBRATION_OFFSET;
    if !(0..1024).contains(&calibrated) {
        return Err(Error::InvalidParameter {
            name: "reading".to_string(),
            value: raw.to_string(),
        });
    }
    Ok(value)
}

/// Build a frame whose probe windows carry the given readings.
fn encode_readings(probe1: i32, probe2: i32, layout: &FrameLayout) -> Frame {
    let mut nibbles = [0x5u8; 26];
    for (offset, reading) in [(layout.probe1_offset, probe1), (layout.probe2_offset, probe2)] {
        let mut value = (reading + layout.calibration_offset) as u32;
        for position in (0..FrameLayout::DIGITS).rev() {
            nibbles[offset + position] = DIGIT_NIBBLES[(value % 4) as usize];
            value /= 4;
        }
    }

    let mut bits = [0u8; FRAME_BITS];
    for (i, nibble) in nibbles.iter().enumerate() {
        for j in 0..4 {
            bits[i * 4 + j] = (nibble >> (3 - j)) & 1;
        }
    }
    Frame::from_bits(&bits)
}
