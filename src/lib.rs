//! # thermo-rf-decode
//!
//! Decoder for the radio transmissions of a two-probe wireless thermometer,
//! working from the digital edge stream of a 433 MHz receiver module.
//!
//! The transmitter uses a biphase pulse-position code: bits are carried by
//! the time between edges, not by the line level. This crate:
//!
//! - classifies every inter-edge interval against tunable timing windows,
//! - runs the sync/preamble/data state machine that assembles 104-slot frames,
//! - hands completed frames off the edge callback through a queue,
//! - decodes the two probe temperatures from each frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thermo_rf_decode::{
//!     frame_channel, DecoderConfig, EdgeClock, EdgeDecoder, EdgeHandler, Level,
//!     ReadingMonitor, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = DecoderConfig::from_env()?;
//!     let (tx, rx) = frame_channel(&config.queue);
//!
//!     // Consumer: interprets and logs readings.
//!     let monitor = ReadingMonitor::spawn(rx, config.layout);
//!     let _handle = monitor.on_reading(|readings| {
//!         println!("probe 1: {:?}, probe 2: {:?}", readings.probe1, readings.probe2);
//!     });
//!
//!     // Producer: hand this callback to the GPIO watch facility.
//!     let decoder = EdgeDecoder::new(config.thresholds);
//!     let mut on_level = EdgeHandler::new(decoder, tx).into_callback(EdgeClock::new());
//!     std::thread::spawn(move || {
//!         // e.g. pin.watch(Edge::Both, move |level| on_level(level))
//!         on_level(Level::Low);
//!     });
//!
//!     monitor.join().await
//! }
//! ```
//!
//! ## Threading
//!
//! The decoder is single-writer: feed it from exactly one context. The
//! default [`QueuePolicy::Block`] blocks that context while the queue is
//! full: use a plain thread, a `spawn_blocking` thread or a multi-thread
//! runtime, never a task on a current-thread runtime.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data and config types

// Public modules
pub mod config;
pub mod data;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod receiver;
pub mod strobe;

// Re-exports for convenience
pub use config::DecoderConfig;
pub use error::{Error, Result};
pub use monitor::{CallbackHandle, ReadingMonitor};
pub use receiver::{
    frame_channel, EdgeHandler, FrameReceiver, FrameSender, QueueConfig, QueuePolicy,
    SharedEdgeHandler,
};
pub use strobe::{DebugPins, StrobePin};

// Re-export commonly used types from submodules
pub use data::{FrameLayout, FrameReadings, ProbeId, ProbeReading};
pub use protocol::{
    DecoderState, DecoderStats, EdgeClock, EdgeDecoder, EdgeEvent, EdgeSink, EdgeSynthesizer,
    Frame, Level, NibbleSequence, PulseThresholds, PulseWidthClass,
};
