//! Protocol module for turning edge timings into frames.
//!
//! This module contains the implementations for:
//! - Edge events and their timestamps
//! - Pulse width classification
//! - The edge decoder state machine
//! - Frame storage and nibble regrouping
//! - Edge synthesis for replaying known frames

pub mod decoder;
pub mod edge;
pub mod frame;
pub mod pulse;
pub mod synth;

pub use decoder::{DecoderState, DecoderStats, EdgeDecoder, EdgeSink};
pub use edge::{EdgeClock, EdgeEvent, Level};
pub use frame::{Frame, NibbleSequence, FRAME_BITS, FRAME_BYTES, NIBBLE_COUNT};
pub use pulse::{PulseThresholds, PulseWidthClass};
pub use synth::EdgeSynthesizer;
