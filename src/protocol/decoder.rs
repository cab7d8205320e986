//! Edge-driven protocol state machine.
//!
//! The decoder is invoked once per edge. It classifies the interval since
//! the previous edge and advances a three-state machine:
//!
//! ```text
//!          TwentyClock/falling              TwoClock
//!   Idle ───────────────────▶ Preamble ────────────────▶ Data
//!    ▲                          │  ▲ OneClock/rising       │
//!    │        malformed         │  └ TwentyClock/falling   │
//!    ├──────────────────────────┘                          │
//!    │   Short, Long, half-bit followed by TwoClock,       │
//!    └──────────── or 103 bits received ───────────────────┘
//! ```
//!
//! In the Data state a one-clock interval is only half of a bit cell. The
//! first half sets `wait_count`; the second commits a repeat of the previous
//! bit. A two-clock interval commits a toggled bit and is only legal when no
//! half is pending.

use std::time::Duration;
use tracing::{debug, trace, warn};

use super::edge::EdgeEvent;
use super::frame::{Frame, FRAME_BITS};
use super::pulse::{PulseThresholds, PulseWidthClass};
use crate::error::{Error, Result};
use crate::strobe::DebugPins;

/// Consumer of edge events.
///
/// A GPIO watch facility (or a test) calls [`EdgeSink::on_edge`] for every
/// transition, strictly one at a time.
pub trait EdgeSink {
    /// Process one edge. Returns the completed frame, if this edge finished one.
    fn on_edge(&mut self, event: EdgeEvent) -> Option<Frame>;
}

/// State of the protocol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecoderState {
    /// Waiting for a sync marker.
    #[default]
    Idle,
    /// Sync seen, waiting for the first bit pair.
    Preamble,
    /// Assembling frame bits.
    Data,
}

impl std::fmt::Display for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Preamble => write!(f, "Preamble"),
            Self::Data => write!(f, "Data"),
        }
    }
}

/// Running counters kept by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderStats {
    /// Edges processed.
    pub edges: u64,
    /// Sync markers that moved the decoder out of Idle.
    pub syncs: u64,
    /// Frames completed.
    pub frames_completed: u64,
    /// Preamble faults.
    pub preamble_errors: u64,
    /// Data faults (frames discarded).
    pub data_errors: u64,
}

/// Stateful edge decoder.
///
/// Owns the in-progress frame and all state machine counters. It is a
/// single-writer component: feed it from one context only.
///
/// # Example
///
/// ```
/// use thermo_rf_decode::protocol::{EdgeDecoder, EdgeEvent, Level, DecoderState};
///
/// let mut decoder = EdgeDecoder::default();
/// decoder.step(EdgeEvent::from_micros(100, Level::Low)).unwrap();
/// decoder.step(EdgeEvent::from_micros(5_100, Level::High)).unwrap();
/// assert_eq!(decoder.state(), DecoderState::Preamble);
/// ```
#[derive(Debug)]
pub struct EdgeDecoder {
    thresholds: PulseThresholds,
    state: DecoderState,
    bit_count: usize,
    wait_count: u8,
    last_edge: Duration,
    frame: Frame,
    stats: DecoderStats,
    pins: DebugPins,
}

impl EdgeDecoder {
    /// Create a decoder with the given pulse thresholds.
    pub fn new(thresholds: PulseThresholds) -> Self {
        Self {
            thresholds,
            state: DecoderState::Idle,
            bit_count: 0,
            wait_count: 0,
            last_edge: Duration::ZERO,
            frame: Frame::new(),
            stats: DecoderStats::default(),
            pins: DebugPins::none(),
        }
    }

    /// Attach debug strobe outputs.
    pub fn with_debug_pins(mut self, pins: DebugPins) -> Self {
        self.pins = pins;
        self
    }

    /// Current state machine state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Index of the last written bit slot.
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Whether half of a bit cell is pending.
    pub fn wait_count(&self) -> u8 {
        self.wait_count
    }

    /// Thresholds used for classification.
    pub fn thresholds(&self) -> &PulseThresholds {
        &self.thresholds
    }

    /// Counters since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame and return to Idle.
    ///
    /// The previous edge timestamp is kept, so the next interval is still
    /// measured correctly.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.bit_count = 0;
        self.wait_count = 0;
        self.frame = Frame::new();
    }

    /// Process one edge.
    ///
    /// Returns `Ok(Some(frame))` when this edge completed a frame,
    /// `Ok(None)` when more edges are needed, and `Err` when the edge broke
    /// the protocol. On error the decoder is already back in Idle and ready
    /// to resynchronize on the next sync marker.
    pub fn step(&mut self, event: EdgeEvent) -> Result<Option<Frame>> {
        self.pins.enter();

        let dt_us = event.micros_since(self.last_edge);
        self.last_edge = event.timestamp;
        let edge = event.edge_bit();
        let width = self.thresholds.classify(dt_us);
        self.stats.edges += 1;

        trace!(dt_us, %width, edge, state = %self.state, "edge");

        let result = match self.state {
            DecoderState::Idle => {
                self.idle(width, edge);
                Ok(None)
            }
            DecoderState::Preamble => self.preamble(width, edge, dt_us).map(|_| None),
            DecoderState::Data => {
                self.pins.data_state();
                self.data(width, edge, dt_us)
            }
        };

        self.pins.exit();
        result
    }

    fn idle(&mut self, width: PulseWidthClass, edge: u8) {
        if width == PulseWidthClass::TwentyClock && edge == 0 {
            self.bit_count = 0;
            self.wait_count = 0;
            self.state = DecoderState::Preamble;
            self.stats.syncs += 1;
        }
    }

    fn preamble(&mut self, width: PulseWidthClass, edge: u8, dt_us: u64) -> Result<()> {
        match (width, edge) {
            (PulseWidthClass::TwoClock, _) => {
                self.bit_count += 1;
                self.frame.set(self.bit_count, edge ^ 1);
                self.bit_count += 1;
                self.frame.set(self.bit_count, edge);
                self.state = DecoderState::Data;
                Ok(())
            }
            (PulseWidthClass::OneClock, 1) | (PulseWidthClass::TwentyClock, 0) => Ok(()),
            _ => {
                self.state = DecoderState::Idle;
                self.stats.preamble_errors += 1;
                Err(Error::Preamble {
                    dt_us,
                    width,
                    edge,
                    wait_count: self.wait_count,
                    bit_count: self.bit_count,
                })
            }
        }
    }

    fn data(&mut self, width: PulseWidthClass, edge: u8, dt_us: u64) -> Result<Option<Frame>> {
        match width {
            PulseWidthClass::OneClock if self.wait_count == 0 => {
                self.wait_count = 1;
                return Ok(None);
            }
            PulseWidthClass::OneClock => {
                self.commit(self.previous_bit());
                self.wait_count = 0;
            }
            PulseWidthClass::TwoClock if self.wait_count == 0 => {
                self.commit(self.previous_bit() ^ 1);
            }
            _ => return Err(self.data_fault(width, edge, dt_us)),
        }

        if self.bit_count >= FRAME_BITS {
            return Ok(Some(self.complete()));
        }
        Ok(None)
    }

    fn previous_bit(&self) -> u8 {
        self.frame.bit(self.bit_count - 1).unwrap_or(0)
    }

    fn commit(&mut self, bit: u8) {
        self.frame.set(self.bit_count, bit);
        self.bit_count += 1;
    }

    fn complete(&mut self) -> Frame {
        let frame = std::mem::take(&mut self.frame);
        self.bit_count = 0;
        self.wait_count = 0;
        self.state = DecoderState::Idle;
        self.stats.frames_completed += 1;
        debug!(frames = self.stats.frames_completed, "frame complete");
        frame
    }

    fn data_fault(&mut self, width: PulseWidthClass, edge: u8, dt_us: u64) -> Error {
        let err = Error::Data {
            dt_us,
            width,
            edge,
            wait_count: self.wait_count,
            bit_count: self.bit_count,
        };
        self.pins.data_error();
        self.reset();
        self.stats.data_errors += 1;
        err
    }
}

impl Default for EdgeDecoder {
    fn default() -> Self {
        Self::new(PulseThresholds::default())
    }
}

impl EdgeSink for EdgeDecoder {
    fn on_edge(&mut self, event: EdgeEvent) -> Option<Frame> {
        match self.step(event) {
            Ok(frame) => frame,
            Err(err @ Error::Preamble { .. }) => {
                debug!("{}", err);
                None
            }
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::edge::Level;
    use crate::protocol::synth::EdgeSynthesizer;
    use crate::strobe::MockStrobePin;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Feeds edges separated by the given gaps, alternating levels.
    struct Feeder {
        decoder: EdgeDecoder,
        now_us: u64,
    }

    impl Feeder {
        fn new() -> Self {
            Self::with_thresholds(PulseThresholds::default())
        }

        fn with_thresholds(thresholds: PulseThresholds) -> Self {
            Self {
                decoder: EdgeDecoder::new(thresholds),
                now_us: 1_000_000,
            }
        }

        fn push(&mut self, gap_us: u64, level: Level) -> Result<Option<Frame>> {
            self.now_us += gap_us;
            self.decoder
                .step(EdgeEvent::from_micros(self.now_us, level))
        }

        /// Sync marker: a falling edge 20 clocks after the previous one.
        fn sync(&mut self) {
            self.push(0, Level::Low).unwrap();
            self.push(5_000, Level::High).unwrap();
            assert_eq!(self.decoder.state(), DecoderState::Preamble);
        }

        /// Sync marker followed by a preamble double-bit with the given edge.
        fn enter_data(&mut self, preamble_level: Level) {
            self.sync();
            self.push(500, preamble_level).unwrap();
            assert_eq!(self.decoder.state(), DecoderState::Data);
        }
    }

    #[test]
    fn test_initial_state() {
        let decoder = EdgeDecoder::default();
        assert_eq!(decoder.state(), DecoderState::Idle);
        assert_eq!(decoder.bit_count(), 0);
        assert_eq!(decoder.wait_count(), 0);
        assert_eq!(decoder.stats(), DecoderStats::default());
    }

    #[test]
    fn test_idle_ignores_everything_but_falling_sync() {
        let mut feeder = Feeder::new();
        for (gap, level) in [
            (100, Level::High),
            (500, Level::High),
            (5_000, Level::Low),
            (20_000, Level::High),
            (2_000, Level::Low),
        ] {
            assert_eq!(feeder.push(gap, level), Ok(None));
            assert_eq!(feeder.decoder.state(), DecoderState::Idle);
        }

        feeder.push(5_000, Level::High).unwrap();
        assert_eq!(feeder.decoder.state(), DecoderState::Preamble);
        assert_eq!(feeder.decoder.stats().syncs, 1);
    }

    #[test]
    fn test_preamble_tolerates_rising_one_clock_and_repeated_sync() {
        let mut feeder = Feeder::new();
        feeder.sync();
        feeder.push(250, Level::Low).unwrap();
        assert_eq!(feeder.decoder.state(), DecoderState::Preamble);
        feeder.push(5_000, Level::High).unwrap();
        assert_eq!(feeder.decoder.state(), DecoderState::Preamble);
        assert_eq!(feeder.decoder.bit_count(), 0);
    }

    #[test]
    fn test_preamble_fault_returns_to_idle() {
        let mut feeder = Feeder::new();
        feeder.sync();
        let err = feeder.push(250, Level::High).unwrap_err();
        assert!(matches!(
            err,
            Error::Preamble {
                width: PulseWidthClass::OneClock,
                edge: 0,
                ..
            }
        ));
        assert_eq!(feeder.decoder.state(), DecoderState::Idle);
        assert_eq!(feeder.decoder.stats().preamble_errors, 1);
    }

    #[test]
    fn test_preamble_writes_first_bit_pair() {
        let mut feeder = Feeder::new();
        // Level Low is a rising edge (bit 1): slot 1 = 0, slot 2 = 1.
        feeder.enter_data(Level::Low);
        assert_eq!(feeder.decoder.bit_count(), 2);
        assert_eq!(feeder.decoder.frame.bit(1), Some(0));
        assert_eq!(feeder.decoder.frame.bit(2), Some(1));
    }

    #[test]
    fn test_half_bit_pairing() {
        let mut feeder = Feeder::new();
        feeder.enter_data(Level::High);
        // slot 1 = 1, slot 2 = 0 (overwritten by the first data commit)

        feeder.push(250, Level::Low).unwrap();
        assert_eq!(feeder.decoder.wait_count(), 1);
        assert_eq!(feeder.decoder.bit_count(), 2);

        feeder.push(250, Level::High).unwrap();
        assert_eq!(feeder.decoder.wait_count(), 0);
        assert_eq!(feeder.decoder.bit_count(), 3);
        assert_eq!(feeder.decoder.frame.bit(2), Some(1));

        feeder.push(500, Level::Low).unwrap();
        assert_eq!(feeder.decoder.bit_count(), 4);
        assert_eq!(feeder.decoder.frame.bit(3), Some(0));
    }

    #[test]
    fn test_two_clock_after_half_bit_is_fault() {
        let mut feeder = Feeder::new();
        feeder.enter_data(Level::High);
        feeder.push(250, Level::Low).unwrap();
        let err = feeder.push(500, Level::High).unwrap_err();
        assert!(matches!(
            err,
            Error::Data {
                width: PulseWidthClass::TwoClock,
                wait_count: 1,
                ..
            }
        ));
        assert_eq!(feeder.decoder.state(), DecoderState::Idle);
        assert_eq!(feeder.decoder.wait_count(), 0);
        assert_eq!(feeder.decoder.stats().data_errors, 1);
    }

    #[test]
    fn test_long_pulse_in_data_discards_frame() {
        let mut feeder = Feeder::new();
        feeder.enter_data(Level::High);
        for _ in 0..40 {
            feeder.push(500, Level::Low).unwrap();
        }
        assert_eq!(feeder.decoder.bit_count(), 42);

        let err = feeder.push(2_000, Level::High).unwrap_err();
        assert!(err.is_decoder_fault());
        assert_eq!(feeder.decoder.state(), DecoderState::Idle);
        assert_eq!(feeder.decoder.bit_count(), 0);
        assert_eq!(feeder.decoder.frame, Frame::new());
    }

    #[test]
    fn test_frame_completes_after_103_bits() {
        let mut feeder = Feeder::new();
        feeder.enter_data(Level::High);

        let mut completed = None;
        for _ in 2..FRAME_BITS {
            assert!(completed.is_none());
            completed = feeder.push(500, Level::Low).unwrap();
        }
        let frame = completed.expect("frame should complete on slot 103");

        assert_eq!(frame.bit(0), Some(0));
        // Every commit toggles, so bits alternate from slot 1 = 1.
        for index in 1..FRAME_BITS {
            assert_eq!(frame.bit(index), Some((index % 2) as u8), "slot {}", index);
        }
        assert_eq!(feeder.decoder.state(), DecoderState::Idle);
        assert_eq!(feeder.decoder.bit_count(), 0);
        assert_eq!(feeder.decoder.wait_count(), 0);
        assert_eq!(feeder.decoder.frame, Frame::new());
        assert_eq!(feeder.decoder.stats().frames_completed, 1);
    }

    #[test]
    fn test_on_edge_swallows_faults() {
        let mut decoder = EdgeDecoder::default();
        let mut events = EdgeSynthesizer::default().sync_marker(Duration::ZERO);
        events.push(EdgeEvent::from_micros(7_000, Level::Low));
        for event in events {
            assert_eq!(decoder.on_edge(event), None);
        }
        assert_eq!(decoder.state(), DecoderState::Idle);
        assert_eq!(decoder.stats().preamble_errors, 1);
    }

    #[test]
    fn test_resynchronizes_after_fault() {
        let expected = Frame::from_bits(&[1; FRAME_BITS]);
        let synth = EdgeSynthesizer::default();
        let mut decoder = EdgeDecoder::default();

        let mut events = synth.sync_marker(Duration::ZERO);
        events.push(EdgeEvent::from_micros(7_000, Level::Low));
        events.extend(synth.encode(&expected, Duration::from_millis(17)));

        let frames: Vec<Frame> = events
            .into_iter()
            .filter_map(|e| decoder.on_edge(e))
            .collect();
        assert_eq!(frames, vec![expected]);
        assert_eq!(decoder.stats().preamble_errors, 1);
        assert_eq!(decoder.stats().frames_completed, 1);
    }

    #[test]
    fn test_strobes_follow_edge_handler() {
        let mut sync = MockStrobePin::new();
        sync.expect_set_high().times(3).return_const(());
        sync.expect_set_low().times(3).return_const(());
        let mut error = MockStrobePin::new();
        error.expect_pulse().times(1).return_const(());

        let mut decoder = EdgeDecoder::default()
            .with_debug_pins(DebugPins::none().with_sync(sync).with_error(error));

        decoder.step(EdgeEvent::from_micros(5_000, Level::High)).unwrap();
        assert_eq!(decoder.state(), DecoderState::Preamble);
        decoder.step(EdgeEvent::from_micros(5_500, Level::High)).unwrap();
        assert_eq!(decoder.state(), DecoderState::Data);
        assert!(decoder.step(EdgeEvent::from_micros(7_500, Level::Low)).is_err());
    }
    #[test]
    fn test_data_strobe_tracks_data_state() {
        let mut seq = Sequence::new();
        let mut data = MockStrobePin::new();
        // Idle and Preamble edges only clear the line.
        for high in [false, false, false, true, false, true, false] {
            if high {
                data.expect_set_high()
                    .times(1)
                    .in_sequence(&mut seq)
                    .return_const(());
            } else {
                data.expect_set_low()
                    .times(1)
                    .in_sequence(&mut seq)
                    .return_const(());
            }
        }

        let mut decoder =
            EdgeDecoder::default().with_debug_pins(DebugPins::none().with_data(data));

        decoder.step(EdgeEvent::from_micros(5_000, Level::High)).unwrap();
        decoder.step(EdgeEvent::from_micros(5_500, Level::High)).unwrap();
        decoder.step(EdgeEvent::from_micros(5_750, Level::Low)).unwrap();
        assert_eq!(decoder.wait_count(), 1);
        assert!(decoder.step(EdgeEvent::from_micros(9_000, Level::High)).is_err());
        decoder.step(EdgeEvent::from_micros(9_100, Level::Low)).unwrap();
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    fn off_window_gap() -> impl Strategy<Value = (u64, PulseWidthClass)> {
        prop_oneof![
            (0u64..100).prop_map(|gap| (gap, PulseWidthClass::Short)),
            (901u64..4_500).prop_map(|gap| (gap, PulseWidthClass::Long)),
            (5_501u64..60_000).prop_map(|gap| (gap, PulseWidthClass::Long)),
            (4_500u64..=5_500).prop_map(|gap| (gap, PulseWidthClass::TwentyClock)),
        ]
    }

    proptest! {
        #[test]
        fn prop_off_window_pulse_in_data_discards_frame(
            bits in 0usize..101,
            half_bit in any::<bool>(),
            (gap, expected) in off_window_gap(),
            high in any::<bool>(),
        ) {
            let thresholds = PulseThresholds::new(100, 375, 900, 4500, 5500).unwrap();
            let mut feeder = Feeder::with_thresholds(thresholds);
            feeder.enter_data(Level::High);
            for _ in 0..bits {
                feeder.push(500, Level::Low).unwrap();
            }
            if half_bit {
                feeder.push(250, Level::Low).unwrap();
            }
            prop_assert_eq!(feeder.decoder.bit_count(), 2 + bits);

            let level = if high { Level::High } else { Level::Low };
            let err = feeder.push(gap, level).unwrap_err();
            match err {
                Error::Data { width, bit_count, .. } => {
                    prop_assert_eq!(width, expected);
                    prop_assert_eq!(bit_count, 2 + bits);
                }
                other => prop_assert!(false, "unexpected error {:?}", other),
            }
            prop_assert_eq!(feeder.decoder.state(), DecoderState::Idle);
            prop_assert_eq!(feeder.decoder.bit_count(), 0);
            prop_assert_eq!(feeder.decoder.wait_count(), 0);
            prop_assert_eq!(&feeder.decoder.frame, &Frame::new());
            prop_assert_eq!(feeder.decoder.stats().frames_completed, 0);
            prop_assert_eq!(feeder.decoder.stats().data_errors, 1);
        }
    }
}
