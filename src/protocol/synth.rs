//! Synthesizes the edge stream a transmitter would produce for a frame.
//!
//! Used to replay known frames through the decoder without radio hardware.

use std::time::Duration;

use super::edge::{EdgeEvent, Level};
use super::frame::{Frame, FRAME_BITS};
use super::pulse::PulseThresholds;

/// Generates edge events with nominal pulse widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSynthesizer {
    clock_period: Duration,
}

impl EdgeSynthesizer {
    /// Create a synthesizer with the given transmitter clock period.
    pub fn new(clock_period: Duration) -> Self {
        Self { clock_period }
    }

    /// Transmitter clock period.
    pub fn clock_period(&self) -> Duration {
        self.clock_period
    }

    fn clocks(&self, n: u32) -> Duration {
        self.clock_period * n
    }

    /// A sync marker starting at `start`: the line drops, then rises 20
    /// clock periods later.
    pub fn sync_marker(&self, start: Duration) -> Vec<EdgeEvent> {
        vec![
            EdgeEvent::new(start, Level::Low),
            EdgeEvent::new(start + self.clocks(20), Level::High),
        ]
    }

    /// Encode a full transmission of `frame` starting at `start`.
    ///
    /// The output is a sync marker, one two-clock edge carrying slot 1, and
    /// then for every following slot either two one-clock edges (bit
    /// repeated) or one two-clock edge (bit toggled). Slot 0 is not
    /// transmitted.
    pub fn encode(&self, frame: &Frame, start: Duration) -> Vec<EdgeEvent> {
        let bits = frame.bits();
        let mut events = self.sync_marker(start);
        let mut now = start + self.clocks(20);

        // The preamble edge bit is the complement of slot 1, and the edge
        // bit is the inverted level, so the level equals slot 1.
        now += self.clocks(2);
        let mut level = Level::from_raw(bits[1]);
        events.push(EdgeEvent::new(now, level));

        for index in 2..FRAME_BITS {
            level = level.toggled();
            if bits[index] == bits[index - 1] {
                now += self.clocks(1);
                events.push(EdgeEvent::new(now, level));
                level = level.toggled();
                now += self.clocks(1);
                events.push(EdgeEvent::new(now, level));
            } else {
                now += self.clocks(2);
                events.push(EdgeEvent::new(now, level));
            }
        }

        events
    }
}

impl Default for EdgeSynthesizer {
    fn default() -> Self {
        Self::new(Duration::from_micros(PulseThresholds::CLOCK_PERIOD_US))
    }
}
