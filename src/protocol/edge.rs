//! Edge events delivered by the receiver's data line.

use std::time::{Duration, Instant};

/// Logic level of the data line after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Line reads 0.
    Low,
    /// Line reads 1.
    High,
}

impl Level {
    /// Create from a raw pin reading (0 is low, anything else high).
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Low,
            _ => Self::High,
        }
    }

    /// Convert to a raw pin value.
    pub fn to_raw(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// The opposite level.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// A single transition of the data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeEvent {
    /// Time of the transition relative to an arbitrary fixed origin.
    pub timestamp: Duration,
    /// Level reported after the transition.
    pub level: Level,
}

impl EdgeEvent {
    /// Create a new edge event.
    pub fn new(timestamp: Duration, level: Level) -> Self {
        Self { timestamp, level }
    }

    /// Create an edge event from a microsecond timestamp.
    pub fn from_micros(timestamp_us: u64, level: Level) -> Self {
        Self::new(Duration::from_micros(timestamp_us), level)
    }

    /// The edge bit carried by this transition.
    ///
    /// The line idles high, so the reported level is inverted: a reading of
    /// 1 is treated as a falling edge (bit 0).
    pub fn edge_bit(&self) -> u8 {
        1 - self.level.to_raw()
    }

    /// Microseconds elapsed since `previous`, saturating at zero.
    pub fn micros_since(&self, previous: Duration) -> u64 {
        let micros = self.timestamp.saturating_sub(previous).as_micros();
        u64::try_from(micros).unwrap_or(u64::MAX)
    }
}

/// Monotonic clock that stamps edge events for a GPIO callback.
#[derive(Debug, Clone, Copy)]
pub struct EdgeClock {
    origin: Instant,
}

impl EdgeClock {
    /// Start a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the clock origin.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Stamp a transition to `level` with the current time.
    pub fn event(&self, level: Level) -> EdgeEvent {
        EdgeEvent::new(self.elapsed(), level)
    }
}

impl Default for EdgeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_bit_inverts_level() {
        assert_eq!(EdgeEvent::from_micros(0, Level::High).edge_bit(), 0);
        assert_eq!(EdgeEvent::from_micros(0, Level::Low).edge_bit(), 1);
    }

    #[test]
    fn test_level_raw_conversion() {
        assert_eq!(Level::from_raw(0), Level::Low);
        assert_eq!(Level::from_raw(1), Level::High);
        assert_eq!(Level::from_raw(7), Level::High);
        assert_eq!(Level::High.to_raw(), 1);
        assert_eq!(Level::Low.toggled(), Level::High);
    }

    #[test]
    fn test_micros_since_saturates() {
        let event = EdgeEvent::from_micros(1_000, Level::Low);
        assert_eq!(event.micros_since(Duration::from_micros(750)), 250);
        assert_eq!(event.micros_since(Duration::from_micros(2_000)), 0);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = EdgeClock::new();
        let first = clock.event(Level::High);
        let second = clock.event(Level::Low);
        assert!(second.timestamp >= first.timestamp);
    }
}
