//! Pulse width classification.
//!
//! The transmitter encodes everything in the time between edges. Each
//! interval is binned against five calibration thresholds into one of the
//! [`PulseWidthClass`] values the state machine understands.

use crate::error::{Error, Result};

/// Width class of the interval between two consecutive edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PulseWidthClass {
    /// Shorter than one clock period (glitch).
    Short = 0,
    /// About one clock period (half of a bit cell).
    OneClock = 1,
    /// About two clock periods (a full bit cell with a level change).
    TwoClock = 2,
    /// About twenty clock periods (the sync marker).
    TwentyClock = 3,
    /// Anything else, including gaps between TwoClock and TwentyClock.
    Long = 4,
}

impl std::fmt::Display for PulseWidthClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "Short"),
            Self::OneClock => write!(f, "OneClock"),
            Self::TwoClock => write!(f, "TwoClock"),
            Self::TwentyClock => write!(f, "TwentyClock"),
            Self::Long => write!(f, "Long"),
        }
    }
}

/// Calibration thresholds for pulse classification, in microseconds.
///
/// Upper bounds are inclusive. The transmitter clock runs at 250us per
/// period, so the defaults bracket 1, 2 and 20 periods with generous
/// margins. Receivers differ in how much they stretch edges, which is why
/// these are configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseThresholds {
    /// Minimum width of a one-clock pulse; anything shorter is `Short`.
    pub one_min_us: u64,
    /// Maximum width of a one-clock pulse.
    pub one_max_us: u64,
    /// Maximum width of a two-clock pulse.
    pub two_max_us: u64,
    /// Minimum width of the twenty-clock sync marker.
    pub twenty_min_us: u64,
    /// Maximum width of the twenty-clock sync marker.
    pub twenty_max_us: u64,
}

impl PulseThresholds {
    /// Nominal length of one transmitter clock period.
    pub const CLOCK_PERIOD_US: u64 = 250;

    /// Create thresholds from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the bounds are not ordered.
    pub fn new(
        one_min_us: u64,
        one_max_us: u64,
        two_max_us: u64,
        twenty_min_us: u64,
        twenty_max_us: u64,
    ) -> Result<Self> {
        let thresholds = Self {
            one_min_us,
            one_max_us,
            two_max_us,
            twenty_min_us,
            twenty_max_us,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// The tighter calibration some receivers use (two-clock bound of 750us).
    pub fn narrow() -> Self {
        Self {
            two_max_us: 750,
            ..Self::default()
        }
    }

    /// Check that the windows are ordered and do not overlap.
    ///
    /// Requires `one_min <= one_max < two_max < twenty_min <= twenty_max`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: u64| Error::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        };

        if self.one_min_us > self.one_max_us {
            return Err(invalid("one_min_us", self.one_min_us));
        }
        if self.two_max_us <= self.one_max_us {
            return Err(invalid("two_max_us", self.two_max_us));
        }
        if self.twenty_min_us <= self.two_max_us {
            return Err(invalid("twenty_min_us", self.twenty_min_us));
        }
        if self.twenty_max_us < self.twenty_min_us {
            return Err(invalid("twenty_max_us", self.twenty_max_us));
        }
        Ok(())
    }

    /// Classify the time between two edges.
    ///
    /// # Example
    ///
    /// ```
    /// use thermo_rf_decode::protocol::{PulseThresholds, PulseWidthClass};
    ///
    /// let t = PulseThresholds::default();
    /// assert_eq!(t.classify(250), PulseWidthClass::OneClock);
    /// assert_eq!(t.classify(500), PulseWidthClass::TwoClock);
    /// assert_eq!(t.classify(5000), PulseWidthClass::TwentyClock);
    /// assert_eq!(t.classify(2000), PulseWidthClass::Long);
    /// ```
    pub fn classify(&self, dt_us: u64) -> PulseWidthClass {
        if dt_us < self.one_min_us {
            PulseWidthClass::Short
        } else if dt_us <= self.one_max_us {
            PulseWidthClass::OneClock
        } else if dt_us <= self.two_max_us {
            PulseWidthClass::TwoClock
        } else if dt_us >= self.twenty_min_us && dt_us <= self.twenty_max_us {
            PulseWidthClass::TwentyClock
        } else {
            PulseWidthClass::Long
        }
    }
}

impl Default for PulseThresholds {
    fn default() -> Self {
        Self {
            one_min_us: 0,
            one_max_us: 375,
            two_max_us: 900,
            twenty_min_us: 4500,
            twenty_max_us: 5500,
        }
    }
}
