//! Probe temperature decoding.
//!
//! Each probe's temperature is carried as five nibbles. Only four nibble
//! codes are valid and each maps to a base-4 digit:
//!
//! | Nibble | Digit |
//! |--------|-------|
//! | `0x5`  | 0     |
//! | `0x6`  | 1     |
//! | `0x9`  | 2     |
//! | `0xA`  | 3     |
//!
//! The five digits form a base-4 number, most significant first, from
//! which a fixed calibration offset is subtracted.

use crate::error::{Error, Result};
use crate::protocol::{NibbleSequence, NIBBLE_COUNT};

/// Which of the two probes a reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbeId {
    /// Probe 1.
    One,
    /// Probe 2.
    Two,
}

impl ProbeId {
    /// Both probes, in order.
    pub const ALL: [ProbeId; 2] = [ProbeId::One, ProbeId::Two];

    /// Create from a probe number (1 or 2).
    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    /// Get the probe number (1 or 2).
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Where the probe temperatures live inside a frame and how they are scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameLayout {
    /// First nibble of probe 1's temperature window.
    pub probe1_offset: usize,
    /// First nibble of probe 2's temperature window.
    pub probe2_offset: usize,
    /// Calibration offset subtracted from the base-4 value.
    pub calibration_offset: i32,
}

impl FrameLayout {
    /// Number of nibbles in a temperature window.
    pub const DIGITS: usize = 5;

    /// Default nibble offset of probe 1.
    pub const PROBE1_OFFSET: usize = 8;

    /// Default nibble offset of probe 2.
    pub const PROBE2_OFFSET: usize = 13;

    /// Default calibration offset.
    pub const CALIBRATION_OFFSET: i32 = 532;

    /// Nibble offset of a probe's window.
    pub fn offset(&self, probe: ProbeId) -> usize {
        match probe {
            ProbeId::One => self.probe1_offset,
            ProbeId::Two => self.probe2_offset,
        }
    }

    /// Check that both windows fit inside a frame.
    pub fn validate(&self) -> Result<()> {
        for (name, offset) in [
            ("probe1_offset", self.probe1_offset),
            ("probe2_offset", self.probe2_offset),
        ] {
            let end = offset.checked_add(Self::DIGITS);
            if end.map_or(true, |end| end > NIBBLE_COUNT) {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    value: offset.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            probe1_offset: Self::PROBE1_OFFSET,
            probe2_offset: Self::PROBE2_OFFSET,
            calibration_offset: Self::CALIBRATION_OFFSET,
        }
    }
}

/// A decoded probe temperature.
///
/// The value is the calibrated integer the transmitter encodes; no unit
/// conversion is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeReading(pub i32);

impl ProbeReading {
    /// Get the raw reading.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for ProbeReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Map a nibble code to its base-4 digit.
///
/// # Example
///
/// ```
/// use thermo_rf_decode::data::decode_digit;
///
/// assert_eq!(decode_digit(0x9), Some(2));
/// assert_eq!(decode_digit(0x7), None);
/// ```
pub fn decode_digit(nibble: u8) -> Option<u8> {
    match nibble {
        0x5 => Some(0),
        0x6 => Some(1),
        0x9 => Some(2),
        0xA => Some(3),
        _ => None,
    }
}

/// Decode one probe's temperature from a frame's nibbles.
///
/// # Errors
///
/// Returns [`Error::DigitDecode`] for the first nibble in the window that is
/// not a valid digit code, and [`Error::InvalidParameter`] if the layout
/// places the window outside the frame.
///
/// # Example
///
/// ```
/// use thermo_rf_decode::data::{probe_temperature, FrameLayout, ProbeId};
/// use thermo_rf_decode::protocol::NibbleSequence;
///
/// let mut nibbles = [0u8; 26];
/// nibbles[8..13].copy_from_slice(&[0xA; 5]);
/// let reading = probe_temperature(ProbeId::One, &NibbleSequence(nibbles), &FrameLayout::default());
/// assert_eq!(reading.unwrap().value(), 491);
/// ```
pub fn probe_temperature(
    probe: ProbeId,
    nibbles: &NibbleSequence,
    layout: &FrameLayout,
) -> Result<ProbeReading> {
    let offset = layout.offset(probe);
    let window = nibbles
        .window(offset, FrameLayout::DIGITS)
        .ok_or_else(|| Error::InvalidParameter {
            name: format!("probe{}_offset", probe),
            value: offset.to_string(),
        })?;

    let mut value: i32 = 0;
    for (position, &nibble) in window.iter().enumerate() {
        let digit = decode_digit(nibble).ok_or(Error::DigitDecode {
            probe,
            position,
            nibble,
        })?;
        value = value * 4 + digit as i32;
    }

    Ok(ProbeReading(value - layout.calibration_offset))
}
