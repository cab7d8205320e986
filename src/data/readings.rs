//! Readings interpreted from a completed frame.

use chrono::{DateTime, Utc};

use super::temperatures::{probe_temperature, FrameLayout, ProbeId, ProbeReading};
use crate::error::Result;
use crate::protocol::{Frame, NibbleSequence};

/// Both probe readings decoded from one frame.
///
/// The probes decode independently: an invalid digit in one window does
/// not affect the other.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameReadings {
    /// Probe 1 reading or its decode failure.
    #[cfg_attr(feature = "serde", serde(with = "reading_serde"))]
    pub probe1: Result<ProbeReading>,
    /// Probe 2 reading or its decode failure.
    #[cfg_attr(feature = "serde", serde(with = "reading_serde"))]
    pub probe2: Result<ProbeReading>,
    /// The frame's nibbles.
    pub nibbles: NibbleSequence,
    /// When the frame was interpreted.
    pub received_at: DateTime<Utc>,
}

impl FrameReadings {
    /// Interpret a completed frame.
    pub fn interpret(frame: &Frame, layout: &FrameLayout) -> Self {
        Self::from_nibbles(frame.nibbles(), layout, Utc::now())
    }

    /// Interpret already-packed nibbles with an explicit timestamp.
    pub fn from_nibbles(
        nibbles: NibbleSequence,
        layout: &FrameLayout,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            probe1: probe_temperature(ProbeId::One, &nibbles, layout),
            probe2: probe_temperature(ProbeId::Two, &nibbles, layout),
            nibbles,
            received_at,
        }
    }

    /// Result for a specific probe.
    pub fn probe(&self, probe: ProbeId) -> &Result<ProbeReading> {
        match probe {
            ProbeId::One => &self.probe1,
            ProbeId::Two => &self.probe2,
        }
    }

    /// Check whether both probes decoded.
    pub fn is_complete(&self) -> bool {
        self.probe1.is_ok() && self.probe2.is_ok()
    }
}

#[cfg(feature = "serde")]
mod reading_serde {
    use super::ProbeReading;
    use crate::error::Result;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Result<ProbeReading>, s: S) -> std::result::Result<S::Ok, S::Error> {
        value.as_ref().ok().copied().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Result<ProbeReading>, D::Error> {
        Ok(Option::<ProbeReading>::deserialize(d)?.ok_or_else(|| {
            crate::error::Error::Internal("reading not decoded".to_string())
        }))
    }
}
