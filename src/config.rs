//! Receiver configuration.
//!
//! Everything a deployment may need to tune lives here: pulse timing
//! windows, frame layout and hand-off queue behaviour. Values can be
//! overridden from environment variables.

use std::str::FromStr;

use crate::data::FrameLayout;
use crate::error::{Error, Result};
use crate::protocol::PulseThresholds;
use crate::receiver::{QueueConfig, QueuePolicy};

/// Complete receiver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    /// Pulse classification windows.
    pub thresholds: PulseThresholds,
    /// Where the probe temperatures sit in a frame.
    pub layout: FrameLayout,
    /// Frame hand-off queue.
    pub queue: QueueConfig,
}

impl DecoderConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults:
    ///
    /// - `RF_ONE_MIN_US`, `RF_ONE_MAX_US`, `RF_TWO_MAX_US`,
    ///   `RF_TWENTY_MIN_US`, `RF_TWENTY_MAX_US`: pulse windows
    /// - `RF_PROBE1_OFFSET`, `RF_PROBE2_OFFSET`: nibble offsets
    /// - `RF_QUEUE_CAPACITY`: bounded queue size
    /// - `RF_QUEUE_POLICY`: `block`, `drop` or `unbounded`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if a variable does not parse or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let t = &mut config.thresholds;

        override_with(&lookup, "RF_ONE_MIN_US", &mut t.one_min_us)?;
        override_with(&lookup, "RF_ONE_MAX_US", &mut t.one_max_us)?;
        override_with(&lookup, "RF_TWO_MAX_US", &mut t.two_max_us)?;
        override_with(&lookup, "RF_TWENTY_MIN_US", &mut t.twenty_min_us)?;
        override_with(&lookup, "RF_TWENTY_MAX_US", &mut t.twenty_max_us)?;
        override_with(&lookup, "RF_PROBE1_OFFSET", &mut config.layout.probe1_offset)?;
        override_with(&lookup, "RF_PROBE2_OFFSET", &mut config.layout.probe2_offset)?;
        override_with(&lookup, "RF_QUEUE_CAPACITY", &mut config.queue.capacity)?;
        override_with(&lookup, "RF_QUEUE_POLICY", &mut config.queue.policy)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.layout.validate()?;
        self.queue.validate()
    }
}

fn override_with<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| Error::InvalidParameter {
            name: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

impl FromStr for QueuePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop" | "drop_newest" => Ok(Self::DropNewest),
            "unbounded" => Ok(Self::Unbounded),
            _ => Err(Error::InvalidParameter {
                name: "queue_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
