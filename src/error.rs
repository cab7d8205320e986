//! Error types for the thermo-rf-decode crate.

use thiserror::Error;

use crate::data::ProbeId;
use crate::protocol::{DecoderState, PulseWidthClass};

/// The main error type for this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An edge in the Preamble state matched none of the expected patterns.
    ///
    /// The decoder has already returned to Idle when this is reported.
    #[error(
        "Error in preamble: pulse = {dt_us}us, width = {width:?}, edge = {edge}, \
         wait_count = {wait_count}, bit_count = {bit_count}"
    )]
    Preamble {
        /// Time since the previous edge, in microseconds.
        dt_us: u64,
        /// Classified width of the offending pulse.
        width: PulseWidthClass,
        /// Edge bit of the offending pulse.
        edge: u8,
        /// Half-bit flag at the time of the fault.
        wait_count: u8,
        /// Bit index at the time of the fault.
        bit_count: usize,
    },

    /// An edge in the Data state broke the bit-pairing rules.
    ///
    /// The in-progress frame is discarded and the decoder is back in Idle.
    #[error(
        "Error in data: pulse = {dt_us}us, width = {width:?}, edge = {edge}, \
         wait_count = {wait_count}, bit_count = {bit_count}"
    )]
    Data {
        /// Time since the previous edge, in microseconds.
        dt_us: u64,
        /// Classified width of the offending pulse.
        width: PulseWidthClass,
        /// Edge bit of the offending pulse.
        edge: u8,
        /// Half-bit flag at the time of the fault.
        wait_count: u8,
        /// Bit index at the time of the fault.
        bit_count: usize,
    },

    /// A nibble in a probe's temperature window is not a valid digit code.
    #[error("Invalid digit for probe {probe}: nibble {nibble:#x} at position {position}")]
    DigitDecode {
        /// The probe whose window contained the nibble.
        probe: ProbeId,
        /// Position of the nibble inside the probe window (0-4).
        position: usize,
        /// The raw nibble value.
        nibble: u8,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// The frame queue has no consumer left.
    #[error("Frame queue closed")]
    QueueClosed,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check whether this error came from the edge state machine.
    ///
    /// Decoder faults are recovered locally by returning to Idle.
    pub fn is_decoder_fault(&self) -> bool {
        matches!(self, Self::Preamble { .. } | Self::Data { .. })
    }

    /// The decoder state the fault was detected in, if any.
    pub fn decoder_state(&self) -> Option<DecoderState> {
        match self {
            Self::Preamble { .. } => Some(DecoderState::Preamble),
            Self::Data { .. } => Some(DecoderState::Data),
            _ => None,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
