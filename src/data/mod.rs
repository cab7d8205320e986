//! Data structures for probe readings.
//!
//! This module turns completed frames into calibrated probe temperatures.

pub mod readings;
pub mod temperatures;

pub use readings::FrameReadings;
pub use temperatures::{decode_digit, probe_temperature, FrameLayout, ProbeId, ProbeReading};
