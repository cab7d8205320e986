//! Debug strobe outputs.
//!
//! Optional digital outputs the decoder toggles so the edge handler can be
//! lined up against the received signal on an oscilloscope. They have no
//! effect on decoding.

/// A digital output line the decoder can drive.
#[cfg_attr(test, mockall::automock)]
pub trait StrobePin: Send {
    /// Drive the line high.
    fn set_high(&mut self);

    /// Drive the line low.
    fn set_low(&mut self);

    /// Emit a single high-low pulse.
    fn pulse(&mut self) {
        self.set_high();
        self.set_low();
    }
}

/// The set of strobe outputs attached to a decoder.
///
/// - `sync`: high for the duration of every edge callback.
/// - `data`: low at callback entry, high while the decoder is in the Data state.
/// - `error`: pulsed when a data fault discards a frame.
#[derive(Default)]
pub struct DebugPins {
    sync: Option<Box<dyn StrobePin>>,
    data: Option<Box<dyn StrobePin>>,
    error: Option<Box<dyn StrobePin>>,
}

impl DebugPins {
    /// No strobe outputs.
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach the sync strobe.
    pub fn with_sync(mut self, pin: impl StrobePin + 'static) -> Self {
        self.sync = Some(Box::new(pin));
        self
    }

    /// Attach the data-state strobe.
    pub fn with_data(mut self, pin: impl StrobePin + 'static) -> Self {
        self.data = Some(Box::new(pin));
        self
    }

    /// Attach the error strobe.
    pub fn with_error(mut self, pin: impl StrobePin + 'static) -> Self {
        self.error = Some(Box::new(pin));
        self
    }

    /// Check whether any output is attached.
    pub fn is_empty(&self) -> bool {
        self.sync.is_none() && self.data.is_none() && self.error.is_none()
    }

    pub(crate) fn enter(&mut self) {
        if let Some(pin) = self.sync.as_mut() {
            pin.set_high();
        }
        if let Some(pin) = self.data.as_mut() {
            pin.set_low();
        }
    }

    pub(crate) fn data_state(&mut self) {
        if let Some(pin) = self.data.as_mut() {
            pin.set_high();
        }
    }

    pub(crate) fn data_error(&mut self) {
        if let Some(pin) = self.error.as_mut() {
            pin.pulse();
        }
    }

    pub(crate) fn exit(&mut self) {
        if let Some(pin) = self.sync.as_mut() {
            pin.set_low();
        }
    }
}

impl std::fmt::Debug for DebugPins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugPins")
            .field("sync", &self.sync.is_some())
            .field("data", &self.data.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}
