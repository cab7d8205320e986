//! Decoded frame and nibble regrouping.

use bytes::{BufMut, Bytes, BytesMut};

/// Number of bytes carried by one transmission.
pub const FRAME_BYTES: usize = 13;

/// Number of single-bit slots in a frame, including the reserved slot 0.
pub const FRAME_BITS: usize = FRAME_BYTES * 8;

/// Number of 4-bit groups in a frame.
pub const NIBBLE_COUNT: usize = FRAME_BYTES * 2;

/// One complete transmission as 104 single-bit slots.
///
/// Slot 0 is reserved and always zero: the decoder starts writing at
/// index 1, so the 103 received bits occupy slots 1..=103. The probe
/// offsets in [`crate::data::FrameLayout`] are defined against this
/// indexing, so it must not be shifted.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    #[cfg_attr(feature = "serde", serde(with = "bits_serde"))]
    bits: [u8; FRAME_BITS],
}

impl Frame {
    /// Create a zero-filled frame.
    pub fn new() -> Self {
        Self {
            bits: [0; FRAME_BITS],
        }
    }

    /// Build a frame from a slice of bit values.
    ///
    /// Values are masked to one bit, slot 0 is forced to zero and missing
    /// trailing slots stay zero. Extra input is ignored.
    pub fn from_bits(bits: &[u8]) -> Self {
        let mut frame = Self::new();
        for (slot, &bit) in frame.bits.iter_mut().zip(bits).skip(1) {
            *slot = bit & 1;
        }
        frame
    }

    /// Get the bit at `index`, or `None` if out of range.
    pub fn bit(&self, index: usize) -> Option<u8> {
        self.bits.get(index).copied()
    }

    /// All bit slots, including the reserved slot 0.
    pub fn bits(&self) -> &[u8; FRAME_BITS] {
        &self.bits
    }

    pub(crate) fn set(&mut self, index: usize, bit: u8) {
        self.bits[index] = bit & 1;
    }

    /// Regroup the frame into 26 nibbles, most significant bit first.
    pub fn nibbles(&self) -> NibbleSequence {
        let mut out = [0u8; NIBBLE_COUNT];
        for (nibble, group) in out.iter_mut().zip(self.bits.chunks_exact(4)) {
            *nibble = group.iter().fold(0, |acc, &bit| (acc << 1) | bit);
        }
        NibbleSequence(out)
    }

    /// Pack the frame into 13 bytes, most significant bit first.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_BYTES);
        for group in self.bits.chunks_exact(8) {
            buf.put_u8(group.iter().fold(0, |acc, &bit| (acc << 1) | bit));
        }
        buf.freeze()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Frame").field(&self.nibbles()).finish()
    }
}

/// A frame regrouped into 26 packed 4-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NibbleSequence(pub [u8; NIBBLE_COUNT]);

impl NibbleSequence {
    /// Get the nibble at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Get `len` consecutive nibbles starting at `offset`.
    pub fn window(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.0.get(offset..offset.checked_add(len)?)
    }

    /// All nibbles.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for NibbleSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for nibble in &self.0 {
            write!(f, "{:X}", nibble)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod bits_serde {
    use super::FRAME_BITS;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &[u8; FRAME_BITS], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(bits.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; FRAME_BITS], D::Error> {
        let bits = Vec::<u8>::deserialize(d)?;
        let len = bits.len();
        bits.try_into()
            .map_err(|_| D::Error::invalid_length(len, &"104 frame bits"))
    }
}
