/// Bounded frame buffer matching the chip's 64 byte FIFO

use core::fmt;

use crate::error::Error;

/// Size of the on-chip FIFO; no frame in either direction can be longer
pub const FIFO_SIZE: usize = 64;

/// A frame exchanged with the card, with its exact bit length.
///
/// The last byte may be partial (REQA is 7 bits, a MIFARE ACK is 4 bits), so the
/// frame tracks how many bits of the final byte are valid. `last_bits == 0`
/// means the final byte is complete.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    buf: [u8; FIFO_SIZE],
    len: usize,
    last_bits: u8,
}

impl Frame {
    pub const fn empty() -> Self {
        Self {
            buf: [0; FIFO_SIZE],
            len: 0,
            last_bits: 0,
        }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        if data.len() > FIFO_SIZE {
            return Err(Error::FrameTooLong(data.len()));
        }
        let mut frame = Self::empty();
        frame.buf[..data.len()].copy_from_slice(data);
        frame.len = data.len();
        Ok(frame)
    }

    /// Mark how many bits of the final byte are valid (0 = all 8)
    pub fn with_last_bits(mut self, last_bits: u8) -> Self {
        self.last_bits = last_bits & 0x07;
        self
    }

    /// Mutable view of the first `len` bytes, used while draining the FIFO
    pub(crate) fn fill(&mut self, len: usize) -> &mut [u8] {
        self.len = len.min(FIFO_SIZE);
        &mut self.buf[..self.len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last_bits(&self) -> u8 {
        self.last_bits
    }

    /// Number of valid bits received
    pub fn bit_len(&self) -> usize {
        match (self.len, self.last_bits) {
            (0, _) => 0,
            (n, 0) => n * 8,
            (n, bits) => (n - 1) * 8 + bits as usize,
        }
    }

    /// True for a 4-bit reply, the shape of every MIFARE ACK/NAK
    pub fn is_nibble(&self) -> bool {
        self.bit_len() == 4
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({} bits: {})", self.bit_len(), hex::encode_upper(self.as_bytes()))
    }
}
