use embedded_hal::i2c::ErrorKind as I2cErrorKind;
use embedded_hal::spi::ErrorKind as SpiErrorKind;
use thiserror::Error as DeriveError;

use crate::rc522::protocol::registers::ErrorFlags;
use crate::rc522::session::CardState;

#[derive(DeriveError, Debug)]
pub enum Error {
    #[error("No card answered")]
    NoTag,

    #[error("Chip timer expired before the card answered")]
    Timeout,

    #[error("Interrupt flags never settled after {0} polls")]
    PollLimit(u32),

    #[error("Bit collision during anticollision (CollReg {0:#04X})")]
    Collision(u8),

    #[error("Chip reported receive errors: {0:?}")]
    Chip(ErrorFlags),

    #[error("UID check byte mismatch: expected {expected:#04X}, got {actual:#04X}")]
    Bcc { expected: u8, actual: u8 },

    #[error("Unexpected response length: expected {expected} bits, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Card refused the command (NAK {0:#03X})")]
    Nak(u8),

    #[error("Crypto1 unit is not active after authentication")]
    CryptoInactive,

    #[error("Frame of {0} bytes does not fit the 64 byte FIFO")]
    FrameTooLong(usize),

    #[error("Operation not valid while the card is {0:?}")]
    InvalidState(CardState),

    #[error("Block {block} is not covered by the authenticated sector")]
    NotAuthenticated { block: u8 },

    #[error("Sanity check failed: expected {expected:#X}, got {actual:#X}")]
    SanityCheckFailed { expected: u8, actual: u8 },

    #[error("SPI bus error: {0:?}")]
    Spi(SpiErrorKind),

    #[error("I2C bus error: {0:?}")]
    I2c(I2cErrorKind),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial echo mismatch: sent {sent:#04X}, got {echoed:#04X}")]
    SerialEcho { sent: u8, echoed: u8 },
}

/// Caller-facing outcome of a card operation.
///
/// Every [`Error`] collapses into exactly one of these, so callers that only care
/// about "card / no card / broken / slow" never have to match on chip details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NoTag,
    Error,
    Timeout,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NoTag => Status::NoTag,
            Error::Timeout | Error::PollLimit(_) => Status::Timeout,
            _ => Status::Error,
        }
    }
}

impl Status {
    /// Classify the outcome of any driver call
    pub fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
