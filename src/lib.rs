//! Driver for the NXP MFRC522 / RC522 13.56 MHz reader IC and MIFARE Classic cards.
//!
//! The chip is reached through a [`rc522::backend::RegisterBackend`], which only
//! needs to read and write one 6-bit register address at a time. Everything above
//! that (FIFO handling, the transceive primitive, ISO14443A activation and the
//! MIFARE Classic block commands) lives in [`rc522::reader::Rc522`].

pub mod delay;
pub mod error;
#[cfg(feature = "ftdi")]
pub mod i2c;
pub mod rc522;

pub use embedded_hal::i2c as eh_i2c;
pub use embedded_hal::spi as eh_spi;
pub use error::{Error, Status};
pub use rc522::reader::{Config, Rc522, RxGain};
pub use rc522::session::{AtqA, Card, CardSession, CardState, CardType, Key, KeyType, Sak, Uid};

#[cfg(feature = "ftdi")]
pub use i2c::i2c_bitbang::I2cFtBitbang;
#[cfg(feature = "ftdi")]
pub use libftd2xx::{BitMode, Ft4232h, FtdiCommon};
