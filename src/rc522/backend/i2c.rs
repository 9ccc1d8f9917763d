//! embedded-hal 1.0 I2C backend
//!
//! The register address is sent as a plain byte; a read is a write of the
//! address followed by a repeated-start read of one byte.

use embedded_hal::i2c::{Error as _, I2c};

use crate::error::Error;
use crate::rc522::protocol::registers::Register;
use super::RegisterBackend;

pub struct I2cBackend<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cBackend<I2C>
where
    I2C: I2c,
{
    /// 7-bit address with EA tied high and ADR_0..5 tied high, as on common boards
    pub const DEFAULT_ADDRESS: u8 = 0x3F;

    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, Self::DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> RegisterBackend for I2cBackend<I2C>
where
    I2C: I2c,
{
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        let mut rx = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register.address()], &mut rx)
            .map_err(|e| Error::I2c(e.kind()))?;
        Ok(rx[0])
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.i2c
            .write(self.address, &[register.address(), value])
            .map_err(|e| Error::I2c(e.kind()))
    }
}
