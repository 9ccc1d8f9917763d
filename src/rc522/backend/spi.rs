//! embedded-hal 1.0 SPI backend
//!
//! Address byte layout: bit 7 = read, bits 6..1 = register address, bit 0 = 0.
//! A read clocks the address byte followed by one dummy byte and samples the
//! register value during the second byte.

use embedded_hal::spi::{Error as _, SpiDevice};

use crate::error::Error;
use crate::rc522::protocol::registers::Register;
use super::RegisterBackend;

const READ_FLAG: u8 = 0x80;

pub struct SpiBackend<SPI> {
    spi: SPI,
}

impl<SPI> SpiBackend<SPI>
where
    SPI: SpiDevice,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn address_byte(register: Register) -> u8 {
        (register.address() << 1) & 0x7E
    }
}

impl<SPI> RegisterBackend for SpiBackend<SPI>
where
    SPI: SpiDevice,
{
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        let tx = [Self::address_byte(register) | READ_FLAG, 0x00];
        let mut rx = [0u8; 2];

        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| Error::Spi(e.kind()))?;

        Ok(rx[1])
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.spi
            .write(&[Self::address_byte(register), value])
            .map_err(|e| Error::Spi(e.kind()))
    }
}
