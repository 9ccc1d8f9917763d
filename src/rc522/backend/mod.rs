/// Backend abstraction module - one adapter per physical bus
///
/// The chip exposes the same register file over SPI, I2C and UART; only the
/// framing of a single register access differs. Backends implement the two
/// required methods and inherit the read-modify-write and FIFO helpers.

use log::trace;

use crate::error::Error;
use super::protocol::registers::Register;

pub mod i2c;
pub mod spi;
pub mod uart;

pub use i2c::I2cBackend;
pub use spi::SpiBackend;
pub use uart::UartBackend;

/// Register transport
pub trait RegisterBackend {
    /// Read one register
    fn read_register(&mut self, register: Register) -> Result<u8, Error>;

    /// Write one register
    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error>;

    /// Read-modify-write: `reg |= mask`
    fn set_bits(&mut self, register: Register, mask: u8) -> Result<(), Error> {
        let value = self.read_register(register)?;
        trace!("{register:?}: {value:#04X} |= {mask:#04X}");
        self.write_register(register, value | mask)
    }

    /// Read-modify-write: `reg &= !mask`
    fn clear_bits(&mut self, register: Register, mask: u8) -> Result<(), Error> {
        let value = self.read_register(register)?;
        trace!("{register:?}: {value:#04X} &= !{mask:#04X}");
        self.write_register(register, value & !mask)
    }

    /// Push bytes into the FIFO, in order
    fn write_fifo(&mut self, data: &[u8]) -> Result<(), Error> {
        for &byte in data {
            self.write_register(Register::FifoData, byte)?;
        }
        Ok(())
    }

    /// Pop `buffer.len()` bytes from the FIFO
    fn read_fifo(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        for byte in buffer.iter_mut() {
            *byte = self.read_register(Register::FifoData)?;
        }
        Ok(())
    }
}

impl<T: RegisterBackend + ?Sized> RegisterBackend for &mut T {
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        (**self).read_register(register)
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        (**self).write_register(register, value)
    }
}

impl<T: RegisterBackend + ?Sized> RegisterBackend for Box<T> {
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        (**self).read_register(register)
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        (**self).write_register(register, value)
    }
}
