//! UART backend
//!
//! Works over any byte stream (a `serialport` handle, a pty, a socket). Each
//! access starts with one address byte, bit 7 set for reads. A read answers with
//! the register value; a write answers with an echo of the address, after which
//! the value byte is sent. The stream's own read timeout bounds every wait.

use std::io::{Read, Write};

use log::trace;

use crate::error::Error;
use crate::rc522::protocol::registers::Register;
use super::RegisterBackend;

const READ_FLAG: u8 = 0x80;
const ADDRESS_MASK: u8 = 0x3F;

pub struct UartBackend<P> {
    port: P,
}

impl<P> UartBackend<P>
where
    P: Read + Write,
{
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn release(self) -> P {
        self.port
    }

    fn exchange_byte(&mut self, byte: u8) -> Result<u8, Error> {
        self.port.write_all(&[byte])?;
        self.port.flush()?;
        let mut rx = [0u8; 1];
        self.port.read_exact(&mut rx)?;
        Ok(rx[0])
    }
}

impl<P> RegisterBackend for UartBackend<P>
where
    P: Read + Write,
{
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        let address = (register.address() & ADDRESS_MASK) | READ_FLAG;
        self.exchange_byte(address)
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        let address = register.address() & ADDRESS_MASK;
        let echoed = self.exchange_byte(address)?;
        if echoed != address {
            trace!("UART echo mismatch on {register:?}: {echoed:#04X}");
            return Err(Error::SerialEcho { sent: address, echoed });
        }
        self.port.write_all(&[value])?;
        self.port.flush()?;
        Ok(())
    }
}
