//! Bit-banged I2C master on an FT4232H in synchronous bit-bang mode
//!
//! Lines are open-drain: a "high" line is released by switching the pin to an
//! input and letting the pull-up raise it, a "low" line is driven as an output.
//! Implements the embedded-hal `I2c` trait so it plugs straight into
//! [`I2cBackend`](crate::rc522::backend::I2cBackend).

use std::time::Duration;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use libftd2xx::{BitMode, Ft4232h, FtdiCommon};
use log::trace;

const BITMODE: BitMode = BitMode::SyncBitbang;

/// Default wiring: SCL on CDBUS6, SDA on CDBUS7
pub const DEFAULT_SCL: u8 = 1 << 6;
pub const DEFAULT_SDA: u8 = 1 << 7;

/// Half an SCL period, roughly 100 kHz once USB latency is added
const HALF_PERIOD_NS: u64 = 5_000;

pub struct I2cFtBitbang {
    device: Ft4232h,
    scl: u8,
    sda: u8,
    gpio_val: u8,
    gpio_dir: u8,
}

impl I2cFtBitbang {
    pub fn new(device: Ft4232h) -> Self {
        Self::with_pins(device, DEFAULT_SCL, DEFAULT_SDA)
    }

    /// `scl` and `sda` are single-bit pin masks
    pub fn with_pins(device: Ft4232h, scl: u8, sda: u8) -> Self {
        Self {
            device,
            scl,
            sda,
            // both released: inputs, pulled high
            gpio_val: scl | sda,
            gpio_dir: 0,
        }
    }

    fn apply(&mut self) -> Result<(), ErrorKind> {
        self.device
            .set_bit_mode(self.gpio_dir, BITMODE)
            .map_err(|_| ErrorKind::Bus)?;
        self.device.write(&[self.gpio_val]).map_err(|_| ErrorKind::Bus)?;
        Ok(())
    }

    fn sample_sda(&mut self) -> Result<bool, ErrorKind> {
        let pins = self.device.bit_mode().map_err(|_| ErrorKind::Bus)?;
        Ok(pins & self.sda != 0)
    }

    fn wait(&self) {
        std::thread::sleep(Duration::from_nanos(HALF_PERIOD_NS));
    }

    fn release(&mut self, mask: u8) -> Result<(), ErrorKind> {
        self.gpio_val |= mask;
        self.gpio_dir &= !mask;
        self.apply()
    }

    fn pull_low(&mut self, mask: u8) -> Result<(), ErrorKind> {
        self.gpio_val &= !mask;
        self.gpio_dir |= mask;
        self.apply()
    }

    fn clock_pulse(&mut self) -> Result<(), ErrorKind> {
        self.release(self.scl)?;
        self.wait();
        self.pull_low(self.scl)?;
        self.wait();
        Ok(())
    }

    /// SDA falls while SCL is high; also used as repeated start
    fn start(&mut self) -> Result<(), ErrorKind> {
        self.release(self.sda)?;
        self.release(self.scl)?;
        self.wait();
        self.pull_low(self.sda)?;
        self.wait();
        self.pull_low(self.scl)?;
        self.wait();
        Ok(())
    }

    /// SDA rises while SCL is high
    fn stop(&mut self) -> Result<(), ErrorKind> {
        self.pull_low(self.sda)?;
        self.wait();
        self.release(self.scl)?;
        self.wait();
        self.release(self.sda)?;
        self.wait();
        Ok(())
    }

    /// Shift a byte out MSB first; true when the target acknowledged
    fn write_byte(&mut self, byte: u8) -> Result<bool, ErrorKind> {
        for bit in (0..8).rev() {
            if byte & (1 << bit) != 0 {
                self.release(self.sda)?;
            } else {
                self.pull_low(self.sda)?;
            }
            self.clock_pulse()?;
        }

        self.release(self.sda)?;
        self.release(self.scl)?;
        self.wait();
        let nack = self.sample_sda()?;
        self.pull_low(self.scl)?;
        self.wait();
        Ok(!nack)
    }

    fn read_byte(&mut self, ack: bool) -> Result<u8, ErrorKind> {
        let mut data = 0u8;

        self.release(self.sda)?;
        for _ in 0..8 {
            self.release(self.scl)?;
            self.wait();
            data = (data << 1) | self.sample_sda()? as u8;
            self.pull_low(self.scl)?;
            self.wait();
        }

        if ack {
            self.pull_low(self.sda)?;
        } else {
            self.release(self.sda)?;
        }
        self.clock_pulse()?;
        self.release(self.sda)?;

        Ok(data)
    }

    fn address(&mut self, address: u8, read: bool) -> Result<(), ErrorKind> {
        let byte = (address << 1) | read as u8;
        if self.write_byte(byte)? {
            Ok(())
        } else {
            trace!("I2C address {address:#04X} not acknowledged");
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        }
    }

    fn run(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        for op in operations {
            self.start()?;
            match op {
                Operation::Read(buf) => {
                    self.address(address, true)?;
                    let last = buf.len().saturating_sub(1);
                    for (i, byte) in buf.iter_mut().enumerate() {
                        // NACK the final byte to end the read
                        *byte = self.read_byte(i != last)?;
                    }
                    trace!("I2C {address:#04X} read {:02X?}", buf);
                }
                Operation::Write(buf) => {
                    self.address(address, false)?;
                    for &byte in buf.iter() {
                        if !self.write_byte(byte)? {
                            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                        }
                    }
                    trace!("I2C {address:#04X} wrote {:02X?}", buf);
                }
            }
        }
        Ok(())
    }
}

impl ErrorType for I2cFtBitbang {
    type Error = ErrorKind;
}

impl I2c for I2cFtBitbang {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let result = self.run(address, operations);
        // always free the bus, even after a NACK
        let stop = self.stop();
        result?;
        stop
    }
}
