/// High-level RC522 reader
///
/// Owns a register backend and a delay provider, and builds every chip and card
/// operation on top of them. The transport only ever sees single register reads
/// and writes, so the same engine drives SPI, I2C and UART wiring.

use embedded_hal::delay::DelayNs;
use log::{debug, trace};

use crate::error::Error;
use super::backend::RegisterBackend;
use super::protocol::commands::PcdCommand;
use super::protocol::registers::{bits, DivIrq, Register, Status2, GSN_RESET_VALUE};
use super::session::CardSession;

pub mod card;
mod exchange;

/// Receiver gain (RFCfgReg bits 6..4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RxGain {
    Db18 = 0b010,
    Db23 = 0b011,
    Db33 = 0b100,
    Db38 = 0b101,
    Db43 = 0b110,
    #[default]
    Db48 = 0b111,
}

impl RxGain {
    /// Closest setting at or below `db`
    pub fn from_db(db: u8) -> Self {
        match db {
            0..=22 => Self::Db18,
            23..=32 => Self::Db23,
            33..=37 => Self::Db33,
            38..=42 => Self::Db38,
            43..=47 => Self::Db43,
            _ => Self::Db48,
        }
    }

    fn rf_cfg(self) -> u8 {
        ((self as u8) << 4) | 0x0F
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub rx_gain: RxGain,
    /// Upper bound on interrupt-register polls per exchange, in case the chip
    /// timer never fires
    pub max_polls: u32,
    /// Wait after switching the antenna driver on or off
    pub antenna_settle_us: u32,
}

impl Config {
    /// The field needs at least 1 ms between toggles
    pub const MIN_ANTENNA_SETTLE_US: u32 = 1_000;

    pub fn with_rx_gain(mut self, rx_gain: RxGain) -> Self {
        self.rx_gain = rx_gain;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    pub fn with_antenna_settle_us(mut self, us: u32) -> Self {
        self.antenna_settle_us = us.max(Self::MIN_ANTENNA_SETTLE_US);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rx_gain: RxGain::default(),
            max_polls: 2000,
            antenna_settle_us: 10_000,
        }
    }
}

/// Contents of VersionReg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    V1_0,
    V2_0,
    /// FM17522 clone
    Fm17522,
    Unknown(u8),
}

impl ChipVersion {
    pub fn from_register(value: u8) -> Self {
        match value {
            0x91 => Self::V1_0,
            0x92 => Self::V2_0,
            0x88 => Self::Fm17522,
            other => Self::Unknown(other),
        }
    }
}

/// RC522 reader - works with any backend
pub struct Rc522<B: RegisterBackend, D: DelayNs> {
    backend: B,
    delay: D,
    config: Config,
    session: CardSession,
    initialized: bool,
}

impl<B: RegisterBackend, D: DelayNs> Rc522<B, D> {
    /// Create a new reader with the default configuration
    pub fn new(backend: B, delay: D) -> Self {
        Self::with_config(backend, delay, Config::default())
    }

    pub fn with_config(backend: B, delay: D, config: Config) -> Self {
        let config = config
            .with_max_polls(config.max_polls)
            .with_antenna_settle_us(config.antenna_settle_us);
        Self {
            backend,
            delay,
            config,
            session: CardSession::default(),
            initialized: false,
        }
    }

    /// Give the backend and delay provider back
    pub fn release(self) -> (B, D) {
        (self.backend, self.delay)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &CardSession {
        &self.session
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the chip
    ///
    /// 1. Soft reset and wait for the oscillator to come back
    /// 2. Sanity check against the GsNReg reset value
    /// 3. Configure for ISO14443A / MIFARE
    /// 4. Switch the antenna on
    pub fn init(&mut self) -> Result<(), Error> {
        if self.initialized {
            return Ok(());
        }

        self.reset()?;
        self.sanity_check()?;
        self.configure_iso14443a()?;

        self.initialized = true;
        debug!("RC522 initialized ({:?})", self.version()?);
        Ok(())
    }

    /// Soft reset; all registers return to their reset values
    pub fn reset(&mut self) -> Result<(), Error> {
        const RESET_POLLS: u32 = 3;

        self.session.invalidate();
        self.initialized = false;
        self.write_register(Register::Command, PcdCommand::SoftReset.bits())?;

        for _ in 0..RESET_POLLS {
            self.delay.delay_ms(50);
            let command = self.read_register(Register::Command)?;
            if command & bits::POWER_DOWN == 0 {
                return Ok(());
            }
        }

        Err(Error::PollLimit(RESET_POLLS))
    }

    fn sanity_check(&mut self) -> Result<(), Error> {
        let actual = self.read_register(Register::GsN)?;
        if actual != GSN_RESET_VALUE {
            return Err(Error::SanityCheckFailed {
                expected: GSN_RESET_VALUE,
                actual,
            });
        }
        Ok(())
    }

    fn configure_iso14443a(&mut self) -> Result<(), Error> {
        self.backend.clear_bits(Register::Status2, Status2::CRYPTO1_ON.bits())?;
        // CRC preset 0x6363, MFIN active high, TX waits for RF
        self.write_register(Register::Mode, 0x3D)?;
        // Manchester from the internal analog part, 6 bit-clock RX wait
        self.write_register(Register::RxSel, 0x86)?;
        self.write_register(Register::RfCfg, self.config.rx_gain.rf_cfg())?;
        self.write_register(Register::TReloadLo, 30)?;
        self.write_register(Register::TReloadHi, 0)?;
        self.write_register(Register::TMode, 0x8D)?;
        self.write_register(Register::TPrescaler, 0x3E)?;
        // 100% ASK
        self.write_register(Register::TxAsk, 0x40)?;
        self.delay.delay_ms(1);
        self.antenna_on()
    }

    /// Drive TX1/TX2, then wait for the field to settle
    pub fn antenna_on(&mut self) -> Result<(), Error> {
        let control = self.read_register(Register::TxControl)?;
        if control & bits::ANTENNA_ON != bits::ANTENNA_ON {
            self.write_register(Register::TxControl, control | bits::ANTENNA_ON)?;
        }
        self.delay.delay_us(self.config.antenna_settle_us);
        Ok(())
    }

    /// Stop driving the field, then wait for it to collapse
    pub fn antenna_off(&mut self) -> Result<(), Error> {
        self.backend.clear_bits(Register::TxControl, bits::ANTENNA_ON)?;
        self.delay.delay_us(self.config.antenna_settle_us);
        Ok(())
    }

    pub fn version(&mut self) -> Result<ChipVersion, Error> {
        Ok(ChipVersion::from_register(self.read_register(Register::Version)?))
    }

    /// CRC_A over `data` using the chip's coprocessor, LSB first
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2], Error> {
        if data.len() > super::protocol::FIFO_SIZE {
            return Err(Error::FrameTooLong(data.len()));
        }

        self.write_register(Register::Command, PcdCommand::Idle.bits())?;
        self.write_register(Register::DivIrq, DivIrq::CRC.bits())?;
        self.backend.set_bits(Register::FifoLevel, bits::FLUSH_BUFFER)?;
        self.backend.write_fifo(data)?;
        self.write_register(Register::Command, PcdCommand::CalcCrc.bits())?;

        let done = self.poll(Register::DivIrq, DivIrq::CRC.bits());
        self.write_register(Register::Command, PcdCommand::Idle.bits())?;
        done?;

        let lsb = self.read_register(Register::CrcResultLsb)?;
        let msb = self.read_register(Register::CrcResultMsb)?;
        Ok([lsb, msb])
    }

    /// Read every documented register. FIFODataReg is skipped, reading it pops a byte.
    pub fn dump_registers(&mut self) -> Result<Vec<(Register, u8)>, Error> {
        let mut values = Vec::with_capacity(Register::ALL.len());
        for register in Register::ALL {
            if register.is_volatile() {
                continue;
            }
            values.push((register, self.read_register(register)?));
        }
        Ok(values)
    }

    /// Write a value to a register
    pub fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        trace!("W {register:?} = {value:#04X}");
        self.backend.write_register(register, value)
    }

    /// Read a value from a register
    pub fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        let value = self.backend.read_register(register)?;
        trace!("R {register:?} = {value:#04X}");
        Ok(value)
    }

    /// Poll `register` until any bit of `mask` is set, bounded by `max_polls`
    fn poll(&mut self, register: Register, mask: u8) -> Result<u8, Error> {
        for _ in 0..self.config.max_polls {
            let value = self.read_register(register)?;
            if value & mask != 0 {
                return Ok(value);
            }
        }
        Err(Error::PollLimit(self.config.max_polls))
    }
}
