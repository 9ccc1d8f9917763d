/// MFRC522 register map and the bit layouts of the registers the driver touches

/// Register addresses (6 bits, 0x00..=0x3F)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    // Page 0: command and status
    Command = 0x01,
    ComIEn = 0x02,
    DivIEn = 0x03,
    ComIrq = 0x04,
    DivIrq = 0x05,
    Error = 0x06,
    Status1 = 0x07,
    Status2 = 0x08,
    FifoData = 0x09,
    FifoLevel = 0x0A,
    WaterLevel = 0x0B,
    Control = 0x0C,
    BitFraming = 0x0D,
    Coll = 0x0E,

    // Page 1: command configuration
    Mode = 0x11,
    TxMode = 0x12,
    RxMode = 0x13,
    TxControl = 0x14,
    TxAsk = 0x15,
    TxSel = 0x16,
    RxSel = 0x17,
    RxThreshold = 0x18,
    Demod = 0x19,
    MfTx = 0x1C,
    MfRx = 0x1D,
    SerialSpeed = 0x1F,

    // Page 2: analog and timer configuration
    CrcResultMsb = 0x21,
    CrcResultLsb = 0x22,
    ModWidth = 0x24,
    RfCfg = 0x26,
    GsN = 0x27,
    CwGsP = 0x28,
    ModGsP = 0x29,
    TMode = 0x2A,
    TPrescaler = 0x2B,
    TReloadHi = 0x2C,
    TReloadLo = 0x2D,
    TCounterValueHi = 0x2E,
    TCounterValueLo = 0x2F,

    // Page 3: test registers
    TestSel1 = 0x31,
    TestSel2 = 0x32,
    TestPinEn = 0x33,
    TestPinValue = 0x34,
    TestBus = 0x35,
    AutoTest = 0x36,
    Version = 0x37,
    AnalogTest = 0x38,
    TestDac1 = 0x39,
    TestDac2 = 0x3A,
    TestAdc = 0x3B,
}

impl Into<u8> for Register {
    fn into(self) -> u8 {
        self as u8
    }
}

impl Register {
    /// Every documented register, in address order
    pub const ALL: [Register; 50] = [
        Self::Command, Self::ComIEn, Self::DivIEn, Self::ComIrq, Self::DivIrq,
        Self::Error, Self::Status1, Self::Status2, Self::FifoData, Self::FifoLevel,
        Self::WaterLevel, Self::Control, Self::BitFraming, Self::Coll,
        Self::Mode, Self::TxMode, Self::RxMode, Self::TxControl, Self::TxAsk,
        Self::TxSel, Self::RxSel, Self::RxThreshold, Self::Demod, Self::MfTx,
        Self::MfRx, Self::SerialSpeed,
        Self::CrcResultMsb, Self::CrcResultLsb, Self::ModWidth, Self::RfCfg,
        Self::GsN, Self::CwGsP, Self::ModGsP, Self::TMode, Self::TPrescaler,
        Self::TReloadHi, Self::TReloadLo, Self::TCounterValueHi, Self::TCounterValueLo,
        Self::TestSel1, Self::TestSel2, Self::TestPinEn, Self::TestPinValue,
        Self::TestBus, Self::AutoTest, Self::Version, Self::AnalogTest,
        Self::TestDac1, Self::TestDac2, Self::TestAdc,
    ];

    /// Get the 6-bit register address
    pub fn address(self) -> u8 {
        self as u8
    }

    /// Register page (0..=3)
    pub fn page(self) -> u8 {
        self.address() >> 4
    }

    /// Create from raw address value
    pub fn from_address(addr: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.address() == addr)
    }

    /// Reading this register has side effects (it pops the FIFO)
    pub fn is_volatile(self) -> bool {
        self == Self::FifoData
    }
}

/// Reset value of GsNReg, used to confirm the chip came out of soft reset
pub const GSN_RESET_VALUE: u8 = 0x88;

bitflags::bitflags! {
    /// ComIrqReg / ComIEnReg
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ComIrq: u8 {
        const TIMER    = 0x01;
        const ERR      = 0x02;
        const LO_ALERT = 0x04;
        const HI_ALERT = 0x08;
        const IDLE     = 0x10;
        const RX       = 0x20;
        const TX       = 0x40;
        /// Write-only: 1 sets the marked bits, 0 clears them
        const SET1     = 0x80;
    }
}

bitflags::bitflags! {
    /// DivIrqReg
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DivIrq: u8 {
        const CRC      = 0x04;
        const MFIN_ACT = 0x10;
        const SET2     = 0x80;
    }
}

bitflags::bitflags! {
    /// ErrorReg
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorFlags: u8 {
        const PROTOCOL         = 0x01;
        const PARITY           = 0x02;
        const CRC              = 0x04;
        const COLLISION        = 0x08;
        const BUFFER_OVERFLOW  = 0x10;
        const TEMPERATURE      = 0x40;
        const WRITE            = 0x80;
    }
}

impl ErrorFlags {
    /// Errors that always invalidate a received frame
    pub const RECEIVE_FAULTS: ErrorFlags = ErrorFlags::PROTOCOL
        .union(ErrorFlags::PARITY)
        .union(ErrorFlags::COLLISION)
        .union(ErrorFlags::BUFFER_OVERFLOW);
}

bitflags::bitflags! {
    /// Status2Reg
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status2: u8 {
        const MODEM_STATE    = 0x07;
        const CRYPTO1_ON     = 0x08;
        const I2C_FORCE_HS   = 0x40;
        const TEMP_SENS_CLEAR = 0x80;
    }
}

/// Single-purpose bits of the configuration registers
pub mod bits {
    /// CommandReg: analog part powered down (still set while soft reset runs)
    pub const POWER_DOWN: u8 = 0x10;
    /// CommandReg: command code field
    pub const COMMAND_MASK: u8 = 0x0F;
    /// FIFOLevelReg: flush the FIFO
    pub const FLUSH_BUFFER: u8 = 0x80;
    /// FIFOLevelReg: number of bytes stored
    pub const FIFO_LEVEL_MASK: u8 = 0x7F;
    /// ControlReg: stop the timer now
    pub const TSTOP_NOW: u8 = 0x80;
    /// ControlReg: start the timer now
    pub const TSTART_NOW: u8 = 0x40;
    /// ControlReg: valid bits in the last received byte (0 = whole byte)
    pub const RX_LAST_BITS: u8 = 0x07;
    /// BitFramingReg: start transmission of a Transceive
    pub const START_SEND: u8 = 0x80;
    /// BitFramingReg: a REQA/WUPA short frame is 7 bits long
    pub const SHORT_FRAME: u8 = 0x07;
    /// TxModeReg / RxModeReg: hardware CRC generation and check
    pub const CRC_EN: u8 = 0x80;
    /// TxControlReg: drive both TX1 and TX2
    pub const ANTENNA_ON: u8 = 0x03;
    /// CollReg: clear received bits after a collision
    pub const VALUES_AFTER_COLL: u8 = 0x80;
    /// ComIEnReg: IRQ pin inverted
    pub const IRQ_INV: u8 = 0x80;
}

/// Timer configuration written before every exchange
///
/// TModeReg = 0x87 (TAuto, prescaler high nibble 0x7) with TPrescalerReg = 0xFF gives
/// a 2047 prescaler, i.e. one reload tick is roughly 0.3 ms.
pub mod timer {
    pub const EXCHANGE_TMODE: u8 = 0x87;
    pub const EXCHANGE_TPRESCALER: u8 = 0xFF;
}
