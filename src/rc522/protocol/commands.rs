/// Chip (PCD) command set and the card (PICC) command bytes used on the air

use super::registers::ComIrq;

/// Commands understood by CommandReg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PcdCommand {
    Idle = 0x00,
    Mem = 0x01,
    GenerateRandomId = 0x02,
    CalcCrc = 0x03,
    Transmit = 0x04,
    NoCmdChange = 0x07,
    Receive = 0x08,
    Transceive = 0x0C,
    MfAuthent = 0x0E,
    SoftReset = 0x0F,
}

impl Into<u8> for PcdCommand {
    fn into(self) -> u8 {
        self as u8
    }
}

impl PcdCommand {
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Interrupt sources enabled in ComIEnReg while this command runs
    pub fn irq_enable(self) -> ComIrq {
        match self {
            Self::MfAuthent => ComIrq::ERR | ComIrq::IDLE,
            _ => {
                ComIrq::TIMER
                    | ComIrq::ERR
                    | ComIrq::LO_ALERT
                    | ComIrq::IDLE
                    | ComIrq::RX
                    | ComIrq::TX
            }
        }
    }

    /// Interrupt bits that mean the command has completed
    pub fn completion_irq(self) -> ComIrq {
        match self {
            Self::MfAuthent => ComIrq::IDLE,
            _ => ComIrq::RX | ComIrq::IDLE,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x0F {
            0x00 => Some(Self::Idle),
            0x01 => Some(Self::Mem),
            0x02 => Some(Self::GenerateRandomId),
            0x03 => Some(Self::CalcCrc),
            0x04 => Some(Self::Transmit),
            0x07 => Some(Self::NoCmdChange),
            0x08 => Some(Self::Receive),
            0x0C => Some(Self::Transceive),
            0x0E => Some(Self::MfAuthent),
            0x0F => Some(Self::SoftReset),
            _ => None,
        }
    }
}

/// First byte of the frames sent to the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PiccCommand {
    /// REQA, wakes cards in IDLE
    ReqA = 0x26,
    /// WUPA, wakes cards in IDLE and HALT
    WupA = 0x52,
    /// Anticollision / select, cascade level 1
    SelCl1 = 0x93,
    /// Anticollision / select, cascade level 2
    SelCl2 = 0x95,
    AuthKeyA = 0x60,
    AuthKeyB = 0x61,
    Read = 0x30,
    Write = 0xA0,
    HltA = 0x50,
}

impl Into<u8> for PiccCommand {
    fn into(self) -> u8 {
        self as u8
    }
}

impl PiccCommand {
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Which cards a Request should wake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestCode {
    /// Only cards not yet halted
    #[default]
    Idle,
    /// Every card in the field, halted ones included
    All,
}

impl RequestCode {
    pub fn command(self) -> PiccCommand {
        match self {
            Self::Idle => PiccCommand::ReqA,
            Self::All => PiccCommand::WupA,
        }
    }
}

/// NVB byte: 2 bytes sent, nothing of the UID known yet
pub const NVB_ANTICOLLISION: u8 = 0x20;
/// NVB byte: 7 bytes sent, full UID + BCC
pub const NVB_SELECT: u8 = 0x70;
/// MIFARE 4-bit acknowledge
pub const MIFARE_ACK: u8 = 0x0A;
/// Mask applied to the 4-bit ACK/NAK reply
pub const MIFARE_ACK_MASK: u8 = 0x0F;
/// HLTA as sent on the air, before CRC
pub const HLTA_FRAME: [u8; 2] = [PiccCommand::HltA as u8, 0x00];

/// Timer reload values (ticks of roughly 0.3 ms) per exchange
pub mod timeout {
    pub const REQUEST: u16 = 0x0002;
    pub const ANTICOLLISION: u16 = 0x0020;
    pub const SELECT: u16 = 0x0010;
    pub const AUTHENTICATE: u16 = 0x0020;
    pub const READ: u16 = 0x0020;
    pub const WRITE_COMMAND: u16 = 0x0010;
    pub const WRITE_DATA: u16 = 0x0020;
    pub const HALT: u16 = 0x0010;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcd_command_bits() {
        assert_eq!(PcdCommand::Transceive.bits(), 0x0C);
        assert_eq!(PcdCommand::MfAuthent.bits(), 0x0E);
        assert_eq!(PcdCommand::from_bits(0x2F), Some(PcdCommand::SoftReset));
        assert_eq!(PcdCommand::from_bits(0x05), None);
    }

    #[test]
    fn test_irq_masks() {
        assert_eq!(PcdCommand::MfAuthent.irq_enable().bits(), 0x12);
        assert_eq!(PcdCommand::MfAuthent.completion_irq().bits(), 0x10);
        assert_eq!(PcdCommand::Transceive.irq_enable().bits(), 0x77);
        assert_eq!(PcdCommand::Transceive.completion_irq().bits(), 0x30);
    }

    #[test]
    fn test_request_codes() {
        assert_eq!(RequestCode::Idle.command().bits(), 0x26);
        assert_eq!(RequestCode::All.command().bits(), 0x52);
    }
}
