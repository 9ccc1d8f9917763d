//! Register-level RC522 + MIFARE Classic 1K simulator for unit tests
//!
//! Models just enough of the chip for the driver: the FIFO, ComIrqReg/DivIrqReg
//! set/clear semantics, StartSend-triggered Transceive, MFAuthent, CalcCRC and
//! soft reset. The card answers REQA/WUPA, anticollision, select, read, write
//! and halt. Knobs on [`SimChip`] inject the faults the driver must survive.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;

use crate::error::Error;
use super::backend::RegisterBackend;
use super::protocol::commands::PcdCommand;
use super::protocol::registers::{ComIrq, DivIrq, Register};
use super::session::sector_of;

const BLOCKS: usize = 64;

#[derive(Default)]
pub(crate) struct SimDelay {
    pub waits_ns: Vec<u32>,
}

impl SimDelay {
    pub fn total_ns(&self) -> u64 {
        self.waits_ns.iter().map(|&ns| ns as u64).sum()
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits_ns.push(ns);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardMode {
    Idle,
    Ready,
    Active,
    Halted,
}

pub(crate) struct SimCard {
    pub uid: [u8; 4],
    pub atqa: [u8; 2],
    /// Number of ATQA bytes actually sent
    pub atqa_len: usize,
    pub sak: u8,
    pub blocks: [[u8; 16]; BLOCKS],
    pub key_a: [u8; 6],
    pub key_b: [u8; 6],
    /// Stay silent for this many REQA/WUPA frames
    pub skip_requests: u32,
    /// Answer the data phase of a write with a NAK
    pub nak_write_data: bool,
    mode: CardMode,
    authenticated: Option<u8>,
    pending_write: Option<u8>,
}

impl SimCard {
    pub fn new(uid: [u8; 4]) -> Self {
        let bcc = uid.iter().fold(0, |acc, b| acc ^ b);
        let mut blocks = [[0u8; 16]; BLOCKS];
        blocks[0][..4].copy_from_slice(&uid);
        blocks[0][4] = bcc;
        blocks[0][5] = 0x08;
        for trailer in (3..BLOCKS).step_by(4) {
            blocks[trailer] = [
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x07, 0x80, 0x69, 0xFF, 0xFF, 0xFF, 0xFF,
                0xFF, 0xFF,
            ];
        }

        Self {
            uid,
            atqa: [0x04, 0x00],
            atqa_len: 2,
            sak: 0x08,
            blocks,
            key_a: [0xFF; 6],
            key_b: [0xFF; 6],
            skip_requests: 0,
            nak_write_data: false,
            mode: CardMode::Idle,
            authenticated: None,
            pending_write: None,
        }
    }

    fn bcc(&self) -> u8 {
        self.uid.iter().fold(0, |acc, b| acc ^ b)
    }

    /// Reply bytes and the number of valid bits in the last one (0 = 8).
    ///
    /// `crc` is the reader's TX CRC setting: anticollision frames carry no CRC,
    /// every later frame must, and a mismatch is ignored like line noise.
    fn respond(&mut self, tx: &[u8], tx_last_bits: u8, crc: bool) -> Option<(Vec<u8>, u8)> {
        const ACK: u8 = 0x0A;
        const NAK: u8 = 0x04;

        match tx {
            [0x26] | [0x52] if tx_last_bits == 7 => {
                if self.skip_requests > 0 {
                    self.skip_requests -= 1;
                    return None;
                }
                if self.mode == CardMode::Halted && tx[0] == 0x26 {
                    return None;
                }
                self.mode = CardMode::Ready;
                self.authenticated = None;
                Some((self.atqa[..self.atqa_len].to_vec(), 0))
            }
            [0x93, 0x20] if self.mode == CardMode::Ready && !crc => {
                let mut reply = self.uid.to_vec();
                reply.push(self.bcc());
                Some((reply, 0))
            }
            [0x93, 0x70, rest @ ..] if self.mode == CardMode::Ready && crc => {
                if rest.len() == 5 && rest[..4] == self.uid && rest[4] == self.bcc() {
                    self.mode = CardMode::Active;
                    Some((vec![self.sak], 0))
                } else {
                    None
                }
            }
            [0x30, block] if self.mode == CardMode::Active && crc => {
                let block = *block as usize;
                if block < BLOCKS && self.authenticated == Some(sector_of(block as u8)) {
                    Some((self.blocks[block].to_vec(), 0))
                } else {
                    Some((vec![NAK], 4))
                }
            }
            [0xA0, block] if self.mode == CardMode::Active && crc => {
                let allowed = (*block as usize) < BLOCKS
                    && *block != 0
                    && self.authenticated == Some(sector_of(*block));
                if allowed {
                    self.pending_write = Some(*block);
                    Some((vec![ACK], 4))
                } else {
                    Some((vec![NAK], 4))
                }
            }
            [0x50, 0x00] if self.mode == CardMode::Active && crc => {
                self.mode = CardMode::Halted;
                self.authenticated = None;
                None
            }
            data if data.len() == 16 && crc && self.pending_write.is_some() => {
                let block = self.pending_write.take()? as usize;
                if self.nak_write_data {
                    return Some((vec![NAK], 4));
                }
                self.blocks[block].copy_from_slice(data);
                Some((vec![ACK], 4))
            }
            _ => None,
        }
    }

    fn authenticate(&mut self, payload: &[u8]) -> Option<u8> {
        if self.mode != CardMode::Active || payload.len() != 12 {
            return None;
        }
        let block = payload[1];
        let key = match payload[0] {
            0x60 => &self.key_a,
            0x61 => &self.key_b,
            _ => return None,
        };
        if (block as usize) >= BLOCKS || payload[2..8] != key[..] || payload[8..12] != self.uid {
            return None;
        }
        let sector = sector_of(block);
        self.authenticated = Some(sector);
        Some(sector)
    }
}

pub(crate) struct SimChip {
    regs: [u8; 64],
    fifo: VecDeque<u8>,
    pub card: Option<SimCard>,

    pub soft_resets: u32,
    pub writes: u32,
    pub irq_polls: u32,
    pub transceives: u32,
    pub auths: u32,

    pub gsn_after_reset: u8,
    pub stuck_in_reset: bool,
    /// No interrupt ever fires
    pub dead_timer: bool,
    /// Timer flag raised together with the reply
    pub timer_races_reply: bool,
    /// Extra ErrorReg bits on every reply
    pub inject_error: Option<u8>,
    /// CRCErr on 4-bit replies
    pub crc_error_on_nibbles: bool,
    /// (byte, xor mask) applied to the anticollision reply
    pub corrupt_anticollision: Option<(usize, u8)>,
    pub collision: bool,
    /// MFAuthent completes but Crypto1On stays clear
    pub suppress_crypto: bool,
}

impl SimChip {
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; 64],
            fifo: VecDeque::new(),
            card: None,
            soft_resets: 0,
            writes: 0,
            irq_polls: 0,
            transceives: 0,
            auths: 0,
            gsn_after_reset: 0x88,
            stuck_in_reset: false,
            dead_timer: false,
            timer_races_reply: false,
            inject_error: None,
            crc_error_on_nibbles: false,
            corrupt_anticollision: None,
            collision: false,
            suppress_crypto: false,
        };
        chip.load_reset_values();
        chip
    }

    pub fn with_card(card: SimCard) -> Self {
        let mut chip = Self::new();
        chip.card = Some(card);
        chip
    }

    /// Current raw register contents (no FIFO side effects)
    pub fn register(&self, register: Register) -> u8 {
        self.regs[register.address() as usize]
    }

    fn reg_mut(&mut self, register: Register) -> &mut u8 {
        &mut self.regs[register.address() as usize]
    }

    fn load_reset_values(&mut self) {
        self.regs = [0; 64];
        self.fifo.clear();
        *self.reg_mut(Register::Command) = if self.stuck_in_reset { 0x30 } else { 0x20 };
        *self.reg_mut(Register::ComIEn) = 0x80;
        *self.reg_mut(Register::ComIrq) = 0x14;
        *self.reg_mut(Register::Control) = 0x10;
        *self.reg_mut(Register::Mode) = 0x3F;
        *self.reg_mut(Register::TxControl) = 0x80;
        *self.reg_mut(Register::RfCfg) = 0x48;
        *self.reg_mut(Register::GsN) = self.gsn_after_reset;
        *self.reg_mut(Register::Version) = 0x92;
    }

    fn run_command(&mut self, command: Option<PcdCommand>) {
        match command {
            Some(PcdCommand::SoftReset) => {
                self.soft_resets += 1;
                self.load_reset_values();
            }
            Some(PcdCommand::CalcCrc) => {
                let data: Vec<u8> = self.fifo.drain(..).collect();
                let [lsb, msb] = crc_a(&data);
                *self.reg_mut(Register::CrcResultLsb) = lsb;
                *self.reg_mut(Register::CrcResultMsb) = msb;
                if !self.dead_timer {
                    *self.reg_mut(Register::DivIrq) |= DivIrq::CRC.bits();
                }
            }
            Some(PcdCommand::MfAuthent) => {
                self.auths += 1;
                let payload: Vec<u8> = self.fifo.drain(..).collect();
                if self.dead_timer {
                    return;
                }
                let sector = self.card.as_mut().and_then(|c| c.authenticate(&payload));
                if sector.is_some() {
                    if !self.suppress_crypto {
                        *self.reg_mut(Register::Status2) |= 0x08;
                    }
                    *self.reg_mut(Register::ComIrq) |= ComIrq::IDLE.bits();
                } else {
                    *self.reg_mut(Register::ComIrq) |= ComIrq::TIMER.bits();
                }
            }
            _ => {}
        }
    }

    fn transceive(&mut self, tx_last_bits: u8) {
        self.transceives += 1;
        let tx: Vec<u8> = self.fifo.drain(..).collect();
        *self.reg_mut(Register::Error) = 0;
        *self.reg_mut(Register::Control) &= !0x07;
        if self.dead_timer {
            return;
        }

        let crc = self.register(Register::TxMode) & 0x80 != 0;
        let reply = self
            .card
            .as_mut()
            .and_then(|card| card.respond(&tx, tx_last_bits, crc));

        let Some((mut bytes, last_bits)) = reply else {
            *self.reg_mut(Register::ComIrq) |= ComIrq::TIMER.bits();
            return;
        };

        let anticollision = tx == [0x93, 0x20];
        if anticollision {
            if let Some((index, mask)) = self.corrupt_anticollision {
                bytes[index] ^= mask;
            }
            if self.collision {
                *self.reg_mut(Register::Error) |= 0x08;
                *self.reg_mut(Register::Coll) = 0x05;
            }
        }
        if let Some(errors) = self.inject_error {
            *self.reg_mut(Register::Error) |= errors;
        }
        if self.crc_error_on_nibbles && last_bits == 4 {
            *self.reg_mut(Register::Error) |= 0x04;
        }

        self.fifo.extend(bytes);
        *self.reg_mut(Register::Control) |= last_bits;

        let mut irq = ComIrq::RX | ComIrq::IDLE;
        if self.timer_races_reply {
            irq |= ComIrq::TIMER;
        }
        *self.reg_mut(Register::ComIrq) |= irq.bits();
    }
}

impl RegisterBackend for SimChip {
    fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        Ok(match register {
            Register::FifoData => self.fifo.pop_front().unwrap_or(0),
            Register::FifoLevel => self.fifo.len() as u8,
            Register::ComIrq => {
                self.irq_polls += 1;
                self.register(register)
            }
            _ => self.register(register),
        })
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.writes += 1;
        match register {
            Register::Command => {
                *self.reg_mut(Register::Command) = value;
                self.run_command(PcdCommand::from_bits(value));
            }
            Register::ComIrq | Register::DivIrq => {
                let reg = self.reg_mut(register);
                if value & 0x80 != 0 {
                    *reg |= value & 0x7F;
                } else {
                    *reg &= !(value & 0x7F);
                }
            }
            Register::FifoLevel => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            Register::FifoData => self.fifo.push_back(value),
            Register::BitFraming => {
                *self.reg_mut(Register::BitFraming) = value & 0x7F;
                let transceive = self.register(Register::Command) & 0x0F == PcdCommand::Transceive.bits();
                if value & 0x80 != 0 && transceive {
                    self.transceive(value & 0x07);
                }
            }
            // TStopNow / TStartNow are strobes, RxLastBits is read-only
            Register::Control => {}
            Register::Status2 => {
                *self.reg_mut(Register::Status2) = value;
                if value & 0x08 == 0 {
                    if let Some(card) = self.card.as_mut() {
                        card.authenticated = None;
                    }
                }
            }
            _ => *self.reg_mut(register) = value,
        }
        Ok(())
    }
}

/// ISO/IEC 14443-3 CRC_A, LSB first
fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc & 0xFF) as u8;
        b ^= b << 4;
        let b = b as u16;
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}
