use embedded_hal::delay::DelayNs;
use log::debug;

use crate::error::Error;
use crate::rc522::backend::RegisterBackend;
use crate::rc522::protocol::commands::{
    timeout, PcdCommand, PiccCommand, RequestCode, HLTA_FRAME, MIFARE_ACK, MIFARE_ACK_MASK,
    NVB_ANTICOLLISION, NVB_SELECT,
};
use crate::rc522::protocol::frame::Frame;
use crate::rc522::protocol::registers::{bits, Register, Status2};
use crate::rc522::session::{sector_of, AtqA, Card, CardState, Key, KeyType, Sak, Uid};
use super::Rc522;

/// A MIFARE Classic data block
pub const BLOCK_SIZE: usize = 16;

/// Request is tried once more when the first attempt times out
const REQUEST_ATTEMPTS: u32 = 2;

impl<B: RegisterBackend, D: DelayNs> Rc522<B, D> {
    /// Wake cards in the field (REQA / WUPA) and return their ATQA.
    ///
    /// Starts a new session. A timeout is retried once; if the second attempt
    /// also times out the field is considered empty and [`Error::NoTag`] is
    /// returned. Anything but a 16-bit answer is an error.
    pub fn request(&mut self, code: RequestCode) -> Result<AtqA, Error> {
        self.session.invalidate();

        let mut attempt = 1;
        let result = loop {
            match self.request_once(code) {
                Err(Error::Timeout) if attempt < REQUEST_ATTEMPTS => {
                    debug!("{code:?}: no answer, retrying");
                    attempt += 1;
                }
                Err(Error::Timeout) => break Err(Error::NoTag),
                other => break other,
            }
        };

        let atqa = self.track(result)?;
        debug!("ATQA {:02X?} ({})", atqa.0, atqa.card_type());
        self.session.requested(atqa);
        Ok(atqa)
    }

    fn request_once(&mut self, code: RequestCode) -> Result<AtqA, Error> {
        self.backend.clear_bits(Register::Status2, Status2::CRYPTO1_ON.bits())?;
        self.write_register(Register::Coll, bits::VALUES_AFTER_COLL)?;
        self.set_crc(false)?;
        self.write_register(Register::BitFraming, bits::SHORT_FRAME)?;
        if self.read_register(Register::TxControl)? & bits::ANTENNA_ON != bits::ANTENNA_ON {
            self.antenna_on()?;
        }

        let reply = self.exchange(PcdCommand::Transceive, &[code.command().bits()], timeout::REQUEST);
        self.write_register(Register::BitFraming, 0x00)?;
        let frame = reply?;

        match frame.as_bytes() {
            &[lo, hi] if frame.bit_len() == 16 => Ok(AtqA([lo, hi])),
            _ => Err(Error::FrameLength {
                expected: 16,
                actual: frame.bit_len(),
            }),
        }
    }

    /// Cascade level 1 anticollision: read the 4-byte UID and check its BCC.
    ///
    /// Needs a prior successful [`request`](Self::request). A bit collision
    /// (two cards answering) is returned as [`Error::Collision`].
    pub fn anticollide(&mut self) -> Result<Uid, Error> {
        self.require(|s| matches!(s, CardState::Requested | CardState::Anticollided))?;

        let result = self.anticollide_once();
        let uid = self.track(result)?;
        debug!("UID {uid}");
        self.session.anticollided(uid);
        Ok(uid)
    }

    fn anticollide_once(&mut self) -> Result<Uid, Error> {
        self.set_crc(false)?;
        self.write_register(Register::Coll, 0x00)?;
        self.write_register(Register::BitFraming, 0x00)?;

        let reply = self.exchange(
            PcdCommand::Transceive,
            &[PiccCommand::SelCl1.bits(), NVB_ANTICOLLISION],
            timeout::ANTICOLLISION,
        );
        self.write_register(Register::Coll, bits::VALUES_AFTER_COLL)?;
        let frame = reply?;

        let &[u0, u1, u2, u3, bcc] = frame.as_bytes() else {
            return Err(Error::FrameLength {
                expected: 40,
                actual: frame.bit_len(),
            });
        };
        if frame.last_bits() != 0 {
            return Err(Error::FrameLength {
                expected: 40,
                actual: frame.bit_len(),
            });
        }

        let uid = Uid([u0, u1, u2, u3]);
        if uid.bcc() != bcc {
            return Err(Error::Bcc {
                expected: uid.bcc(),
                actual: bcc,
            });
        }
        Ok(uid)
    }

    /// Select the card with `uid` and return its SAK. Needs a prior
    /// [`anticollide`](Self::anticollide).
    pub fn select(&mut self, uid: Uid) -> Result<Sak, Error> {
        self.require(|s| s == CardState::Anticollided)?;

        let result = self.select_once(uid);
        let sak = self.track(result)?;
        debug!("selected {uid}, SAK {:#04X}", sak.0);
        self.session.selected(uid, sak);
        Ok(sak)
    }

    fn select_once(&mut self, uid: Uid) -> Result<Sak, Error> {
        self.set_crc(true)?;

        let [u0, u1, u2, u3] = uid.0;
        let frame = self.exchange(
            PcdCommand::Transceive,
            &[PiccCommand::SelCl1.bits(), NVB_SELECT, u0, u1, u2, u3, uid.bcc()],
            timeout::SELECT,
        )?;

        match frame.as_bytes().first() {
            Some(&sak) => Ok(Sak(sak)),
            None => Err(Error::FrameLength {
                expected: 8,
                actual: 0,
            }),
        }
    }

    /// Request, anticollision and select in one go
    pub fn detect(&mut self, code: RequestCode) -> Result<Card, Error> {
        let atqa = self.request(code)?;
        let uid = self.anticollide()?;
        let sak = self.select(uid)?;
        Ok(Card { atqa, uid, sak })
    }

    /// Three-pass MIFARE authentication for the sector holding `block`.
    ///
    /// Succeeds only if the chip reports the Crypto1 unit active afterwards; a
    /// command that completes without switching it on is an error.
    pub fn authenticate(&mut self, key_type: KeyType, block: u8, key: &Key, uid: Uid) -> Result<(), Error> {
        self.require(|s| matches!(s, CardState::Selected | CardState::Authenticated { .. }))?;

        let result = self.authenticate_once(key_type, block, key, uid);
        self.track(result)?;
        let sector = sector_of(block);
        debug!("authenticated sector {sector} with key {key_type:?}");
        self.session.authenticated(sector);
        Ok(())
    }

    fn authenticate_once(&mut self, key_type: KeyType, block: u8, key: &Key, uid: Uid) -> Result<(), Error> {
        let mut payload = [0u8; 12];
        payload[0] = key_type.command().bits();
        payload[1] = block;
        payload[2..8].copy_from_slice(key.bytes());
        payload[8..12].copy_from_slice(uid.bytes());

        self.set_crc(true)?;
        self.exchange(PcdCommand::MfAuthent, &payload, timeout::AUTHENTICATE)?;

        let status = Status2::from_bits_truncate(self.read_register(Register::Status2)?);
        if !status.contains(Status2::CRYPTO1_ON) {
            return Err(Error::CryptoInactive);
        }
        Ok(())
    }

    /// Read one 16-byte block. The session must be authenticated for its sector.
    pub fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE], Error> {
        let result = self.read_block_once(block);
        self.track(result)
    }

    fn read_block_once(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE], Error> {
        self.require_authenticated(block)?;
        self.set_crc(true)?;

        let frame = self.exchange(
            PcdCommand::Transceive,
            &[PiccCommand::Read.bits(), block],
            timeout::READ,
        )?;

        if frame.is_nibble() {
            return Err(Error::Nak(frame.as_bytes()[0] & MIFARE_ACK_MASK));
        }
        if frame.bit_len() != BLOCK_SIZE * 8 {
            return Err(Error::FrameLength {
                expected: BLOCK_SIZE * 8,
                actual: frame.bit_len(),
            });
        }

        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(frame.as_bytes());
        Ok(data)
    }

    /// Write one 16-byte block in two phases: the WRITE command, then the data.
    /// Each phase must be answered with the 4-bit MIFARE ACK.
    pub fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<(), Error> {
        let result = self.write_block_once(block, data);
        self.track(result)
    }

    fn write_block_once(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<(), Error> {
        self.require_authenticated(block)?;
        self.set_crc(true)?;

        let ack = self.exchange(
            PcdCommand::Transceive,
            &[PiccCommand::Write.bits(), block],
            timeout::WRITE_COMMAND,
        )?;
        Self::check_ack(&ack)?;

        let ack = self.exchange(PcdCommand::Transceive, data, timeout::WRITE_DATA)?;
        Self::check_ack(&ack)?;

        debug!("wrote block {block}");
        Ok(())
    }

    /// Put the card into HALT. Silence is the success answer.
    ///
    /// Crypto1 is switched off and the session ends, whatever the outcome.
    pub fn halt(&mut self) -> Result<(), Error> {
        let result = self.halt_once();
        let crypto_off = self.backend.clear_bits(Register::Status2, Status2::CRYPTO1_ON.bits());
        self.session.invalidate();
        result?;
        crypto_off
    }

    fn halt_once(&mut self) -> Result<(), Error> {
        self.set_crc(true)?;
        let frame = self.exchange(PcdCommand::Transceive, &HLTA_FRAME, timeout::HALT)?;
        if !frame.is_empty() {
            return Err(Error::FrameLength {
                expected: 0,
                actual: frame.bit_len(),
            });
        }
        Ok(())
    }

    /// Switch Crypto1 off; the card stays selected
    pub fn stop_crypto(&mut self) -> Result<(), Error> {
        self.backend.clear_bits(Register::Status2, Status2::CRYPTO1_ON.bits())?;
        self.session.deauthenticated();
        Ok(())
    }

    fn check_ack(frame: &Frame) -> Result<(), Error> {
        if !frame.is_nibble() {
            return Err(Error::FrameLength {
                expected: 4,
                actual: frame.bit_len(),
            });
        }
        let nibble = frame.as_bytes()[0] & MIFARE_ACK_MASK;
        if nibble != MIFARE_ACK {
            return Err(Error::Nak(nibble));
        }
        Ok(())
    }

    fn set_crc(&mut self, enabled: bool) -> Result<(), Error> {
        for register in [Register::TxMode, Register::RxMode] {
            if enabled {
                self.backend.set_bits(register, bits::CRC_EN)?;
            } else {
                self.backend.clear_bits(register, bits::CRC_EN)?;
            }
        }
        Ok(())
    }

    fn require(&mut self, allowed: impl Fn(CardState) -> bool) -> Result<(), Error> {
        let state = self.session.state();
        if allowed(state) {
            return Ok(());
        }
        self.session.invalidate();
        Err(Error::InvalidState(state))
    }

    fn require_authenticated(&self, block: u8) -> Result<(), Error> {
        if self.session.is_authenticated_for(block) {
            Ok(())
        } else {
            Err(Error::NotAuthenticated { block })
        }
    }

    /// Any failure ends the session
    fn track<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            if self.session.state() != CardState::Idle {
                debug!("{e}, session reset");
            }
            self.session.invalidate();
        }
        result
    }
}
