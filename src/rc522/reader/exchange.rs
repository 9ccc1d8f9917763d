use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::error::Error;
use crate::rc522::backend::RegisterBackend;
use crate::rc522::protocol::commands::{HLTA_FRAME, PcdCommand};
use crate::rc522::protocol::frame::{FIFO_SIZE, Frame};
use crate::rc522::protocol::registers::{bits, timer, ComIrq, ErrorFlags, Register};
use super::Rc522;

/// How the interrupt poll ended
enum Completion {
    Done(ComIrq),
    TimerExpired,
}

impl<B: RegisterBackend, D: DelayNs> Rc522<B, D> {
    /// Run one chip command against the card and collect the reply.
    ///
    /// `command` is [`PcdCommand::Transceive`] or [`PcdCommand::MfAuthent`];
    /// `reload` is the timer reload in ticks of roughly 0.3 ms. The chip is
    /// always returned to Idle, whatever the outcome.
    ///
    /// * timer expired without completion: [`Error::Timeout`], except for a
    ///   HLTA frame, where silence is the expected answer
    /// * completed, but the timer flag was raised too: [`Error::NoTag`]
    /// * ErrorReg collision bit: [`Error::Collision`]
    /// * other ErrorReg receive faults: [`Error::Chip`]
    pub fn exchange(&mut self, command: PcdCommand, data: &[u8], reload: u16) -> Result<Frame, Error> {
        if data.len() > FIFO_SIZE {
            return Err(Error::FrameTooLong(data.len()));
        }

        let result = self.run_exchange(command, data, reload);
        // leave the chip idle even when the bus or the card misbehaved
        let idle = self.write_register(Register::Command, PcdCommand::Idle.bits());

        let frame = result?;
        idle?;
        Ok(frame)
    }

    fn run_exchange(&mut self, command: PcdCommand, data: &[u8], reload: u16) -> Result<Frame, Error> {
        let irq_enable = command.irq_enable();
        let completion_irq = command.completion_irq();

        self.write_register(Register::TPrescaler, timer::EXCHANGE_TPRESCALER)?;
        self.write_register(Register::TMode, timer::EXCHANGE_TMODE)?;
        let [reload_hi, reload_lo] = reload.to_be_bytes();
        self.write_register(Register::TReloadLo, reload_lo)?;
        self.write_register(Register::TReloadHi, reload_hi)?;

        self.write_register(Register::ComIEn, irq_enable.bits() | bits::IRQ_INV)?;
        // Set1 = 0: clears every flag written as 1
        self.write_register(Register::ComIrq, ComIrq::all().difference(ComIrq::SET1).bits())?;
        self.write_register(Register::Command, PcdCommand::Idle.bits())?;
        self.backend.set_bits(Register::FifoLevel, bits::FLUSH_BUFFER)?;

        self.backend.write_fifo(data)?;
        self.write_register(Register::Command, command.bits())?;

        if command == PcdCommand::Transceive {
            self.backend.set_bits(Register::BitFraming, bits::START_SEND)?;
        } else {
            self.backend.set_bits(Register::Control, bits::TSTART_NOW)?;
        }

        let completion = self.wait_for_completion(completion_irq);
        self.backend.clear_bits(Register::BitFraming, bits::START_SEND)?;
        self.backend.set_bits(Register::Control, bits::TSTOP_NOW)?;

        let irq = match completion? {
            Completion::Done(irq) => irq,
            Completion::TimerExpired => {
                if command == PcdCommand::Transceive && data == HLTA_FRAME {
                    debug!("HLTA: no reply, card halted");
                    return Ok(Frame::empty());
                }
                debug!("{command:?}: timer expired, no reply");
                return Err(Error::Timeout);
            }
        };

        let errors = ErrorFlags::from_bits_truncate(self.read_register(Register::Error)?);
        if errors.contains(ErrorFlags::COLLISION) {
            let coll = self.read_register(Register::Coll)?;
            debug!("{command:?}: collision, CollReg {coll:#04X}");
            return Err(Error::Collision(coll));
        }
        if errors.intersects(ErrorFlags::RECEIVE_FAULTS) {
            debug!("{command:?}: receive errors {errors:?}");
            return Err(Error::Chip(errors));
        }
        if irq.intersects(irq_enable & ComIrq::TIMER) {
            debug!("{command:?}: completed after the timer expired");
            return Err(Error::NoTag);
        }

        if command != PcdCommand::Transceive {
            return Ok(Frame::empty());
        }

        let level = (self.read_register(Register::FifoLevel)? & bits::FIFO_LEVEL_MASK) as usize;
        let last_bits = self.read_register(Register::Control)? & bits::RX_LAST_BITS;
        let mut frame = Frame::empty().with_last_bits(last_bits);
        self.backend.read_fifo(frame.fill(level))?;

        // MIFARE ACK/NAK nibbles carry no CRC
        if errors.contains(ErrorFlags::CRC) && !frame.is_nibble() {
            debug!("{command:?}: CRC error on {frame:?}");
            return Err(Error::Chip(errors));
        }

        debug!("{command:?}: {frame:?}");
        Ok(frame)
    }

    fn wait_for_completion(&mut self, completion_irq: ComIrq) -> Result<Completion, Error> {
        for _ in 0..self.config.max_polls {
            let irq = ComIrq::from_bits_truncate(self.read_register(Register::ComIrq)?);
            if irq.intersects(completion_irq) {
                return Ok(Completion::Done(irq));
            }
            if irq.contains(ComIrq::TIMER) {
                return Ok(Completion::TimerExpired);
            }
        }

        warn!("ComIrqReg never signalled after {} polls", self.config.max_polls);
        Err(Error::PollLimit(self.config.max_polls))
    }
}
