/// Hardware-independent protocol definitions
///
/// Register map, chip and card command codes, and the FIFO-bounded frame type.
/// Nothing in here talks to a bus.

pub mod commands;
pub mod frame;
pub mod registers;

pub use commands::{PcdCommand, PiccCommand, RequestCode};
pub use frame::{FIFO_SIZE, Frame};
pub use registers::Register;
