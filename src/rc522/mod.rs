pub mod backend;
pub mod protocol;
pub mod reader;
pub mod session;

#[cfg(test)]
pub(crate) mod sim;

pub use reader::card::BLOCK_SIZE;
