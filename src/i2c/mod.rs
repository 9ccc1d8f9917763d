/// Two-wire bus bit-banged on an FTDI FT4232H
pub mod i2c_bitbang;
