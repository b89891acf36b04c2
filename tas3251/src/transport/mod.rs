//! Bus access traits for talking to the chips.
//!
//! Both the DAC and the clock generator speak plain byte-register I2C, so
//! the transport surface is a pair of blocking single-register accessors.
//! Page banking sits above this, in [`crate::regmap`].

use thiserror::Error;

pub mod i2c;
pub use i2c::I2cTransport;
#[cfg(any(feature = "mock", test))]
pub mod mock;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("bus error: {0}")]
    Bus(String),

    #[error("device did not acknowledge")]
    Nack,
}

/// Blocking register access on the currently selected page.
pub trait Transport {
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), TransportError>;
    fn read_reg(&mut self, reg: u8) -> Result<u8, TransportError>;
}
