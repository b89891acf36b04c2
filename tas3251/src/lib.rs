//! This crate provides a high level control API for the TI TAS3251 audio
//! DAC, the PLL clock generator sitting next to it on the HiFiBerry DAC+
//! HD, and the board glue tying the two together. To get started,
//! instantiate a transport for each chip (usually
//! [`transport::I2cTransport`] over an `embedded-hal` bus, or
//! [`transport::mock::MockTransport`] in tests), then build a
//! [`Tas3251`] device around it:
//!
//! ```no_run
//! use tas3251::{
//!     device::{Config, DaiFormat, HwParams},
//!     transport::mock::MockTransport,
//!     Tas3251,
//! };
//!
//! fn main() -> tas3251::Result<()> {
//!     let dac = Tas3251::new(MockTransport::new(), Config::default())?;
//!     dac.probe(&mut ())?;
//!
//!     dac.set_fmt(DaiFormat::default())?;
//!     dac.set_sysclk(24_576_000);
//!     dac.hw_params(&HwParams {
//!         rate: 48_000,
//!         width: 32,
//!         channels: 2,
//!     })?;
//!
//!     dac.mute_stream(false)?;
//!     Ok(())
//! }
//! ```
//!
//! The pure register-level pieces (register map, clock solver, PPC3
//! configuration codec, clock generator tables) live in the
//! `tas3251-protocol` crate and are re-exported as [`protocol`].

pub use tas3251_protocol as protocol;

pub mod clockgen;
pub mod device;
pub mod error;
pub mod hifiberry;
pub mod regmap;
pub mod transport;

pub use clockgen::ClockGen;
pub use device::Tas3251;
pub use error::Error;
pub use hifiberry::DacPlusHd;
pub use regmap::Regmap;
pub use transport::Transport;

pub type Result<T, E = Error> = core::result::Result<T, E>;
