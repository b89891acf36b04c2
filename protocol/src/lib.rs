#![cfg_attr(not(feature = "std"), no_std)]

//! Register-level protocol support for the TI TAS3251 audio DAC and the
//! PLL clock generator used next to it on the HiFiBerry DAC+ HD board.
//!
//! This crate holds the pure parts of the driver: the page-banked register
//! map, the clock/divider solver, the PPC3 configuration byte-code and the
//! clock generator register tables. There is no I/O here and no transport
//! implementation; the `tas3251` crate layers those on top.
//!
//! It is meant to be as lean as possible in order to run in restricted
//! environments, hence the `std`/`debug` feature split.

extern crate alloc;

mod util;

pub mod clockgen;
pub mod clocking;
pub use clocking::{ClockError, DividerSet, PllCoefficients};

pub mod microprogram;
pub use microprogram::{FirmwareError, Opcode};

pub mod regs;
