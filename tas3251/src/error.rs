use tas3251_protocol::{ClockError, FirmwareError};
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("clock tree error: {0}")]
    Clocking(#[from] ClockError),

    #[error("invalid firmware: {0}")]
    Firmware(#[from] FirmwareError),

    #[error("unsupported sample width: {0}")]
    BadWidth(u32),

    #[error("unsupported sample rate: {0}")]
    UnsupportedRate(u32),

    #[error("bclk ratio too big: {0}")]
    BadBclkRatio(u32),

    #[error("clock provider role needs an external clock rate")]
    MissingSysclk,

    #[error("pll input and output must both be routed, on distinct gpios")]
    PllRouting,

    #[error("gpio index out of range: {0}")]
    BadGpio(u8),

    #[error("amp mute gpio: {0}")]
    Gpio(String),

    #[error("clock generator address {0:#04x} outside 0x60..=0x6f")]
    BadClockGenAddr(u8),

    #[error("overclock allowance {0}% above the {1}% limit")]
    BadOverclock(u32, u32),

    #[error("timed out polling register {reg:#05x}")]
    PollTimeout { reg: u32 },

    #[error("register cache is in cache-only mode")]
    CacheOnly,

    #[error("not allowed while a stream is active")]
    Busy,
}
