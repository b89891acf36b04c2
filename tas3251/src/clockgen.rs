//! Driver for the PLL clock generator feeding the DAC its master clock.
//!
//! The generator has no pages and no cacheable state worth tracking, so
//! this talks straight to the transport instead of going through
//! [`crate::regmap`]. Register content comes from the fixed tables in
//! [`tas3251_protocol::clockgen`].

use std::{thread, time::Duration};

use log::debug;
use tas3251_protocol::clockgen::{
    ClkOut, Config, ConfigError, RateFamily, DEFAULT_RATE, PLL_RESET_SETTLE_MS,
};

use crate::{transport::Transport, Error, Result};

pub struct ClockGen<T> {
    transport: T,
    config: Config,
    rate: Option<u32>,
}

impl<T: Transport> ClockGen<T> {
    pub fn new(transport: T, config: Config) -> Self {
        ClockGen {
            transport,
            config,
            rate: None,
        }
    }

    pub fn with_clkout(transport: T, clkout: ClkOut) -> Self {
        ClockGen::new(
            transport,
            Config {
                i2c_reg: None,
                clkout: Some(clkout),
            },
        )
    }

    fn write_all(&mut self, regs: &[(u8, u8)]) -> Result<()> {
        for &(reg, value) in regs {
            self.transport.write_reg(reg, value)?;
        }
        Ok(())
    }

    /// Program the base configuration and bring the output up at the
    /// default rate. The first write doubles as an I2C liveness check.
    pub fn probe(&mut self) -> Result<()> {
        let common = self.config.common_regs().map_err(|e| match e {
            ConfigError::I2cAddrOutOfRange(addr) => Error::BadClockGenAddr(addr),
        })?;
        self.write_all(&common)?;
        self.set_rate(DEFAULT_RATE)
    }

    /// Reprogram the synthesizer for the family containing `rate` and
    /// wait out the PLL settle time.
    pub fn set_rate(&mut self, rate: u32) -> Result<()> {
        let family = RateFamily::of(rate).ok_or(Error::UnsupportedRate(rate))?;
        debug!("clock generator: {} Hz, mclk {}", rate, family.mclk_rate());

        self.write_all(family.regs())?;
        thread::sleep(Duration::from_millis(u64::from(PLL_RESET_SETTLE_MS)));
        self.rate = Some(rate);
        Ok(())
    }

    /// Family of the last programmed rate.
    pub fn family(&self) -> Option<RateFamily> {
        self.rate.and_then(RateFamily::of)
    }

    pub fn rate(&self) -> Option<u32> {
        self.rate
    }
}
