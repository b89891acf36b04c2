//! HiFiBerry DAC+ HD board glue.
//!
//! The board pairs a TAS3251 with a PLL clock generator so the DAC can be
//! clocked from a clean 22.5792 or 24.576 MHz master clock instead of
//! multiplying its own PLL up from BCLK. An optional GPIO mutes the
//! amplifier stage around bias transitions, and a PPC3 configuration
//! stream (when the distribution ships one) programs the DSP per sample
//! rate.

use bytes::Bytes;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};
use tas3251_protocol::clockgen::RateFamily;

use crate::{
    clockgen::ClockGen,
    device::{BiasLevel, BoardResources, ClockProvider, DaiFormat, HwParams, SerialFormat, Tas3251},
    transport::Transport,
    Error, Result,
};

/// Sample rates the generator tables cover.
pub const RATES: &[u32] = &[32_000, 44_100, 48_000, 88_200, 96_000, 176_400, 192_000];

/// Both chips see 32-bit slots on the bus regardless of sample width.
pub const BCLK_RATIO: u32 = 64;

/// 0x30 is 0 dB; the board caps playback there to protect the amp.
pub const VOLUME_MIN: u8 = 0x30;

/// Power-up playback volume, -32 dB.
pub const INITIAL_VOLUME: u8 = 0x70;

/// Where PPC3 configuration streams come from. The board runs fine
/// without one, just without the DSP program.
pub trait FirmwareSource {
    fn load(&mut self, profile: &str, rate: u32) -> Option<Bytes>;
}

/// No configuration streams at all.
impl FirmwareSource for () {
    fn load(&mut self, _profile: &str, _rate: u32) -> Option<Bytes> {
        None
    }
}

pub struct DacPlusHd<D, C, P, F> {
    dac: Tas3251<D>,
    clockgen: ClockGen<C>,
    amp_mute: Option<P>,
    firmware: F,
    profile: String,
}

impl<D, C, P, F> DacPlusHd<D, C, P, F>
where
    D: Transport,
    C: Transport,
    P: OutputPin,
    F: FirmwareSource,
{
    pub fn new(
        dac: Tas3251<D>,
        clockgen: ClockGen<C>,
        amp_mute: Option<P>,
        firmware: F,
    ) -> Self {
        DacPlusHd {
            dac,
            clockgen,
            amp_mute,
            firmware,
            profile: "default".to_string(),
        }
    }

    /// Select which PPC3 profile `hw_params` will ask the firmware source
    /// for.
    pub fn set_profile(&mut self, profile: &str) {
        self.profile = profile.to_string();
    }

    pub fn dac(&self) -> &Tas3251<D> {
        &self.dac
    }

    fn set_amp_mute(&mut self, mute: bool) -> Result<()> {
        if let Some(pin) = self.amp_mute.as_mut() {
            let result = if mute { pin.set_high() } else { pin.set_low() };
            result.map_err(|e| Error::Gpio(format!("{:?}", e)))?;
        }
        Ok(())
    }

    /// Bring up both chips: amp muted, DAC reset into standby, clock
    /// generator running at its default rate, DAC in provider mode fed
    /// from the generator.
    pub fn probe(&mut self, resources: &mut impl BoardResources) -> Result<()> {
        self.set_amp_mute(true)?;
        self.dac.probe(resources)?;
        self.clockgen.probe()?;

        self.dac.set_fmt(DaiFormat {
            provider: ClockProvider::Provider,
            format: SerialFormat::I2s,
        })?;
        self.dac.set_bclk_ratio(BCLK_RATIO)?;
        self.dac
            .set_digital_volume(INITIAL_VOLUME, INITIAL_VOLUME)?;
        Ok(())
    }

    /// Stream-open hook. Returns the rates the clock generator can serve.
    pub fn startup(&self) -> Result<&'static [u32]> {
        self.dac.startup()?;
        Ok(RATES)
    }

    /// Playback volume with the board's 0 dB cap applied.
    pub fn set_volume(&self, left: u8, right: u8) -> Result<()> {
        self.dac
            .set_digital_volume(left.max(VOLUME_MIN), right.max(VOLUME_MIN))
    }

    /// Retune the clock generator for the rate's family, then program the
    /// DAC's clock tree and DSP configuration. A missing or unreadable
    /// configuration stream degrades to running without the DSP program.
    pub fn hw_params(&mut self, params: &HwParams) -> Result<()> {
        let family = RateFamily::of(params.rate).ok_or(Error::UnsupportedRate(params.rate))?;

        self.clockgen.set_rate(params.rate)?;
        self.dac.set_sysclk(family.mclk_rate());
        self.dac.hw_params(params)?;

        match self.firmware.load(&self.profile, params.rate) {
            Some(data) => {
                if let Err(e) = self.dac.load_config(&data, params.rate) {
                    warn!("configuration stream rejected, running unconfigured: {}", e);
                }
            }
            None => {
                debug!(
                    "no configuration stream for profile {:?} at {} Hz",
                    self.profile, params.rate
                );
            }
        }
        Ok(())
    }

    /// Bias transitions, wrapping the DAC's with the amp mute GPIO so the
    /// amplifier only hears the DAC once it is fully up.
    pub fn set_bias_level(&mut self, level: BiasLevel) -> Result<()> {
        let prev = self.dac.bias_level();

        if level == BiasLevel::Standby && prev == BiasLevel::Prepare {
            self.set_amp_mute(true)?;
        }
        self.dac.set_bias_level(level)?;
        if level == BiasLevel::Prepare && prev == BiasLevel::Standby {
            self.set_amp_mute(false)?;
        }
        Ok(())
    }

    pub fn suspend(&mut self, resources: &mut impl BoardResources) -> Result<()> {
        self.set_amp_mute(true)?;
        self.dac.suspend(resources)
    }

    pub fn resume(&mut self, resources: &mut impl BoardResources) -> Result<()> {
        self.dac.resume(resources)
    }
}
