//! TAS3251 device driver: format negotiation, clock tree commit, mute
//! sequencing, bias levels, power events and PPC3 configuration loading.
//!
//! All mutable state lives behind one per-device mutex, so a board can
//! share a [`Tas3251`] handle between its stream path and its mixer
//! controls. Register writes are sequenced the way the chip wants them:
//! clock dividers are fully solved in [`tas3251_protocol::clocking`]
//! before the first divider register is touched, so a constraint failure
//! never leaves a half-programmed clock tree behind.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use bytes::Bytes;
use log::{debug, warn};
use tas3251_protocol::{
    clocking::{
        self, ClockParams, DacClockSource, DividerSet, Overclock, RationalRates, CONSUMER_RATES,
    },
    microprogram::{Opcode, Reader},
    regs,
};

use crate::{regmap::Regmap, transport::Transport, Error, Result};

const MUTE_POLL_INTERVAL: Duration = Duration::from_micros(200);
const MUTE_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Control-exposed overclock ceilings, percent above nominal.
pub const OVERCLOCK_PLL_LIMIT: u32 = 20;
pub const OVERCLOCK_DSP_LIMIT: u32 = 40;
pub const OVERCLOCK_DAC_LIMIT: u32 = 40;

/// Mute cause mask bits.
const MUTE_STREAM: u8 = 0x1;
const MUTE_RIGHT: u8 = 0x2;
const MUTE_LEFT: u8 = 0x4;

/// Static device wiring, the moral equivalent of the devicetree node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// GPIO (1..=6) feeding an external reference into the PLL.
    pub pll_in: Option<u8>,
    /// GPIO (1..=6) carrying the PLL output back out to the board.
    pub pll_out: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockProvider {
    /// SCLK and LRCLK are both inputs.
    Consumer,
    /// SCLK and LRCLK are both outputs.
    Provider,
    /// SCLK is an output, LRCLK stays an input.
    BitClockProvider,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerialFormat {
    I2s,
    RightJustified,
    LeftJustified,
    DspA,
    DspB,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DaiFormat {
    pub provider: ClockProvider,
    pub format: SerialFormat,
}

impl Default for DaiFormat {
    fn default() -> Self {
        DaiFormat {
            provider: ClockProvider::Consumer,
            format: SerialFormat::I2s,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwParams {
    pub rate: u32,
    pub width: u32,
    pub channels: u32,
}

impl HwParams {
    /// Bit clocks per frame.
    pub fn frame_size(&self) -> u32 {
        self.width * self.channels
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BiasLevel {
    Off,
    Standby,
    Prepare,
    On,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Supply {
    Avdd,
    Dvdd,
    Cpvdd,
    Gvdd,
    Pvdd,
}

impl Supply {
    pub const ALL: [Supply; 5] = [
        Supply::Avdd,
        Supply::Dvdd,
        Supply::Cpvdd,
        Supply::Gvdd,
        Supply::Pvdd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Supply::Avdd => "AVDD",
            Supply::Dvdd => "DVDD",
            Supply::Cpvdd => "CPVDD",
            Supply::Gvdd => "GVDD",
            Supply::Pvdd => "PVDD",
        }
    }
}

/// Board-owned resources the device needs sequenced around power
/// transitions. Suspend releases them in reverse of the fixed resume
/// order (clock, then supplies, then register resync).
pub trait BoardResources {
    fn enable_clock(&mut self) -> Result<()> {
        Ok(())
    }
    fn disable_clock(&mut self) -> Result<()> {
        Ok(())
    }
    fn enable_supplies(&mut self) -> Result<()> {
        Ok(())
    }
    fn disable_supplies(&mut self) -> Result<()> {
        Ok(())
    }
}

/// For boards where clocks and supplies are hard-wired.
impl BoardResources for () {}

/// Sample rates reachable for a given frame geometry and clocking role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateConstraint {
    /// Only the listed rates work.
    List(&'static [u32]),
    /// Everything the chip supports works.
    Any,
    /// Two inclusive windows with a hole between them.
    Windows([(u32, u32); 2]),
    /// `num / den` for every divider in `den_min..=den_max`.
    Rational(RationalRates),
}

struct Inner<T> {
    regmap: Regmap<T>,
    fmt: DaiFormat,
    bclk_ratio: u32,
    mute: u8,
    overclock: Overclock,
    sysclk: Option<u32>,
    applied_rate: Option<u32>,
    committed: Option<DividerSet>,
    bias: BiasLevel,
}

pub struct Tas3251<T> {
    config: Config,
    inner: Mutex<Inner<T>>,
}

impl<T: Transport> Tas3251<T> {
    /// Wraps a transport. Fails when the PLL routing config is
    /// inconsistent: both GPIOs must be routed or neither, on distinct
    /// pins in 1..=6.
    pub fn new(transport: T, config: Config) -> Result<Self> {
        for gpio in [config.pll_in, config.pll_out].into_iter().flatten() {
            if !(1..=6).contains(&gpio) {
                return Err(Error::BadGpio(gpio));
            }
        }
        if config.pll_in.is_some() != config.pll_out.is_some() {
            return Err(Error::PllRouting);
        }
        if config.pll_in.is_some() && config.pll_in == config.pll_out {
            return Err(Error::PllRouting);
        }

        Ok(Tas3251 {
            config,
            inner: Mutex::new(Inner {
                regmap: Regmap::new(transport),
                fmt: DaiFormat::default(),
                bclk_ratio: 0,
                mute: 0,
                overclock: Overclock::default(),
                sysclk: None,
                applied_rate: None,
                committed: None,
                bias: BiasLevel::Off,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pll_routed(&self) -> bool {
        self.config.pll_out.is_some()
    }

    /// Reset the chip and leave it in standby. The reset write doubles as
    /// an I2C liveness check.
    pub fn probe(&self, resources: &mut impl BoardResources) -> Result<()> {
        resources.enable_supplies()?;

        let mut inner = self.lock();
        inner.regmap.write(regs::RESET, regs::RSTM | regs::RSTR)?;
        inner.regmap.write(regs::RESET, 0)?;
        drop(inner);

        resources.enable_clock()?;

        let mut inner = self.lock();
        inner
            .regmap
            .update_bits(regs::POWER, regs::RQST, regs::RQST)?;
        Ok(())
    }

    /// External clock rate on the SCLK pin.
    pub fn set_sysclk(&self, rate: u32) {
        self.lock().sysclk = Some(rate);
    }

    /// Fixed bit clocks per frame, overriding the frame geometry from
    /// `hw_params`. Zero restores the default.
    pub fn set_bclk_ratio(&self, ratio: u32) -> Result<()> {
        if ratio > 256 {
            return Err(Error::BadBclkRatio(ratio));
        }
        self.lock().bclk_ratio = ratio;
        Ok(())
    }

    pub fn set_fmt(&self, fmt: DaiFormat) -> Result<()> {
        let mut inner = self.lock();

        let (clock_output, provider_mode) = match fmt.provider {
            ClockProvider::Consumer => (0, 0),
            ClockProvider::Provider => {
                (regs::SCLKO | regs::LRKO, regs::RLRK | regs::RSCLK)
            }
            ClockProvider::BitClockProvider => (regs::SCLKO, regs::RSCLK),
        };

        inner.regmap.update_bits(
            regs::SCLK_LRCLK_CFG,
            regs::SCLKP | regs::SCLKO | regs::LRKO,
            clock_output,
        )?;
        inner
            .regmap
            .update_bits(regs::MASTER_MODE, regs::RLRK | regs::RSCLK, provider_mode)?;

        let (afmt, offset) = match fmt.format {
            SerialFormat::I2s => (regs::AFMT_I2S, 0),
            SerialFormat::RightJustified => (regs::AFMT_RTJ, 0),
            SerialFormat::LeftJustified => (regs::AFMT_LTJ, 0),
            SerialFormat::DspA => (regs::AFMT_DSP, 1),
            SerialFormat::DspB => (regs::AFMT_DSP, 0),
        };

        inner.regmap.update_bits(regs::I2S_1, regs::AFMT, afmt)?;
        inner.regmap.update_bits(regs::I2S_2, 0xff, offset)?;

        inner.fmt = fmt;
        Ok(())
    }

    /// Stream-open fixups. Without an external SCLK in consumer role the
    /// chip runs its PLL from BCLK, with the missing-SCLK error ignored.
    pub fn startup(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.fmt.provider {
            ClockProvider::Provider | ClockProvider::BitClockProvider => {
                if inner.sysclk.is_none() {
                    return Err(Error::MissingSysclk);
                }
            }
            ClockProvider::Consumer => {
                if inner.sysclk.is_none() {
                    debug!("no SCLK, using BCLK as PLL input");
                    inner
                        .regmap
                        .update_bits(regs::ERROR_DETECT, regs::IDCH, regs::IDCH)?;
                    inner.regmap.update_bits(
                        regs::PLL_DSP_REF,
                        regs::SREF | regs::SDSP,
                        regs::SREF_SCLK | regs::SDSP_PLL,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Which sample rates the current role and frame geometry allow.
    pub fn rate_constraint(&self, frame_size: u32) -> Result<RateConstraint> {
        let inner = self.lock();
        match inner.fmt.provider {
            ClockProvider::Consumer => Ok(RateConstraint::List(CONSUMER_RATES)),
            ClockProvider::Provider | ClockProvider::BitClockProvider => {
                let sysclk = inner.sysclk.ok_or(Error::MissingSysclk)?;
                if self.pll_routed() {
                    match clocking::provider_rate_windows(frame_size, &inner.overclock)? {
                        None => Ok(RateConstraint::Any),
                        Some(windows) => Ok(RateConstraint::Windows(windows)),
                    }
                } else {
                    Ok(RateConstraint::Rational(clocking::no_pll_rates(sysclk)))
                }
            }
        }
    }

    pub fn hw_params(&self, params: &HwParams) -> Result<()> {
        let mut inner = self.lock();

        debug!("hw_params {} Hz, {} channels", params.rate, params.channels);

        let alen = match params.width {
            16 => regs::ALEN_16,
            20 => regs::ALEN_20,
            24 => regs::ALEN_24,
            32 => regs::ALEN_32,
            other => return Err(Error::BadWidth(other)),
        };
        inner.regmap.update_bits(regs::I2S_1, regs::ALEN, alen)?;

        if inner.fmt.provider == ClockProvider::Consumer {
            // the chip autosets its dividers from the incoming clocks
            inner.regmap.update_bits(regs::ERROR_DETECT, regs::DCAS, 0)?;
            return Ok(());
        }

        let detect_mask = regs::IDFS
            | regs::IDBK
            | regs::IDSK
            | regs::IDCH
            | regs::IDCM
            | regs::DCAS
            | regs::IPLK;
        if self.pll_routed() {
            inner.regmap.write(regs::FLEX_A, 0x11)?;
            inner.regmap.write(regs::FLEX_B, 0xff)?;
            inner.regmap.update_bits(
                regs::ERROR_DETECT,
                detect_mask,
                regs::IDFS | regs::IDBK | regs::IDSK | regs::IDCH | regs::DCAS,
            )?;
        } else {
            inner.regmap.update_bits(
                regs::ERROR_DETECT,
                detect_mask,
                regs::IDFS | regs::IDBK | regs::IDSK | regs::IDCH | regs::DCAS | regs::IPLK,
            )?;
            inner.regmap.update_bits(regs::PLL_EN, regs::PLLE, 0)?;
        }

        let frame_size = if inner.bclk_ratio > 0 {
            inner.bclk_ratio
        } else {
            params.frame_size()
        };
        let sclk_rate = inner.sysclk.ok_or(Error::MissingSysclk)?;

        let set = clocking::resolve(
            &ClockParams {
                sample_rate: params.rate,
                frame_size,
                sclk_rate,
                pll_generates_sck: self.pll_routed(),
            },
            &inner.overclock,
        )?;
        self.commit_dividers(&mut inner, &set)?;

        if self.pll_routed() {
            inner.regmap.update_bits(
                regs::PLL_DSP_REF,
                regs::SREF | regs::SDSP,
                regs::SREF_GPIO | regs::SDSP_PLL,
            )?;
            inner
                .regmap
                .update_bits(regs::GPIO_PLLIN, regs::GREF, regs::GREF_SDOUT)?;
            inner
                .regmap
                .update_bits(regs::PLL_EN, regs::PLLE, regs::PLLE)?;

            let pll_out = self.config.pll_out.unwrap_or_default();
            let enable = (u32::from(regs::G2OE) << (pll_out - 1)) as u8;
            inner.regmap.update_bits(regs::GPIO_EN, enable, enable)?;
            inner
                .regmap
                .update_bits(regs::GPIO_SDOUT, regs::G2SL, regs::G2SL_PLLCK)?;
        }

        inner.committed = Some(set);
        Ok(())
    }

    fn commit_dividers(&self, inner: &mut Inner<T>, set: &DividerSet) -> Result<()> {
        if let Some(pll) = set.pll {
            inner.regmap.write(regs::PLL_COEFF_0, (pll.p - 1) as u8)?;
            inner.regmap.write(regs::PLL_COEFF_1, pll.j as u8)?;
            inner.regmap.write(regs::PLL_COEFF_2, (pll.d >> 8) as u8)?;
            inner.regmap.write(regs::PLL_COEFF_3, (pll.d & 0xff) as u8)?;
            inner.regmap.write(regs::PLL_COEFF_4, (pll.r - 1) as u8)?;
        }

        match set.dac_source {
            DacClockSource::PllInput => {
                debug!("using pll input as dac input");
                inner
                    .regmap
                    .update_bits(regs::OSR_DAC_REF, regs::SDAC, regs::SDAC_GPIO)?;
                let pll_in = self.config.pll_in.unwrap_or_default();
                let gpio = regs::GREF_SDOUT + pll_in - 1;
                inner
                    .regmap
                    .update_bits(regs::GPIO_SDOUT, regs::GREF, gpio)?;
            }
            DacClockSource::Sclk => {
                inner
                    .regmap
                    .update_bits(regs::OSR_DAC_REF, regs::SDAC, regs::SDAC_SCLK)?;
            }
        }

        inner
            .regmap
            .write(regs::DSP_CLKDIV, (set.dsp_div - 1) as u8)?;
        inner
            .regmap
            .write(regs::DAC_CLKDIV, (set.dac_div - 1) as u8)?;
        inner
            .regmap
            .write(regs::NCP_CLKDIV, (set.ncp_div - 1) as u8)?;
        inner
            .regmap
            .write(regs::OSR_CLKDIV, (set.osr_div - 1) as u8)?;
        inner
            .regmap
            .write(regs::MASTER_CLKDIV_1, (set.bclk_div - 1) as u8)?;
        inner
            .regmap
            .write(regs::MASTER_CLKDIV_2, (set.lrclk_div - 1) as u8)?;

        inner.regmap.update_bits(
            regs::FS_SPEED_MODE,
            regs::FSSP,
            set.fs_speed.field_value(),
        )?;

        debug!(
            "dividers: dsp {} dac {} ncp {} osr {} bclk {} lrclk {} idac {}",
            set.dsp_div, set.dac_div, set.ncp_div, set.osr_div, set.bclk_div, set.lrclk_div,
            set.idac
        );
        Ok(())
    }

    fn write_mute(inner: &mut Inner<T>) -> Result<bool> {
        let value = (((inner.mute & (MUTE_STREAM | MUTE_LEFT) != 0) as u8) << regs::RQML_SHIFT)
            | (((inner.mute & (MUTE_STREAM | MUTE_RIGHT) != 0) as u8) << regs::RQMR_SHIFT);
        inner
            .regmap
            .update_bits(regs::MUTE, regs::RQML | regs::RQMR, value)
    }

    fn poll_mute_det(inner: &mut Inner<T>, expected: u8) {
        let result = inner.regmap.read_poll_timeout(
            regs::ANALOG_MUTE_DET,
            0x3,
            expected,
            MUTE_POLL_INTERVAL,
            MUTE_POLL_TIMEOUT,
        );
        // best effort: report the requested state even when the amp never
        // confirmed it
        if let Err(e) = result {
            warn!("analog mute detect: {}", e);
        }
    }

    /// Stream-level mute. Waits (bounded) for the analog side to confirm
    /// so the bias transition that follows cannot pop.
    pub fn mute_stream(&self, mute: bool) -> Result<()> {
        let mut inner = self.lock();

        if mute {
            inner.mute |= MUTE_STREAM;
            inner.regmap.update_bits(
                regs::MUTE,
                regs::RQML | regs::RQMR,
                regs::RQML | regs::RQMR,
            )?;
            Self::poll_mute_det(&mut inner, 0);
        } else {
            inner.mute &= !MUTE_STREAM;
            Self::write_mute(&mut inner)?;
            let expected = (!inner.mute >> 1) & 0x3;
            Self::poll_mute_det(&mut inner, expected);
        }
        Ok(())
    }

    /// Mixer view of the per-channel mute switches: `(left_on, right_on)`.
    pub fn playback_switch(&self) -> (bool, bool) {
        let inner = self.lock();
        (inner.mute & MUTE_LEFT == 0, inner.mute & MUTE_RIGHT == 0)
    }

    /// Mixer update of the per-channel mute switches. Returns whether
    /// anything changed.
    pub fn set_playback_switch(&self, left_on: bool, right_on: bool) -> Result<bool> {
        let mut inner = self.lock();
        let mut changed = false;

        if (inner.mute & MUTE_LEFT != 0) == left_on {
            inner.mute ^= MUTE_LEFT;
            changed = true;
        }
        if (inner.mute & MUTE_RIGHT != 0) == right_on {
            inner.mute ^= MUTE_RIGHT;
            changed = true;
        }
        if changed {
            Self::write_mute(&mut inner)?;
        }
        Ok(changed)
    }

    /// Digital playback volume, 0x30 = 0 dB, half a dB per step down.
    pub fn set_digital_volume(&self, left: u8, right: u8) -> Result<()> {
        let mut inner = self.lock();
        inner.regmap.write(regs::DIGITAL_VOLUME_2, left)?;
        inner.regmap.write(regs::DIGITAL_VOLUME_3, right)?;
        Ok(())
    }

    pub fn digital_volume(&self) -> Result<(u8, u8)> {
        let mut inner = self.lock();
        let left = inner.regmap.read(regs::DIGITAL_VOLUME_2)?;
        let right = inner.regmap.read(regs::DIGITAL_VOLUME_3)?;
        Ok((left, right))
    }

    pub fn overclock(&self) -> Overclock {
        self.lock().overclock
    }

    fn set_overclock(&self, field: fn(&mut Overclock) -> &mut u32, pct: u32, limit: u32) -> Result<()> {
        if pct > limit {
            return Err(Error::BadOverclock(pct, limit));
        }
        let mut inner = self.lock();
        if inner.bias >= BiasLevel::Prepare {
            return Err(Error::Busy);
        }
        *field(&mut inner.overclock) = pct;
        Ok(())
    }

    pub fn set_overclock_pll(&self, pct: u32) -> Result<()> {
        self.set_overclock(|oc| &mut oc.pll, pct, OVERCLOCK_PLL_LIMIT)
    }

    pub fn set_overclock_dsp(&self, pct: u32) -> Result<()> {
        self.set_overclock(|oc| &mut oc.dsp, pct, OVERCLOCK_DSP_LIMIT)
    }

    pub fn set_overclock_dac(&self, pct: u32) -> Result<()> {
        self.set_overclock(|oc| &mut oc.dac, pct, OVERCLOCK_DAC_LIMIT)
    }

    pub fn bias_level(&self) -> BiasLevel {
        self.lock().bias
    }

    pub fn set_bias_level(&self, level: BiasLevel) -> Result<()> {
        let mut inner = self.lock();
        let prev = inner.bias;

        match level {
            BiasLevel::On | BiasLevel::Prepare => {}
            BiasLevel::Standby => {
                if prev == BiasLevel::Off {
                    inner.regmap.cache_only(false);
                    inner
                        .regmap
                        .update_bits(regs::POWER, regs::RQPD | regs::DSPR, 0)?;
                    if inner.regmap.is_dirty() {
                        inner.regmap.sync()?;
                    }
                }
                inner.regmap.update_bits(regs::POWER, regs::RQST, 0)?;
            }
            BiasLevel::Off => {
                inner
                    .regmap
                    .update_bits(regs::POWER, regs::RQST, regs::RQST)?;
                inner.regmap.update_bits(
                    regs::POWER,
                    regs::RQPD | regs::DSPR,
                    regs::RQPD | regs::DSPR,
                )?;
            }
        }

        inner.bias = level;
        Ok(())
    }

    /// Power down for system sleep, releasing the board resources after
    /// the chip has been told.
    pub fn suspend(&self, resources: &mut impl BoardResources) -> Result<()> {
        let mut inner = self.lock();
        inner.regmap.update_bits(
            regs::POWER,
            regs::RQPD | regs::DSPR,
            regs::RQPD | regs::DSPR,
        )?;
        inner.regmap.mark_dirty();
        inner.regmap.cache_only(true);
        drop(inner);

        resources.disable_supplies()?;
        resources.disable_clock()?;
        Ok(())
    }

    /// Re-acquire resources in fixed order, resync the register file,
    /// then lift the power-down request. Any failing step aborts resume.
    pub fn resume(&self, resources: &mut impl BoardResources) -> Result<()> {
        resources.enable_clock()?;
        resources.enable_supplies()?;

        let mut inner = self.lock();
        inner.regmap.cache_only(false);
        inner.regmap.sync()?;
        inner
            .regmap
            .update_bits(regs::POWER, regs::RQPD | regs::DSPR, 0)?;
        Ok(())
    }

    /// A supply rail is about to drop: the chip will lose its register
    /// file, so stop trusting the bus and remember to resync.
    pub fn supply_event(&self, supply: Supply) {
        warn!("{} supply failing, marking register cache dirty", supply.name());
        let mut inner = self.lock();
        inner.regmap.mark_dirty();
        inner.regmap.cache_only(true);
    }

    /// Sample rate of the last applied configuration stream.
    pub fn applied_rate(&self) -> Option<u32> {
        self.lock().applied_rate
    }

    /// Divider set committed by the last successful `hw_params`.
    pub fn committed_dividers(&self) -> Option<DividerSet> {
        self.lock().committed
    }

    /// Run a PPC3 configuration stream against the register file.
    ///
    /// The DSP is taken out of reset first and the register file is
    /// returned to page 0 afterwards. Reloading at the rate already
    /// applied is a no-op, so rate changes within the same clock family
    /// do not audibly interrupt playback.
    pub fn load_config(&self, firmware: &[u8], rate: u32) -> Result<()> {
        let mut inner = self.lock();
        if inner.applied_rate == Some(rate) {
            debug!("configuration for {} Hz already applied", rate);
            return Ok(());
        }

        let mut reader = Reader::new(Bytes::copy_from_slice(firmware))?;
        inner.regmap.update_bits(regs::POWER, regs::DSPR, 0)?;

        while let Some(op) = reader.next_opcode()? {
            match op {
                Opcode::Delay { ms } => {
                    thread::sleep(Duration::from_millis(u64::from(ms)));
                }
                Opcode::Burst { base, values } => {
                    for (i, value) in values.iter().enumerate() {
                        inner.regmap.write_raw(base.wrapping_add(i as u8), *value)?;
                    }
                }
                Opcode::SkipText { .. } => {}
                Opcode::Write { reg, value } => {
                    inner.regmap.write_raw(reg, value)?;
                }
            }
        }

        inner.regmap.write_raw(regs::PAGE_SELECT, 0)?;
        inner.applied_rate = Some(rate);
        Ok(())
    }
}
