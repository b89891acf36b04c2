//! Clock tree solver for the TAS3251.
//!
//! Given a requested sample rate and serial frame geometry, this module
//! computes a consistent set of PLL coefficients and clock dividers for
//! the chip's DSP, DAC, oversampling and charge pump clocks. Everything
//! here is pure integer arithmetic; committing the result to hardware is
//! the `tas3251` crate's job and only happens once the whole set has
//! validated.
//!
//! The PLL multiplies its input by `R * J.D / P` with
//! `1 <= R <= 16`, `0 <= J <= 63`, `0 <= D <= 9999`, `1 <= P <= 15`,
//! and wants `64 MHz <= pll_rate <= 100 MHz`. With `D == 0` the divided
//! input may sit anywhere in `[1 MHz, 20 MHz]`; the fractional mode
//! narrows that to `[6.667 MHz, 20 MHz]` and forces `R = 1`.

#[cfg(feature = "use_serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "debug")]
use thiserror::Error;

use crate::regs;

/// Nominal PLL ceiling before overclocking.
pub const PLL_RATE_NOMINAL_MAX: u32 = 25_000_000;
/// Smallest usable SCK when the PLL generates it.
pub const SCK_RATE_MIN: u32 = 16_000_000;
/// Nominal DSP clock ceiling.
pub const DSP_RATE_NOMINAL_MAX: u32 = 50_000_000;
/// Nominal DAC modulator clock ceiling.
pub const DAC_RATE_NOMINAL_MAX: u32 = 6_144_000;
/// Nominal negative charge pump target.
pub const NCP_RATE_TARGET: u32 = 1_536_000;
/// Hard NCP ceiling.
pub const NCP_RATE_MAX: u32 = 2_048_000;
/// Every hardware divider is a 7-bit `value - 1` field.
pub const DIV_MAX: u32 = 128;

/// Sample rates accepted when an external source drives the clocks.
pub const CONSUMER_RATES: &[u32] = &[32000, 44100, 48000, 88200, 96000];

#[cfg_attr(feature = "debug", derive(Debug, Error))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[cfg_attr(feature = "debug", error("no frame clock geometry"))]
    MissingFrameClock,

    #[cfg_attr(feature = "debug", error("impossible to generate a suitable SCK"))]
    ImpossibleSck,

    #[cfg_attr(feature = "debug", error("need a slower clock as pll input"))]
    PllInputTooFast,

    #[cfg_attr(feature = "debug", error("need a faster clock as pll input"))]
    PllInputTooSlow,

    #[cfg_attr(feature = "debug", error("failed to find a DAC rate"))]
    NoDacRate,

    #[cfg_attr(
        feature = "debug",
        error("{name} divider out of range: {value} not in [1, 128]")
    )]
    DividerOutOfRange { name: &'static str, value: u32 },

    #[cfg_attr(feature = "debug", error("unsupported frame size: {0}"))]
    UnsupportedFrameSize(u32),
}

/// Overclocking allowances, in percent above nominal.
#[cfg_attr(feature = "debug", derive(Debug))]
#[cfg_attr(feature = "use_serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Overclock {
    pub pll: u32,
    pub dsp: u32,
    pub dac: u32,
}

impl Overclock {
    pub fn pll_max(&self) -> u32 {
        PLL_RATE_NOMINAL_MAX + PLL_RATE_NOMINAL_MAX * self.pll / 100
    }

    pub fn dsp_max(&self) -> u32 {
        DSP_RATE_NOMINAL_MAX + DSP_RATE_NOMINAL_MAX * self.dsp / 100
    }

    pub fn dac_max(&self, rate: u32) -> u32 {
        rate + rate * self.dac / 100
    }

    pub fn sck_max(&self, pll_generates_sck: bool) -> u32 {
        if !pll_generates_sck {
            return PLL_RATE_NOMINAL_MAX;
        }
        self.pll_max()
    }

    /// NCP divider target. If the DAC is actually overclocked past its
    /// nominal ceiling the target scales along, so the recommended
    /// dividers still come out.
    pub fn ncp_target(&self, dac_rate: u32) -> u32 {
        if dac_rate <= DAC_RATE_NOMINAL_MAX {
            return NCP_RATE_TARGET;
        }
        self.dac_max(NCP_RATE_TARGET)
    }
}

/// PLL coefficients: `pll_rate = pllin_rate * R * (J + D/10000) / P`.
#[cfg_attr(feature = "debug", derive(Debug))]
#[cfg_attr(feature = "use_serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PllCoefficients {
    pub r: u32,
    pub j: u32,
    pub d: u32,
    pub p: u32,
    /// The rate the coefficients actually realize. Equal to the requested
    /// rate when an exact solution exists.
    pub rate: u32,
}

/// Which clock feeds the DAC modulator.
#[cfg_attr(feature = "debug", derive(Debug))]
#[cfg_attr(feature = "use_serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum DacClockSource {
    /// SCK pin (possibly PLL-generated).
    Sclk,
    /// The raw PLL input, routed back in through a GPIO to bypass PLL
    /// jitter.
    PllInput,
}

/// 48 kHz vs 96 kHz sample rate family selector.
#[cfg_attr(feature = "debug", derive(Debug))]
#[cfg_attr(feature = "use_serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FsSpeed {
    Khz48,
    Khz96,
}

impl FsSpeed {
    pub fn field_value(self) -> u8 {
        match self {
            FsSpeed::Khz48 => regs::FSSP_48KHZ,
            FsSpeed::Khz96 => regs::FSSP_96KHZ,
        }
    }
}

/// Solver input.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ClockParams {
    pub sample_rate: u32,
    /// Bit clocks per frame (LRCLK divider).
    pub frame_size: u32,
    /// Rate of the external clock on the SCLK/PLL-input pin.
    pub sclk_rate: u32,
    /// True when the on-chip PLL generates SCK (provider role with a PLL
    /// output GPIO routed); false when SCK comes in from outside.
    pub pll_generates_sck: bool,
}

/// Fully resolved divider chain. All `*_div` fields are in `[1, 128]` and
/// are written to hardware as `value - 1`.
#[cfg_attr(feature = "debug", derive(Debug))]
#[cfg_attr(feature = "use_serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DividerSet {
    pub pll: Option<PllCoefficients>,
    pub dsp_div: u32,
    pub dac_div: u32,
    pub ncp_div: u32,
    pub osr_div: u32,
    pub bclk_div: u32,
    pub lrclk_div: u32,
    pub fs_speed: FsSpeed,
    pub dac_source: DacClockSource,
    /// DAC cycles per audio frame. Reported for diagnostics; the IDAC
    /// register write is intentionally absent, matching the hardware
    /// bring-up this was validated against.
    pub idac: u32,
    /// The sample rate the divider chain actually produces.
    pub sample_rate: u32,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn div_round_closest(a: u64, b: u64) -> u64 {
    (a + b / 2) / b
}

fn div_round_up(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn rounddown(a: u64, b: u64) -> u64 {
    a - a % b
}

fn fls(x: u64) -> u32 {
    u64::BITS - x.leading_zeros()
}

fn check_div(name: &'static str, value: u64) -> Result<u32, ClockError> {
    if value < 1 || value > DIV_MAX as u64 {
        return Err(ClockError::DividerOutOfRange {
            name,
            value: value as u32,
        });
    }
    Ok(value as u32)
}

/// Pick SCK as a multiple of `bclk_rate`, still with as many factors of
/// two as possible since that makes it easier to find a fast DAC rate.
pub fn find_sck(bclk_rate: u32, overclock: &Overclock) -> Option<u32> {
    let pll_max = overclock.pll_max() as u64;
    let bclk_rate = bclk_rate as u64;

    let mut pow2 = 1u64 << fls((pll_max - SCK_RATE_MIN as u64) / bclk_rate);
    while pow2 != 0 {
        let sck_rate = rounddown(pll_max, bclk_rate * pow2);
        if sck_rate >= SCK_RATE_MIN as u64 {
            return Some(sck_rate as u32);
        }
        pow2 >>= 1;
    }
    None
}

/// Solve `pll_rate = pllin_rate * R * J.D / P` for the coefficient limits
/// documented at module level. Prefers an exact integer (`D == 0`)
/// solution, then an exact fractional one, then falls back to the nearest
/// achievable rate and reports it in [`PllCoefficients::rate`].
pub fn find_pll_coeff(pllin_rate: u32, pll_rate: u32) -> Result<PllCoefficients, ClockError> {
    let pllin = pllin_rate as u64;
    let pll = pll_rate as u64;

    let common = gcd(pll, pllin);
    let mut num = pll / common;
    let mut den = pllin / common;

    /* pllin_rate / P (or here, den) cannot be greater than 20 MHz */
    if pllin / den > 20_000_000 && num < 8 {
        let scale = div_round_up(pllin / den, 20_000_000);
        num *= scale;
        den *= scale;
    }

    let p = den;
    if den <= 15 && num <= 16 * 63 && (1_000_000..=20_000_000).contains(&(pllin / p)) {
        /* try the case with D = 0; factor num into J and R */
        for r in (1..=16u64).rev() {
            if num % r != 0 {
                continue;
            }
            let j = num / r;
            if j == 0 || j > 63 {
                continue;
            }
            return Ok(PllCoefficients {
                r: r as u32,
                j: j as u32,
                d: 0,
                p: p as u32,
                rate: pll_rate,
            });
        }
        /* no luck */
    }

    /* try to find an exact pll_rate using the D > 0 case */
    let common = gcd(10_000 * num, den);
    let num = 10_000 * num / common;
    let den = den / common;

    for p in den..=15 {
        if pllin / p < 6_667_000 || pllin / p > 20_000_000 {
            continue;
        }
        if (num * p) % den != 0 {
            continue;
        }
        let k = num * p / den; /* 10000 * J.D */
        /* J == 12 is ok if D == 0 */
        if !(40_000..=120_000).contains(&k) {
            continue;
        }
        return Ok(PllCoefficients {
            r: 1,
            j: (k / 10_000) as u32,
            d: (k % 10_000) as u32,
            p: p as u32,
            rate: pll_rate,
        });
    }

    /* fall back to an approximate pll_rate; find smallest possible P */
    let p = div_round_up(pllin, 20_000_000).max(1);
    if p > 15 {
        return Err(ClockError::PllInputTooFast);
    }
    if pllin / p < 6_667_000 {
        return Err(ClockError::PllInputTooSlow);
    }
    let k = div_round_closest(10_000 * pll * p, pllin).clamp(40_000, 120_000);
    Ok(PllCoefficients {
        r: 1,
        j: (k / 10_000) as u32,
        d: (k % 10_000) as u32,
        p: p as u32,
        rate: (k * pllin / (10_000 * p)) as u32,
    })
}

/// Largest multiple of `osr_rate` that divides `pllin_rate` evenly with a
/// divider of at most 128, staying below the (possibly overclocked) DAC
/// ceiling. `None` when the PLL input cannot clock the DAC directly.
fn pllin_dac_rate(osr_rate: u64, pllin_rate: u64, dac_ceiling: u64) -> Option<u64> {
    if pllin_rate % osr_rate != 0 {
        return None; /* futile, quit early */
    }

    let mut dac_rate = rounddown(dac_ceiling, osr_rate);
    while dac_rate != 0 {
        if pllin_rate / dac_rate > DIV_MAX as u64 {
            return None; /* DAC divider would be too big */
        }
        if pllin_rate % dac_rate == 0 {
            return Some(dac_rate);
        }
        dac_rate -= osr_rate;
    }
    None
}

/// Resolve the whole divider chain. Nothing is committed to hardware
/// here: the caller writes the result only once it has it in hand, so a
/// late constraint failure leaves no partial register state behind.
pub fn resolve(params: &ClockParams, overclock: &Overclock) -> Result<DividerSet, ClockError> {
    let lrclk_div = params.frame_size as u64;
    if lrclk_div == 0 {
        return Err(ClockError::MissingFrameClock);
    }

    let bclk_rate = params.sample_rate as u64 * lrclk_div;
    if bclk_rate == 0 {
        return Err(ClockError::MissingFrameClock);
    }

    let (sck_rate, mck_rate, pll, pllin_rate) = if !params.pll_generates_sck {
        let sck_rate = params.sclk_rate as u64;
        (sck_rate, sck_rate, None, 0u64)
    } else {
        let pllin_rate = params.sclk_rate as u64;
        let sck_rate = find_sck(bclk_rate as u32, overclock).ok_or(ClockError::ImpossibleSck)?
            as u64;
        let coeff = find_pll_coeff(pllin_rate as u32, 4 * sck_rate as u32)?;
        (sck_rate, coeff.rate as u64, Some(coeff), pllin_rate)
    };

    let bclk_div = check_div("bclk", div_round_closest(sck_rate, bclk_rate))?;

    /* the rate the chain actually produces */
    let sample_rate = sck_rate / bclk_div as u64 / lrclk_div;
    let osr_rate = 16 * sample_rate;

    /* run the DSP no faster than 50 MHz */
    let dsp_div = if mck_rate > overclock.dsp_max() as u64 {
        2
    } else {
        1
    };

    let dac_ceiling = overclock.dac_max(DAC_RATE_NOMINAL_MAX) as u64;
    let bypass = if pll.is_some() {
        pllin_dac_rate(osr_rate, pllin_rate, dac_ceiling)
    } else {
        None
    };

    let (mut dac_rate, dacsrc_rate, dac_source) = match bypass {
        /* the desired rate is compatible with the pll input clock, so
         * use that as dac input instead of the pll output, which would
         * introduce jitter and thus noise */
        Some(rate) => (rate, pllin_rate, DacClockSource::PllInput),
        None => {
            /* run the DAC no faster than 6.144 MHz */
            let mut dac_mul = dac_ceiling / osr_rate;
            let sck_mul = sck_rate / osr_rate;
            while dac_mul != 0 && sck_mul % dac_mul != 0 {
                dac_mul -= 1;
            }
            if dac_mul == 0 {
                return Err(ClockError::NoDacRate);
            }
            (dac_mul * osr_rate, sck_rate, DacClockSource::Sclk)
        }
    };

    let osr_div = check_div("osr", div_round_closest(dac_rate, osr_rate))?;
    let dac_div = check_div("dac", div_round_closest(dacsrc_rate, dac_rate))?;
    dac_rate = dacsrc_rate / dac_div as u64;

    let ncp_target = overclock.ncp_target(dac_rate as u32) as u64;
    let mut ncp_div = div_round_closest(dac_rate, ncp_target);
    if ncp_div > DIV_MAX as u64 || (ncp_div != 0 && dac_rate / ncp_div > NCP_RATE_MAX as u64) {
        /* run the NCP no faster than 2.048 MHz */
        ncp_div = div_round_up(dac_rate, NCP_RATE_MAX as u64);
    }
    let ncp_div = check_div("ncp", ncp_div.max(1))?;

    let idac = mck_rate / (dsp_div * sample_rate);

    let fs_speed = if sample_rate <= overclock.dac_max(48_000) as u64 {
        FsSpeed::Khz48
    } else {
        FsSpeed::Khz96
    };

    Ok(DividerSet {
        pll,
        dsp_div: dsp_div as u32,
        dac_div,
        ncp_div,
        osr_div,
        bclk_div,
        lrclk_div: check_div("lrclk", lrclk_div)?,
        fs_speed,
        dac_source,
        idac: idac as u32,
        sample_rate: sample_rate as u32,
    })
}

/// Rate windows available when the on-chip PLL generates SCK. Frame size
/// 32 has no hole; 48 and 64 have a single hole that moves with the frame
/// size. `None` means the whole supported span is usable.
pub fn provider_rate_windows(
    frame_size: u32,
    overclock: &Overclock,
) -> Result<Option<[(u32, u32); 2]>, ClockError> {
    match frame_size {
        32 => Ok(None),
        48 | 64 => {
            let sck_max = overclock.sck_max(true);
            Ok(Some([
                (32_000, sck_max / frame_size / 2),
                (div_round_up(16_000_000, frame_size as u64) as u32, 96_000),
            ]))
        }
        other => Err(ClockError::UnsupportedFrameSize(other)),
    }
}

/// Rational rate family available in provider role without the PLL: the
/// external SCK divided down by 64 bit clocks per frame and an integer
/// divider up to 128.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RationalRates {
    pub num: u32,
    pub den_min: u32,
    pub den_max: u32,
}

pub fn no_pll_rates(sclk_rate: u32) -> RationalRates {
    RationalRates {
        num: sclk_rate / 64,
        den_min: 1,
        den_max: 128,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn provider(sample_rate: u32, frame_size: u32, sclk_rate: u32) -> ClockParams {
        ClockParams {
            sample_rate,
            frame_size,
            sclk_rate,
            pll_generates_sck: true,
        }
    }

    #[test]
    fn sck_prefers_large_power_of_two_multiples() {
        let oc = Overclock::default();
        // 44.1 kHz, 32 bit frames: bclk 1,411,200 Hz, 16x fits under 25 MHz
        assert_eq!(find_sck(1_411_200, &oc), Some(22_579_200));
        // 48 kHz, 64 bit frames: bclk 3,072,000 Hz
        assert_eq!(find_sck(3_072_000, &oc), Some(24_576_000));
        // bclk above the 25 MHz ceiling: no multiple fits, not even 1x
        assert_eq!(find_sck(26_000_000, &oc), None);
    }

    #[test]
    fn pll_exact_integer_solution() {
        // 98.304 MHz from 24.576 MHz: 8 * 1.0 / 2
        let c = find_pll_coeff(24_576_000, 98_304_000).unwrap();
        assert_eq!((c.r, c.j, c.d, c.p), (8, 1, 0, 2));
        assert_eq!(c.rate, 98_304_000);
    }

    #[test]
    fn pll_exact_fractional_solution() {
        // 90.3168 MHz from 24.576 MHz: 1 * 7.3500 / 2
        let c = find_pll_coeff(24_576_000, 90_316_800).unwrap();
        assert_eq!((c.r, c.j, c.d, c.p), (1, 7, 3500, 2));
        assert_eq!(c.rate, 90_316_800);
    }

    #[test]
    fn pll_fallback_reports_realized_rate() {
        // 17 MHz input cannot hit the 44.1 kHz family exactly
        let c = find_pll_coeff(17_000_000, 90_316_800).unwrap();
        assert_eq!((c.r, c.j, c.d, c.p), (1, 5, 3128, 1));
        assert_eq!(c.rate, 90_317_600);
        // realized rate is K * pllin / (10000 * P)
        assert_eq!(
            c.rate as u64,
            (c.j as u64 * 10_000 + c.d as u64) * 17_000_000 / 10_000
        );
    }

    #[test]
    fn pll_input_out_of_range() {
        assert_eq!(
            find_pll_coeff(400_000_000, 90_316_800),
            Err(ClockError::PllInputTooFast)
        );
        assert_eq!(
            find_pll_coeff(5_000_000, 90_316_800),
            Err(ClockError::PllInputTooSlow)
        );
    }

    #[test]
    fn resolve_44k1_provider() {
        let oc = Overclock::default();
        let set = resolve(&provider(44_100, 32, 24_576_000), &oc).unwrap();

        assert_eq!(set.sample_rate, 44_100);
        assert_eq!(set.bclk_div, 16);
        assert_eq!(set.lrclk_div, 32);
        // 90.3168 MHz master clock exceeds the 50 MHz DSP ceiling
        assert_eq!(set.dsp_div, 2);
        // 24.576 MHz input is not a multiple of 705.6 kHz OSR: no bypass
        assert_eq!(set.dac_source, DacClockSource::Sclk);
        assert_eq!(set.osr_div, 8);
        assert_eq!(set.dac_div, 4);
        assert_eq!(set.ncp_div, 4);
        assert_eq!(set.fs_speed, FsSpeed::Khz48);
        let pll = set.pll.unwrap();
        assert_eq!((pll.r, pll.j, pll.d, pll.p), (1, 7, 3500, 2));
        assert_eq!(pll.rate, 90_316_800);
        assert_eq!(set.idac, 1024);
    }

    #[test]
    fn resolve_48k_provider_is_exact_integer() {
        let oc = Overclock::default();
        let set = resolve(&provider(48_000, 64, 24_576_000), &oc).unwrap();

        assert_eq!(set.sample_rate, 48_000);
        assert_eq!(set.bclk_div, 8);
        let pll = set.pll.unwrap();
        assert_eq!((pll.r, pll.j, pll.d, pll.p), (8, 1, 0, 2));
        assert_eq!(pll.rate, 98_304_000);
        // 24.576 MHz divides evenly into 768 kHz * 8 = 6.144 MHz: bypass
        assert_eq!(set.dac_source, DacClockSource::PllInput);
        assert_eq!(set.osr_div, 8);
        assert_eq!(set.dac_div, 4);
        assert_eq!(set.fs_speed, FsSpeed::Khz48);
    }

    #[test]
    fn resolve_with_external_sck() {
        let oc = Overclock::default();
        let set = resolve(
            &ClockParams {
                sample_rate: 48_000,
                frame_size: 64,
                sclk_rate: 24_576_000,
                pll_generates_sck: false,
            },
            &oc,
        )
        .unwrap();

        assert!(set.pll.is_none());
        assert_eq!(set.bclk_div, 8);
        assert_eq!(set.dac_source, DacClockSource::Sclk);
        assert_eq!(set.sample_rate, 48_000);
    }

    #[test]
    fn oversized_divider_is_rejected_not_clamped() {
        let oc = Overclock::default();
        // 50 MHz SCK against a 352.8 kHz bit clock needs divider 142
        let err = resolve(
            &ClockParams {
                sample_rate: 44_100,
                frame_size: 8,
                sclk_rate: 50_000_000,
                pll_generates_sck: false,
            },
            &oc,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ClockError::DividerOutOfRange { name: "bclk", .. }
        ));
    }

    #[test]
    fn overclock_raises_ceilings() {
        let oc = Overclock {
            pll: 20,
            dsp: 0,
            dac: 0,
        };
        assert_eq!(oc.pll_max(), 30_000_000);
        assert_eq!(oc.dsp_max(), 50_000_000);
        assert_eq!(oc.ncp_target(6_144_000), NCP_RATE_TARGET);
        let oc = Overclock {
            pll: 0,
            dsp: 0,
            dac: 25,
        };
        assert_eq!(oc.dac_max(DAC_RATE_NOMINAL_MAX), 7_680_000);
        assert_eq!(oc.ncp_target(7_000_000), 1_920_000);
    }

    #[test]
    fn provider_windows_move_with_frame_size() {
        let oc = Overclock::default();
        assert_eq!(provider_rate_windows(32, &oc).unwrap(), None);
        let ranges = provider_rate_windows(64, &oc).unwrap().unwrap();
        assert_eq!(ranges[0], (32_000, 195_312));
        assert_eq!(ranges[1], (250_000, 96_000));
        assert_eq!(
            provider_rate_windows(24, &oc),
            Err(ClockError::UnsupportedFrameSize(24))
        );
    }

    #[test]
    fn no_pll_rational_family() {
        let rats = no_pll_rates(24_576_000);
        assert_eq!(rats.num, 384_000);
        assert_eq!((rats.den_min, rats.den_max), (1, 128));
    }
}
