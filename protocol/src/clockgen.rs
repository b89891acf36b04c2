//! Register tables for the Si5351A-style PLL clock generator that feeds
//! the TAS3251 its master clock on the HiFiBerry DAC+ HD.
//!
//! The generator only ever needs two output frequencies, one per sample
//! rate family, so instead of a general frequency synthesizer this is a
//! fixed common setup plus one table per family. The tables were captured
//! from a working board; they are opaque on purpose.

/// I2C address window the generator may sit in.
pub const I2C_ADDR_MIN: u8 = 0x60;
pub const I2C_ADDR_MAX: u8 = 0x6F;

/// Rate programmed when none has been requested yet.
pub const DEFAULT_RATE: u32 = 44_100;

/// Settle time after reprogramming the synthesizer.
pub const PLL_RESET_SETTLE_MS: u32 = 10;

const OUTPUT_DISABLE_REG: u8 = 0x03;
const I2C_ADDR_REG: u8 = 0x07;
const CLKOUT0_CTRL_REG: u8 = 0x10;
const CLKOUT1_CTRL_REG: u8 = 0x11;
const CLKOUT2_CTRL_REG: u8 = 0x12;
const CLKOUT_POWERED: u8 = 0x0D;
const CLKOUT_DOWN: u8 = 0x8C;

/// Base configuration: power everything down, set up PLL feedback and
/// output stage, leave only clkout 0 running. Written once at probe.
pub const COMMON_REGS: &[(u8, u8)] = &[
    (0x02, 0x53),
    (0x03, 0xFE),
    (0x07, 0x00),
    (0x0F, 0x00),
    (0x10, 0x0D),
    (0x11, 0x8C),
    (0x12, 0x8C),
    (0x13, 0x8C),
    (0x14, 0x8C),
    (0x15, 0x8C),
    (0x16, 0x8C),
    (0x17, 0x8C),
    (0x18, 0x2A),
    (0x1C, 0x00),
    (0x1D, 0x0F),
    (0x1F, 0x00),
    (0x2A, 0x00),
    (0x2C, 0x00),
    (0x2F, 0x00),
    (0x30, 0x00),
    (0x31, 0x00),
    (0xB7, 0x92),
    (0xB1, 0xAC),
];

/// Multisynth setup for 22.5792 MHz (44.1 kHz family), ending in a PLL
/// soft reset.
pub const RATE_44K1_REGS: &[(u8, u8)] = &[
    (0x1A, 0x3D),
    (0x1B, 0x09),
    (0x1E, 0xD6),
    (0x20, 0x19),
    (0x21, 0x7A),
    (0x2B, 0x04),
    (0x2D, 0x07),
    (0x2E, 0xE0),
    (0xB1, 0xAC),
];

/// Multisynth setup for 24.576 MHz (48 kHz family).
pub const RATE_48K_REGS: &[(u8, u8)] = &[
    (0x1A, 0x0C),
    (0x1B, 0x35),
    (0x1E, 0xF0),
    (0x20, 0x09),
    (0x21, 0x50),
    (0x2B, 0x04),
    (0x2D, 0x07),
    (0x2E, 0x20),
    (0xB1, 0xAC),
];

/// The two master clock families the generator can produce.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RateFamily {
    /// 44.1, 88.2, 176.4 kHz
    Family44k1,
    /// 32, 48, 96, 192 kHz
    Family48k,
}

impl RateFamily {
    pub fn of(sample_rate: u32) -> Option<RateFamily> {
        match sample_rate {
            44_100 | 88_200 | 176_400 => Some(RateFamily::Family44k1),
            32_000 | 48_000 | 96_000 | 192_000 => Some(RateFamily::Family48k),
            _ => None,
        }
    }

    pub fn regs(self) -> &'static [(u8, u8)] {
        match self {
            RateFamily::Family44k1 => RATE_44K1_REGS,
            RateFamily::Family48k => RATE_48K_REGS,
        }
    }

    /// Master clock rate the family's table produces.
    pub fn mclk_rate(self) -> u32 {
        match self {
            RateFamily::Family44k1 => 22_579_200,
            RateFamily::Family48k => 24_576_000,
        }
    }
}

/// Alternate output pins; clkout 0 is the default.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClkOut {
    Clk1,
    Clk2,
}

/// Board-level variations of the generator hookup.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Reprogram the generator's own I2C address; must lie in
    /// `0x60..=0x6F`.
    pub i2c_reg: Option<u8>,
    /// Use clkout 1 or 2 instead of clkout 0.
    pub clkout: Option<ClkOut>,
}

#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    I2cAddrOutOfRange(u8),
}

impl Config {
    /// The common table with this board's variations applied. The base
    /// table is never mutated; each call rebuilds the sequence.
    pub fn common_regs(&self) -> Result<alloc::vec::Vec<(u8, u8)>, ConfigError> {
        let mut regs: alloc::vec::Vec<(u8, u8)> = COMMON_REGS.into();

        if let Some(addr) = self.i2c_reg {
            if !(I2C_ADDR_MIN..=I2C_ADDR_MAX).contains(&addr) {
                return Err(ConfigError::I2cAddrOutOfRange(addr));
            }
            set_reg(&mut regs, I2C_ADDR_REG, (addr - I2C_ADDR_MIN) << 4);
        }

        match self.clkout {
            None => {}
            Some(ClkOut::Clk1) => {
                set_reg(&mut regs, OUTPUT_DISABLE_REG, 0xFF ^ (1 << 1));
                set_reg(&mut regs, CLKOUT0_CTRL_REG, CLKOUT_DOWN);
                set_reg(&mut regs, CLKOUT1_CTRL_REG, CLKOUT_POWERED);
            }
            Some(ClkOut::Clk2) => {
                set_reg(&mut regs, OUTPUT_DISABLE_REG, 0xFF ^ (1 << 2));
                set_reg(&mut regs, CLKOUT0_CTRL_REG, CLKOUT_DOWN);
                set_reg(&mut regs, CLKOUT2_CTRL_REG, CLKOUT_POWERED);
            }
        }

        Ok(regs)
    }
}

fn set_reg(regs: &mut [(u8, u8)], reg: u8, value: u8) {
    for entry in regs.iter_mut() {
        if entry.0 == reg {
            entry.1 = value;
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn value_of(regs: &[(u8, u8)], reg: u8) -> u8 {
        regs.iter().find(|(r, _)| *r == reg).map(|(_, v)| *v).unwrap()
    }

    #[test]
    fn family_lookup() {
        assert_eq!(RateFamily::of(44_100), Some(RateFamily::Family44k1));
        assert_eq!(RateFamily::of(176_400), Some(RateFamily::Family44k1));
        assert_eq!(RateFamily::of(32_000), Some(RateFamily::Family48k));
        assert_eq!(RateFamily::of(192_000), Some(RateFamily::Family48k));
        assert_eq!(RateFamily::of(22_050), None);
    }

    #[test]
    fn mclk_matches_family() {
        assert_eq!(RateFamily::Family44k1.mclk_rate(), 22_579_200);
        assert_eq!(RateFamily::Family48k.mclk_rate(), 24_576_000);
    }

    #[test]
    fn default_config_is_the_plain_table() {
        let regs = Config::default().common_regs().unwrap();
        assert_eq!(regs.as_slice(), COMMON_REGS);
    }

    #[test]
    fn address_override_lands_in_reg_07() {
        let cfg = Config {
            i2c_reg: Some(0x63),
            clkout: None,
        };
        let regs = cfg.common_regs().unwrap();
        assert_eq!(value_of(&regs, 0x07), 0x30);

        let bad = Config {
            i2c_reg: Some(0x55),
            clkout: None,
        };
        assert_eq!(bad.common_regs(), Err(ConfigError::I2cAddrOutOfRange(0x55)));
    }

    #[test]
    fn alternate_outputs_swap_power_and_enable() {
        let cfg = Config {
            i2c_reg: None,
            clkout: Some(ClkOut::Clk1),
        };
        let regs = cfg.common_regs().unwrap();
        assert_eq!(value_of(&regs, 0x03), 0xFD);
        assert_eq!(value_of(&regs, 0x10), 0x8C);
        assert_eq!(value_of(&regs, 0x11), 0x0D);

        let cfg = Config {
            i2c_reg: None,
            clkout: Some(ClkOut::Clk2),
        };
        let regs = cfg.common_regs().unwrap();
        assert_eq!(value_of(&regs, 0x03), 0xFB);
        assert_eq!(value_of(&regs, 0x12), 0x0D);
        // clkout 1 stays down
        assert_eq!(value_of(&regs, 0x11), 0x8C);
    }
}
