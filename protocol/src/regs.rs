//! TAS3251 register map.
//!
//! The chip exposes 256-byte register pages selected through register 0 of
//! every page. Registers are addressed here through a flat virtual space:
//! `VIRT_BASE + page * PAGE_LEN + offset`. Addresses below `VIRT_BASE` are
//! raw, i.e. they hit whatever page is currently selected; the PPC3
//! configuration streams use raw addressing and drive the page register
//! themselves.

/// First virtual address; everything below is raw in-page addressing.
pub const VIRT_BASE: u32 = 0x100;
/// Number of registers per page.
pub const PAGE_LEN: u32 = 0x100;
/// In-page offset of the page select register.
pub const PAGE_SELECT: u8 = 0;

/// Virtual address of `offset` within `page`.
pub const fn addr(page: u8, offset: u8) -> u32 {
    VIRT_BASE + PAGE_LEN * page as u32 + offset as u32
}

/// Page number of a virtual address.
///
/// Callers must not pass raw addresses; see [`is_virtual`].
pub const fn page(reg: u32) -> u8 {
    ((reg - VIRT_BASE) / PAGE_LEN) as u8
}

/// In-page offset of a virtual address.
pub const fn offset(reg: u32) -> u8 {
    ((reg - VIRT_BASE) % PAGE_LEN) as u8
}

/// Whether `reg` lives in the paged virtual space.
pub const fn is_virtual(reg: u32) -> bool {
    reg >= VIRT_BASE
}

pub const RESET: u32 = addr(0, 1);
pub const POWER: u32 = addr(0, 2);
pub const MUTE: u32 = addr(0, 3);
pub const PLL_EN: u32 = addr(0, 4);
pub const I2C_PAGE_AUTO_INC: u32 = addr(0, 6);
pub const DSP: u32 = addr(0, 7);
pub const GPIO_EN: u32 = addr(0, 8);
pub const SCLK_LRCLK_CFG: u32 = addr(0, 9);
pub const MASTER_MODE: u32 = addr(0, 12);
pub const PLL_DSP_REF: u32 = addr(0, 13);
pub const OSR_DAC_REF: u32 = addr(0, 14);
pub const NCP_REF: u32 = addr(0, 15);
pub const GPIO_DACIN: u32 = addr(0, 16);
pub const GPIO_NCPIN: u32 = addr(0, 17);
pub const GPIO_PLLIN: u32 = addr(0, 18);
pub const PLL_COEFF_0: u32 = addr(0, 20);
pub const PLL_COEFF_1: u32 = addr(0, 21);
pub const PLL_COEFF_2: u32 = addr(0, 22);
pub const PLL_COEFF_3: u32 = addr(0, 23);
pub const PLL_COEFF_4: u32 = addr(0, 24);
pub const DSP_CLKDIV: u32 = addr(0, 27);
pub const DAC_CLKDIV: u32 = addr(0, 28);
pub const NCP_CLKDIV: u32 = addr(0, 29);
pub const OSR_CLKDIV: u32 = addr(0, 30);
pub const MASTER_CLKDIV_1: u32 = addr(0, 32);
pub const MASTER_CLKDIV_2: u32 = addr(0, 33);
pub const FS_SPEED_MODE: u32 = addr(0, 34);
pub const ERROR_DETECT: u32 = addr(0, 37);
pub const I2S_1: u32 = addr(0, 40);
pub const I2S_2: u32 = addr(0, 41);
pub const DAC_ROUTING: u32 = addr(0, 42);
pub const DSP_PROGRAM: u32 = addr(0, 43);
pub const CLKDET: u32 = addr(0, 44);
pub const AUTO_MUTE: u32 = addr(0, 59);
pub const DIGITAL_VOLUME_1: u32 = addr(0, 60);
pub const DIGITAL_VOLUME_2: u32 = addr(0, 61);
pub const DIGITAL_VOLUME_3: u32 = addr(0, 62);
pub const DIGITAL_MUTE_1: u32 = addr(0, 63);
pub const DIGITAL_MUTE_2: u32 = addr(0, 64);
pub const DIGITAL_MUTE_3: u32 = addr(0, 65);
pub const DACL_OFFSET: u32 = addr(0, 78);
pub const DACR_OFFSET: u32 = addr(0, 79);
pub const GPIO_SDOUT: u32 = addr(0, 85);
pub const GPIO_CONTROL_1: u32 = addr(0, 86);
pub const GPIO_CONTROL_2: u32 = addr(0, 87);
pub const RATE_DET_1: u32 = addr(0, 91);
pub const RATE_DET_2: u32 = addr(0, 92);
pub const RATE_DET_3: u32 = addr(0, 93);
pub const RATE_DET_4: u32 = addr(0, 94);
pub const CLOCK_STATUS: u32 = addr(0, 95);
pub const ANALOG_MUTE_DET: u32 = addr(0, 108);
pub const GPIN: u32 = addr(0, 119);
pub const DIGITAL_MUTE_DET: u32 = addr(0, 120);

pub const OUTPUT_AMPLITUDE: u32 = addr(1, 1);
pub const ANALOG_GAIN_CTRL: u32 = addr(1, 2);
pub const ANALOG_MUTE_CTRL: u32 = addr(1, 6);
pub const ANALOG_GAIN_BOOST: u32 = addr(1, 7);
pub const VCOM_CTRL_2: u32 = addr(1, 9);

pub const FLEX_A: u32 = addr(253, 63);
pub const FLEX_B: u32 = addr(253, 64);

pub const MAX_REGISTER: u32 = FLEX_B;

/* Page 0, Register 1 - reset */
pub const RSTR: u8 = 1 << 0;
pub const RSTM: u8 = 1 << 4;

/* Page 0, Register 2 - power */
pub const RQPD: u8 = 1 << 0;
pub const RQST: u8 = 1 << 4;
pub const DSPR: u8 = 1 << 7;

/* Page 0, Register 3 - mute */
pub const RQMR_SHIFT: u8 = 0;
pub const RQMR: u8 = 1 << RQMR_SHIFT;
pub const RQML_SHIFT: u8 = 4;
pub const RQML: u8 = 1 << RQML_SHIFT;

/* Page 0, Register 4 - PLL */
pub const PLLE: u8 = 1 << 0;
pub const PLCK: u8 = 1 << 4;

/* Page 0, Register 7 - DSP */
pub const SDSL: u8 = 1 << 0;
pub const DEMP: u8 = 1 << 4;

/* Page 0, Register 8 - GPIO output enable */
pub const MUTEOE: u8 = 1 << 4;
pub const G2OE: u8 = 1 << 5;

/* Page 0, Register 9 - SCLK, LRCLK configuration */
pub const LRKO: u8 = 1 << 0;
pub const SCLKO: u8 = 1 << 4;
pub const SCLKP: u8 = 1 << 5;

/* Page 0, Register 12 - provider mode SCLK, LRCLK reset */
pub const RLRK: u8 = 1 << 0;
pub const RSCLK: u8 = 1 << 1;

/* Page 0, Register 13 - PLL, DSP reference */
pub const SREF: u8 = 7 << 4;
pub const SREF_MCLK: u8 = 0 << 4;
pub const SREF_SCLK: u8 = 1 << 4;
pub const SREF_OSC: u8 = 2 << 4;
pub const SREF_GPIO: u8 = 3 << 4;

pub const SDSP: u8 = 7 << 0;
pub const SDSP_MCK: u8 = 0 << 0;
pub const SDSP_PLL: u8 = 1 << 0;
pub const SDSP_OSC: u8 = 2 << 0;
pub const SDSP_MCLK: u8 = 3 << 0;
pub const SDSP_SCLK: u8 = 4 << 0;
pub const SDSP_GPIO: u8 = 5 << 0;

/* Page 0, Register 14 - DAC, OSR reference */
pub const SDAC: u8 = 7 << 4;
pub const SDAC_MCK: u8 = 0 << 4;
pub const SDAC_PLL: u8 = 1 << 4;
pub const SDAC_MCLK: u8 = 3 << 4;
pub const SDAC_SCLK: u8 = 4 << 4;
pub const SDAC_GPIO: u8 = 5 << 4;

pub const SOSR: u8 = 7 << 0;
pub const SOSR_DAC: u8 = 0 << 0;

/* Page 0, Register 15 - NCP reference */
pub const SNCP: u8 = 7 << 0;
pub const SNCP_DAC: u8 = 0 << 0;

/* Page 0, Registers 16..18 - GPIO input routing */
pub const GDAC: u8 = 7 << 0;
pub const GDAC_SDOUT: u8 = 5 << 0;
pub const GREF: u8 = 7 << 0;
pub const GREF_SDOUT: u8 = 5 << 0;

/* Page 0, Register 34 - fs speed mode */
pub const FSSP: u8 = 3 << 0;
pub const FSSP_48KHZ: u8 = 3 << 0;
pub const FSSP_96KHZ: u8 = 4 << 0;
pub const I16E: u8 = 1 << 4;

/* Page 0, Register 37 - error detection */
pub const IPLK: u8 = 1 << 0;
pub const DCAS: u8 = 1 << 1;
pub const IDCM: u8 = 1 << 2;
pub const IDCH: u8 = 1 << 3;
pub const IDSK: u8 = 1 << 4;
pub const IDBK: u8 = 1 << 5;
pub const IDFS: u8 = 1 << 6;

/* Page 0, Register 40 - serial interface */
pub const ALEN: u8 = 3 << 0;
pub const ALEN_16: u8 = 0 << 0;
pub const ALEN_20: u8 = 1 << 0;
pub const ALEN_24: u8 = 2 << 0;
pub const ALEN_32: u8 = 3 << 0;

pub const AFMT: u8 = 3 << 4;
pub const AFMT_I2S: u8 = 0 << 4;
pub const AFMT_DSP: u8 = 1 << 4;
pub const AFMT_RTJ: u8 = 2 << 4;
pub const AFMT_LTJ: u8 = 3 << 4;

/* Page 0, Register 85 - GPIO output selection */
pub const G2SL: u8 = 31 << 0;
pub const G2SL_OFF: u8 = 0 << 0;
pub const G2SL_SDOUT: u8 = 7 << 0;
pub const G2SL_PLLCK: u8 = 16 << 0;

/* Page 1, Register 2 - analog volume control */
pub const RAGN_SHIFT: u8 = 0;
pub const LAGN_SHIFT: u8 = 4;

/* Page 1, Register 7 - analog boost control */
pub const AGBR_SHIFT: u8 = 0;
pub const AGBL_SHIFT: u8 = 4;

/// Power-on reset values, used to seed the register cache and to restore
/// known state after a supply loss.
pub const RESET_DEFAULTS: &[(u32, u8)] = &[
    (RESET, 0x00),
    (POWER, 0x80),
    (MUTE, 0x00),
    (DSP, 0x01),
    (PLL_DSP_REF, 0x00),
    (OSR_DAC_REF, 0x00),
    (NCP_REF, 0x00),
    (DAC_ROUTING, 0x11),
    (DSP_PROGRAM, 0x01),
    (CLKDET, 0x00),
    (AUTO_MUTE, 0x00),
    (ERROR_DETECT, 0x00),
    (DIGITAL_VOLUME_1, 0x00),
    (DIGITAL_VOLUME_2, 0x30),
    (DIGITAL_VOLUME_3, 0x30),
    (DIGITAL_MUTE_1, 0x33),
    (DIGITAL_MUTE_2, 0x10),
    (DIGITAL_MUTE_3, 0x07),
    (OUTPUT_AMPLITUDE, 0x00),
    (ANALOG_GAIN_CTRL, 0x00),
    (ANALOG_MUTE_CTRL, 0x01),
    (ANALOG_GAIN_BOOST, 0x00),
    (VCOM_CTRL_2, 0x01),
    (SCLK_LRCLK_CFG, 0x00),
    (MASTER_MODE, 0x01),
    (GPIO_DACIN, 0x00),
    (GPIO_NCPIN, 0x00),
    (GPIO_PLLIN, 0x00),
    (PLL_COEFF_0, 0x00),
    (PLL_COEFF_1, 0x08),
    (PLL_COEFF_2, 0x00),
    (PLL_COEFF_3, 0x00),
    (PLL_COEFF_4, 0x00),
    (DSP_CLKDIV, 0x00),
    (DAC_CLKDIV, 0x01),
    (NCP_CLKDIV, 0x01),
    (OSR_CLKDIV, 0x01),
    (MASTER_CLKDIV_1, 0x00),
    (MASTER_CLKDIV_2, 0x00),
    (FS_SPEED_MODE, 0x00),
    (I2S_1, 0x02),
    (I2S_2, 0x00),
];

/// Reset value of `reg`, if it has one in [`RESET_DEFAULTS`].
pub fn reset_default(reg: u32) -> Option<u8> {
    RESET_DEFAULTS
        .iter()
        .find(|&&(r, _)| r == reg)
        .map(|&(_, v)| v)
}

/// Whether `reg` may be read back from the device.
pub fn readable(reg: u32) -> bool {
    match reg {
        RESET
        | POWER
        | MUTE
        | PLL_EN
        | I2C_PAGE_AUTO_INC
        | DSP
        | GPIO_EN
        | SCLK_LRCLK_CFG
        | MASTER_MODE
        | PLL_DSP_REF
        | OSR_DAC_REF
        | GPIO_DACIN
        | GPIO_NCPIN
        | GPIO_PLLIN
        | PLL_COEFF_0
        | PLL_COEFF_1
        | PLL_COEFF_2
        | PLL_COEFF_3
        | PLL_COEFF_4
        | DSP_CLKDIV
        | DAC_CLKDIV
        | NCP_CLKDIV
        | OSR_CLKDIV
        | MASTER_CLKDIV_1
        | MASTER_CLKDIV_2
        | FS_SPEED_MODE
        | I2S_1
        | I2S_2
        | DAC_ROUTING
        | DSP_PROGRAM
        | CLKDET
        | AUTO_MUTE
        | DIGITAL_VOLUME_1
        | DIGITAL_VOLUME_2
        | DIGITAL_VOLUME_3
        | DIGITAL_MUTE_1
        | DIGITAL_MUTE_2
        | DIGITAL_MUTE_3
        | GPIO_SDOUT
        | GPIO_CONTROL_1
        | GPIO_CONTROL_2
        | RATE_DET_1
        | RATE_DET_2
        | RATE_DET_3
        | RATE_DET_4
        | CLOCK_STATUS
        | ANALOG_MUTE_DET
        | GPIN
        | DIGITAL_MUTE_DET
        | OUTPUT_AMPLITUDE
        | ANALOG_GAIN_CTRL
        | ANALOG_MUTE_CTRL
        | ANALOG_GAIN_BOOST
        | VCOM_CTRL_2
        | FLEX_A
        | FLEX_B => true,
        /* There are 256 raw register addresses */
        _ => reg < 0xff,
    }
}

/// Whether `reg` changes under the device's feet and must never be served
/// from cache.
pub fn volatile(reg: u32) -> bool {
    match reg {
        PLL_EN | RATE_DET_1 | RATE_DET_2 | RATE_DET_3 | RATE_DET_4 | CLOCK_STATUS
        | ANALOG_MUTE_DET | GPIN | DIGITAL_MUTE_DET => true,
        /* There are 256 raw register addresses */
        _ => reg < 0xff,
    }
}
