//! Page-banked register cache in front of a raw transport.
//!
//! The TAS3251 multiplexes its register file through a page select at
//! offset 0 of every page. `Regmap` addresses registers through the flat
//! virtual space from [`tas3251_protocol::regs`], issues page selects
//! only when the page actually changes, and caches non-volatile values so
//! reads rarely touch the bus and lost register state can be replayed
//! after a supply failure.

use std::{
    collections::BTreeMap,
    thread,
    time::{Duration, Instant},
};

use log::trace;
use tas3251_protocol::regs;

use crate::{transport::Transport, Error, Result};

pub struct Regmap<T> {
    transport: T,
    /// Page the device currently has selected; `None` when unknown, e.g.
    /// after a supply event may have reset the chip.
    page: Option<u8>,
    cache: BTreeMap<u32, u8>,
    cache_only: bool,
    dirty: bool,
}

impl<T: Transport> Regmap<T> {
    /// Wraps a transport, assuming the device is in its power-on state.
    pub fn new(transport: T) -> Self {
        Regmap {
            transport,
            page: Some(0),
            cache: regs::RESET_DEFAULTS.iter().copied().collect(),
            cache_only: false,
            dirty: false,
        }
    }

    fn select_page(&mut self, page: u8) -> Result<()> {
        if self.page != Some(page) {
            self.transport.write_reg(regs::PAGE_SELECT, page)?;
            self.page = Some(page);
        }
        Ok(())
    }

    fn current_page(&self) -> u8 {
        self.page.unwrap_or(0)
    }

    /// Raw in-page write. PPC3 streams address whatever page is currently
    /// selected and drive the page register themselves, so a raw write to
    /// offset 0 retargets the page tracking.
    pub fn write_raw(&mut self, reg: u8, value: u8) -> Result<()> {
        if self.cache_only {
            return Err(Error::CacheOnly);
        }
        self.transport.write_reg(reg, value)?;
        if reg == regs::PAGE_SELECT {
            self.page = Some(value);
        } else {
            let vreg = regs::addr(self.current_page(), reg);
            if !regs::volatile(vreg) {
                self.cache.insert(vreg, value);
            }
        }
        Ok(())
    }

    pub fn write(&mut self, reg: u32, value: u8) -> Result<()> {
        if !regs::is_virtual(reg) {
            return self.write_raw(reg as u8, value);
        }
        if self.cache_only {
            if !regs::volatile(reg) {
                self.cache.insert(reg, value);
                self.dirty = true;
            }
            return Ok(());
        }
        self.select_page(regs::page(reg))?;
        self.transport.write_reg(regs::offset(reg), value)?;
        if !regs::volatile(reg) {
            self.cache.insert(reg, value);
        }
        trace!("write {:#05x} = {:#04x}", reg, value);
        Ok(())
    }

    pub fn read(&mut self, reg: u32) -> Result<u8> {
        let reg = if regs::is_virtual(reg) {
            reg
        } else {
            regs::addr(self.current_page(), reg as u8)
        };

        if !regs::volatile(reg) {
            if let Some(&value) = self.cache.get(&reg) {
                return Ok(value);
            }
        }
        if self.cache_only {
            return Err(Error::CacheOnly);
        }

        self.select_page(regs::page(reg))?;
        let value = self.transport.read_reg(regs::offset(reg))?;
        if !regs::volatile(reg) {
            self.cache.insert(reg, value);
        }
        Ok(value)
    }

    /// Read-modify-write of the masked bits. Skips the bus write when the
    /// register already holds the requested value and reports whether
    /// anything changed.
    pub fn update_bits(&mut self, reg: u32, mask: u8, value: u8) -> Result<bool> {
        let old = self.read(reg)?;
        let new = (old & !mask) | (value & mask);
        if new == old {
            return Ok(false);
        }
        self.write(reg, new)?;
        Ok(true)
    }

    pub fn test_bits(&mut self, reg: u32, mask: u8, expected: u8) -> Result<bool> {
        Ok(self.read(reg)? & mask == expected)
    }

    /// Sleeping poll until `reg & mask == expected`.
    pub fn read_poll_timeout(
        &mut self,
        reg: u32,
        mask: u8,
        expected: u8,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.read(reg)? & mask == expected {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(Error::PollTimeout { reg });
            }
            thread::sleep(interval);
        }
    }

    /// Route writes to the cache only; the bus is presumed dead (supply
    /// lost or device held in power down).
    pub fn cache_only(&mut self, enable: bool) {
        self.cache_only = enable;
    }

    /// Flag the hardware as out of sync with the cache, typically after a
    /// supply rail dropped and the chip fell back to its reset defaults.
    /// Page tracking is invalidated along with it.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.page = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replay every cached value that differs from the power-on default.
    /// The device is assumed to have reset, so its page tracking restarts
    /// at page 0.
    pub fn sync(&mut self) -> Result<()> {
        if self.cache_only {
            return Err(Error::CacheOnly);
        }
        if !self.dirty {
            return Ok(());
        }

        let entries: Vec<(u32, u8)> = self
            .cache
            .iter()
            .filter(|&(&reg, &value)| {
                !regs::volatile(reg) && regs::reset_default(reg) != Some(value)
            })
            .map(|(&reg, &value)| (reg, value))
            .collect();
        for (reg, value) in entries {
            self.select_page(regs::page(reg))?;
            self.transport.write_reg(regs::offset(reg), value)?;
        }

        self.dirty = false;
        Ok(())
    }
}
