//! Mock transport simulating the paged register file of a TAS3251 (or,
//! with the emulation switched off, any dumb byte-register chip such as
//! the clock generator).
//!
//! The mock tracks the page select register exactly like the hardware
//! does, serves reads from power-on defaults until written, and keeps a
//! journal of every raw write seen on the wire so tests can assert exact
//! sequences. Handles are cheap clones over shared state, so a test can
//! keep one while the driver owns another.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use tas3251_protocol::regs;

use super::{Transport, TransportError};

#[derive(Default)]
struct State {
    page: u8,
    regs: BTreeMap<(u8, u8), u8>,
    journal: Vec<(u8, u8)>,
    emulate_mute_det: bool,
    fail_writes: bool,
}

#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(State {
                emulate_mute_det: true,
                ..State::default()
            })),
        }
    }

    /// Current value of a register, falling back to its power-on default.
    pub fn reg(&self, page: u8, offset: u8) -> u8 {
        let state = self.state.lock().unwrap();
        read_reg(&state, page, offset)
    }

    pub fn set_reg(&self, page: u8, offset: u8, value: u8) {
        let mut state = self.state.lock().unwrap();
        state.regs.insert((page, offset), value);
    }

    /// Raw `(register, value)` pairs seen since the last call.
    pub fn take_journal(&self) -> Vec<(u8, u8)> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.journal)
    }

    /// When enabled (the default), writes to the mute register reflect
    /// into the analog mute detect status like the real amplifier does.
    /// Disable to simulate an amplifier stuck mid-transition.
    pub fn set_emulate_mute_det(&self, on: bool) {
        self.state.lock().unwrap().emulate_mute_det = on;
    }

    /// Make every subsequent write fail with a NACK.
    pub fn set_fail_writes(&self, on: bool) {
        self.state.lock().unwrap().fail_writes = on;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

fn read_reg(state: &State, page: u8, offset: u8) -> u8 {
    state
        .regs
        .get(&(page, offset))
        .copied()
        .or_else(|| regs::reset_default(regs::addr(page, offset)))
        .unwrap_or(0)
}

impl Transport for MockTransport {
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(TransportError::Nack);
        }

        state.journal.push((reg, value));
        if reg == regs::PAGE_SELECT {
            state.page = value;
        }
        let page = state.page;
        state.regs.insert((page, reg), value);

        if state.emulate_mute_det && page == 0 && reg == regs::offset(regs::MUTE) {
            let left_live = value & regs::RQML == 0;
            let right_live = value & regs::RQMR == 0;
            let det = (left_live as u8) << 1 | right_live as u8;
            state
                .regs
                .insert((0, regs::offset(regs::ANALOG_MUTE_DET)), det);
        }

        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, TransportError> {
        let state = self.state.lock().unwrap();
        Ok(read_reg(&state, state.page, reg))
    }
}
