//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` will get to that state by the most efficient path, based on the current state.
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use crate::cable::{Cable, CableError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        JtagState::Reset,
        JtagState::Idle,
        JtagState::SelectDR,
        JtagState::CaptureDR,
        JtagState::ShiftDR,
        JtagState::Exit1DR,
        JtagState::PauseDR,
        JtagState::Exit2DR,
        JtagState::UpdateDR,
        JtagState::SelectIR,
        JtagState::CaptureIR,
        JtagState::ShiftIR,
        JtagState::Exit1IR,
        JtagState::PauseIR,
        JtagState::Exit2IR,
        JtagState::UpdateIR,
    ];

    /// The state one TCK edge later with the given TMS level.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        match (self, tms) {
            (Reset, false) => Idle,
            (Reset, true) => Reset,
            (Idle, false) => Idle,
            (Idle, true) => SelectDR,
            (SelectDR, false) => CaptureDR,
            (SelectDR, true) => SelectIR,
            (CaptureDR, false) | (ShiftDR, false) | (Exit2DR, false) => ShiftDR,
            (CaptureDR, true) | (ShiftDR, true) => Exit1DR,
            (Exit1DR, false) | (PauseDR, false) => PauseDR,
            (Exit1DR, true) | (Exit2DR, true) => UpdateDR,
            (PauseDR, true) => Exit2DR,
            (UpdateDR, false) | (UpdateIR, false) => Idle,
            (UpdateDR, true) | (UpdateIR, true) => SelectDR,
            (SelectIR, false) => CaptureIR,
            (SelectIR, true) => Reset,
            (CaptureIR, false) | (ShiftIR, false) | (Exit2IR, false) => ShiftIR,
            (CaptureIR, true) | (ShiftIR, true) => Exit1IR,
            (Exit1IR, false) | (PauseIR, false) => PauseIR,
            (Exit1IR, true) | (Exit2IR, true) => UpdateIR,
            (PauseIR, true) => Exit2IR,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, JtagState::ShiftDR | JtagState::ShiftIR)
    }
}

/// Shortest TMS sequence leading from `from` to `to`.
pub fn tms_path(from: JtagState, to: JtagState) -> Vec<usize> {
    if from == to {
        return vec![];
    }
    let mut paths = VecDeque::new();
    let mut seen = [false; 16];
    seen[from as usize] = true;
    paths.push_back((from, Vec::new()));

    while let Some((state, path)) = paths.pop_front() {
        for tms in [0, 1] {
            let next = state.next(tms != 0);
            if seen[next as usize] {
                continue;
            }
            let mut p = path.clone();
            p.push(tms);
            if next == to {
                return p;
            }
            seen[next as usize] = true;
            paths.push_back((next, p));
        }
    }
    // Every state reaches every other.
    vec![]
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`.  The chain is reset and left in
    /// Run-Test/Idle.
    pub fn new(cable: T) -> Result<Self, CableError> {
        let mut sm = Self {
            cable,
            state: JtagState::Reset,
        };
        sm.mode_reset()?;
        Ok(sm)
    }

    /// Reset the scan chain by driving TMS high for 5 clocks, then go to Run-Test/Idle
    pub fn mode_reset(&mut self) -> Result<(), CableError> {
        self.cable.change_mode(&[1, 1, 1, 1, 1, 0], true)?;
        self.state = JtagState::Idle;
        Ok(())
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<(), CableError> {
        if self.state == state {
            return Ok(());
        }

        let path = tms_path(self.state, state);
        log::trace!("path from {:?} to {:?}: {:?}", self.state, state, path);
        self.cable.change_mode(&path, true)?;
        self.state = state;
        Ok(())
    }

    fn enter_shift(&mut self, reg: Register) -> Result<(), CableError> {
        match reg {
            Register::Data => self.change_mode(JtagState::ShiftDR),
            Register::Instruction => self.change_mode(JtagState::ShiftIR),
        }
    }

    fn after_shift(&mut self, reg: Register, pause_after: bool) {
        if pause_after {
            self.state = match reg {
                Register::Data => JtagState::PauseDR,
                Register::Instruction => JtagState::PauseIR,
            };
        }
    }

    /// Read `bits` from either the instruction or data register
    pub fn read_reg(&mut self, reg: Register, bits: usize) -> Result<Vec<u8>, CableError> {
        self.enter_shift(reg)?;
        if bits == 0 {
            return Ok(vec![]);
        }
        self.cable.read_data(bits)
    }

    /// Queue a read of `bits` from either the instruction or data register
    pub fn queue_read(&mut self, reg: Register, bits: usize) -> Result<bool, CableError> {
        self.enter_shift(reg)?;
        self.cable.queue_read(bits)
    }

    /// Write `data` into either the instruction or data register.  `bits` indicates how many bits
    /// of the last byte should be written (8 indicates that the entire byte should be written).
    /// The mode will either be ShiftIR / ShiftDR if `pause_after` is false, or PauseIR / PauseDR
    /// if `pause_after` is true.  This allows for setting the register with multiple calls to
    /// `write_reg`, which may be more convenient than manual bit-shifting.
    pub fn write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.enter_shift(reg)?;
        self.cable.write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(())
    }

    /// Similar to `write_reg` except it returns the bits that were shifted out during writing.
    pub fn read_write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        self.enter_shift(reg)?;
        let data = self.cable.read_write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(data)
    }

    pub fn queue_read_write(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<bool, CableError> {
        self.enter_shift(reg)?;
        let queued = self.cable.queue_read_write(data, bits, pause_after)?;
        if queued {
            self.after_shift(reg, pause_after);
        }
        Ok(queued)
    }

    pub fn finish_read(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        self.cable.finish_read(bits)
    }

    pub fn flush(&mut self) -> Result<(), CableError> {
        self.cable.flush()
    }
}
