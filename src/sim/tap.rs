//! A bit-level JTAG TAP in front of the simulated client.
use std::sync::Arc;
use std::vec::Vec;

use super::{Shared, SimConfig, IDCODE_INSTRUCTION};
use crate::cable::{self, Cable, CableError, Clocked};
use crate::nrr::{from_bytes, to_bytes, NrrIndex};
use crate::statemachine::JtagState;

// Captured into the IR on Capture-IR
const IR_CAPTURE: u64 = 0b01;
const SELECT_BITS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Select,
    Data { index: NrrIndex, write: bool, bits: usize },
}

pub struct SimTap {
    shared: Arc<Shared>,
    state: JtagState,
    ir: u64,
    ir_len: usize,
    idcode: u32,
    nexus: u64,
    // bit 0 is the one next out on TDO
    sr: Vec<bool>,
    phase: Phase,
}

fn to_bits(value: u64, bits: usize) -> Vec<bool> {
    (0..bits).map(|i| i < 64 && value >> i & 1 != 0).collect()
}

fn from_bits(bits: &[bool]) -> u64 {
    bits.iter().take(64).enumerate().fold(0, |v, (i, b)| v | (*b as u64) << i)
}

impl SimTap {
    pub(super) fn new(shared: Arc<Shared>, config: &SimConfig) -> Self {
        Self {
            shared,
            state: JtagState::Reset,
            ir: IDCODE_INSTRUCTION as u64,
            ir_len: config.ir_len.clamp(2, 32),
            idcode: config.idcode | 1,
            nexus: config.nexus_instruction as u64,
            sr: Vec::new(),
            phase: Phase::Select,
        }
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Level on TDO right now.
    pub fn tdo(&self) -> bool {
        self.state.is_shift() && self.sr.first().copied().unwrap_or(false)
    }

    /// One TCK period: TDO is sampled, then the rising edge acts on the current state.
    pub fn tick(&mut self, tms: bool, tdi: bool) -> bool {
        let out = self.tdo();
        match self.state {
            JtagState::CaptureDR => self.capture_dr(),
            JtagState::CaptureIR => self.sr = to_bits(IR_CAPTURE, self.ir_len),
            JtagState::ShiftDR | JtagState::ShiftIR if !self.sr.is_empty() => {
                self.sr.remove(0);
                self.sr.push(tdi);
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        match self.state {
            JtagState::UpdateDR => self.update_dr(),
            JtagState::UpdateIR => {
                self.ir = from_bits(&self.sr);
                self.phase = Phase::Select;
                log::trace!("sim tap IR {:#x}", self.ir);
            }
            JtagState::Reset => {
                self.ir = IDCODE_INSTRUCTION as u64;
                self.phase = Phase::Select;
            }
            _ => {}
        }
        out
    }

    fn capture_dr(&mut self) {
        self.sr = if self.ir == IDCODE_INSTRUCTION as u64 {
            to_bits(self.idcode as u64, 32)
        } else if self.ir == self.nexus {
            match self.phase {
                Phase::Select => to_bits(0, SELECT_BITS),
                Phase::Data { index, write: false, bits } => {
                    let value = match self.shared.with(|c| c.read_nrr(index, bits)) {
                        Ok(data) => from_bytes(&data, bits),
                        Err(e) => {
                            log::warn!("sim tap: {}", e);
                            0
                        }
                    };
                    to_bits(value, bits)
                }
                Phase::Data { bits, .. } => to_bits(0, bits),
            }
        } else {
            // BYPASS
            to_bits(0, 1)
        };
    }

    fn update_dr(&mut self) {
        if self.ir != self.nexus {
            return;
        }
        self.phase = match self.phase {
            Phase::Select => {
                let select = from_bits(&self.sr);
                match NrrIndex::new((select >> 1) as u8 & 0x7f) {
                    Some(index) => {
                        let bits = self.shared.client().config().width_of(index);
                        Phase::Data { index, write: select & 1 != 0, bits }
                    }
                    None => Phase::Select,
                }
            }
            Phase::Data { index, write: true, bits } => {
                let data = to_bytes(from_bits(&self.sr), bits);
                if let Err(e) = self.shared.with(|c| c.write_nrr(index, bits, &data)) {
                    log::warn!("sim tap: {}", e);
                }
                Phase::Select
            }
            Phase::Data { .. } => Phase::Select,
        };
    }
}

impl Clocked for SimTap {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        Ok(self.tick(tms, tdi))
    }
}

impl Cable for SimTap {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError> {
        cable::clock_tms(self, tms, tdi)
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        cable::shift_ones(self, bits)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        cable::shift(self, data, bits, pause_after).map(|_| ())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        cable::shift(self, data, bits, pause_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTarget;
    use crate::statemachine::{JtagSM, Register};
    use std::boxed::Box;
    use std::vec;

    #[test]
    fn ir_captures_the_standard_pattern() {
        let target = SimTarget::new(SimConfig::default());
        let mut sm = JtagSM::new(Box::new(target.tap())).unwrap();
        let ir = sm.read_reg(Register::Instruction, 5).unwrap();
        assert_eq!(ir, vec![0b00001]);
    }

    #[test]
    fn bypass_is_one_bit() {
        let target = SimTarget::new(SimConfig::default());
        let mut sm = JtagSM::new(Box::new(target.tap())).unwrap();
        sm.write_reg(Register::Instruction, &[0x1f], 5, true).unwrap();
        sm.change_mode(JtagState::Idle).unwrap();
        // A zero comes out of the bypass register, then our own bits follow it through.
        let out = sm.read_write_reg(Register::Data, &[0b1010], 4, true).unwrap();
        assert_eq!(out, vec![0b0100]);
    }

    #[test]
    fn select_then_data_scan_writes_a_register() {
        let target = SimTarget::new(SimConfig::register_file());
        let probe = target.probe();
        let mut sm = JtagSM::new(Box::new(target.tap())).unwrap();
        sm.write_reg(Register::Instruction, &[0x1c], 5, true).unwrap();
        sm.change_mode(JtagState::Idle).unwrap();

        let index = NrrIndex::new(0x30).unwrap();
        sm.write_reg(Register::Data, &[(0x30 << 1) | 1], 8, true).unwrap();
        sm.change_mode(JtagState::Idle).unwrap();
        sm.write_reg(Register::Data, &[0x78, 0x56, 0x34, 0x12], 8, true).unwrap();
        sm.change_mode(JtagState::Idle).unwrap();
        assert_eq!(probe.nrr(index), 0x1234_5678);
    }
}
