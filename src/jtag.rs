//! A HAL that reaches the Nexus client through a JTAG scan chain.
//!
//! The client's TAP is loaded with the NEXUS-ACCESS instruction once at open time.  Each
//! register access is then two DR scans: an 8-bit select scan holding the register index
//! and a read/write flag (`index << 1 | 1` to write), followed by a data scan as wide as the
//! register.  A read captures the register at the start of the data scan; a write takes
//! effect when the scan passes Update-DR.
//!
//! JTAG carries no unsolicited messages, so the only events this HAL produces are register
//! snapshots taken when the target is seen to have stopped.
use alloc::format;
use alloc::vec::Vec;

use crate::cable::Cable;
use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::event::ReceivedEvent;
use crate::hal::{check_nrr_args, Hal};
use crate::nrr::{ds, mask_tail, to_bytes, NrrIndex, RegisterMap};
use crate::statemachine::JtagState;
use crate::taps::Taps;
use crate::types::{PortType, Registers, TargetSpec};

const SELECT_BITS: u8 = 8;

/// Default NEXUS-ACCESS opcode
pub const NEXUS_ACCESS: u32 = 0x1c;

#[derive(Clone, Debug)]
pub struct JtagConfig {
    /// Position of the Nexus client's TAP in the chain, 0 being nearest TDO
    pub tap: usize,
    /// IR length of every TAP in the chain.  Left empty, the chain is detected.
    pub ir_lengths: Vec<usize>,
    pub nexus_access: u32,
    /// What the target behind this TAP supports
    pub capability: Capability,
}

impl Default for JtagConfig {
    fn default() -> Self {
        Self {
            tap: 0,
            ir_lengths: Vec::new(),
            nexus_access: NEXUS_ACCESS,
            capability: Capability::reference_client(),
        }
    }
}

pub struct JtagHal<T> {
    taps: Taps<T>,
    config: JtagConfig,
    map: RegisterMap,
    halted: bool,
}

impl<T, U> JtagHal<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    pub fn new(taps: Taps<T>, config: JtagConfig) -> Self {
        Self {
            taps,
            config,
            map: RegisterMap::default(),
            halted: false,
        }
    }

    pub fn taps(&mut self) -> &mut Taps<T> {
        &mut self.taps
    }

    pub fn into_taps(self) -> Taps<T> {
        self.taps
    }

    fn select(&mut self, index: NrrIndex, write: bool) -> Result<()> {
        let select = (index.get() << 1) | write as u8;
        self.taps.write_dr(&[select], SELECT_BITS as usize)?;
        self.taps.sm.change_mode(JtagState::Idle)?;
        Ok(())
    }

    fn read_core_registers(&mut self) -> Result<Registers> {
        let mut regs = Registers::default();
        for n in 0..Registers::COUNT {
            self.write_word(self.map.reg_sel, n as u64)?;
            let value = self.read_word(self.map.reg_data)?;
            regs.set_raw(n, value);
        }
        Ok(regs)
    }
}

impl<T, U> Hal for JtagHal<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    fn open(&mut self, spec: &TargetSpec) -> Result<Capability> {
        if spec.access_port != PortType::Jtag {
            return Err(Error::no_capability(format!("JTAG HAL cannot use a {:?} access port", spec.access_port)));
        }
        if spec.unsolicited_port == PortType::Aux {
            return Err(Error::no_capability("no auxiliary message port behind a JTAG cable"));
        }

        // The chain is only learnt on the first open
        if self.taps.is_empty() {
            if self.config.ir_lengths.is_empty() {
                self.taps.detect()?;
            } else {
                for len in self.config.ir_lengths.clone() {
                    self.taps.add_tap(len);
                }
            }
        }
        let irlen = self
            .taps
            .irlen(self.config.tap)
            .ok_or_else(|| Error::no_capability(format!("no tap {} on the scan chain", self.config.tap)))?;
        if irlen < 32 && self.config.nexus_access >> irlen != 0 {
            return Err(Error::no_capability(format!(
                "NEXUS-ACCESS opcode {:#x} does not fit a {}-bit IR",
                self.config.nexus_access, irlen
            )));
        }

        let ir = to_bytes(self.config.nexus_access as u64, irlen);
        self.taps.select_tap(self.config.tap, &ir)?;
        self.taps.sm.change_mode(JtagState::Idle)?;
        self.map = spec.vendor.register_map.clone();
        self.halted = false;

        let mut cap = self.config.capability.clone();
        cap.hal_info = format!("JTAG tap {} of {}, IR length {}", self.config.tap, self.taps.len(), irlen);
        log::debug!("{}", cap.hal_info);
        Ok(cap)
    }

    fn close(&mut self) -> Result<()> {
        self.taps.sm.mode_reset()?;
        Ok(())
    }

    fn write_nrr(&mut self, index: NrrIndex, bits: usize, data: &[u8]) -> Result<()> {
        check_nrr_args(index, bits, data.len())?;
        log::trace!("nrr {:#04x} <- {:02x?}", index.get(), data);
        self.select(index, true)?;
        let last = bits - (data.len() - 1) * 8;
        self.taps.write_dr(data, last)?;
        self.taps.sm.change_mode(JtagState::Idle)?;
        Ok(())
    }

    fn read_nrr(&mut self, index: NrrIndex, bits: usize) -> Result<Vec<u8>> {
        check_nrr_args(index, bits, crate::nrr::byte_len(bits))?;
        self.select(index, false)?;
        let mut data = self.taps.read_dr(bits)?;
        self.taps.sm.change_mode(JtagState::Idle)?;
        data.truncate(crate::nrr::byte_len(bits));
        mask_tail(&mut data, bits);
        log::trace!("nrr {:#04x} -> {:02x?}", index.get(), data);
        Ok(data)
    }

    fn get_event(&mut self, block: bool) -> Result<Option<ReceivedEvent>> {
        loop {
            let status = self.read_word(self.map.ds)?;
            let halted = status & ds::HALTED != 0;
            if halted && !self.halted {
                self.halted = true;
                log::debug!("target stopped");
                let regs = self.read_core_registers()?;
                return Ok(Some(ReceivedEvent::BreakStep(alloc::boxed::Box::new(regs))));
            }
            self.halted = halted;
            if !block {
                return Ok(None);
            }
            core::hint::spin_loop();
        }
    }
}
