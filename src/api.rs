//! The target abstraction layer: the Nexus API entry points.
//!
//! A `Handle` is one open connection.  It owns the HAL that reaches the target, the
//! capability negotiated when the connection was opened, and the TAL's own view of the
//! target: which events are armed and shadow copies of the control registers it writes
//! piecemeal.  Every entry point is expressed in terms of Nexus register reads and writes
//! through the HAL, using the register map from the target specification.
//!
//! Failures are returned as `Error`s.  They are also passed to the `ErrorSink` installed
//! at open time, except for `NoSpace`, which only means the caller's buffer was too small.
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::ToString;

use crate::capability::{Capability, EventCategory, EventId, VERSION_STRING_10};
use crate::control::{CtrlData, VendorCtrl};
use crate::error::{Error, Result, Status};
use crate::event::{ReceivedEvent, SetEvent};
use crate::hal::{ErrorSink, Hal};
use crate::nrr::{dc1, ds, RegisterMap};
use crate::types::{Endian, PortType, Registers, TargetSpec};

mod memory;
mod triggers;

pub use memory::AccessSize;

/// Used to reference a connected target
pub struct Handle<H: Hal> {
    cap: Capability,
    spec: TargetSpec,
    hal: H,
    sink: Box<dyn ErrorSink>,
    events: BTreeMap<EventId, SetEvent>,
    // Shadows of registers the TAL only ever changes a few bits of at a time
    dc1: u64,
    wt: u64,
    // An event the caller had no room for last time
    held: Option<ReceivedEvent>,
}

impl<H: Hal> Handle<H> {
    /// Open a target connection.  On failure no handle exists and the error is always
    /// `NoCapability`.
    pub fn open<S: ErrorSink + 'static>(spec: TargetSpec, mut hal: H, sink: S) -> Result<Self> {
        match spec.access_port {
            PortType::Jtag | PortType::Aux => {}
            port => {
                return Err(Error::no_capability(format!("access port {:?} is not supported", port)));
            }
        }
        if spec.unsolicited_port == PortType::Other {
            return Err(Error::no_capability("unsolicited port type Other is reserved"));
        }

        let cap = hal.open(&spec).map_err(as_no_capability)?;
        let mut handle = Handle {
            cap,
            spec,
            hal,
            sink: Box::new(sink),
            events: BTreeMap::new(),
            dc1: 0,
            wt: 0,
            held: None,
        };
        if let Err(e) = handle.negotiate() {
            if let Err(close) = handle.hal.close() {
                log::warn!("closing after failed open: {}", close);
            }
            return Err(as_no_capability(e));
        }

        log::info!(
            "opened target: device id {:#010x}, {:?} endian, hal {:?}",
            handle.cap.device_id,
            handle.cap.target_endian,
            handle.cap.hal_info
        );
        Ok(handle)
    }

    fn negotiate(&mut self) -> Result<()> {
        let map = self.spec.vendor.register_map.clone();

        self.cap.api_version = VERSION_STRING_10.to_string();
        self.cap.device_id = self.hal.read_word(map.did)? as u32;
        self.cap.target_endian = match (self.spec.target_endian, self.cap.target_endian) {
            (Endian::Unknown, reported) => reported,
            (wanted, Endian::Unknown) => wanted,
            (wanted, reported) if wanted == reported => wanted,
            (wanted, reported) => {
                return Err(Error::no_capability(format!(
                    "target is {:?} endian, specification asks for {:?}",
                    reported, wanted
                )));
            }
        };
        self.cap.validate()?;

        for (category, bank) in [
            (EventCategory::Breakpoint, map.breakpoints),
            (EventCategory::Watchpoint, map.watchpoints),
        ] {
            if self.cap.range(category).len() > bank.slots {
                return Err(Error::no_capability(format!(
                    "{} {:?} events advertised, register map has {} comparators",
                    self.cap.range(category).len(),
                    category,
                    bank.slots
                )));
            }
        }
        if self.cap.dtm.len() > 1 {
            return Err(Error::no_capability("register map has a single data trace channel"));
        }
        if self.cap.max_mem_map > 8 || self.cap.max_mem_access_priority > 4 {
            return Err(Error::no_capability("memory map or priority count exceeds the RWCS fields"));
        }

        self.hal.write_word(map.wt, 0)?;
        self.hal.write_word(map.dc1, 0)?;
        Ok(())
    }

    /// Close the connection.  Armed events are cleared first.
    pub fn close(mut self) -> Result<()> {
        let armed = core::mem::take(&mut self.events);
        for event in armed.values() {
            if let Err(e) = self.disarm(event) {
                log::warn!("failed to clear event {} on close: {}", event.eid, e);
            }
        }
        let result = self.hal.close();
        match &result {
            Ok(()) => log::info!("closed target {:#010x}", self.cap.device_id),
            Err(e) => self.sink.report(&e.to_string()),
        }
        result
    }

    pub fn capability(&self) -> &Capability {
        &self.cap
    }

    pub fn target_spec(&self) -> &TargetSpec {
        &self.spec
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn armed_events(&self) -> impl Iterator<Item = &SetEvent> {
        self.events.values()
    }

    /// Apply one control operation.
    pub fn control(&mut self, ctrl: &CtrlData) -> Result<()> {
        log::debug!("control {:?}", ctrl.tag());
        let result = self.apply_control(ctrl);
        self.check(result)
    }

    fn apply_control(&mut self, ctrl: &CtrlData) -> Result<()> {
        match ctrl {
            CtrlData::SetClient { client_id } => {
                let csc = self.regs().csc;
                if csc.bits < 32 && (*client_id as u64) >= (1u64 << csc.bits) {
                    return Err(Error::failed(format!(
                        "client id {} does not fit the {}-bit client select register",
                        client_id, csc.bits
                    )));
                }
                self.hal.write_word(csc, *client_id as u64)
            }
            CtrlData::OverrunMode { delay } => {
                if *delay > 0xff {
                    return Err(Error::no_capability(format!("overrun delay {} is too long", delay)));
                }
                let value = (self.dc1 & !dc1::OVERRUN_MASK) | (*delay as u64) << dc1::OVERRUN_SHIFT;
                self.write_dc1(value)
            }
            CtrlData::SubstitutionMode(mode) => {
                let mut value = self.dc1 & !(dc1::SUBST_INSTR | dc1::SUBST_DATA);
                if let Some(mode) = mode {
                    if mode.instructions {
                        value |= dc1::SUBST_INSTR;
                    }
                    if mode.data {
                        value |= dc1::SUBST_DATA;
                    }
                }
                self.write_dc1(value)
            }
            CtrlData::ResetOrHalt { perform_reset_sequence, halt } => {
                let mut pulse = 0;
                if *perform_reset_sequence {
                    pulse |= dc1::RESET_REQ;
                }
                if *halt {
                    pulse |= dc1::HALT_REQ;
                }
                if pulse == 0 {
                    return Ok(());
                }
                self.pulse_dc1(pulse)
            }
            CtrlData::RestartFromBreakStep(regs) => self.restart(regs),
            CtrlData::EventIn { level } => self.set_dc1_bit(dc1::EVTI, *level),
            CtrlData::ClientBreak { enabled } => self.set_dc1_bit(dc1::CLIENT_BREAK, *enabled),
            CtrlData::Vendor(op) => {
                let (reg, value) = match op {
                    VendorCtrl::FlashLed { how_fast } => (self.regs().led, *how_fast as u64),
                    VendorCtrl::ConfigureTraceBuffer { size } => (self.regs().trace_buffer, *size as u64),
                };
                let reg = reg.ok_or_else(|| Error::no_capability(format!("{:?} has no register on this target", op)))?;
                self.hal.write_word(reg, value)
            }
        }
    }

    fn restart(&mut self, regs: &Registers) -> Result<()> {
        let map = self.regs().clone();
        let status = self.hal.read_word(map.ds)?;
        if status & ds::HALTED == 0 {
            return Err(Error::failed("restart requested but the target is not halted"));
        }
        for n in 0..Registers::COUNT {
            self.hal.write_word(map.reg_sel, n as u64)?;
            self.hal.write_word(map.reg_data, regs.raw(n).unwrap_or_default())?;
        }
        self.pulse_dc1(dc1::RESUME)
    }

    /// Read the next event.  Events bigger than `max_bytes` stay queued and the call
    /// fails with `NoSpace`.
    pub fn get_event(&mut self, max_bytes: usize, block: bool) -> Result<Option<ReceivedEvent>> {
        let event = match self.held.take() {
            Some(event) => event,
            None => match self.hal.get_event(block) {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(None),
                Err(e) => return self.check(Err(e)),
            },
        };

        let needed = event.wire_size();
        if needed > max_bytes {
            log::debug!("holding {:?} event of {} bytes, caller offered {}", event.tag(), needed, max_bytes);
            self.held = Some(event);
            return Err(Error::NoSpace { needed, available: max_bytes });
        }
        Ok(Some(event))
    }

    fn regs(&self) -> &RegisterMap {
        &self.spec.vendor.register_map
    }

    fn write_dc1(&mut self, value: u64) -> Result<()> {
        let reg = self.regs().dc1;
        self.hal.write_word(reg, value)?;
        self.dc1 = value;
        Ok(())
    }

    fn set_dc1_bit(&mut self, bit: u64, on: bool) -> Result<()> {
        let value = if on { self.dc1 | bit } else { self.dc1 & !bit };
        self.write_dc1(value)
    }

    // Request bits act once, so they never enter the shadow.
    fn pulse_dc1(&mut self, bits: u64) -> Result<()> {
        let reg = self.regs().dc1;
        self.hal.write_word(reg, self.dc1 | bits)
    }

    fn write_wt(&mut self, value: u64) -> Result<()> {
        let reg = self.regs().wt;
        self.hal.write_word(reg, value)?;
        self.wt = value;
        Ok(())
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.status() != Status::NoSpace {
                let message = e.to_string();
                log::warn!("{}", message);
                self.sink.report(&message);
            }
        }
        result
    }
}

fn as_no_capability(e: Error) -> Error {
    match e {
        Error::NoCapability(_) => e,
        other => Error::NoCapability(other.to_string()),
    }
}
