//! Arming and disarming events.
//!
//! Breakpoints and watchpoints each own a comparator slot; the slot is the event ID's
//! position in its capability range.  Trace and substitution events are enabled through
//! the WT register, whose 8-bit fields name the breakpoint or watchpoint that starts or
//! ends them (zero: always on).
use alloc::format;
use alloc::string::ToString;

use super::Handle;
use crate::capability::{EventCategory, EventId, EVENTID_INVALID};
use crate::error::{Error, Result};
use crate::event::{Comparator, EventKind, EventOutputMode, SetEvent, TraceTriggers};
use crate::hal::Hal;
use crate::nrr::{comparator, dc1, dtc, wt, ComparatorBank, Reg};

const MAX_TRIGGER_ID: EventId = 0xff;

impl<H: Hal> Handle<H> {
    /// Arm `event`.  An event already armed under the same ID is replaced.
    pub fn set_event(&mut self, event: &SetEvent) -> Result<()> {
        log::debug!("set event {} {:?}", event.eid, event.kind.event_type());
        let result = self.install(event);
        self.check(result)
    }

    /// Disarm the event with ID `eid`.  Failures go to the error sink.
    pub fn clear_event(&mut self, eid: EventId) {
        let Some(event) = self.events.remove(&eid) else {
            log::debug!("clear of event {} which is not set", eid);
            return;
        };
        if let Err(e) = self.disarm(&event) {
            let message = format!("clearing event {}: {}", eid, e);
            log::warn!("{}", message);
            self.sink.report(&message);
        }
    }

    fn install(&mut self, event: &SetEvent) -> Result<()> {
        self.validate_event(event)?;
        if let Some(old) = self.events.remove(&event.eid) {
            self.disarm(&old)?;
        }
        self.arm(event)?;
        self.events.insert(event.eid, event.clone());
        Ok(())
    }

    fn validate_event(&self, event: &SetEvent) -> Result<()> {
        let category = event.kind.category();
        let range = self.cap.range(category);
        if !range.contains(event.eid) {
            return Err(Error::no_capability(format!(
                "event id {} is outside the {:?} range {}..{}",
                event.eid, category, range.min, range.max
            )));
        }
        for trigger in event.kind.triggers() {
            if !self.cap.is_trigger_source(trigger) || trigger > MAX_TRIGGER_ID {
                return Err(Error::no_capability(format!(
                    "event {} cannot be used as a trigger",
                    trigger
                )));
            }
        }
        if let EventKind::DataTrace { start_addr, end_addr, .. } = event.kind {
            if start_addr > end_addr {
                return Err(Error::failed(format!(
                    "data trace range {:#x}..{:#x} is reversed",
                    start_addr, end_addr
                )));
            }
        }
        if event.counts_before_trigger != 0 {
            let counted = matches!(event.kind, EventKind::Breakpoint(_) | EventKind::Watchpoint(_));
            if !counted || event.counts_before_trigger as u64 > comparator::COUNT_MAX {
                return Err(Error::no_capability(format!(
                    "{} counts before trigger not supported for {:?}",
                    event.counts_before_trigger,
                    event.kind.event_type()
                )));
            }
        }
        Ok(())
    }

    fn arm(&mut self, event: &SetEvent) -> Result<()> {
        let map = self.regs().clone();
        match &event.kind {
            EventKind::Step => self.set_dc1_bit(dc1::STEP, true),
            EventKind::Breakpoint(c) => {
                let slot = self.slot(EventCategory::Breakpoint, event.eid)?;
                self.program_comparator(map.breakpoints, slot, c, event.counts_before_trigger)
            }
            EventKind::Watchpoint(c) => {
                let slot = self.slot(EventCategory::Watchpoint, event.eid)?;
                self.program_comparator(map.watchpoints, slot, c, event.counts_before_trigger)
            }
            EventKind::BranchTrace(t) => {
                self.set_trace_triggers(wt::BTM_START, wt::BTM_END, *t)?;
                self.set_dc1_bit(dc1::BTM_ENABLE, true)
            }
            EventKind::DataTrace { rw_mode, triggers, start_addr, end_addr } => {
                self.hal.write_word(map.dtsa, *start_addr)?;
                self.hal.write_word(map.dtea, *end_addr)?;
                self.set_trace_triggers(wt::DTM_START, wt::DTM_END, *triggers)?;
                self.hal.write_word(map.dtc, dtc::ENABLE | rw_mode.code() << dtc::RW_SHIFT)
            }
            EventKind::OwnershipTrace(t) => {
                self.set_trace_triggers(wt::OTM_START, wt::OTM_END, *t)?;
                self.set_dc1_bit(dc1::OTM_ENABLE, true)
            }
            EventKind::Substitution { start_trigger } => {
                self.write_wt(wt::set_field(self.wt, wt::SUBST_START, *start_trigger))
            }
            EventKind::PerfCount { what_to_monitor, what_to_do } => {
                let reg = vendor_reg(map.perf_count, "performance counter")?;
                self.hal.write_word(reg, *what_to_monitor as u64 | (*what_to_do as u64) << 16)
            }
            EventKind::WatchdogCount { count } => {
                let reg = vendor_reg(map.watchdog, "watchdog")?;
                self.hal.write_word(reg, *count as u64)
            }
        }
    }

    // `event` must already be out of `self.events`.
    pub(super) fn disarm(&mut self, event: &SetEvent) -> Result<()> {
        let map = self.regs().clone();
        match &event.kind {
            // Step events share DC1.STEP, which stays set while any of them is armed
            EventKind::Step if self.events.values().any(|e| e.kind == EventKind::Step) => Ok(()),
            EventKind::Step => self.set_dc1_bit(dc1::STEP, false),
            EventKind::Breakpoint(_) => {
                let slot = self.slot(EventCategory::Breakpoint, event.eid)?;
                self.hal.write_word(bank_reg(map.breakpoints.ctrl(slot))?, 0)
            }
            EventKind::Watchpoint(_) => {
                let slot = self.slot(EventCategory::Watchpoint, event.eid)?;
                self.hal.write_word(bank_reg(map.watchpoints.ctrl(slot))?, 0)
            }
            EventKind::BranchTrace(_) => {
                self.set_dc1_bit(dc1::BTM_ENABLE, false)?;
                self.set_trace_triggers(wt::BTM_START, wt::BTM_END, TraceTriggers::ALWAYS)
            }
            EventKind::DataTrace { .. } => {
                self.hal.write_word(map.dtc, 0)?;
                self.set_trace_triggers(wt::DTM_START, wt::DTM_END, TraceTriggers::ALWAYS)
            }
            EventKind::OwnershipTrace(_) => {
                self.set_dc1_bit(dc1::OTM_ENABLE, false)?;
                self.set_trace_triggers(wt::OTM_START, wt::OTM_END, TraceTriggers::ALWAYS)
            }
            EventKind::Substitution { .. } => self.write_wt(wt::set_field(self.wt, wt::SUBST_START, EVENTID_INVALID)),
            EventKind::PerfCount { .. } => self.hal.write_word(vendor_reg(map.perf_count, "performance counter")?, 0),
            EventKind::WatchdogCount { .. } => self.hal.write_word(vendor_reg(map.watchdog, "watchdog")?, 0),
        }
    }

    fn slot(&self, category: EventCategory, eid: EventId) -> Result<usize> {
        self.cap
            .range(category)
            .slot(eid)
            .ok_or_else(|| Error::no_capability(format!("no {:?} comparator for event {}", category, eid)))
    }

    // The slot stays disabled while its operands change.
    fn program_comparator(&mut self, bank: ComparatorBank, slot: usize, c: &Comparator, counts: u32) -> Result<()> {
        let ctrl = bank_reg(bank.ctrl(slot))?;
        self.hal.write_word(ctrl, 0)?;
        self.hal.write_word(bank_reg(bank.addr(slot))?, c.addr)?;
        self.hal.write_word(bank_reg(bank.data(slot))?, c.data)?;
        self.hal.write_word(bank_reg(bank.mask(slot))?, c.mask)?;

        let mut value = comparator::ENABLE
            | c.rw_mode.code() << comparator::RW_SHIFT
            | c.op.code() << comparator::OPERAND_SHIFT
            | (counts as u64 & comparator::COUNT_MAX) << comparator::COUNT_SHIFT;
        if c.eo_mode == EventOutputMode::Triggered {
            value |= comparator::EVTO;
        }
        self.hal.write_word(ctrl, value)
    }

    fn set_trace_triggers(&mut self, start_field: u32, end_field: u32, triggers: TraceTriggers) -> Result<()> {
        let value = wt::set_field(self.wt, start_field, triggers.start);
        let value = wt::set_field(value, end_field, triggers.end);
        self.write_wt(value)
    }
}

fn bank_reg(reg: Option<Reg>) -> Result<Reg> {
    reg.ok_or_else(|| Error::no_capability("comparator slot outside the register map".to_string()))
}

fn vendor_reg(reg: Option<Reg>, what: &str) -> Result<Reg> {
    reg.ok_or_else(|| Error::no_capability(format!("target has no {} register", what)))
}
