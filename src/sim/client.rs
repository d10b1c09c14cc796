//! Register level model of a Nexus client.
//!
//! Registers the map names get their debug behaviour here; anything else is plain
//! storage.  Events the client produces wait in a bounded queue until the host pulls them.
use std::boxed::Box;
use std::collections::VecDeque;
use std::format;
use std::vec;
use std::vec::Vec;

use super::{Region, SimConfig};
use crate::api::AccessSize;
use crate::capability::EventId;
use crate::error::{Error, Result};
use crate::event::{Operand, ReceivedEvent, RwMode};
use crate::message::{Message, MessageBuilder, Tcode, SRC_BITS};
use crate::nrr::{comparator, dc1, ds, dtc, from_bytes, rwcs, to_bytes, wt, ComparatorBank, NrrIndex, NRR_COUNT};
use crate::types::{Address, Registers};

// Error message code for messages lost to a full queue
const ECODE_OVERRUN: u64 = 1;
const ECODE_BITS: usize = 5;
const ADDR_BITS: usize = 32;

struct Memory {
    region: Region,
    bytes: Vec<u8>,
}

impl Memory {
    fn range(&self, map: u32, addr: Address, len: usize) -> Option<core::ops::Range<usize>> {
        let region = &self.region;
        if region.map != map || addr < region.base {
            return None;
        }
        let start = usize::try_from(addr - region.base).ok()?;
        let end = start.checked_add(len)?;
        (end <= region.size).then(|| start..end)
    }
}

// An RWCS transfer in progress
struct Access {
    write: bool,
    size: AccessSize,
    map: u32,
    addr: Address,
    remaining: u64,
}

impl Access {
    // Step past the unit just transferred.  False if more units remain but the address
    // space has run out.
    fn advance(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        match self.addr.checked_add(self.size.bytes() as u64) {
            Some(next) => {
                self.addr = next;
                true
            }
            None => self.remaining == 0,
        }
    }
}

#[derive(Clone, Copy)]
enum Activity {
    Fetch(Address),
    Data { addr: Address, value: u64, write: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bank {
    Breakpoints,
    Watchpoints,
}

#[derive(Default)]
struct Trace {
    btm: bool,
    dtm: bool,
    otm: bool,
    subst: bool,
}

pub(crate) struct NexusClient {
    config: SimConfig,
    nrr: [u64; NRR_COUNT],
    memory: Vec<Memory>,
    core: Registers,
    halted: bool,
    reset_seen: bool,
    access: Option<Access>,
    // ERR and DV
    status: u64,
    read_data: u64,
    countdown: [Vec<u64>; 2],
    trace: Trace,
    queue: VecDeque<ReceivedEvent>,
    lost: u64,
}

impl NexusClient {
    pub fn new(config: SimConfig) -> Self {
        let memory = config
            .regions
            .iter()
            .map(|region| Memory { region: *region, bytes: vec![0; region.size] })
            .collect();
        let countdown = [
            vec![0; config.register_map.breakpoints.slots],
            vec![0; config.register_map.watchpoints.slots],
        ];
        Self {
            config,
            nrr: [0; NRR_COUNT],
            memory,
            core: Registers::default(),
            halted: false,
            reset_seen: false,
            access: None,
            status: 0,
            read_data: 0,
            countdown,
            trace: Trace::default(),
            queue: VecDeque::new(),
            lost: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn check_width(&self, index: NrrIndex, bits: usize) -> Result<()> {
        let width = self.config.width_of(index);
        if bits != width {
            return Err(Error::failed(format!(
                "NRR {:#04x} is {} bits wide, access was {} bits",
                index.get(),
                width,
                bits
            )));
        }
        Ok(())
    }

    fn get(&self, index: NrrIndex) -> u64 {
        self.nrr[index.get() as usize]
    }

    fn set(&mut self, index: NrrIndex, value: u64) {
        self.nrr[index.get() as usize] = value;
    }

    pub fn write_nrr(&mut self, index: NrrIndex, bits: usize, data: &[u8]) -> Result<()> {
        self.check_width(index, bits)?;
        let value = from_bytes(data, bits);
        log::trace!("sim nrr {:#04x} <- {:#x}", index.get(), value);
        if self.config.plain {
            self.set(index, value);
            return Ok(());
        }

        let map = self.config.register_map.clone();
        if index == map.did.index || index == map.ds.index {
            log::debug!("sim: write to read-only NRR {:#04x} ignored", index.get());
        } else if index == map.dc1.index {
            self.write_dc1(value);
        } else if index == map.rwcs.index {
            self.start_access(value);
        } else if index == map.rwd.index {
            self.write_rwd(value);
        } else if index == map.wt.index {
            self.write_wt(value);
        } else if index == map.dtc.index {
            let old = self.get(index);
            self.set(index, value);
            if value & dtc::ENABLE == 0 {
                self.trace.dtm = false;
            } else if old & dtc::ENABLE == 0 {
                self.trace.dtm = wt::field(self.get(map.wt.index), wt::DTM_START) == 0;
            }
        } else if index == map.otr.index {
            self.set(index, value);
            self.ownership(value);
        } else if index == map.reg_data.index {
            let n = self.get(map.reg_sel.index) as usize;
            if !self.core.set_raw(n, value) {
                log::debug!("sim: no core register {}", n);
            }
        } else {
            self.set(index, value);
            for (bank, slots) in [(Bank::Breakpoints, map.breakpoints), (Bank::Watchpoints, map.watchpoints)] {
                if let Some((slot, 0)) = slots.locate(index) {
                    self.countdown[bank as usize][slot] = (value >> comparator::COUNT_SHIFT) & comparator::COUNT_MAX;
                }
            }
        }
        Ok(())
    }

    pub fn read_nrr(&mut self, index: NrrIndex, bits: usize) -> Result<Vec<u8>> {
        self.check_width(index, bits)?;
        let map = self.config.register_map.clone();
        let value = if self.config.plain {
            self.get(index)
        } else if index == map.did.index {
            self.config.device_id as u64
        } else if index == map.ds.index {
            let mut value = 0;
            if self.halted {
                value |= ds::HALTED;
            }
            if core::mem::take(&mut self.reset_seen) {
                value |= ds::RESET;
            }
            value
        } else if index == map.rwcs.index {
            let control = self.get(index) & !(rwcs::COUNT_MAX << rwcs::COUNT_SHIFT | rwcs::ERR | rwcs::DV);
            let remaining = self.access.as_ref().map_or(0, |a| a.remaining);
            control | remaining << rwcs::COUNT_SHIFT | self.status
        } else if index == map.rwd.index {
            self.read_rwd()
        } else if index == map.reg_data.index {
            self.core.raw(self.get(map.reg_sel.index) as usize).unwrap_or(0)
        } else {
            self.get(index)
        };
        log::trace!("sim nrr {:#04x} -> {:#x}", index.get(), value);
        Ok(to_bytes(value, bits))
    }

    /// Contents of register `index` as last written.
    pub fn stored(&self, index: NrrIndex) -> u64 {
        self.get(index)
    }

    fn dc1(&self) -> u64 {
        self.get(self.config.register_map.dc1.index)
    }

    fn wt(&self) -> u64 {
        self.get(self.config.register_map.wt.index)
    }

    fn write_dc1(&mut self, value: u64) {
        let old = self.dc1();
        self.set(self.config.register_map.dc1.index, value & !dc1::PULSES);
        let rising = |bit: u64| value & bit != 0 && old & bit == 0;

        if value & dc1::RESET_REQ != 0 {
            self.reset();
        }
        if value & dc1::HALT_REQ != 0 {
            self.halt();
        }
        if value & dc1::RESUME != 0 && self.halted {
            log::debug!("sim: core resumed");
            self.halted = false;
        }
        if rising(dc1::EVTI) && value & dc1::CLIENT_BREAK != 0 {
            self.halt();
        }

        let triggers = self.wt();
        if value & dc1::BTM_ENABLE == 0 {
            self.trace.btm = false;
        } else if rising(dc1::BTM_ENABLE) {
            self.trace.btm = wt::field(triggers, wt::BTM_START) == 0;
        }
        if value & dc1::OTM_ENABLE == 0 {
            self.trace.otm = false;
        } else if rising(dc1::OTM_ENABLE) {
            self.trace.otm = wt::field(triggers, wt::OTM_START) == 0;
        }
    }

    fn write_wt(&mut self, value: u64) {
        let old = self.wt();
        self.set(self.config.register_map.wt.index, value);
        let changed = |field| wt::field(old, field) != wt::field(value, field);

        if changed(wt::BTM_START) {
            self.trace.btm = self.dc1() & dc1::BTM_ENABLE != 0 && wt::field(value, wt::BTM_START) == 0;
        }
        if changed(wt::DTM_START) {
            let enabled = self.get(self.config.register_map.dtc.index) & dtc::ENABLE != 0;
            self.trace.dtm = enabled && wt::field(value, wt::DTM_START) == 0;
        }
        if changed(wt::OTM_START) {
            self.trace.otm = self.dc1() & dc1::OTM_ENABLE != 0 && wt::field(value, wt::OTM_START) == 0;
        }
        if changed(wt::SUBST_START) {
            self.trace.subst = false;
        }
    }

    fn reset(&mut self) {
        log::debug!("sim: core reset");
        self.core = Registers::default();
        self.halted = false;
        self.reset_seen = true;
        self.access = None;
        self.status = 0;
    }

    fn halt(&mut self) {
        if self.halted {
            return;
        }
        log::debug!("sim: core halted");
        self.halted = true;
        self.queue.push_back(ReceivedEvent::BreakStep(Box::new(self.core.clone())));
    }

    fn start_access(&mut self, value: u64) {
        self.set(self.config.register_map.rwcs.index, value);
        self.access = None;
        self.status = 0;
        if value & rwcs::START == 0 {
            return;
        }
        let Some(size) = AccessSize::from_code(rwcs::size(value)) else {
            self.status = rwcs::ERR;
            return;
        };
        let access = Access {
            write: value & rwcs::WRITE != 0,
            size,
            map: rwcs::map(value) as u32,
            addr: self.get(self.config.register_map.rwa.index),
            remaining: rwcs::count(value),
        };
        log::trace!("sim: {} units of {:?} at {:#x}", access.remaining, size, access.addr);
        let read = !access.write;
        self.access = Some(access);
        if read {
            self.prefetch();
        }
    }

    fn prefetch(&mut self) {
        let Some(access) = &self.access else { return };
        if access.remaining == 0 {
            self.access = None;
            return;
        }
        match self.read_unit(access.map, access.addr, access.size) {
            Some(value) => {
                self.read_data = value;
                self.status |= rwcs::DV;
            }
            None => {
                self.status |= rwcs::ERR;
                self.access = None;
            }
        }
    }

    fn read_rwd(&mut self) -> u64 {
        if self.status & rwcs::DV == 0 {
            return self.get(self.config.register_map.rwd.index);
        }
        self.status &= !rwcs::DV;
        let value = self.read_data;
        let advanced = self.access.as_mut().map_or(true, Access::advance);
        if advanced {
            self.prefetch();
        } else {
            self.status |= rwcs::ERR;
            self.access = None;
        }
        value
    }

    fn write_rwd(&mut self, value: u64) {
        self.set(self.config.register_map.rwd.index, value);
        let Some(access) = &self.access else { return };
        if !access.write || access.remaining == 0 {
            return;
        }
        let (map, addr, size) = (access.map, access.addr, access.size);
        let written = self.write_unit(map, addr, size, value);
        if !written || !self.access.as_mut().map_or(true, Access::advance) {
            self.status |= rwcs::ERR;
            self.access = None;
        }
    }

    fn memory(&self, map: u32, addr: Address, len: usize) -> Option<&[u8]> {
        self.memory
            .iter()
            .find_map(|m| m.range(map, addr, len).map(|r| &m.bytes[r]))
    }

    fn memory_mut(&mut self, map: u32, addr: Address, len: usize) -> Option<&mut [u8]> {
        for m in &mut self.memory {
            if let Some(r) = m.range(map, addr, len) {
                return Some(&mut m.bytes[r]);
            }
        }
        None
    }

    fn read_unit(&self, map: u32, addr: Address, size: AccessSize) -> Option<u64> {
        let bytes = self.memory(map, addr, size.bytes())?;
        self.config.capability.target_endian.word_from_bytes(bytes)
    }

    fn write_unit(&mut self, map: u32, addr: Address, size: AccessSize, value: u64) -> bool {
        let Some(bytes) = self.config.capability.target_endian.word_to_bytes(value, size.bytes()) else {
            return false;
        };
        match self.memory_mut(map, addr, size.bytes()) {
            Some(dest) => {
                dest.copy_from_slice(&bytes);
                true
            }
            None => false,
        }
    }

    pub fn poke(&mut self, map: u32, addr: Address, data: &[u8]) -> bool {
        match self.memory_mut(map, addr, data.len()) {
            Some(dest) => {
                dest.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    pub fn peek(&self, map: u32, addr: Address, len: usize) -> Option<Vec<u8>> {
        self.memory(map, addr, len).map(<[u8]>::to_vec)
    }

    fn source(&self) -> u64 {
        self.get(self.config.register_map.csc.index) & ((1 << SRC_BITS) - 1)
    }

    fn message(&self, tcode: Tcode) -> MessageBuilder {
        Message::builder(tcode).packet(self.source(), SRC_BITS)
    }

    fn full(&self) -> bool {
        self.queue.len() >= self.config.queue_depth
    }

    // With an overrun delay set, a full queue holds the core back instead of losing
    // messages.
    fn stalled(&self) -> bool {
        let delay = (self.dc1() & dc1::OVERRUN_MASK) >> dc1::OVERRUN_SHIFT;
        delay != 0 && self.full()
    }

    // A stalled core still finishes the access it was making, so the queue can run a
    // few messages past its depth.
    fn push_message(&mut self, message: Message) {
        if self.full() && !self.stalled() {
            self.lost += 1;
            log::trace!("sim: message queue full, {} lost", self.lost);
            return;
        }
        self.queue.push_back(ReceivedEvent::Message(message));
    }

    pub fn raise(&mut self, event: ReceivedEvent) {
        if self.full() {
            self.lost += 1;
            log::trace!("sim: queue full, raised {:?} event lost", event.tag());
            return;
        }
        self.queue.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<ReceivedEvent> {
        let event = self.queue.pop_front()?;
        if self.lost > 0 {
            let lost = core::mem::take(&mut self.lost).min(0xff);
            let report = self.message(Tcode::Error).packet(ECODE_OVERRUN, ECODE_BITS).packet(lost, 8).build();
            self.queue.push_back(ReceivedEvent::Message(report));
        }
        Some(event)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn bank(&self, bank: Bank) -> ComparatorBank {
        match bank {
            Bank::Breakpoints => self.config.register_map.breakpoints,
            Bank::Watchpoints => self.config.register_map.watchpoints,
        }
    }

    fn eid(&self, bank: Bank, slot: usize) -> Option<EventId> {
        let range = match bank {
            Bank::Breakpoints => self.config.capability.breakpoint,
            Bank::Watchpoints => self.config.capability.watch,
        };
        range.eid(slot)
    }

    fn matches(&self, bank: ComparatorBank, slot: usize, activity: Activity) -> Option<u64> {
        let reg = |r: Option<crate::nrr::Reg>| r.map_or(0, |r| self.get(r.index));
        let ctrl = reg(bank.ctrl(slot));
        if ctrl & comparator::ENABLE == 0 {
            return None;
        }
        let op = Operand::from_code((ctrl >> comparator::OPERAND_SHIFT) & 0x3)?;
        let rw = RwMode::from_code((ctrl >> comparator::RW_SHIFT) & 0x3)?;
        let (addr, data, mask) = (reg(bank.addr(slot)), reg(bank.data(slot)), reg(bank.mask(slot)));
        let value_matches = |value: u64| (value ^ data) & !mask == 0;

        let hit = match (activity, op) {
            (Activity::Fetch(pc), Operand::InstrAddr) => pc == addr,
            (Activity::Data { addr: a, value, write }, op) if rw.matches(write) => match op {
                Operand::DataAddr => a == addr,
                Operand::DataValue => value_matches(value),
                Operand::DataAddrAndValue => a == addr && value_matches(value),
                Operand::InstrAddr => false,
            },
            _ => false,
        };
        hit.then_some(ctrl)
    }

    // Runs every comparator against `activity`.  Returns true if a breakpoint stopped the core.
    fn observe(&mut self, activity: Activity) -> bool {
        let mut stopped = false;
        for bank in [Bank::Breakpoints, Bank::Watchpoints] {
            let comparators = self.bank(bank);
            for slot in 0..comparators.slots {
                let Some(ctrl) = self.matches(comparators, slot, activity) else { continue };
                let count = &mut self.countdown[bank as usize][slot];
                if *count > 0 {
                    *count -= 1;
                    continue;
                }
                let eid = self.eid(bank, slot).unwrap_or(0);
                log::debug!("sim: {:?} slot {} (event {}) hit", bank, slot, eid);
                match bank {
                    Bank::Breakpoints => {
                        self.halt();
                        stopped = true;
                    }
                    Bank::Watchpoints => {
                        let msg = self.message(Tcode::Watchpoint).packet(eid as u64, 8).build();
                        self.push_message(msg);
                    }
                }
                if ctrl & comparator::EVTO != 0 {
                    self.raise(ReceivedEvent::InputPin { level: true });
                }
                self.trigger(eid);
            }
        }
        stopped
    }

    // A breakpoint or watchpoint fired: start or stop whatever names it in WT.
    fn trigger(&mut self, eid: EventId) {
        if eid == 0 {
            return;
        }
        let triggers = self.wt();
        let control = self.dc1();
        let data_control = self.get(self.config.register_map.dtc.index);
        let units = [
            (&mut self.trace.btm, control & dc1::BTM_ENABLE != 0, wt::BTM_START, wt::BTM_END),
            (&mut self.trace.dtm, data_control & dtc::ENABLE != 0, wt::DTM_START, wt::DTM_END),
            (&mut self.trace.otm, control & dc1::OTM_ENABLE != 0, wt::OTM_START, wt::OTM_END),
        ];
        for (running, enabled, start, end) in units {
            if enabled && wt::field(triggers, start) == eid {
                *running = true;
            }
            if wt::field(triggers, end) == eid {
                *running = false;
            }
        }
        if wt::field(triggers, wt::SUBST_START) == eid {
            self.trace.subst = true;
        }
    }

    fn data_trace(&mut self, addr: Address, size: AccessSize, value: u64, write: bool) {
        if !self.trace.dtm {
            return;
        }
        let map = &self.config.register_map;
        let control = self.get(map.dtc.index);
        let (start, end) = (self.get(map.dtsa.index), self.get(map.dtea.index));
        let mode = RwMode::from_code((control >> dtc::RW_SHIFT) & 0x3).unwrap_or_default();
        if addr < start || addr >= end || !mode.matches(write) {
            return;
        }
        let tcode = if write { Tcode::DataWrite } else { Tcode::DataRead };
        let msg = self
            .message(tcode)
            .packet(size.code(), 3)
            .packet(addr, ADDR_BITS)
            .packet(value, size.bytes() * 8)
            .build();
        self.push_message(msg);
    }

    fn ownership(&mut self, process: u64) {
        if self.trace.otm {
            let msg = self.message(Tcode::Ownership).packet(process, 32).build();
            self.push_message(msg);
        }
    }

    pub fn execute(&mut self, pc: Address) -> bool {
        if self.halted || self.stalled() || self.observe(Activity::Fetch(pc)) {
            return false;
        }
        if self.dc1() & dc1::STEP != 0 {
            self.halt();
        }
        true
    }

    pub fn branch(&mut self, target: Address) -> bool {
        if self.halted || self.stalled() {
            return false;
        }
        if self.trace.btm {
            let msg = self.message(Tcode::IndirectBranch).packet(target, ADDR_BITS).build();
            self.push_message(msg);
        }
        true
    }

    pub fn load(&mut self, addr: Address, size: AccessSize) -> Option<u64> {
        if self.halted || self.stalled() {
            return None;
        }
        let value = self.read_unit(0, addr, size)?;
        self.observe(Activity::Data { addr, value, write: false });
        self.data_trace(addr, size, value, false);
        Some(value)
    }

    pub fn store(&mut self, addr: Address, size: AccessSize, value: u64) -> bool {
        if self.halted || self.stalled() || !self.write_unit(0, addr, size, value) {
            return false;
        }
        self.observe(Activity::Data { addr, value, write: true });
        self.data_trace(addr, size, value, true);
        true
    }

    pub fn set_owner(&mut self, process: u32) -> bool {
        if self.stalled() {
            return false;
        }
        self.set(self.config.register_map.otr.index, process as u64);
        self.ownership(process as u64);
        true
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn registers(&self) -> &Registers {
        &self.core
    }

    pub fn set_registers(&mut self, regs: Registers) {
        self.core = regs;
    }

    pub fn substituting(&self) -> bool {
        self.trace.subst && self.dc1() & (dc1::SUBST_INSTR | dc1::SUBST_DATA) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> NexusClient {
        NexusClient::new(SimConfig::default())
    }

    fn write(c: &mut NexusClient, index: NrrIndex, bits: usize, value: u64) {
        c.write_nrr(index, bits, &to_bytes(value, bits)).unwrap();
    }

    fn read(c: &mut NexusClient, index: NrrIndex, bits: usize) -> u64 {
        from_bytes(&c.read_nrr(index, bits).unwrap(), bits)
    }

    #[test]
    fn width_must_match() {
        let mut c = client();
        let dc1 = c.config().register_map.dc1;
        assert!(c.write_nrr(dc1.index, 8, &[0]).is_err());
        assert!(c.read_nrr(dc1.index, dc1.bits).is_ok());
    }

    #[test]
    fn read_access_prefetches_each_unit() {
        let mut c = client();
        let map = c.config().register_map.clone();
        assert!(c.poke(0, 0x100, &[0x11, 0x22, 0x33, 0x44]));
        write(&mut c, map.rwa.index, map.rwa.bits, 0x100);
        write(&mut c, map.rwcs.index, map.rwcs.bits, rwcs::start(false, 1, 0, 0, 2));

        let status = read(&mut c, map.rwcs.index, map.rwcs.bits);
        assert!(status & rwcs::DV != 0);
        assert_eq!(rwcs::count(status), 2);
        assert_eq!(read(&mut c, map.rwd.index, map.rwd.bits), 0x2211);
        assert_eq!(read(&mut c, map.rwd.index, map.rwd.bits), 0x4433);
        assert_eq!(read(&mut c, map.rwcs.index, map.rwcs.bits) & rwcs::DV, 0);
    }

    #[test]
    fn unmapped_write_sets_err() {
        let mut c = client();
        let map = c.config().register_map.clone();
        write(&mut c, map.rwa.index, map.rwa.bits, 0x1_0000);
        write(&mut c, map.rwcs.index, map.rwcs.bits, rwcs::start(true, 0, 0, 0, 1));
        write(&mut c, map.rwd.index, map.rwd.bits, 0xaa);
        assert!(read(&mut c, map.rwcs.index, map.rwcs.bits) & rwcs::ERR != 0);
    }

    #[test]
    fn halt_is_reported_once() {
        let mut c = client();
        let map = c.config().register_map.clone();
        write(&mut c, map.dc1.index, map.dc1.bits, dc1::HALT_REQ);
        write(&mut c, map.dc1.index, map.dc1.bits, dc1::HALT_REQ);
        assert!(c.is_halted());
        assert_eq!(c.pending(), 1);
        assert_eq!(read(&mut c, map.ds.index, map.ds.bits), ds::HALTED);
        // request bits never stick
        assert_eq!(c.stored(map.dc1.index), 0);
        assert!(!c.execute(0x40));
    }

    #[test]
    fn reset_shows_once_in_ds() {
        let mut c = client();
        let map = c.config().register_map.clone();
        write(&mut c, map.dc1.index, map.dc1.bits, dc1::RESET_REQ);
        assert_eq!(read(&mut c, map.ds.index, map.ds.bits), ds::RESET);
        assert_eq!(read(&mut c, map.ds.index, map.ds.bits), 0);
    }

    #[test]
    fn breakpoint_counts_down_before_firing() {
        let mut c = client();
        let bank = c.config().register_map.breakpoints;
        let (ctrl, addr) = (bank.ctrl(0).unwrap(), bank.addr(0).unwrap());
        write(&mut c, addr.index, addr.bits, 0x80);
        let value = comparator::ENABLE | Operand::InstrAddr.code() << comparator::OPERAND_SHIFT | 2 << comparator::COUNT_SHIFT;
        write(&mut c, ctrl.index, ctrl.bits, value);

        assert!(c.execute(0x80));
        assert!(c.execute(0x80));
        assert!(c.execute(0x7c));
        assert!(!c.execute(0x80));
        assert!(c.is_halted());
    }

    #[test]
    fn full_queue_reports_lost_messages() {
        let mut c = NexusClient::new(SimConfig { queue_depth: 1, ..SimConfig::default() });
        let map = c.config().register_map.clone();
        write(&mut c, map.otr.index, map.otr.bits, 0);
        write(&mut c, map.dc1.index, map.dc1.bits, dc1::OTM_ENABLE);
        c.set_owner(1);
        c.set_owner(2);
        c.set_owner(3);
        assert_eq!(c.pending(), 1);

        let first = c.pop_event().unwrap();
        assert_eq!(first.message().and_then(Message::tcode), Some(Tcode::Ownership as u8));
        let report = c.pop_event().unwrap();
        let packets = report.message().unwrap().packets();
        assert_eq!(packets[0].value(), Some(Tcode::Error as u64));
        assert_eq!(packets[2].value(), Some(ECODE_OVERRUN));
        assert_eq!(packets[3].value(), Some(2));
        assert!(c.pop_event().is_none());
    }

    #[test]
    fn overrun_delay_stalls_the_core() {
        let mut c = NexusClient::new(SimConfig { queue_depth: 2, ..SimConfig::default() });
        let map = c.config().register_map.clone();
        write(&mut c, map.otr.index, map.otr.bits, 0);
        write(&mut c, map.dc1.index, map.dc1.bits, dc1::OTM_ENABLE | 4 << dc1::OVERRUN_SHIFT);
        assert!(c.set_owner(1));
        assert!(c.set_owner(2));
        assert!(!c.set_owner(3));
        assert!(!c.execute(0x10));
        assert!(!c.store(0x10, AccessSize::Byte, 1));
        assert_eq!(c.pending(), 2);

        c.pop_event();
        assert!(c.set_owner(3));
        assert_eq!(c.pending(), 2);
    }

    #[test]
    fn raised_events_respect_the_depth() {
        let mut c = NexusClient::new(SimConfig { queue_depth: 1, ..SimConfig::default() });
        c.raise(ReceivedEvent::InputPin { level: true });
        c.raise(ReceivedEvent::InputPin { level: false });
        assert_eq!(c.pending(), 1);
        assert_eq!(c.pop_event(), Some(ReceivedEvent::InputPin { level: true }));
        let report = c.pop_event().unwrap();
        assert_eq!(report.message().and_then(Message::tcode), Some(Tcode::Error as u8));
    }

    #[test]
    fn access_may_end_at_the_top_of_memory() {
        let config = SimConfig { regions: vec![Region::new(0, u64::MAX - 7, 8)], ..SimConfig::default() };
        let mut c = NexusClient::new(config);
        let map = c.config().register_map.clone();
        write(&mut c, map.rwa.index, map.rwa.bits, u64::MAX - 7);
        write(&mut c, map.rwcs.index, map.rwcs.bits, rwcs::start(true, 2, 0, 0, 2));
        write(&mut c, map.rwd.index, map.rwd.bits, 0x1111_1111);
        write(&mut c, map.rwd.index, map.rwd.bits, 0x2222_2222);
        assert_eq!(read(&mut c, map.rwcs.index, map.rwcs.bits) & rwcs::ERR, 0);

        write(&mut c, map.rwa.index, map.rwa.bits, u64::MAX - 7);
        write(&mut c, map.rwcs.index, map.rwcs.bits, rwcs::start(false, 2, 0, 0, 2));
        assert_eq!(read(&mut c, map.rwd.index, map.rwd.bits), 0x1111_1111);
        assert_eq!(read(&mut c, map.rwd.index, map.rwd.bits), 0x2222_2222);
        assert_eq!(read(&mut c, map.rwcs.index, map.rwcs.bits) & rwcs::ERR, 0);
    }

    #[test]
    fn access_past_the_top_of_memory_fails() {
        let config = SimConfig { regions: vec![Region::new(0, u64::MAX - 3, 4)], ..SimConfig::default() };
        let mut c = NexusClient::new(config);
        let map = c.config().register_map.clone();
        write(&mut c, map.rwa.index, map.rwa.bits, u64::MAX - 3);
        write(&mut c, map.rwcs.index, map.rwcs.bits, rwcs::start(false, 2, 0, 0, 2));
        read(&mut c, map.rwd.index, map.rwd.bits);
        assert!(read(&mut c, map.rwcs.index, map.rwcs.bits) & rwcs::ERR != 0);
    }

    #[test]
    fn plain_mode_is_storage() {
        let mut c = NexusClient::new(SimConfig::register_file());
        let ds = c.config().register_map.ds;
        write(&mut c, ds.index, ds.bits, 0xdead_beef);
        assert_eq!(read(&mut c, ds.index, ds.bits), 0xdead_beef);
    }
}
