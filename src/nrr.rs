//! Nexus-addressable JTAG registers (NRRs).
//!
//! A Nexus client exposes up to 128 registers, each selected by a 7-bit index and each
//! up to a vendor defined number of bits wide.  Register contents travel as
//! `ceil(bits/8)` bytes, least significant bit first, which is the order they are
//! shifted through TDI/TDO.
//!
//! `RegisterMap` says where the TAL finds the registers it drives.  The default is the
//! layout used by the simulated target; a vendor replaces it through
//! `TargetSpec.vendor.register_map`.  The field layouts inside those registers are in
//! the submodules below.
use alloc::vec::Vec;

pub const NRR_COUNT: usize = 128;

/// Index of a Nexus register, 0 through 127.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NrrIndex(u8);

impl NrrIndex {
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < NRR_COUNT {
            Some(NrrIndex(index))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = NrrIndex> {
        (0..NRR_COUNT as u8).map(NrrIndex)
    }

    // Only for indices known to be in range at compile time.
    const fn at(index: u8) -> Self {
        assert!((index as usize) < NRR_COUNT);
        NrrIndex(index)
    }
}

impl TryFrom<usize> for NrrIndex {
    type Error = usize;

    fn try_from(index: usize) -> Result<Self, usize> {
        if index < NRR_COUNT {
            Ok(NrrIndex(index as u8))
        } else {
            Err(index)
        }
    }
}

pub const fn byte_len(bits: usize) -> usize {
    (bits + 7) / 8
}

/// Clear the bits of the last byte that lie beyond `bits`.
pub fn mask_tail(data: &mut [u8], bits: usize) {
    let rem = bits % 8;
    if rem != 0 {
        if let Some(last) = data.get_mut(byte_len(bits) - 1) {
            *last &= (1 << rem) - 1;
        }
    }
}

/// Pack the low `bits` of `value` into `ceil(bits/8)` bytes.
pub fn to_bytes(value: u64, bits: usize) -> Vec<u8> {
    let mut out: Vec<u8> = (0..byte_len(bits))
        .map(|i| if i < 8 { (value >> (8 * i)) as u8 } else { 0 })
        .collect();
    mask_tail(&mut out, bits);
    out
}

/// Unpack up to 64 bits from `data`.  Bits past `bits` are ignored.
pub fn from_bytes(data: &[u8], bits: usize) -> u64 {
    let mut value = 0u64;
    for (i, b) in data.iter().take(byte_len(bits.min(64))).enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    if bits < 64 {
        value &= (1u64 << bits) - 1;
    }
    value
}

/// A register the TAL drives: where it is and how wide it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg {
    pub index: NrrIndex,
    pub bits: usize,
}

impl Reg {
    pub const fn new(index: u8, bits: usize) -> Self {
        Reg { index: NrrIndex::at(index), bits }
    }
}

/// A bank of address/data comparators.  Each slot takes four consecutive registers:
/// control, address, data and mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComparatorBank {
    pub base: u8,
    pub slots: usize,
}

impl ComparatorBank {
    fn reg(&self, slot: usize, offset: usize, bits: usize) -> Option<Reg> {
        if slot >= self.slots {
            return None;
        }
        let index = self.base as usize + slot * 4 + offset;
        NrrIndex::try_from(index).ok().map(|index| Reg { index, bits })
    }

    pub fn ctrl(&self, slot: usize) -> Option<Reg> {
        self.reg(slot, 0, 16)
    }

    pub fn addr(&self, slot: usize) -> Option<Reg> {
        self.reg(slot, 1, 64)
    }

    pub fn data(&self, slot: usize) -> Option<Reg> {
        self.reg(slot, 2, 64)
    }

    pub fn mask(&self, slot: usize) -> Option<Reg> {
        self.reg(slot, 3, 64)
    }

    /// Which slot, if any, `index` belongs to, and the register's offset in the slot.
    pub fn locate(&self, index: NrrIndex) -> Option<(usize, usize)> {
        let index = index.get() as usize;
        let base = self.base as usize;
        if index < base || index >= base + self.slots * 4 {
            return None;
        }
        Some(((index - base) / 4, (index - base) % 4))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterMap {
    /// Device ID
    pub did: Reg,
    /// Client select control
    pub csc: Reg,
    /// Development control
    pub dc1: Reg,
    /// Development status
    pub ds: Reg,
    /// Read/write access control and status
    pub rwcs: Reg,
    /// Read/write access address
    pub rwa: Reg,
    /// Read/write access data
    pub rwd: Reg,
    /// Watchpoint trigger
    pub wt: Reg,
    /// Data trace control
    pub dtc: Reg,
    /// Data trace start address
    pub dtsa: Reg,
    /// Data trace end address
    pub dtea: Reg,
    /// Ownership trace
    pub otr: Reg,
    /// Register window select
    pub reg_sel: Reg,
    /// Register window data
    pub reg_data: Reg,
    pub breakpoints: ComparatorBank,
    pub watchpoints: ComparatorBank,
    pub led: Option<Reg>,
    pub trace_buffer: Option<Reg>,
    pub perf_count: Option<Reg>,
    pub watchdog: Option<Reg>,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            did: Reg::new(0x00, 32),
            csc: Reg::new(0x01, 4),
            dc1: Reg::new(0x02, 32),
            ds: Reg::new(0x04, 32),
            rwcs: Reg::new(0x07, 32),
            rwa: Reg::new(0x09, 64),
            rwd: Reg::new(0x0a, 64),
            wt: Reg::new(0x0b, 64),
            dtc: Reg::new(0x0d, 32),
            dtsa: Reg::new(0x0e, 64),
            dtea: Reg::new(0x0f, 64),
            otr: Reg::new(0x10, 32),
            reg_sel: Reg::new(0x11, 8),
            reg_data: Reg::new(0x12, 64),
            breakpoints: ComparatorBank { base: 0x40, slots: 8 },
            watchpoints: ComparatorBank { base: 0x60, slots: 8 },
            led: Some(Reg::new(0x20, 16)),
            trace_buffer: Some(Reg::new(0x21, 32)),
            perf_count: Some(Reg::new(0x22, 32)),
            watchdog: Some(Reg::new(0x23, 32)),
        }
    }
}

impl RegisterMap {
    /// Every register in the map, comparator banks included.
    pub fn registers(&self) -> Vec<Reg> {
        let mut regs = alloc::vec![
            self.did, self.csc, self.dc1, self.ds, self.rwcs, self.rwa, self.rwd, self.wt,
            self.dtc, self.dtsa, self.dtea, self.otr, self.reg_sel, self.reg_data,
        ];
        regs.extend([self.led, self.trace_buffer, self.perf_count, self.watchdog].into_iter().flatten());
        for bank in [self.breakpoints, self.watchpoints] {
            for slot in 0..bank.slots {
                regs.extend([bank.ctrl(slot), bank.addr(slot), bank.data(slot), bank.mask(slot)].into_iter().flatten());
            }
        }
        regs
    }

    pub fn width_of(&self, index: NrrIndex) -> Option<usize> {
        self.registers().into_iter().find(|r| r.index == index).map(|r| r.bits)
    }
}

/// Development control register fields
pub mod dc1 {
    pub const BTM_ENABLE: u64 = 1 << 2;
    pub const OTM_ENABLE: u64 = 1 << 3;
    pub const OVERRUN_SHIFT: u32 = 8;
    pub const OVERRUN_MASK: u64 = 0xff << OVERRUN_SHIFT;
    pub const SUBST_INSTR: u64 = 1 << 16;
    pub const SUBST_DATA: u64 = 1 << 17;
    pub const CLIENT_BREAK: u64 = 1 << 18;
    pub const EVTI: u64 = 1 << 19;
    pub const RESET_REQ: u64 = 1 << 20;
    pub const HALT_REQ: u64 = 1 << 21;
    pub const RESUME: u64 = 1 << 22;
    pub const STEP: u64 = 1 << 23;
    /// Request bits that act once and never read back as set.
    pub const PULSES: u64 = RESET_REQ | HALT_REQ | RESUME;
}

/// Development status register fields
pub mod ds {
    pub const HALTED: u64 = 1 << 0;
    pub const RESET: u64 = 1 << 1;
}

/// Read/write access control/status fields
pub mod rwcs {
    pub const START: u64 = 1 << 31;
    pub const WRITE: u64 = 1 << 30;
    pub const SIZE_SHIFT: u32 = 27;
    pub const MAP_SHIFT: u32 = 24;
    pub const PRIORITY_SHIFT: u32 = 22;
    pub const COUNT_SHIFT: u32 = 2;
    pub const COUNT_MAX: u64 = 0x3fff;
    pub const ERR: u64 = 1 << 1;
    /// Read data valid in RWD
    pub const DV: u64 = 1 << 0;

    /// Build a control word starting an access of `count` units.  `size` is the size
    /// code (0 = byte .. 3 = double word).
    pub fn start(write: bool, size: u64, map: u64, priority: u64, count: u64) -> u64 {
        let mut value = START
            | (size & 0x7) << SIZE_SHIFT
            | (map & 0x7) << MAP_SHIFT
            | (priority & 0x3) << PRIORITY_SHIFT
            | (count & COUNT_MAX) << COUNT_SHIFT;
        if write {
            value |= WRITE;
        }
        value
    }

    pub fn size(value: u64) -> u64 {
        (value >> SIZE_SHIFT) & 0x7
    }

    pub fn map(value: u64) -> u64 {
        (value >> MAP_SHIFT) & 0x7
    }

    pub fn count(value: u64) -> u64 {
        (value >> COUNT_SHIFT) & COUNT_MAX
    }
}

/// Comparator control fields, shared by breakpoint and watchpoint slots
pub mod comparator {
    pub const ENABLE: u64 = 1;
    pub const RW_SHIFT: u32 = 1;
    pub const OPERAND_SHIFT: u32 = 3;
    pub const EVTO: u64 = 1 << 5;
    pub const COUNT_SHIFT: u32 = 8;
    pub const COUNT_MAX: u64 = 0xff;
}

/// Watchpoint trigger register: one 8-bit event ID per field
pub mod wt {
    pub const BTM_START: u32 = 0;
    pub const BTM_END: u32 = 8;
    pub const DTM_START: u32 = 16;
    pub const DTM_END: u32 = 24;
    pub const OTM_START: u32 = 32;
    pub const OTM_END: u32 = 40;
    pub const SUBST_START: u32 = 48;

    pub fn field(value: u64, shift: u32) -> u32 {
        ((value >> shift) & 0xff) as u32
    }

    pub fn set_field(value: u64, shift: u32, eid: u32) -> u64 {
        (value & !(0xff << shift)) | ((eid as u64 & 0xff) << shift)
    }
}

/// Data trace control fields
pub mod dtc {
    pub const ENABLE: u64 = 1;
    pub const RW_SHIFT: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn index_is_seven_bits() {
        assert_eq!(NrrIndex::new(127).map(NrrIndex::get), Some(127));
        assert_eq!(NrrIndex::new(128), None);
        assert_eq!(NrrIndex::try_from(200usize), Err(200));
        assert_eq!(NrrIndex::all().count(), NRR_COUNT);
    }

    #[test]
    fn values_pack_lsb_first() {
        assert_eq!(to_bytes(0x1ff, 9), vec![0xff, 0x01]);
        assert_eq!(to_bytes(0xffff, 12), vec![0xff, 0x0f]);
        assert_eq!(from_bytes(&[0x34, 0x12], 16), 0x1234);
        assert_eq!(from_bytes(&[0xff, 0xff], 10), 0x3ff);
        assert_eq!(to_bytes(u64::MAX, 72).len(), 9);
    }

    #[test]
    fn tail_mask_leaves_whole_bytes_alone() {
        let mut data = vec![0xff, 0xff];
        mask_tail(&mut data, 16);
        assert_eq!(data, vec![0xff, 0xff]);
        mask_tail(&mut data, 11);
        assert_eq!(data, vec![0xff, 0x07]);
    }

    #[test]
    fn default_map_has_no_collisions() {
        let regs = RegisterMap::default().registers();
        for (i, a) in regs.iter().enumerate() {
            for b in &regs[i + 1..] {
                assert_ne!(a.index, b.index, "{:?} and {:?} collide", a, b);
            }
        }
    }

    #[test]
    fn comparator_slots_are_four_registers_wide() {
        let map = RegisterMap::default();
        assert_eq!(map.breakpoints.ctrl(1).map(|r| r.index.get()), Some(0x44));
        assert_eq!(map.watchpoints.mask(7).map(|r| r.index.get()), Some(0x7f));
        assert_eq!(map.watchpoints.ctrl(8), None);
        assert_eq!(map.breakpoints.locate(NrrIndex::at(0x46)), Some((1, 2)));
        assert_eq!(map.breakpoints.locate(NrrIndex::at(0x60)), None);
    }

    #[test]
    fn access_control_word_round_trips_fields() {
        let value = rwcs::start(true, 2, 1, 3, 100);
        assert!(value & rwcs::START != 0);
        assert!(value & rwcs::WRITE != 0);
        assert_eq!(rwcs::size(value), 2);
        assert_eq!(rwcs::map(value), 1);
        assert_eq!(rwcs::count(value), 100);
    }

    #[test]
    fn trigger_fields_are_independent() {
        let value = wt::set_field(0, wt::DTM_START, 5);
        let value = wt::set_field(value, wt::SUBST_START, 7);
        assert_eq!(wt::field(value, wt::DTM_START), 5);
        assert_eq!(wt::field(value, wt::SUBST_START), 7);
        assert_eq!(wt::field(wt::set_field(value, wt::DTM_START, 0), wt::SUBST_START), 7);
    }
}
