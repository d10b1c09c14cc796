//! Memory access through the RWCS/RWA/RWD registers.
//!
//! A transfer loads RWA with the start address and RWCS with the direction, access size,
//! map, priority and unit count.  Each write unit is then a write to RWD; each read unit
//! is a poll of RWCS until the data is valid followed by a read of RWD.  The target
//! advances the address itself.
//!
//! Reads are all or nothing.  Writes stop at the first unit that fails and report how
//! many bytes made it as `Error::PartialWrite`.
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;

use super::Handle;
use crate::error::{Error, Result};
use crate::hal::Hal;
use crate::nrr::{rwcs, Reg};
use crate::types::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
    Double,
}

impl AccessSize {
    pub const ALL: [AccessSize; 4] = [AccessSize::Byte, AccessSize::Half, AccessSize::Word, AccessSize::Double];

    pub fn bytes(self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
            AccessSize::Double => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// RWCS size field
    pub fn code(self) -> u64 {
        match self {
            AccessSize::Byte => 0,
            AccessSize::Half => 1,
            AccessSize::Word => 2,
            AccessSize::Double => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        AccessSize::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        AccessSize::ALL.into_iter().find(|s| s.bytes() == bytes)
    }
}

struct Window {
    rwcs: Reg,
    rwa: Reg,
    rwd: Reg,
}

impl<H: Hal> Handle<H> {
    /// Write `data` to target memory at `addr` in units of `size`.
    pub fn write_mem(&mut self, map: u32, priority: u32, addr: Address, size: AccessSize, data: &[u8]) -> Result<()> {
        log::debug!("write {} bytes at {:#x} (map {}, {:?})", data.len(), addr, map, size);
        let result = match self.check_access(map, priority, addr, data.len(), size) {
            Ok(()) => self.write_units(map, priority, addr, size, data),
            Err(e) => Err(e),
        };
        self.check(result)
    }

    /// Read `num_bytes` of target memory at `addr` in units of `size`.
    pub fn read_mem(&mut self, map: u32, priority: u32, addr: Address, num_bytes: usize, size: AccessSize) -> Result<Vec<u8>> {
        log::debug!("read {} bytes at {:#x} (map {}, {:?})", num_bytes, addr, map, size);
        let result = match self.check_access(map, priority, addr, num_bytes, size) {
            Ok(()) => self.read_units(map, priority, addr, num_bytes, size),
            Err(e) => Err(e),
        };
        self.check(result)
    }

    fn check_access(&self, map: u32, priority: u32, addr: Address, len: usize, size: AccessSize) -> Result<()> {
        let cap = &self.cap;
        if map >= cap.max_mem_map.max(1) {
            return Err(Error::no_capability(format!(
                "memory map {} not available, target has {}",
                map,
                cap.max_mem_map.max(1)
            )));
        }
        if priority >= cap.max_mem_access_priority.max(1) {
            return Err(Error::no_capability(format!("access priority {} not available", priority)));
        }
        if size.bits() > cap.max_access_size || size.bits() as usize > self.regs().rwd.bits {
            return Err(Error::no_capability(format!(
                "{}-bit accesses exceed the target's {}-bit maximum",
                size.bits(),
                cap.max_access_size
            )));
        }
        if size != AccessSize::Byte && !cap.target_endian.is_known() {
            return Err(Error::no_capability("multi-byte access needs a big or little endian target"));
        }
        let unit = size.bytes();
        if addr % unit as u64 != 0 || len % unit != 0 {
            return Err(Error::failed(format!(
                "{} bytes at {:#x} is not aligned to {}-byte accesses",
                len, addr, unit
            )));
        }
        if len != 0 && addr.checked_add(len as u64 - 1).is_none() {
            return Err(Error::failed(format!("{} bytes at {:#x} run past the end of the address space", len, addr)));
        }
        Ok(())
    }

    fn window(&self) -> Window {
        let map = self.regs();
        Window { rwcs: map.rwcs, rwa: map.rwa, rwd: map.rwd }
    }

    fn write_units(&mut self, map: u32, priority: u32, addr: Address, size: AccessSize, data: &[u8]) -> Result<()> {
        let regs = self.window();
        let unit = size.bytes();
        let endian = self.cap.target_endian;
        let mut written = 0;

        for block in data.chunks(unit * rwcs::COUNT_MAX as usize) {
            let units = (block.len() / unit) as u64;
            let setup = rwcs::start(true, size.code(), map as u64, priority as u64, units);
            self.hal
                .write_word(regs.rwa, addr + written as u64)
                .and_then(|()| self.hal.write_word(regs.rwcs, setup))
                .map_err(|e| stopped(written, e))?;

            for chunk in block.chunks(unit) {
                let at = addr + written as u64;
                let word = endian
                    .word_from_bytes(chunk)
                    .ok_or_else(|| Error::no_capability("target byte order unknown"))?;
                let status = self
                    .hal
                    .write_word(regs.rwd, word)
                    .and_then(|()| self.hal.read_word(regs.rwcs))
                    .map_err(|e| stopped(written, e))?;
                if status & rwcs::ERR != 0 {
                    return Err(stopped(written, Error::failed(format!("bus error writing {:#x}", at))));
                }
                written += unit;
            }
        }
        Ok(())
    }

    fn read_units(&mut self, map: u32, priority: u32, addr: Address, num_bytes: usize, size: AccessSize) -> Result<Vec<u8>> {
        let regs = self.window();
        let unit = size.bytes();
        let endian = self.cap.target_endian;
        let block_bytes = unit * rwcs::COUNT_MAX as usize;
        let mut out = Vec::with_capacity(num_bytes);

        while out.len() < num_bytes {
            let units = (num_bytes - out.len()).min(block_bytes) / unit;
            let start = addr + out.len() as u64;
            self.hal.write_word(regs.rwa, start)?;
            self.hal
                .write_word(regs.rwcs, rwcs::start(false, size.code(), map as u64, priority as u64, units as u64))?;

            for _ in 0..units {
                let at = addr + out.len() as u64;
                self.wait_for_data(regs.rwcs, at)?;
                let word = self.hal.read_word(regs.rwd)?;
                let bytes = endian
                    .word_to_bytes(word, unit)
                    .ok_or_else(|| Error::no_capability("target byte order unknown"))?;
                out.extend_from_slice(&bytes);
            }
        }
        Ok(out)
    }

    fn wait_for_data(&mut self, rwcs_reg: Reg, at: Address) -> Result<()> {
        for _ in 0..self.spec.vendor.poll_limit.max(1) {
            let status = self.hal.read_word(rwcs_reg)?;
            if status & rwcs::ERR != 0 {
                return Err(Error::failed(format!("bus error reading {:#x}", at)));
            }
            if status & rwcs::DV != 0 {
                return Ok(());
            }
        }
        Err(Error::failed(format!("timed out waiting for read data at {:#x}", at)))
    }
}

fn stopped(written: usize, e: Error) -> Error {
    if written == 0 {
        e
    } else {
        Error::PartialWrite { written, reason: e.to_string() }
    }
}
