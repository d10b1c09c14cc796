//! The hardware abstraction layer seam.
//!
//! A HAL drives one physical debug port.  It knows how to reach the target's Nexus
//! registers and how to pull events off the target; everything else (memory access,
//! breakpoints, trace configuration) is built on top of register access by the TAL in
//! `api`.  Vendors plug their silicon in by implementing `Hal`.
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::event::ReceivedEvent;
use crate::nrr::{byte_len, from_bytes, to_bytes, NrrIndex, Reg};
use crate::types::TargetSpec;

pub trait Hal {
    /// Connect to the target described by `spec` and report what it supports.  The TAL
    /// fills in the API version and device ID itself.
    fn open(&mut self, spec: &TargetSpec) -> Result<Capability>;

    /// Release the connection.
    fn close(&mut self) -> Result<()>;

    /// Write `bits` bits to register `index`.  `data` holds `ceil(bits/8)` bytes, least
    /// significant bit first.
    fn write_nrr(&mut self, index: NrrIndex, bits: usize, data: &[u8]) -> Result<()>;

    /// Read `bits` bits from register `index` into `ceil(bits/8)` bytes.
    fn read_nrr(&mut self, index: NrrIndex, bits: usize) -> Result<Vec<u8>>;

    /// Pull the next event off the target.  With `block` set, wait until one arrives;
    /// otherwise return `Ok(None)` straight away when nothing is pending.
    fn get_event(&mut self, block: bool) -> Result<Option<ReceivedEvent>>;

    fn write_word(&mut self, reg: Reg, value: u64) -> Result<()> {
        self.write_nrr(reg.index, reg.bits, &to_bytes(value, reg.bits))
    }

    fn read_word(&mut self, reg: Reg) -> Result<u64> {
        let data = self.read_nrr(reg.index, reg.bits)?;
        Ok(from_bytes(&data, reg.bits))
    }
}

impl<H: Hal + ?Sized> Hal for Box<H> {
    fn open(&mut self, spec: &TargetSpec) -> Result<Capability> {
        (**self).open(spec)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn write_nrr(&mut self, index: NrrIndex, bits: usize, data: &[u8]) -> Result<()> {
        (**self).write_nrr(index, bits, data)
    }

    fn read_nrr(&mut self, index: NrrIndex, bits: usize) -> Result<Vec<u8>> {
        (**self).read_nrr(index, bits)
    }

    fn get_event(&mut self, block: bool) -> Result<Option<ReceivedEvent>> {
        (**self).get_event(block)
    }
}

/// Argument check shared by HAL implementations.
pub fn check_nrr_args(index: NrrIndex, bits: usize, len: usize) -> Result<()> {
    if bits == 0 {
        return Err(Error::failed(format!("zero-width access to NRR {}", index.get())));
    }
    if len != byte_len(bits) {
        return Err(Error::failed(format!(
            "NRR {} access of {} bits needs {} bytes, got {}",
            index.get(),
            bits,
            byte_len(bits),
            len
        )));
    }
    Ok(())
}

/// Receives failures that happen below the API, in place of an error callback.
pub trait ErrorSink {
    fn report(&mut self, message: &str);
}

impl<F: FnMut(&str)> ErrorSink for F {
    fn report(&mut self, message: &str) {
        self(message)
    }
}

/// Sends reports to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&mut self, message: &str) {
        log::error!("{}", message);
    }
}
