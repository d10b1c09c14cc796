//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait.
//!
//! Bits travel least significant bit first: bit 0 of `data[0]` is the first bit shifted into
//! TDI, and the first bit shifted out of TDO lands in bit 0 of the first returned byte.
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

pub mod gpio;
#[cfg(feature = "ftdi")]
pub mod jtagkey;
#[cfg(feature = "ftdi")]
pub mod mpsse;
#[cfg(feature = "jlink")]
pub mod jlink;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CableError {
    /// No adapter matching the description is attached.
    #[error("no adapter found: {0}")]
    NotFound(String),

    /// The adapter or its driver reported an error.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// A GPIO pin could not be driven or sampled.
    #[error("pin error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),

    /// The scan chain did not behave like a JTAG chain.
    #[error("unexpected target response: {0}")]
    Target(String),

    #[error("{0} is not supported by this cable")]
    Unsupported(&'static str),

    #[error("unknown cable type {0:?}")]
    UnknownCable(String),
}

pub trait Cable {
    /// Clock out a series of TMS values to change the state of the JTAG chain.  Each element of
    /// `tms` determines the value of the TMS line, zero for low and any other value for high.
    /// `tdi` controls the state of the TDI line during mode changes.
    fn change_mode(&mut self, tms: &[usize], tdi: bool) -> Result<(), CableError>;

    /// Shift in bits from the TDO line.  `bits` is the total number of bits to read.  Should be
    /// called with state = ShiftIR or ShiftDR, and will remain in that state.  Clocks out all
    /// ones.
    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError>;

    /// Shift out bits on the TDI line.  `bits` is the number of bits to send from the last byte.
    /// Should be called with state = ShiftIR or ShiftDR.  State won't change unless `pause_after`
    /// is true, in which case it will be PauseIR or PauseDR on exit.
    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError>;

    /// Like `write_data`, returning the bits shifted out of TDO meanwhile.
    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError>;

    /// Queue a read to be collected later with `finish_read`.  Returns false if the cable cannot
    /// queue it, in which case the caller should use `read_data`.
    fn queue_read(&mut self, _bits: usize) -> Result<bool, CableError> {
        Ok(false)
    }

    /// Queued form of `read_write_data`.
    fn queue_read_write(&mut self, _data: &[u8], _bits: u8, _pause_after: bool) -> Result<bool, CableError> {
        Ok(false)
    }

    /// Collect the oldest queued read.
    fn finish_read(&mut self, _bits: usize) -> Result<Vec<u8>, CableError> {
        Err(CableError::Unsupported("queued reads"))
    }

    /// Push out anything the cable has buffered.
    fn flush(&mut self) -> Result<(), CableError> {
        Ok(())
    }
}

/// Build a cable from its name, as given on a command line.
pub fn new_from_string(name: &str, clock: u32) -> Result<Box<dyn Cable>, CableError> {
    log::debug!("opening {} cable at {} Hz", name, clock);
    match name {
        #[cfg(feature = "ftdi")]
        "jtagkey" => Ok(Box::new(jtagkey::JtagKey::new(clock, true)?)),
        #[cfg(feature = "ftdi")]
        "jtagkey-b" => Ok(Box::new(jtagkey::JtagKey::new(clock, false)?)),
        #[cfg(feature = "jlink")]
        "jlink" => Ok(Box::new(jlink::JLink::new(clock)?)),
        _ => Err(CableError::UnknownCable(name.to_string())),
    }
}

/// A cable that is driven one TCK period at a time.
pub trait Clocked {
    /// Drive TMS and TDI, sample TDO, then clock one rising and falling edge.
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError>;
}

pub(crate) fn clock_tms<C: Clocked + ?Sized>(c: &mut C, tms: &[usize], tdi: bool) -> Result<(), CableError> {
    for t in tms {
        c.clock(*t != 0, tdi)?;
    }
    Ok(())
}

/// Shift `data` through a `Clocked` cable, `bits` bits from the last byte.  With `pause_after`
/// the last bit goes out with TMS high and one more clock reaches the pause state.
pub(crate) fn shift<C: Clocked + ?Sized>(
    c: &mut C,
    data: &[u8],
    bits: u8,
    pause_after: bool,
) -> Result<Vec<u8>, CableError> {
    let Some(total) = shift_len(data.len(), bits) else {
        return Ok(vec![]);
    };
    let mut out = vec![0u8; data.len()];
    for i in 0..total {
        let tdi = data[i / 8] & (1 << (i % 8)) != 0;
        let last = i + 1 == total;
        if c.clock(pause_after && last, tdi)? {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    if pause_after {
        c.clock(false, true)?;
    }
    Ok(out)
}

/// Clock `bits` ones through a `Clocked` cable, collecting TDO.
pub(crate) fn shift_ones<C: Clocked + ?Sized>(c: &mut C, bits: usize) -> Result<Vec<u8>, CableError> {
    let mut out = vec![0u8; (bits + 7) / 8];
    for i in 0..bits {
        if c.clock(false, true)? {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    Ok(out)
}

/// Total bits described by a buffer of `len` bytes with `bits` bits used in the last one.
pub(crate) fn shift_len(len: usize, bits: u8) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let bits = bits.clamp(1, 8) as usize;
    Some((len - 1) * 8 + bits)
}
