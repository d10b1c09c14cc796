//! A convenience wrapper for JTAG scan chains with multiple TAPs present.  `Taps` allows the
//! client to interact with one selected TAP as if it were the only TAP in the chain, so that the
//! client doesn't have to deal with putting the other TAPs into bypass and shifting data through
//! the bypass registers.
//!
//! TAP 0 is the one nearest TDO: its bits are the first to come out of the chain and the first
//! ones shifted in end up in it.
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use crate::cable::{Cable, CableError};
use crate::statemachine::{JtagSM, Register};

// Longest chain `detect` will walk before deciding TDO is stuck.
const MAX_CHAIN_BITS: usize = 1024;

fn shift_left(input: &[u8], mut shift: usize) -> Vec<u8> {
    let bytes = shift / 8;
    shift %= 8;
    let mut output = vec![0xff; bytes];

    let mut remainder = (1 << shift) - 1;
    for x in input {
        if shift > 0 {
            let top = *x >> (8 - shift);
            let mut new = *x << shift;
            new |= remainder;
            remainder = top;
            output.push(new);
        } else {
            output.push(*x);
        }
    }
    if shift > 0 {
        output.push(remainder);
    }
    output
}

/// Place `data` (`len` bits) after `before` ones and ahead of `after` ones.  Returns the buffer
/// and the number of bits used in its last byte.
fn pad(data: &[u8], len: usize, before: usize, after: usize) -> (Vec<u8>, u8) {
    let total = before + len + after;
    let mut out = shift_left(data, before);
    out.resize((total + 7) / 8, 0);
    for bit in before + len..total {
        out[bit / 8] |= 1 << (bit % 8);
    }
    let used = match total % 8 {
        0 => 8,
        n => n as u8,
    };
    (out, used)
}

/// What `detect` learnt about one TAP
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapInfo {
    pub irlen: usize,
    /// `None` for TAPs that come out of reset with BYPASS selected
    pub idcode: Option<u32>,
}

struct Tap {
    irlen: usize,
}

pub struct Taps<T> {
    pub sm: JtagSM<T>,
    taps: Vec<Tap>,
    active: usize,
}

impl<T, U> Taps<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create an object using an existing `JtagSM` object
    pub fn new(sm: JtagSM<T>) -> Self {
        Self {
            sm,
            taps: Vec::new(),
            active: 0,
        }
    }

    /// Add a TAP to the scan chain with the given instruction register length
    pub fn add_tap(&mut self, irlen: usize) {
        let tap = Tap {
            irlen
        };
        self.taps.push(tap);
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn irlen(&self, tap: usize) -> Option<usize> {
        self.taps.get(tap).map(|t| t.irlen)
    }

    /// Attempt to autodetect the number of TAPs on the scan chain and the instruction register
    /// length for each.  Relies on every IR capturing `...001`.
    pub fn detect(&mut self) -> Result<Vec<TapInfo>, CableError> {
        self.taps = Vec::new();
        self.sm.mode_reset()?;

        let mut count: i32 = -1;
        let mut irlen = vec![];
        let mut seen = 0;
        loop {
            if seen == MAX_CHAIN_BITS {
                return Err(CableError::Target(format!("no end of IR chain after {} bits", seen)));
            }
            seen += 1;
            let bit = self.sm.read_reg(Register::Instruction, 1)?;
            if bit[0] != 0 {
                if count > 0 {
                    log::debug!("found IR len {}", count + 1);
                    irlen.push((count + 1) as usize)
                }
                if count == 0 {
                    break;
                }
                count = 0;
            } else {
                count += 1;
            }
        }

        self.sm.mode_reset()?;
        let mut found = vec![];
        for len in irlen {
            let bit = self.sm.read_reg(Register::Data, 1)?;
            let idcode = if bit[0] == 0 {
                None
            } else {
                let bits = self.sm.read_reg(Register::Data, 31)?;
                let mut word = [0u8; 4];
                for (w, b) in word.iter_mut().zip(bits.iter()) {
                    *w = *b;
                }
                // Add back the one we read
                Some((u32::from_le_bytes(word) << 1) | 1)
            };
            found.push(TapInfo { irlen: len, idcode });
        }
        self.sm.mode_reset()?;

        for (i, tap) in found.iter().enumerate() {
            match tap.idcode {
                Some(id) => log::info!("tap {}: idcode {:#010x}, IR length {}", i, id, tap.irlen),
                None => log::info!("tap {}: in bypass, IR length {}", i, tap.irlen),
            }
            self.add_tap(tap.irlen);
        }
        Ok(found)
    }

    /// Select which TAP in the scan chain to operate upon.  `ir` will be shifted into its
    /// instruction register, and the other TAPs put into bypass.
    pub fn select_tap(&mut self, tap: usize, ir: &[u8]) -> Result<(), CableError> {
        if tap >= self.taps.len() {
            return Err(CableError::Target(format!("no tap {} in a chain of {}", tap, self.taps.len())));
        }
        self.sm.mode_reset()?;
        self.active = tap;
        self.write_ir(ir)
    }

    fn active_irlen(&self) -> Result<usize, CableError> {
        self.taps
            .get(self.active)
            .map(|t| t.irlen)
            .ok_or_else(|| CableError::Target(format!("no tap {} selected", self.active)))
    }

    /// Shift `ir` into the instruction register of the TAP selected by `select_tap`
    pub fn write_ir(&mut self, ir: &[u8]) -> Result<(), CableError> {
        let this_irlen = self.active_irlen()?;
        if ir.len() != (this_irlen + 7) / 8 {
            return Err(CableError::Target(format!(
                "IR of {} bits needs {} bytes, got {}",
                this_irlen,
                (this_irlen + 7) / 8,
                ir.len()
            )));
        }

        // Everything else gets BYPASS
        let before: usize = self.taps[..self.active].iter().map(|t| t.irlen).sum();
        let after: usize = self.taps[self.active + 1..].iter().map(|t| t.irlen).sum();
        let (ir, bits) = pad(ir, this_irlen, before, after);
        self.sm.write_reg(Register::Instruction, &ir, bits, true)
    }

    /// Read the instruction register of the TAP selected by `select_tap`
    pub fn read_ir(&mut self) -> Result<Vec<u8>, CableError> {
        let this_irlen = self.active_irlen()?;
        let pad_bits: usize = self.taps[..self.active].iter().map(|t| t.irlen).sum();

        // Discard the unwanted bits
        self.sm.read_reg(Register::Instruction, pad_bits)?;
        self.sm.read_reg(Register::Instruction, this_irlen)
    }

    /// Shift `dr` into the data register of the TAP selected by `select_tap`.  `bits` indicates
    /// how many bits of the final byte should be written (a value of 8 will write the entire byte)
    pub fn write_dr(&mut self, dr: &[u8], bits: usize) -> Result<(), CableError> {
        self.active_irlen()?;
        if dr.is_empty() {
            return Ok(());
        }
        let this_len = (dr.len() - 1) * 8 + bits.clamp(1, 8);
        let after = self.taps.len() - self.active - 1;

        let (dr, bits) = pad(dr, this_len, self.active, after);
        self.sm.write_reg(Register::Data, &dr, bits, true)
    }

    /// Read the data register of the TAP selected by `select_tap`.  `bits` indicates the length of
    /// the data register for the current instruction.
    pub fn read_dr(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        self.active_irlen()?;

        // Discard the bypass bits
        self.sm.read_reg(Register::Data, self.active)?;
        self.sm.read_reg(Register::Data, bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_left_fills_with_ones() {
        assert_eq!(shift_left(&[0x00], 3), vec![0x07, 0x00]);
        assert_eq!(shift_left(&[0xff, 0x01], 4), vec![0xff, 0x1f, 0x00]);
        assert_eq!(shift_left(&[0x12], 8), vec![0xff, 0x12]);
    }

    #[test]
    fn padding_surrounds_the_payload() {
        // two bypass bits, 5 bit IR of zero, three bypass bits
        let (buf, bits) = pad(&[0x00], 5, 2, 3);
        assert_eq!(buf, vec![0x83, 0x03]);
        assert_eq!(bits, 2);

        let (buf, bits) = pad(&[0xaa], 8, 0, 0);
        assert_eq!(buf, vec![0xaa]);
        assert_eq!(bits, 8);
    }
}
