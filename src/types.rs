//! Session management types: ports, byte order, the target specification handed to
//! `Handle::open` and the register file snapshot returned on break/step events.
use alloc::vec::Vec;

use crate::nrr::RegisterMap;

/// Holds a target address
pub type Address = u64;

/// Holds a target word (max size of an atomic memory access)
pub type Word = u64;

pub const NUM_INT_REGS: usize = 32;
pub const NUM_FLOAT_REGS: usize = 32;

/// Host, emulator and target byte order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    /// Used for initial assignment
    #[default]
    Unknown,
    Big,
    Little,
    Other,
}

impl Endian {
    pub fn is_known(self) -> bool {
        matches!(self, Endian::Big | Endian::Little)
    }

    /// Assemble a word from `bytes` laid out in memory order.  Single bytes need no byte
    /// order, anything wider needs a big or little endian target.
    pub fn word_from_bytes(self, bytes: &[u8]) -> Option<Word> {
        if bytes.len() > 8 {
            return None;
        }
        if bytes.len() == 1 {
            return Some(bytes[0] as Word);
        }
        let mut word = 0;
        match self {
            Endian::Little => {
                for (i, b) in bytes.iter().enumerate() {
                    word |= (*b as Word) << (8 * i);
                }
            }
            Endian::Big => {
                for b in bytes {
                    word = (word << 8) | *b as Word;
                }
            }
            _ => return None,
        }
        Some(word)
    }

    /// Split the low `len` bytes of `word` into memory order.
    pub fn word_to_bytes(self, word: Word, len: usize) -> Option<Vec<u8>> {
        if len > 8 {
            return None;
        }
        if len == 1 {
            return Some(alloc::vec![word as u8]);
        }
        let little = (0..len).map(|i| (word >> (8 * i)) as u8);
        match self {
            Endian::Little => Some(little.collect()),
            Endian::Big => {
                let mut bytes: Vec<u8> = little.collect();
                bytes.reverse();
                Some(bytes)
            }
            _ => None,
        }
    }
}

/// Debug port types
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PortType {
    /// A non-existent port
    #[default]
    Unavailable,
    Jtag,
    Aux,
    /// Reserved for future use
    Other,
}

/// Vendor extension block of the target specification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorTargetSpec {
    /// Where the TAL finds the Nexus registers on this target.
    pub register_map: RegisterMap,
    /// How many times the TAL polls RWCS for a read to complete before giving up.
    pub poll_limit: usize,
}

impl Default for VendorTargetSpec {
    fn default() -> Self {
        Self {
            register_map: RegisterMap::default(),
            poll_limit: 32,
        }
    }
}

/// Defines the target's setup when connecting
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetSpec {
    /// Port for access and control
    pub access_port: PortType,
    /// Port for unsolicited messages
    pub unsolicited_port: PortType,
    pub target_endian: Endian,
    pub vendor: VendorTargetSpec,
}

impl TargetSpec {
    /// Access and control over JTAG, with no separate message port.
    pub fn jtag(target_endian: Endian) -> Self {
        Self {
            access_port: PortType::Jtag,
            unsolicited_port: PortType::Unavailable,
            target_endian,
            vendor: VendorTargetSpec::default(),
        }
    }

    /// Access over JTAG, unsolicited messages over the AUX port.
    pub fn jtag_with_aux(target_endian: Endian) -> Self {
        Self {
            unsolicited_port: PortType::Aux,
            ..Self::jtag(target_endian)
        }
    }
}

/// The target's general purpose register set
#[derive(Clone, Debug, PartialEq)]
pub struct Registers {
    pub int_regs: [i64; NUM_INT_REGS],
    pub float_regs: [f32; NUM_FLOAT_REGS],
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            int_regs: [0; NUM_INT_REGS],
            float_regs: [0.0; NUM_FLOAT_REGS],
        }
    }
}

impl Registers {
    pub const COUNT: usize = NUM_INT_REGS + NUM_FLOAT_REGS;

    /// Raw bits of register `n`, integer registers first, then floats.
    pub fn raw(&self, n: usize) -> Option<u64> {
        if n < NUM_INT_REGS {
            Some(self.int_regs[n] as u64)
        } else if n < Self::COUNT {
            Some(self.float_regs[n - NUM_INT_REGS].to_bits() as u64)
        } else {
            None
        }
    }

    pub fn set_raw(&mut self, n: usize, value: u64) -> bool {
        if n < NUM_INT_REGS {
            self.int_regs[n] = value as i64;
        } else if n < Self::COUNT {
            self.float_regs[n - NUM_INT_REGS] = f32::from_bits(value as u32);
        } else {
            return false;
        }
        true
    }
}
