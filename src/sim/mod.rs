//! A simulated Nexus target.
//!
//! `SimTarget` is a HAL over an in-memory model of a Nexus client that implements the
//! default register map: the RWCS memory access engine, run control through DC1/DS, the
//! register window, comparator banks and the trace units.  `SimProbe` plays the part of the
//! core, executing instructions and making data accesses that the debug logic reacts to,
//! and `SimTap` exposes the same client through a bit-level JTAG TAP so the JTAG stack can be
//! driven end to end.
//!
//! All three share one client behind a mutex; a blocking `get_event` sleeps on a condition
//! variable that is signalled whenever the client queues something.
use std::collections::BTreeMap;
use std::format;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::vec;
use std::vec::Vec;

use crate::api::AccessSize;
use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::event::ReceivedEvent;
use crate::hal::{check_nrr_args, Hal};
use crate::nrr::{NrrIndex, RegisterMap};
use crate::types::{Address, PortType, Registers, TargetSpec};

mod client;
mod tap;

use client::NexusClient;
pub use tap::SimTap;

/// IR opcode selecting the IDCODE register
pub const IDCODE_INSTRUCTION: u32 = 0x01;

/// A block of target memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub map: u32,
    pub base: Address,
    pub size: usize,
}

impl Region {
    pub const fn new(map: u32, base: Address, size: usize) -> Self {
        Self { map, base, size }
    }
}

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub capability: Capability,
    pub register_map: RegisterMap,
    pub regions: Vec<Region>,
    /// Messages the client buffers before it overruns
    pub queue_depth: usize,
    /// Value of the DID register
    pub device_id: u32,
    /// JTAG IDCODE; bit 0 must be set
    pub idcode: u32,
    pub ir_len: usize,
    pub nexus_instruction: u32,
    /// Width of registers the register map does not name
    pub default_width: usize,
    /// Per-register width overrides
    pub widths: BTreeMap<u8, usize>,
    /// Treat every register as plain storage, with no debug logic behind it
    pub plain: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            capability: Capability::reference_client(),
            register_map: RegisterMap::default(),
            regions: vec![Region::new(0, 0, 0x1_0000), Region::new(1, 0x2000_0000, 0x1000)],
            queue_depth: 64,
            device_id: 0x0a5e_5001,
            idcode: 0x1a5e_501d,
            ir_len: 5,
            nexus_instruction: crate::jtag::NEXUS_ACCESS,
            default_width: 32,
            widths: BTreeMap::new(),
            plain: false,
        }
    }
}

impl SimConfig {
    /// A client that is nothing but 128 registers of storage.
    pub fn register_file() -> Self {
        Self { plain: true, ..Self::default() }
    }

    pub fn with_width(mut self, index: u8, bits: usize) -> Self {
        self.widths.insert(index, bits);
        self
    }

    /// Width of register `index`, between 1 and 64 bits.
    pub fn width_of(&self, index: NrrIndex) -> usize {
        self.widths
            .get(&index.get())
            .copied()
            .or_else(|| self.register_map.width_of(index))
            .unwrap_or(self.default_width)
            .clamp(1, 64)
    }
}

struct Shared {
    client: Mutex<NexusClient>,
    ready: Condvar,
}

impl Shared {
    fn client(&self) -> MutexGuard<'_, NexusClient> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Runs `f` on the client and wakes anyone waiting for an event.
    fn with<R>(&self, f: impl FnOnce(&mut NexusClient) -> R) -> R {
        let result = f(&mut self.client());
        self.ready.notify_all();
        result
    }
}

pub struct SimTarget {
    shared: Arc<Shared>,
}

impl SimTarget {
    pub fn new(config: SimConfig) -> Self {
        let shared = Shared {
            client: Mutex::new(NexusClient::new(config)),
            ready: Condvar::new(),
        };
        Self { shared: Arc::new(shared) }
    }

    /// A handle on the simulated core, usable from any thread.
    pub fn probe(&self) -> SimProbe {
        SimProbe { shared: self.shared.clone() }
    }

    /// A JTAG TAP in front of the same client.
    pub fn tap(&self) -> SimTap {
        let config = self.shared.client().config().clone();
        SimTap::new(self.shared.clone(), &config)
    }
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Hal for SimTarget {
    fn open(&mut self, spec: &TargetSpec) -> Result<Capability> {
        if !matches!(spec.access_port, PortType::Jtag | PortType::Aux) {
            return Err(Error::no_capability(format!("simulator has no {:?} port", spec.access_port)));
        }
        let client = self.shared.client();
        let mut cap = client.config().capability.clone();
        cap.hal_info = format!("simulated Nexus client, {} memory regions", client.config().regions.len());
        Ok(cap)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_nrr(&mut self, index: NrrIndex, bits: usize, data: &[u8]) -> Result<()> {
        check_nrr_args(index, bits, data.len())?;
        self.shared.with(|c| c.write_nrr(index, bits, data))
    }

    fn read_nrr(&mut self, index: NrrIndex, bits: usize) -> Result<Vec<u8>> {
        check_nrr_args(index, bits, crate::nrr::byte_len(bits))?;
        self.shared.with(|c| c.read_nrr(index, bits))
    }

    fn get_event(&mut self, block: bool) -> Result<Option<ReceivedEvent>> {
        let mut client = self.shared.client();
        loop {
            if let Some(event) = client.pop_event() {
                return Ok(Some(event));
            }
            if !block {
                return Ok(None);
            }
            client = self.shared.ready.wait(client).map_err(|_| Error::failed("simulator state poisoned"))?;
        }
    }
}

/// Drives the simulated core.  Clones share the same target.
#[derive(Clone)]
pub struct SimProbe {
    shared: Arc<Shared>,
}

impl SimProbe {
    /// Fetch and execute the instruction at `pc`.  Returns false if the core was halted,
    /// stalled, or stopped on a breakpoint before executing it.
    ///
    /// The core stalls while an overrun delay is set in DC1 and the event queue is full.
    /// It makes progress again once the host pulls an event.  With no delay set, messages
    /// that do not fit are counted and reported as lost.
    pub fn execute(&self, pc: Address) -> bool {
        self.shared.with(|c| c.execute(pc))
    }

    /// Take a branch to `target`.  False while halted or stalled.
    pub fn branch(&self, target: Address) -> bool {
        self.shared.with(|c| c.branch(target))
    }

    /// Data read from memory map 0.
    pub fn load(&self, addr: Address, size: AccessSize) -> Option<u64> {
        self.shared.with(|c| c.load(addr, size))
    }

    /// Data write to memory map 0.
    pub fn store(&self, addr: Address, size: AccessSize, value: u64) -> bool {
        self.shared.with(|c| c.store(addr, size, value))
    }

    /// The running software switches process.  False while stalled.
    pub fn set_owner(&self, process: u32) -> bool {
        self.shared.with(|c| c.set_owner(process))
    }

    /// Queue an event as if the client had produced it.  A full queue counts it as lost.
    pub fn raise_event(&self, event: ReceivedEvent) {
        self.shared.with(|c| c.raise(event))
    }

    /// Write memory without involving the core or the debug logic.
    pub fn poke(&self, map: u32, addr: Address, data: &[u8]) -> bool {
        self.shared.with(|c| c.poke(map, addr, data))
    }

    pub fn peek(&self, map: u32, addr: Address, len: usize) -> Option<Vec<u8>> {
        self.shared.client().peek(map, addr, len)
    }

    pub fn is_halted(&self) -> bool {
        self.shared.client().is_halted()
    }

    pub fn registers(&self) -> Registers {
        self.shared.client().registers().clone()
    }

    pub fn set_registers(&self, regs: Registers) {
        self.shared.client().set_registers(regs)
    }

    /// Whether memory substitution is active.
    pub fn substituting(&self) -> bool {
        self.shared.client().substituting()
    }

    /// Current contents of register `index`, read without side effects.
    pub fn nrr(&self, index: NrrIndex) -> u64 {
        self.shared.client().stored(index)
    }

    pub fn pending_events(&self) -> usize {
        self.shared.client().pending()
    }
}
