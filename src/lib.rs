//! This crate implements the IEEE-ISTO 5001 (Nexus) debug API: a target abstraction layer
//! (TAL) that opens debug connections, reads and writes target memory, arms breakpoints,
//! watchpoints and trace, and delivers the events a target produces.
//!
//! The TAL is `api::Handle`.  It expresses every operation as reads and writes of Nexus
//! registers (NRRs) through a hardware abstraction layer, the `Hal` trait, so that a new debug
//! port only has to know how to move register contents and events.
//!
//! Two HALs come with the crate.  `jtag::JtagHal` reaches the client through a JTAG scan chain
//! built from the lower layers: a `Cable` that shifts bits, the `JtagSM` that tracks the TAP
//! state and `Taps`, which puts every other TAP on the chain in BYPASS.  `sim::SimTarget` is a
//! simulated client for testing; `sim::SimTap` puts the same client behind a bit-level TAP so
//! the JTAG layers can be driven without hardware.
//!
//! # Example
//! ```
//! use nexus_api::sim::SimTarget;
//! use nexus_api::{AccessSize, Endian, Handle, LogSink, TargetSpec};
//!
//! let target = SimTarget::default();
//! let mut handle = Handle::open(TargetSpec::jtag(Endian::Little), target, LogSink)?;
//! handle.write_mem(0, 0, 0x100, AccessSize::Word, &[1, 2, 3, 4])?;
//! assert_eq!(handle.read_mem(0, 0, 0x100, 4, AccessSize::Word)?, [1, 2, 3, 4]);
//! handle.close()?;
//! # Ok::<(), nexus_api::Error>(())
//! ```


#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod api;
pub mod cable;
pub mod capability;
pub mod control;
pub mod error;
pub mod event;
pub mod hal;
pub mod jtag;
pub mod message;
pub mod nrr;
#[cfg(feature = "std")]
pub mod sim;
pub mod statemachine;
pub mod taps;
pub mod types;

pub use api::{AccessSize, Handle};
pub use capability::{Capability, EventId, EventIdRange, EVENTID_INVALID};
pub use control::{CtrlData, Substitution, VendorCtrl};
pub use error::{Error, Result, Status};
pub use event::{Comparator, EventKind, ReceivedEvent, RwMode, SetEvent, TraceTriggers};
pub use hal::{ErrorSink, Hal, LogSink};
pub use types::{Address, Endian, PortType, Registers, TargetSpec};
