//! Event configuration and event delivery types.
//!
//! `SetEvent` installs a trigger/action pair under a caller chosen event ID, and
//! `ReceivedEvent` is what comes back from the target: a message, a register snapshot
//! taken on a break or step, or the level of an input pin.
use alloc::boxed::Box;

use crate::capability::{EventCategory, EventId, EVENTID_INVALID};
use crate::message::Message;
use crate::types::{Address, Registers, Word, NUM_FLOAT_REGS, NUM_INT_REGS};

/// Numeric event type tags.  Values from 0x100 upwards are vendor extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    /// single step
    Step = 0x01,
    Breakpoint = 0x10,
    Watchpoint = 0x20,
    /// branch trace messaging
    Btm = 0x50,
    /// data trace messaging
    Dtm = 0x51,
    /// ownership trace messaging
    Otm = 0x52,
    /// memory substitution
    Substitution = 0x70,
    PerfCount = 0x100,
    WatchdogCount = 0x101,
}

/// Whether accesses trigger for read, write or both
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RwMode {
    Read,
    Write,
    #[default]
    ReadOrWrite,
}

impl RwMode {
    pub fn code(self) -> u64 {
        match self {
            RwMode::Read => 0,
            RwMode::Write => 1,
            RwMode::ReadOrWrite => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(RwMode::Read),
            1 => Some(RwMode::Write),
            2 => Some(RwMode::ReadOrWrite),
            _ => None,
        }
    }

    pub fn matches(self, write: bool) -> bool {
        match self {
            RwMode::Read => !write,
            RwMode::Write => write,
            RwMode::ReadOrWrite => true,
        }
    }
}

/// What a breakpoint or watchpoint matches against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Operand {
    DataAddr,
    DataValue,
    DataAddrAndValue,
    #[default]
    InstrAddr,
}

impl Operand {
    pub fn code(self) -> u64 {
        match self {
            Operand::DataAddr => 0,
            Operand::DataValue => 1,
            Operand::DataAddrAndValue => 2,
            Operand::InstrAddr => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Operand::DataAddr),
            1 => Some(Operand::DataValue),
            2 => Some(Operand::DataAddrAndValue),
            3 => Some(Operand::InstrAddr),
            _ => None,
        }
    }
}

/// Whether an occurrence asserts the Event Out (EVTO) pin
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventOutputMode {
    #[default]
    NoChange,
    Triggered,
}

/// Match condition shared by breakpoints and watchpoints.  Addresses compare exactly;
/// data values compare with the bits set in `mask` ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Comparator {
    pub rw_mode: RwMode,
    pub addr: Address,
    pub op: Operand,
    pub data: Word,
    pub mask: Word,
    pub eo_mode: EventOutputMode,
}

impl Comparator {
    /// Match an instruction fetch from `addr`.
    pub fn instruction(addr: Address) -> Self {
        Self { addr, op: Operand::InstrAddr, ..Self::default() }
    }

    /// Match a data access to `addr`.
    pub fn data_access(addr: Address, rw_mode: RwMode) -> Self {
        Self { addr, rw_mode, op: Operand::DataAddr, ..Self::default() }
    }

    pub fn with_evto(mut self) -> Self {
        self.eo_mode = EventOutputMode::Triggered;
        self
    }
}

/// Start and end triggers: `EVENTID_INVALID` disables a trigger, any other value names
/// the breakpoint or watchpoint that fires it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceTriggers {
    pub start: EventId,
    pub end: EventId,
}

impl TraceTriggers {
    pub const ALWAYS: TraceTriggers = TraceTriggers { start: EVENTID_INVALID, end: EVENTID_INVALID };
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Step,
    Breakpoint(Comparator),
    Watchpoint(Comparator),
    BranchTrace(TraceTriggers),
    /// Trace accesses with `start_addr <= addr < end_addr`
    DataTrace {
        rw_mode: RwMode,
        triggers: TraceTriggers,
        start_addr: Address,
        end_addr: Address,
    },
    OwnershipTrace(TraceTriggers),
    Substitution {
        start_trigger: EventId,
    },
    PerfCount {
        what_to_monitor: u16,
        what_to_do: u16,
    },
    WatchdogCount {
        count: u32,
    },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Step => EventType::Step,
            EventKind::Breakpoint(_) => EventType::Breakpoint,
            EventKind::Watchpoint(_) => EventType::Watchpoint,
            EventKind::BranchTrace(_) => EventType::Btm,
            EventKind::DataTrace { .. } => EventType::Dtm,
            EventKind::OwnershipTrace(_) => EventType::Otm,
            EventKind::Substitution { .. } => EventType::Substitution,
            EventKind::PerfCount { .. } => EventType::PerfCount,
            EventKind::WatchdogCount { .. } => EventType::WatchdogCount,
        }
    }

    /// The capability range the event's ID must come from.  Single step shares the
    /// breakpoint IDs.
    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::Step | EventKind::Breakpoint(_) => EventCategory::Breakpoint,
            EventKind::Watchpoint(_) => EventCategory::Watchpoint,
            EventKind::BranchTrace(_) => EventCategory::BranchTrace,
            EventKind::DataTrace { .. } => EventCategory::DataTrace,
            EventKind::OwnershipTrace(_) => EventCategory::OwnershipTrace,
            EventKind::Substitution { .. } => EventCategory::Substitution,
            EventKind::PerfCount { .. } | EventKind::WatchdogCount { .. } => EventCategory::Vendor,
        }
    }

    /// Event IDs this event refers to as triggers, disabled ones left out.
    pub fn triggers(&self) -> impl Iterator<Item = EventId> {
        let (a, b) = match self {
            EventKind::BranchTrace(t) | EventKind::OwnershipTrace(t) => (t.start, t.end),
            EventKind::DataTrace { triggers, .. } => (triggers.start, triggers.end),
            EventKind::Substitution { start_trigger } => (*start_trigger, EVENTID_INVALID),
            _ => (EVENTID_INVALID, EVENTID_INVALID),
        };
        [a, b].into_iter().filter(|eid| *eid != EVENTID_INVALID)
    }
}

/// Used when setting an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetEvent {
    pub eid: EventId,
    pub kind: EventKind,
    /// Occurrences to let pass before the event fires
    pub counts_before_trigger: u32,
}

impl SetEvent {
    pub fn new(eid: EventId, kind: EventKind) -> Self {
        Self { eid, kind, counts_before_trigger: 0 }
    }

    pub fn after(mut self, counts: u32) -> Self {
        self.counts_before_trigger = counts;
        self
    }
}

/// What can be read from the target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ReadEventTag {
    Message = 0x1,
    BreakStep = 0x2,
    InputPin = 0x3,
}

const TAG_SIZE: usize = 4;
const REGISTERS_WIRE_SIZE: usize = NUM_INT_REGS * 8 + NUM_FLOAT_REGS * 4;

/// An event read from the target
#[derive(Clone, Debug, PartialEq)]
pub enum ReceivedEvent {
    Message(Message),
    BreakStep(Box<Registers>),
    InputPin { level: bool },
}

impl ReceivedEvent {
    pub fn tag(&self) -> ReadEventTag {
        match self {
            ReceivedEvent::Message(_) => ReadEventTag::Message,
            ReceivedEvent::BreakStep(_) => ReadEventTag::BreakStep,
            ReceivedEvent::InputPin { .. } => ReadEventTag::InputPin,
        }
    }

    /// Bytes a client buffer needs to hold this event.
    pub fn wire_size(&self) -> usize {
        TAG_SIZE
            + match self {
                ReceivedEvent::Message(m) => m.wire_size(),
                ReceivedEvent::BreakStep(_) => REGISTERS_WIRE_SIZE,
                ReceivedEvent::InputPin { .. } => 4,
            }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            ReceivedEvent::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn registers(&self) -> Option<&Registers> {
        match self {
            ReceivedEvent::BreakStep(r) => Some(r),
            _ => None,
        }
    }
}
