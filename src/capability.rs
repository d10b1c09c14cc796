//! What a connected target can do.
//!
//! Event capabilities are expressed as ranges of event IDs, one per category.  An ID of
//! zero (`EVENTID_INVALID`) marks a category as unsupported, so an absent range is
//! `0..=0` and a present one is `min..=max` with `1 <= min <= max`.
use alloc::format;
use alloc::string::String;

use crate::error::{Error, Result};
use crate::types::Endian;

/// Version string for v1.0 of the API
pub const VERSION_STRING_10: &str = "nxAPIv1.0";

pub type EventId = u32;

/// Event ID that is not available
pub const EVENTID_INVALID: EventId = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventIdRange {
    pub min: EventId,
    pub max: EventId,
}

impl EventIdRange {
    pub const NONE: EventIdRange = EventIdRange { min: EVENTID_INVALID, max: EVENTID_INVALID };

    pub const fn new(min: EventId, max: EventId) -> Self {
        Self { min, max }
    }

    pub const fn single(id: EventId) -> Self {
        Self { min: id, max: id }
    }

    pub fn is_available(&self) -> bool {
        self.min != EVENTID_INVALID
    }

    pub fn contains(&self, eid: EventId) -> bool {
        self.is_available() && eid >= self.min && eid <= self.max
    }

    pub fn len(&self) -> usize {
        if self.is_available() {
            (self.max - self.min) as usize + 1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `eid` inside the range.
    pub fn slot(&self, eid: EventId) -> Option<usize> {
        self.contains(eid).then(|| (eid - self.min) as usize)
    }

    /// The ID at position `slot`.
    pub fn eid(&self, slot: usize) -> Option<EventId> {
        (slot < self.len()).then(|| self.min + slot as EventId)
    }

    fn is_consistent(&self) -> bool {
        if self.min == EVENTID_INVALID || self.max == EVENTID_INVALID {
            self.min == self.max
        } else {
            self.min <= self.max
        }
    }

    fn overlaps(&self, other: &EventIdRange) -> bool {
        self.is_available() && other.is_available() && self.min <= other.max && other.min <= self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventCategory {
    Breakpoint,
    Watchpoint,
    BranchTrace,
    DataTrace,
    OwnershipTrace,
    Substitution,
    Vendor,
}

impl EventCategory {
    pub const ALL: [EventCategory; 7] = [
        EventCategory::Breakpoint,
        EventCategory::Watchpoint,
        EventCategory::BranchTrace,
        EventCategory::DataTrace,
        EventCategory::OwnershipTrace,
        EventCategory::Substitution,
        EventCategory::Vendor,
    ];

    /// Categories that own exactly one event ID.
    pub fn is_single(self) -> bool {
        matches!(
            self,
            EventCategory::BranchTrace | EventCategory::OwnershipTrace | EventCategory::Substitution
        )
    }
}

/// Defines what the target is capable of
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    pub api_version: String,
    /// Emulator HAL specific info
    pub hal_info: String,
    pub target_endian: Endian,
    pub emu_endian: Endian,
    /// As per the DID register
    pub device_id: u32,
    /// Number of memory maps available to read/write operations
    pub max_mem_map: u32,
    /// Number of access priorities available to read/write operations
    pub max_mem_access_priority: u32,
    /// Maximum memory access size in bits
    pub max_access_size: u32,
    pub btm: EventIdRange,
    pub dtm: EventIdRange,
    pub otm: EventIdRange,
    pub substitution: EventIdRange,
    pub watch: EventIdRange,
    pub breakpoint: EventIdRange,
    pub vendor: EventIdRange,
}

impl Capability {
    /// What a client built on the default register map offers: four breakpoints, four
    /// watchpoints, one ID for each trace kind and for substitution, and two vendor IDs.
    pub fn reference_client() -> Self {
        Self {
            target_endian: Endian::Little,
            emu_endian: Endian::Little,
            max_mem_map: 2,
            max_mem_access_priority: 2,
            max_access_size: 64,
            breakpoint: EventIdRange::new(1, 4),
            watch: EventIdRange::new(5, 8),
            dtm: EventIdRange::single(9),
            btm: EventIdRange::single(11),
            otm: EventIdRange::single(12),
            substitution: EventIdRange::single(13),
            vendor: EventIdRange::new(14, 15),
            ..Self::default()
        }
    }

    pub fn range(&self, category: EventCategory) -> EventIdRange {
        match category {
            EventCategory::Breakpoint => self.breakpoint,
            EventCategory::Watchpoint => self.watch,
            EventCategory::BranchTrace => self.btm,
            EventCategory::DataTrace => self.dtm,
            EventCategory::OwnershipTrace => self.otm,
            EventCategory::Substitution => self.substitution,
            EventCategory::Vendor => self.vendor,
        }
    }

    pub fn category_of(&self, eid: EventId) -> Option<EventCategory> {
        EventCategory::ALL.into_iter().find(|c| self.range(*c).contains(eid))
    }

    /// Whether `eid` can be named as a start or end trigger.
    pub fn is_trigger_source(&self, eid: EventId) -> bool {
        self.breakpoint.contains(eid) || self.watch.contains(eid)
    }

    /// Check that the event ranges are internally consistent: well formed, single where
    /// the category only has one ID, and not overlapping each other.
    pub fn validate(&self) -> Result<()> {
        for category in EventCategory::ALL {
            let range = self.range(category);
            if !range.is_consistent() {
                return Err(Error::no_capability(format!(
                    "{:?} event range {}..{} is malformed",
                    category, range.min, range.max
                )));
            }
            if category.is_single() && range.min != range.max {
                return Err(Error::no_capability(format!("{:?} takes a single event id", category)));
            }
        }
        for (i, a) in EventCategory::ALL.iter().enumerate() {
            for b in &EventCategory::ALL[i + 1..] {
                if self.range(*a).overlaps(&self.range(*b)) {
                    return Err(Error::no_capability(format!(
                        "{:?} and {:?} event ranges overlap",
                        a, b
                    )));
                }
            }
        }
        if self.max_access_size % 8 != 0 || self.max_access_size > 64 {
            return Err(Error::no_capability(format!(
                "maximum access size of {} bits is not supported",
                self.max_access_size
            )));
        }
        Ok(())
    }
}
