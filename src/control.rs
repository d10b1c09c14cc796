//! Control operations applied with `Handle::control`.
use alloc::boxed::Box;

use crate::types::Registers;

/// Numeric control tags.  Values from 0x100 upwards are vendor extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CtrlTag {
    SetClient = 0x01,
    OverrunMode = 0x02,
    SubstitutionMode = 0x03,
    ResetOrHalt = 0x04,
    EventIn = 0x05,
    ClientBreak = 0x06,
    RestartFromBreakStep = 0x50,
    FlashLed = 0x100,
    ConfigTraceBuffer = 0x101,
}

/// What substitution applies to when enabled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Substitution {
    pub instructions: bool,
    pub data: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VendorCtrl {
    FlashLed { how_fast: u16 },
    ConfigureTraceBuffer { size: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CtrlData {
    SetClient { client_id: u32 },
    /// Delay the core instead of dropping messages when the message queue overruns.
    /// Zero disables.
    OverrunMode { delay: u32 },
    /// `None` disables substitution
    SubstitutionMode(Option<Substitution>),
    ResetOrHalt { perform_reset_sequence: bool, halt: bool },
    /// Load the given registers and resume a target stopped on a break or step.
    RestartFromBreakStep(Box<Registers>),
    EventIn { level: bool },
    /// Let EVTI stop the core
    ClientBreak { enabled: bool },
    Vendor(VendorCtrl),
}

impl CtrlData {
    pub fn tag(&self) -> CtrlTag {
        match self {
            CtrlData::SetClient { .. } => CtrlTag::SetClient,
            CtrlData::OverrunMode { .. } => CtrlTag::OverrunMode,
            CtrlData::SubstitutionMode(_) => CtrlTag::SubstitutionMode,
            CtrlData::ResetOrHalt { .. } => CtrlTag::ResetOrHalt,
            CtrlData::RestartFromBreakStep(_) => CtrlTag::RestartFromBreakStep,
            CtrlData::EventIn { .. } => CtrlTag::EventIn,
            CtrlData::ClientBreak { .. } => CtrlTag::ClientBreak,
            CtrlData::Vendor(VendorCtrl::FlashLed { .. }) => CtrlTag::FlashLed,
            CtrlData::Vendor(VendorCtrl::ConfigureTraceBuffer { .. }) => CtrlTag::ConfigTraceBuffer,
        }
    }

    pub fn halt() -> Self {
        CtrlData::ResetOrHalt { perform_reset_sequence: false, halt: true }
    }
}
