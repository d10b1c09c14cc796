//! Status codes and the error type shared by the API and HAL layers.
//!
//! Every Nexus operation ends in one of four status codes.  The Rust API returns
//! `Result<T, Error>` instead, and `Error::status` recovers the code when a caller
//! needs to talk to something that only understands the numeric form.
use alloc::string::String;

use crate::cable::CableError;

/// Standard status codes used by all Nexus API functions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// success
    None = 0,
    /// generic failure
    Failed = 1,
    /// operation not within capabilities
    NoCapability = 2,
    /// insufficient buffer space
    NoSpace = 3,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Status::None),
            1 => Some(Status::Failed),
            2 => Some(Status::NoCapability),
            3 => Some(Status::NoSpace),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Generic failure reported by the TAL, the HAL or the target.
    #[error("operation failed: {0}")]
    Failed(String),

    /// The request is outside what the target or HAL supports.
    #[error("not within target capabilities: {0}")]
    NoCapability(String),

    /// A received event does not fit into the caller's buffer.
    #[error("event needs {needed} bytes, only {available} available")]
    NoSpace { needed: usize, available: usize },

    /// A memory write stopped part way through.
    #[error("write stopped after {written} bytes: {reason}")]
    PartialWrite { written: usize, reason: String },

    /// The JTAG adapter underneath the HAL failed.
    #[error("cable error: {0}")]
    Cable(#[from] CableError),
}

impl Error {
    pub fn failed(reason: impl Into<String>) -> Self {
        Error::Failed(reason.into())
    }

    pub fn no_capability(reason: impl Into<String>) -> Self {
        Error::NoCapability(reason.into())
    }

    /// The status code this error is reported as.
    pub fn status(&self) -> Status {
        match self {
            Error::Failed(_) | Error::PartialWrite { .. } | Error::Cable(_) => Status::Failed,
            Error::NoCapability(_) => Status::NoCapability,
            Error::NoSpace { .. } => Status::NoSpace,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Collapse a result into its status code.
pub fn status_of<T>(result: &Result<T>) -> Status {
    match result {
        Ok(_) => Status::None,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn codes_match_the_standard_values() {
        assert_eq!(Status::None.code(), 0);
        assert_eq!(Status::Failed.code(), 1);
        assert_eq!(Status::NoCapability.code(), 2);
        assert_eq!(Status::NoSpace.code(), 3);
        for code in 0..4 {
            assert_eq!(Status::from_code(code).map(Status::code), Some(code));
        }
        assert_eq!(Status::from_code(4), None);
    }

    #[test]
    fn errors_map_to_status() {
        assert_eq!(Error::failed("x").status(), Status::Failed);
        assert_eq!(Error::no_capability("x").status(), Status::NoCapability);
        assert_eq!(Error::NoSpace { needed: 8, available: 4 }.status(), Status::NoSpace);
        let partial = Error::PartialWrite { written: 4, reason: "bus error".to_string() };
        assert_eq!(partial.status(), Status::Failed);
        assert_eq!(Error::from(CableError::Unsupported("queued reads")).status(), Status::Failed);

        let ok: Result<()> = Ok(());
        assert_eq!(status_of(&ok), Status::None);
    }

    #[test]
    fn messages_carry_details() {
        let e = Error::NoSpace { needed: 388, available: 16 };
        assert_eq!(e.to_string(), "event needs 388 bytes, only 16 available");
    }
}
