//! Error modules and kernel error descriptions.
//!
//! Result codes carry a module ID and a description value; this module names
//! the ones this crate produces or inspects. The kernel descriptions are the
//! documented values returned by the SVCs wrapped in [`crate::thread`],
//! [`crate::mem`] and [`crate::sync`].
//!
//! # References
//! - [Switchbrew Wiki: Error codes](https://switchbrew.org/wiki/Error_codes)

use crate::result::{Error, ResultCode};

/// Modules that can appear in a result code this runtime deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Module {
    /// The kernel itself.
    Kernel = 1,
    /// This user-space runtime.
    Runtime = 345,
}

/// Kernel error descriptions, as found in the description field of a result
/// code whose module is [`Module::Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KernelError {
    InvalidSize = 101,
    InvalidAddress = 102,
    OutOfResource = 103,
    OutOfMemory = 104,
    OutOfHandles = 105,
    InvalidCurrentMemory = 106,
    InvalidNewMemoryPermission = 108,
    InvalidMemoryRegion = 110,
    InvalidPriority = 112,
    InvalidCoreId = 113,
    InvalidHandle = 114,
    InvalidPointer = 115,
    InvalidCombination = 116,
    TimedOut = 117,
    Cancelled = 118,
    OutOfRange = 119,
    InvalidEnumValue = 120,
    NotFound = 121,
    Busy = 122,
    SessionClosed = 123,
    NotHandled = 124,
    InvalidState = 125,
    ReservedUsed = 126,
    NotSupported = 127,
    Debug = 128,
    NoThread = 129,
    UnknownThread = 130,
    PortClosed = 131,
    LimitReached = 132,
    InvalidMemoryPool = 133,
}

impl PartialEq<u32> for KernelError {
    fn eq(&self, other: &u32) -> bool {
        *self as u32 == *other
    }
}

impl ToRawResultCode for KernelError {
    fn to_rc(self) -> ResultCode {
        Error::from_parts(Module::Kernel, self as u32).to_raw()
    }
}

/// Runtime error descriptions, packed under [`Module::Runtime`].
///
/// These only surface as raw codes on the abort path; everywhere else the
/// runtime returns typed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RuntimeError {
    /// A calling thread was expected to be owned by the runtime but carries
    /// no valid per-thread record.
    NotOwnedThread = 1,
    /// Caller-supplied input was malformed.
    BadInput = 2,
    /// An allocation or layout did not fit.
    OutOfMemory = 3,
}

impl ToRawResultCode for RuntimeError {
    fn to_rc(self) -> ResultCode {
        Error::from_parts(Module::Runtime, self as u32).to_raw()
    }
}

/// Conversion into a raw result code, for diagnostics and the abort path.
pub trait ToRawResultCode {
    fn to_rc(self) -> ResultCode;
}

#[cfg(test)]
mod tests {
    use super::{KernelError, Module, ToRawResultCode};
    use crate::result::Error;

    #[test]
    fn kernel_error_matches_description() {
        assert!(KernelError::OutOfMemory == 104u32);
        assert!(KernelError::InvalidHandle != 104u32);
    }

    #[test]
    fn kernel_error_round_trips_through_code() {
        let rc = KernelError::TimedOut.to_rc();
        let err = Error::from_parts(Module::Kernel, 117);
        assert_eq!(rc, err.to_raw());
        assert_eq!(err.description(), 117);
    }
}
