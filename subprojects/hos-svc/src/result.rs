//! Result codes for Horizon OS kernel SVC functions.
//!
//! Every syscall returns a 32-bit result code identifying the subsystem that
//! produced it and a description of what happened:
//!
//! - **Bits 0-8:** Module ID
//! - **Bits 9-21:** Description
//! - **Bits 22-31:** Reserved
//!
//! Zero is success. Error codes are conventionally displayed as `2XXX-YYYY`
//! where `XXX` is `2000` + the module number and `YYYY` is the description.
//!
//! # References
//! - [Switchbrew Wiki: Error codes](https://switchbrew.org/wiki/Error_codes)

use crate::error::Module;

/// Type alias for `Result` with [`Error`] as the error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The raw representation of a result code, success included.
pub type ResultCode = u32;

/// The error type for Horizon OS result codes.
///
/// Stores the raw code, which is guaranteed to be non-zero. Formats as
/// `2XXX-YYYY`.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct Error(raw::ResultCode);

impl Error {
    /// Builds an error from a module and a description value.
    pub const fn from_parts(module: Module, description: u32) -> Self {
        Self(raw::ResultCode::from_parts(module, description))
    }

    /// Returns the module that produced the error.
    #[inline]
    pub const fn module(&self) -> u32 {
        self.0.module()
    }

    /// Returns the description value.
    #[inline]
    pub const fn description(&self) -> u32 {
        self.0.description()
    }

    /// Returns the raw `u32` value of this error code.
    #[inline]
    pub const fn to_raw(self) -> ResultCode {
        self.0.to_raw()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:04}", 2000 + self.module(), self.description())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Error")
            .field("code", &format_args!("{}", self))
            .field("module", &self.module())
            .field("description", &self.description())
            .field("raw", &format_args!("{:#x}", self.to_raw()))
            .finish()
    }
}

impl core::error::Error for Error {}

impl From<raw::ResultCode> for Error {
    fn from(value: raw::ResultCode) -> Self {
        Self(value)
    }
}

/// Raw representation of the result code.
// NOTE: For internal use by the typed wrappers.
pub(crate) mod raw {
    use crate::error::Module;

    /// Successful result code.
    const SUCCESS: u32 = 0;

    /// Mask for the module field (9 bits).
    const MODULE_MASK: u32 = 0x1FF;
    /// Mask for the description field (13 bits).
    const DESCRIPTION_MASK: u32 = 0x1FFF;
    /// Shift amount for the description field.
    const DESCRIPTION_SHIFT: u32 = 9;

    /// Encapsulates a Horizon OS result code, allowing it to be separated
    /// into its constituent fields.
    #[derive(Copy, Clone, Eq, PartialEq)]
    #[repr(transparent)]
    pub(crate) struct ResultCode(u32);

    impl ResultCode {
        pub(crate) const fn from_raw(raw: u32) -> Self {
            Self(raw)
        }

        pub(crate) const fn from_parts(module: Module, description: u32) -> Self {
            Self((module as u32 & MODULE_MASK) | ((description & DESCRIPTION_MASK) << DESCRIPTION_SHIFT))
        }

        pub(crate) const fn is_success(self) -> bool {
            self.0 == SUCCESS
        }

        pub(crate) const fn module(self) -> u32 {
            self.0 & MODULE_MASK
        }

        pub(crate) const fn description(self) -> u32 {
            (self.0 >> DESCRIPTION_SHIFT) & DESCRIPTION_MASK
        }

        pub(crate) const fn to_raw(self) -> u32 {
            self.0
        }
    }

    /// Success-or-error view of a raw result code.
    ///
    /// The typed wrappers use this to translate a syscall return value into
    /// an operation-specific error enum:
    ///
    /// `RawResult::from_raw(rc).map(ok_value, |rc| match rc.description() { ... })`
    pub(crate) enum Result {
        Ok,
        Err(ResultCode),
    }

    impl Result {
        pub(crate) const fn from_raw(raw: u32) -> Self {
            let rc = ResultCode::from_raw(raw);
            if rc.is_success() { Self::Ok } else { Self::Err(rc) }
        }

        pub(crate) fn map<T, E>(self, ok: T, err: impl FnOnce(ResultCode) -> E) -> core::result::Result<T, E> {
            match self {
                Self::Ok => Ok(ok),
                Self::Err(rc) => Err(err(rc)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, raw};
    use crate::error::Module;

    #[test]
    fn packs_module_and_description() {
        let rc = raw::ResultCode::from_parts(Module::Kernel, 104);
        assert_eq!(rc.module(), 1);
        assert_eq!(rc.description(), 104);
        assert!(!rc.is_success());
    }

    #[test]
    fn zero_is_success() {
        assert!(raw::ResultCode::from_raw(0).is_success());
        assert!(matches!(raw::Result::from_raw(0), raw::Result::Ok));
    }

    #[test]
    fn display_format() {
        let err = Error::from_parts(Module::Kernel, 114);
        assert_eq!(std::format!("{err}"), "2001-0114");
    }

    extern crate std;
}
