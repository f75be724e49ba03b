//! Miscellaneous SVCs.

use crate::result::Error;
#[cfg(target_os = "horizon")]
use crate::{
    error::KernelError as KError,
    handle::{CUR_PROCESS_HANDLE, Handle},
    raw,
    result::raw::Result as RawResult,
};

/// Info ids accepted by the get-info syscall, limited to the ones this
/// runtime consumes.
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub enum InfoType {
    /// Base address of the process stack region.
    StackRegionAddress = 14,
    /// Size of the process stack region.
    StackRegionSize = 15,
}

/// Error type for [`get_info`].
#[derive(Debug, thiserror::Error)]
pub enum GetInfoError {
    /// The info id or sub id is not recognized.
    #[error("Invalid enum value")]
    InvalidEnumValue,
    /// The supplied handle is invalid.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Retrieves a process information value for the current process.
#[cfg(target_os = "horizon")]
pub fn get_info(info_type: InfoType) -> Result<u64, GetInfoError> {
    let mut out: u64 = 0;
    // SAFETY: the pseudo handle always refers to the current process.
    let handle = unsafe { Handle::from_raw(CUR_PROCESS_HANDLE) };
    let rc = unsafe { raw::get_info(&mut out, info_type as u32, handle.to_raw(), 0) };
    RawResult::from_raw(rc).map(out, |rc| match rc.description() {
        desc if KError::InvalidEnumValue == desc => GetInfoError::InvalidEnumValue,
        desc if KError::InvalidHandle == desc => GetInfoError::InvalidHandle,
        _ => GetInfoError::Unknown(rc.into()),
    })
}
