//! Synchronization SVCs.
//!
//! The runtime only needs single-object waits: blocking on a thread handle
//! until the thread terminates and the kernel signals it.

use crate::result::Error;
#[cfg(target_os = "horizon")]
use crate::{
    error::KernelError as KError,
    handle::Handle,
    raw,
    result::raw::Result as RawResult,
};

/// Error type for the wait syscall.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The supplied handle is invalid, or a pseudo handle was passed.
    #[error("Invalid handle")]
    InvalidHandle,
    /// The wait timed out. Does not occur with an infinite timeout.
    #[error("Operation timed out")]
    TimedOut,
    /// The wait was cancelled from another thread.
    #[error("Wait cancelled")]
    Cancelled,
    /// The handle count was out of range (unreachable for a single handle).
    #[error("Out of range")]
    OutOfRange,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Blocks until `handle` becomes signalled or `timeout_ns` elapses.
///
/// `u64::MAX` waits forever. For a thread handle, signalled means the thread
/// has fully exited.
///
/// # Safety
/// `handle` must be a real handle owned by the current process, not one of
/// the pseudo handles.
#[cfg(target_os = "horizon")]
pub unsafe fn wait_synchronization_single(
    handle: Handle,
    timeout_ns: u64,
) -> Result<(), WaitError> {
    let raw_handle = handle.to_raw();
    let mut index: i32 = -1;
    let rc = unsafe { raw::wait_synchronization(&mut index, &raw_handle, 1, timeout_ns) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidHandle == desc => WaitError::InvalidHandle,
        desc if KError::TimedOut == desc => WaitError::TimedOut,
        desc if KError::Cancelled == desc => WaitError::Cancelled,
        desc if KError::OutOfRange == desc => WaitError::OutOfRange,
        _ => WaitError::Unknown(rc.into()),
    })
}
