//! Per-thread reentrant state.
//!
//! Each thread carries a fixed-size block of reentrant C library state in
//! the tail of its stack allocation. The runtime only interprets a small
//! typed prefix of it — the error slot and the standard stream handles that
//! a new thread inherits from its creator — and treats the remainder as
//! opaque storage that starts out zeroed.

use core::{ffi::c_void, ptr::NonNull};

/// Size of the reentrant-state block.
///
/// This must match the C library's reentrancy structure for the target
/// configuration; for the current AArch64 build that is 352 bytes (already
/// a 16-byte multiple). Verify whenever the C library is updated.
pub const REENT_SIZE: usize = 352;

/// Typed prefix of the reentrant-state block.
#[derive(Debug)]
#[repr(C)]
pub struct ReentBlock {
    /// Per-thread error slot.
    pub errno: i32,
    _pad: i32,
    /// Standard input handle.
    pub stdin: *mut c_void,
    /// Standard output handle.
    pub stdout: *mut c_void,
    /// Standard error handle.
    pub stderr: *mut c_void,
}

impl ReentBlock {
    /// Initializes a block in place: zero-fills all [`REENT_SIZE`] bytes,
    /// then copies the standard stream handles from `parent` (the creating
    /// thread's block) when one is available.
    ///
    /// # Safety
    /// `dst` must be valid for writes of [`REENT_SIZE`] bytes and 16-byte
    /// aligned; `parent` (when `Some`) must point at an initialized block.
    pub unsafe fn init(dst: NonNull<u8>, parent: Option<NonNull<ReentBlock>>) {
        unsafe {
            core::ptr::write_bytes(dst.as_ptr(), 0, REENT_SIZE);

            if let Some(parent) = parent {
                let parent = parent.as_ref();
                let block = &mut *(dst.as_ptr() as *mut ReentBlock);
                block.stdin = parent.stdin;
                block.stdout = parent.stdout;
                block.stderr = parent.stderr;
            }
        }
    }
}
