//! Memory management SVCs.
//!
//! Typed wrappers over the page-granularity mapping syscalls the thread
//! runtime uses to mirror stack memory, plus the memory-query call the
//! virtual-range allocator scans with.

use bitflags::bitflags;

use crate::result::Error;
#[cfg(target_os = "horizon")]
use crate::{
    error::KernelError as KError,
    raw,
    result::raw::Result as RawResult,
};
#[cfg(target_os = "horizon")]
use core::ffi::c_void;

/// Memory region information, as filled in by the query syscall.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryInfo {
    /// Base address of the region.
    pub addr: usize,
    /// Size of the region, in bytes.
    pub size: usize,
    /// Memory type (low 8 bits) and state flags.
    pub typ: u32,
    /// Memory attributes.
    pub attr: u32,
    /// Memory permissions.
    pub perm: u32,
    /// IPC reference count.
    pub ipc_refcount: u32,
    /// Device reference count.
    pub device_refcount: u32,
    padding: u32,
}

impl MemoryInfo {
    /// Memory type value for unmapped (free) address space.
    pub const TYPE_FREE: u32 = 0x0;

    /// Returns `true` when the queried region is unmapped address space.
    pub fn is_free(&self) -> bool {
        self.typ & 0xFF == Self::TYPE_FREE
    }
}

bitflags! {
    /// Memory permission bitflags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryPermission: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const DONT_CARE = 1 << 28;
    }
}

/// Error type for [`map_memory`] operations.
#[derive(Debug, thiserror::Error)]
pub enum MapMemoryError {
    /// The size is zero or not page-aligned.
    #[error("Invalid size")]
    InvalidSize,
    /// An address is not page-aligned or outside the address space.
    #[error("Invalid address")]
    InvalidAddress,
    /// The source range is not in a mappable state.
    #[error("Invalid memory state")]
    InvalidCurrentMemory,
    /// The destination range does not lie in the stack region.
    #[error("Invalid memory region")]
    InvalidMemoryRegion,
    /// The kernel ran out of memory for page tables.
    #[error("Out of resource")]
    OutOfResource,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for [`unmap_memory`] operations.
#[derive(Debug, thiserror::Error)]
pub enum UnmapMemoryError {
    /// The size is zero or not page-aligned.
    #[error("Invalid size")]
    InvalidSize,
    /// An address is not page-aligned or outside the address space.
    #[error("Invalid address")]
    InvalidAddress,
    /// The ranges do not describe an existing mapping.
    #[error("Invalid memory state")]
    InvalidCurrentMemory,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for [`query_memory`] operations.
#[derive(Debug, thiserror::Error)]
pub enum QueryMemoryError {
    /// Any unforeseen kernel error. The query itself accepts any address.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Maps `size` bytes from `src` into `dst`.
///
/// `dst` must lie inside the process stack region; the kernel re-protects
/// the source pages while the mapping is live.
#[cfg(target_os = "horizon")]
pub fn map_memory(
    dst: core::ptr::NonNull<c_void>,
    src: core::ptr::NonNull<c_void>,
    size: usize,
) -> Result<(), MapMemoryError> {
    let rc = unsafe { raw::map_memory(dst.as_ptr(), src.as_ptr(), size) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidSize == desc => MapMemoryError::InvalidSize,
        desc if KError::InvalidAddress == desc => MapMemoryError::InvalidAddress,
        desc if KError::InvalidCurrentMemory == desc => MapMemoryError::InvalidCurrentMemory,
        desc if KError::InvalidMemoryRegion == desc => MapMemoryError::InvalidMemoryRegion,
        desc if KError::OutOfResource == desc => MapMemoryError::OutOfResource,
        _ => MapMemoryError::Unknown(rc.into()),
    })
}

/// Reverses a prior [`map_memory`] call.
///
/// # Safety
/// The arguments must match the original mapping exactly; the destination
/// range must no longer be in use as a stack.
#[cfg(target_os = "horizon")]
pub unsafe fn unmap_memory(
    dst: core::ptr::NonNull<c_void>,
    src: core::ptr::NonNull<c_void>,
    size: usize,
) -> Result<(), UnmapMemoryError> {
    let rc = unsafe { raw::unmap_memory(dst.as_ptr(), src.as_ptr(), size) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidSize == desc => UnmapMemoryError::InvalidSize,
        desc if KError::InvalidAddress == desc => UnmapMemoryError::InvalidAddress,
        desc if KError::InvalidCurrentMemory == desc => UnmapMemoryError::InvalidCurrentMemory,
        _ => UnmapMemoryError::Unknown(rc.into()),
    })
}

/// Queries the memory region containing `addr`.
///
/// Returns the region information together with the page information word.
#[cfg(target_os = "horizon")]
pub fn query_memory(addr: usize) -> Result<(MemoryInfo, u32), QueryMemoryError> {
    let mut info = core::mem::MaybeUninit::<MemoryInfo>::uninit();
    let mut page_info: u32 = 0;
    let rc = unsafe { raw::query_memory(info.as_mut_ptr(), &mut page_info, addr) };
    RawResult::from_raw(rc).map(
        // SAFETY: the kernel filled the struct on success.
        (unsafe { info.assume_init() }, page_info),
        |rc| QueryMemoryError::Unknown(rc.into()),
    )
}
