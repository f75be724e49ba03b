//! Stack memory mapping.
//!
//! A thread's execution stack is not the backing memory itself: the backing
//! buffer is mapped into a guard-paged range reserved in the process stack
//! region (the "mirror"), and the thread runs on the mirror addresses. The
//! types here track that state transition so partially acquired resources
//! unwind correctly:
//!
//! 1. [`UnmappedStackMemory`] — backing buffer exists, nothing mapped.
//!    Dropping it frees owned backing memory.
//! 2. [`map`] — reserves a mirror range and maps the buffer into it. On
//!    mapping failure the reservation is released before returning.
//! 3. [`MappedStackMemory`] — live mapping. [`MappedStackMemory::leak`]
//!    hands the raw parts to the thread object, which owns them until the
//!    thread is closed.

use core::{ffi::c_void, ptr::NonNull};

use hos_svc::{
    kernel::Kernel,
    mem::{MapMemoryError, UnmapMemoryError},
};

use crate::{
    buf::{AlignedBuffer, BorrowedBuf, BufAllocError, MemBuf},
    vspace::StackSpace,
};

/// Backing buffer for a stack mapping, owned or caller-supplied.
#[derive(Debug)]
pub enum StackBuffer {
    /// Allocated by the runtime; freed when dropped or when the owning
    /// thread is closed.
    Owned(AlignedBuffer),
    /// Supplied by the caller, who keeps ownership.
    Borrowed(BorrowedBuf),
}

impl MemBuf for StackBuffer {
    fn ptr(&self) -> NonNull<c_void> {
        match self {
            Self::Owned(buf) => buf.ptr(),
            Self::Borrowed(buf) => buf.ptr(),
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Owned(buf) => buf.size(),
            Self::Borrowed(buf) => buf.size(),
        }
    }
}

/// Stack memory that has been allocated but not yet mapped.
#[derive(Debug)]
pub struct UnmappedStackMemory {
    buffer: StackBuffer,
}

impl UnmappedStackMemory {
    /// Allocates a fresh zeroed backing buffer of `size` bytes (a page
    /// multiple).
    pub fn alloc_owned(size: usize) -> Result<Self, BufAllocError> {
        Ok(Self {
            buffer: StackBuffer::Owned(AlignedBuffer::alloc(size)?),
        })
    }

    /// Wraps a caller-supplied backing region.
    ///
    /// # Safety
    /// `ptr` must be page-aligned and valid for reads and writes of `size`
    /// bytes (a page multiple) until the thread using it is closed.
    pub unsafe fn from_provided(ptr: NonNull<c_void>, size: usize) -> Self {
        Self {
            buffer: StackBuffer::Borrowed(unsafe { BorrowedBuf::from_raw_parts(ptr, size) }),
        }
    }
}

/// Stack memory mapped into a reserved mirror range.
#[derive(Debug)]
pub struct MappedStackMemory {
    buffer: StackBuffer,
    mirror: NonNull<c_void>,
}

impl MappedStackMemory {
    /// Returns the pointer to the mapped mirror (the execution stack).
    pub fn mirror_ptr(&self) -> NonNull<c_void> {
        self.mirror
    }

    /// Returns the pointer to the backing memory.
    pub fn backing_ptr(&self) -> NonNull<c_void> {
        self.buffer.ptr()
    }

    /// Returns the mapped size.
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    /// Returns `true` when the backing memory is runtime-owned.
    pub fn is_owned(&self) -> bool {
        matches!(self.buffer, StackBuffer::Owned(_))
    }

    /// Releases ownership of mapping and buffer to the caller.
    ///
    /// Nothing is unmapped or freed; the returned parts must eventually be
    /// unmapped, have their reservation released, and (if owned) be freed.
    pub fn leak(self) -> RawStackParts {
        let parts = RawStackParts {
            backing: self.buffer.ptr(),
            mirror: self.mirror,
            size: self.buffer.size(),
            owned: self.is_owned(),
        };
        if let StackBuffer::Owned(buf) = self.buffer {
            let _ = buf.leak();
        }
        parts
    }
}

/// Raw parts of a leaked stack mapping.
#[derive(Debug, Clone, Copy)]
pub struct RawStackParts {
    /// Backing memory base.
    pub backing: NonNull<c_void>,
    /// Mirror range base.
    pub mirror: NonNull<c_void>,
    /// Mapped size (page multiple).
    pub size: usize,
    /// Whether the backing memory is runtime-owned.
    pub owned: bool,
}

/// Errors that can occur when mapping stack memory.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// No free range of the requested size in the process stack region.
    #[error("Failed to reserve a virtual address range for the stack mirror")]
    VirtAddrAllocFailed,

    /// System call to map memory failed.
    #[error(transparent)]
    Svc(#[from] MapMemoryError),
}

/// Errors that can occur when unmapping stack memory.
#[derive(Debug, thiserror::Error)]
pub enum UnmapError {
    /// System call to unmap memory failed.
    #[error(transparent)]
    Svc(#[from] UnmapMemoryError),
}

/// Maps the backing buffer into a freshly reserved mirror range.
///
/// On mapping failure the reservation is released and the buffer is dropped
/// (freeing it when owned).
///
/// # Safety
/// The buffer must not be mapped elsewhere, and for a borrowed buffer the
/// caller's validity guarantees must still hold.
pub unsafe fn map<P>(provider: &P, sm: UnmappedStackMemory) -> Result<MappedStackMemory, MapError>
where
    P: Kernel + StackSpace,
{
    let UnmappedStackMemory { buffer } = sm;
    let size = buffer.size();

    let Some(mirror) = provider.reserve_stack_range(size) else {
        return Err(MapError::VirtAddrAllocFailed);
    };

    if let Err(err) = provider.map_stack_memory(mirror, buffer.ptr(), size) {
        // SAFETY: nothing was mapped into the range.
        unsafe { provider.release_stack_range(mirror, size) };
        return Err(err.into());
    }

    Ok(MappedStackMemory { buffer, mirror })
}

/// Unmaps the mirror and releases its reservation, yielding back the
/// unmapped buffer.
///
/// If the unmap syscall fails the mapping is still live; the buffer is
/// deliberately leaked (freeing it would pull memory out from under the
/// mapping) and the error is returned.
///
/// # Safety
/// No thread may still be running on the mirror.
pub unsafe fn unmap<P>(
    provider: &P,
    sm: MappedStackMemory,
) -> Result<UnmappedStackMemory, UnmapError>
where
    P: Kernel + StackSpace,
{
    let MappedStackMemory { buffer, mirror } = sm;
    let size = buffer.size();

    if let Err(err) = unsafe { provider.unmap_stack_memory(mirror, buffer.ptr(), size) } {
        if let StackBuffer::Owned(buf) = buffer {
            let _ = buf.leak();
        }
        return Err(err.into());
    }

    // SAFETY: the range is no longer backed by the mapping.
    unsafe { provider.release_stack_range(mirror, size) };

    Ok(UnmappedStackMemory { buffer })
}
