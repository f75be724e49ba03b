//! Page-aligned memory buffers.
//!
//! A stack backing buffer is either allocated by the runtime (and freed when
//! the owning thread is closed) or supplied by the caller (who keeps
//! ownership). Both shapes are erased behind [`MemBuf`].

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::{ffi::c_void, ptr::NonNull};

use crate::alignment::{PAGE_SIZE, is_page_aligned};

/// Trait for memory buffer implementations.
pub trait MemBuf {
    /// Get the pointer to the buffer's memory.
    fn ptr(&self) -> NonNull<c_void>;

    /// Get the size of the buffer in bytes.
    fn size(&self) -> usize;
}

/// Buffer for stack memory that is owned and will be deallocated on drop.
///
/// The memory is zero-initialized and page-aligned.
#[derive(Debug)]
pub struct AlignedBuffer {
    /// The memory layout used for allocation and deallocation.
    layout: Layout,

    /// The pointer to the buffer.
    ptr: NonNull<c_void>,
}

impl AlignedBuffer {
    /// Allocates a new owned buffer of the specified size.
    ///
    /// `size` must be non-zero and a multiple of [`PAGE_SIZE`].
    pub fn alloc(size: usize) -> Result<Self, BufAllocError> {
        if size == 0 {
            return Err(BufAllocError::InvalidSize);
        }
        if !is_page_aligned(size) {
            return Err(BufAllocError::InvalidAlignment);
        }

        // SAFETY: size and alignment were just validated.
        let layout = unsafe { Layout::from_size_align_unchecked(size, PAGE_SIZE) };
        let ptr = unsafe { alloc_zeroed(layout) } as *mut c_void;
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(BufAllocError::AllocationFailed);
        };

        Ok(Self { ptr, layout })
    }

    /// Releases ownership without deallocating; returns the raw pointer.
    ///
    /// The caller becomes responsible for freeing the memory with
    /// [`free_raw`](AlignedBuffer::free_raw) using the same size.
    pub fn leak(self) -> NonNull<c_void> {
        let ptr = self.ptr;
        core::mem::forget(self);
        ptr
    }

    /// Frees memory previously leaked with [`leak`](AlignedBuffer::leak).
    ///
    /// # Safety
    /// `ptr`/`size` must come from exactly one prior `alloc` + `leak` pair
    /// and must not be used afterwards.
    pub unsafe fn free_raw(ptr: NonNull<c_void>, size: usize) {
        // SAFETY: the layout is reconstructible because `alloc` only ever
        // uses page alignment.
        let layout = unsafe { Layout::from_size_align_unchecked(size, PAGE_SIZE) };
        unsafe { dealloc(ptr.as_ptr().cast(), layout) };
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated with the same layout in `alloc`.
        unsafe { dealloc(self.ptr.as_ptr().cast(), self.layout) };
    }
}

impl MemBuf for AlignedBuffer {
    fn ptr(&self) -> NonNull<c_void> {
        self.ptr
    }

    fn size(&self) -> usize {
        self.layout.size()
    }
}

/// Borrowed view of a caller-supplied backing region.
///
/// Dropping it does nothing; the caller keeps ownership.
#[derive(Debug, Clone, Copy)]
pub struct BorrowedBuf {
    ptr: NonNull<c_void>,
    size: usize,
}

impl BorrowedBuf {
    /// Wraps a raw region.
    ///
    /// # Safety
    /// `ptr` must be page-aligned and valid for reads and writes of `size`
    /// bytes (a page multiple) for as long as the buffer is in use.
    pub unsafe fn from_raw_parts(ptr: NonNull<c_void>, size: usize) -> Self {
        Self { ptr, size }
    }
}

impl MemBuf for BorrowedBuf {
    fn ptr(&self) -> NonNull<c_void> {
        self.ptr
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Errors that can occur during buffer allocation.
#[derive(Debug, thiserror::Error)]
pub enum BufAllocError {
    /// Size must be non-zero.
    #[error("Size must be non-zero")]
    InvalidSize,

    /// Size must be a multiple of the page size (4 KiB).
    #[error("Size must be page-aligned (0x1000)")]
    InvalidAlignment,

    /// Memory allocation failed.
    #[error("Memory allocation failed")]
    AllocationFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unaligned_and_zero_sizes() {
        assert!(matches!(
            AlignedBuffer::alloc(0),
            Err(BufAllocError::InvalidSize)
        ));
        assert!(matches!(
            AlignedBuffer::alloc(0x1234),
            Err(BufAllocError::InvalidAlignment)
        ));
    }

    #[test]
    fn allocates_zeroed_page_aligned_memory() {
        let buf = AlignedBuffer::alloc(PAGE_SIZE).unwrap();
        assert_eq!(buf.size(), PAGE_SIZE);
        assert!(is_page_aligned(buf.ptr().as_ptr() as usize));
        let bytes = unsafe {
            core::slice::from_raw_parts(buf.ptr().as_ptr() as *const u8, PAGE_SIZE)
        };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn leak_and_free_round_trip() {
        let buf = AlignedBuffer::alloc(PAGE_SIZE).unwrap();
        let ptr = buf.leak();
        unsafe { AlignedBuffer::free_raw(ptr, PAGE_SIZE) };
    }
}
