//! The module's TLS load image.
//!
//! A TLS segment has two parts: initialized data that is copied into every
//! new thread's TLS block, and zero-initialized data that follows it. The
//! embedder describes both at runtime construction (on the real target the
//! linker provides the addresses and sizes); installing the image into a
//! fresh block performs the copy and the zero fill.

use core::ptr::NonNull;

use hos_sys_mem::alignment::round_up_to_16;

/// Description of the TLS load image.
#[derive(Debug, Clone, Copy)]
pub struct TlsImage {
    base: *const u8,
    load_size: usize,
    mem_size: usize,
}

// SAFETY: the image points at immutable initialized data (on the real
// target, the load segment emitted by the linker); it is only ever read.
unsafe impl Send for TlsImage {}
unsafe impl Sync for TlsImage {}

impl TlsImage {
    /// An empty image, for modules without TLS data.
    pub const fn empty() -> Self {
        Self {
            base: core::ptr::null(),
            load_size: 0,
            mem_size: 0,
        }
    }

    /// Describes a TLS image.
    ///
    /// `load_size` is the initialized prefix; `mem_size` the full segment
    /// size including the zero-initialized tail.
    ///
    /// # Safety
    /// `base` must be valid for reads of `load_size` bytes for the lifetime
    /// of the runtime, and `load_size <= mem_size`.
    pub const unsafe fn from_raw_parts(base: *const u8, load_size: usize, mem_size: usize) -> Self {
        Self {
            base,
            load_size,
            mem_size,
        }
    }

    /// Full segment size, including the zero-initialized tail.
    pub const fn mem_size(&self) -> usize {
        self.mem_size
    }

    /// Segment size rounded up to the 16-byte layout unit.
    pub const fn segment_size(&self) -> usize {
        round_up_to_16(self.mem_size)
    }

    /// Installs the image into a fresh TLS block: copies the initialized
    /// prefix and zero-fills the rest of [`segment_size`](Self::segment_size).
    ///
    /// # Safety
    /// `dst` must be valid for writes of `segment_size()` bytes and must not
    /// overlap the image.
    pub unsafe fn install(&self, dst: NonNull<u8>) {
        let segment = self.segment_size();
        unsafe {
            if self.load_size > 0 {
                core::ptr::copy_nonoverlapping(self.base, dst.as_ptr(), self.load_size);
            }
            if segment > self.load_size {
                core::ptr::write_bytes(dst.as_ptr().add(self.load_size), 0, segment - self.load_size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_copies_and_zero_fills() {
        static IMAGE: [u8; 5] = [1, 2, 3, 4, 5];
        let image = unsafe { TlsImage::from_raw_parts(IMAGE.as_ptr(), IMAGE.len(), 24) };
        assert_eq!(image.segment_size(), 32);

        let mut block = [0xEEu8; 32];
        let dst = core::ptr::NonNull::new(block.as_mut_ptr()).unwrap();
        unsafe { image.install(dst) };

        assert_eq!(&block[..5], &[1, 2, 3, 4, 5]);
        assert!(block[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_image_has_no_segment() {
        assert_eq!(TlsImage::empty().segment_size(), 0);
    }
}
