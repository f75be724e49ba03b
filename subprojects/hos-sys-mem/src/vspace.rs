//! Guard-paged stack range reservation.
//!
//! The mirror a stack buffer is mapped into must come out of the process
//! stack region, with unmapped guard space on both sides so that an overflow
//! faults instead of silently corrupting a neighbour. [`StackSpace`] is the
//! capability the runtime consumes for that; on the real target it is backed
//! by a scanner over the kernel-reported stack region.

use core::{ffi::c_void, ptr::NonNull};

/// Unmapped guard space kept on each side of a reserved stack range.
pub const GUARD_SIZE: usize = 0x4000;

/// Allocator of guard-paged address ranges for stack mirrors.
pub trait StackSpace: Sync {
    /// Reserves a free range of `size` bytes in the stack region, with
    /// [`GUARD_SIZE`] of unmapped space on both sides. Returns `None` when
    /// no such range exists.
    fn reserve_stack_range(&self, size: usize) -> Option<NonNull<c_void>>;

    /// Releases a range previously returned by
    /// [`reserve_stack_range`](StackSpace::reserve_stack_range).
    ///
    /// # Safety
    /// The range must no longer have anything mapped into it and must not be
    /// released twice.
    unsafe fn release_stack_range(&self, range: NonNull<c_void>, size: usize);
}

#[cfg(target_os = "horizon")]
mod horizon {
    use alloc::vec::Vec;
    use core::{ffi::c_void, ptr::NonNull};

    use hos_svc::{
        kernel::Horizon,
        mem,
        misc::{self, InfoType},
    };
    use spin::Mutex;

    use super::{GUARD_SIZE, StackSpace};

    /// Process stack region bounds, queried from the kernel once.
    #[derive(Clone, Copy)]
    struct StackRegion {
        start: usize,
        end: usize,
    }

    /// First-fit scanner over the stack region.
    ///
    /// The kernel only knows about mappings, not about ranges we have
    /// promised to threads that have not been mapped yet, so reservations
    /// are tracked here and consulted alongside the kernel's own view.
    struct Scanner {
        region: Option<StackRegion>,
        /// Reserved ranges as (base, size), guard space excluded.
        reservations: Vec<(usize, usize)>,
    }

    impl Scanner {
        const fn new() -> Self {
            Self {
                region: None,
                reservations: Vec::new(),
            }
        }

        fn region(&mut self) -> Option<StackRegion> {
            if self.region.is_none() {
                let start = misc::get_info(InfoType::StackRegionAddress).ok()? as usize;
                let size = misc::get_info(InfoType::StackRegionSize).ok()? as usize;
                self.region = Some(StackRegion {
                    start,
                    end: start.checked_add(size)?,
                });
            }
            self.region
        }

        /// Returns the end of a reservation (guards included) overlapping
        /// `[start, end)`, if any.
        fn reservation_conflict(&self, start: usize, end: usize) -> Option<usize> {
            self.reservations
                .iter()
                .filter(|&&(base, size)| {
                    let r_start = base - GUARD_SIZE;
                    let r_end = base + size + GUARD_SIZE;
                    start < r_end && r_start < end
                })
                .map(|&(base, size)| base + size + GUARD_SIZE)
                .max()
        }

        fn find_free(&mut self, size: usize) -> Option<usize> {
            let region = self.region()?;
            let total = size.checked_add(2 * GUARD_SIZE)?;

            let mut candidate = region.start;
            'scan: while candidate.checked_add(total)? <= region.end {
                if let Some(skip_to) = self.reservation_conflict(candidate, candidate + total) {
                    candidate = skip_to;
                    continue;
                }

                // Probe the kernel's mappings across the whole candidate
                // window, guards included.
                let mut probe = candidate;
                while probe < candidate + total {
                    let (info, _) = mem::query_memory(probe).ok()?;
                    if !info.is_free() {
                        candidate = info.addr.checked_add(info.size)?;
                        continue 'scan;
                    }
                    probe = info.addr.checked_add(info.size)?;
                }

                let base = candidate + GUARD_SIZE;
                self.reservations.push((base, size));
                return Some(base);
            }

            None
        }

        fn release(&mut self, base: usize, size: usize) {
            if let Some(pos) = self
                .reservations
                .iter()
                .position(|&(b, s)| b == base && s == size)
            {
                self.reservations.swap_remove(pos);
            }
        }
    }

    static VSPACE: Mutex<Scanner> = Mutex::new(Scanner::new());

    impl StackSpace for Horizon {
        fn reserve_stack_range(&self, size: usize) -> Option<NonNull<c_void>> {
            let base = VSPACE.lock().find_free(size)?;
            NonNull::new(base as *mut c_void)
        }

        unsafe fn release_stack_range(&self, range: NonNull<c_void>, size: usize) {
            VSPACE.lock().release(range.as_ptr() as usize, size);
        }
    }
}
