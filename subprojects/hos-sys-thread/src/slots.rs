//! Dynamic TLS slot management.
//!
//! A small fixed pool of pointer-sized slots inside every thread's
//! thread-local region, allocated process-wide. A single-word usage bitmap
//! supports lock-free allocation and free via compare-exchange; a side
//! table records an optional destructor per slot, invoked for the exiting
//! thread during teardown.
//!
//! ## Ordering
//! `claim`/`release` use `AcqRel` on success and `Acquire` on failure,
//! which is enough to order destructor-table accesses against bitmap
//! transitions. Teardown snapshots the bitmap once (`Acquire`) and then
//! reads destructor cells individually; a concurrent [`SlotTable::release`]
//! can still win either side of a single invocation. That race is bounded,
//! not eliminated, and callers of the free operation are warned
//! accordingly.

use core::{
    ffi::c_void,
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crate::tls_region::NUM_TLS_SLOTS;

/// Destructor invoked with a slot's stored value when its thread exits.
pub type SlotDestructor = fn(*mut c_void);

/// Bitmask with the lowest [`NUM_TLS_SLOTS`] bits set.
///
/// Masks out bits beyond the valid slot range so a mask scan never reports
/// an index past the pool.
const VALID_SLOT_MASK: u64 = if NUM_TLS_SLOTS < 64 {
    (1u64 << NUM_TLS_SLOTS) - 1
} else {
    u64::MAX
};

/// Process-wide slot usage bitmap plus destructor table.
///
/// Owned by the runtime context; the per-thread value cells live in each
/// thread's own thread-local region.
pub(crate) struct SlotTable {
    used: AtomicU64,
    /// Destructors, encoded as a raw fn-pointer value (0 = none). A cell is
    /// only meaningful while the matching usage bit is set.
    destructors: [AtomicUsize; NUM_TLS_SLOTS],
}

impl SlotTable {
    pub(crate) const fn new() -> Self {
        Self {
            used: AtomicU64::new(0),
            destructors: [const { AtomicUsize::new(0) }; NUM_TLS_SLOTS],
        }
    }

    /// Claims the lowest free slot, or `None` when the pool is exhausted.
    pub(crate) fn claim_lowest(&self) -> Option<usize> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let free = !current & VALID_SLOT_MASK;
            let slot = free.trailing_zeros() as usize;
            if slot >= NUM_TLS_SLOTS {
                return None;
            }

            match self.used.compare_exchange(
                current,
                current | (1u64 << slot),
                Ordering::AcqRel,  // success: releases prior writes
                Ordering::Acquire, // failure: refresh the mask
            ) {
                Ok(_) => return Some(slot),
                Err(actual) => current = actual,
            }
        }
    }

    /// Clears the destructor for `slot`, then clears its usage bit.
    ///
    /// The order matters: a teardown that still observes the bit as set
    /// must find either the old destructor or none, never a successor's.
    pub(crate) fn release(&self, slot: usize) {
        debug_assert!(slot < NUM_TLS_SLOTS);

        self.destructors[slot].store(0, Ordering::Release);

        let mut current = self.used.load(Ordering::Acquire);
        loop {
            match self.used.compare_exchange(
                current,
                current & !(1u64 << slot),
                Ordering::AcqRel,  // success: releases the destructor clear
                Ordering::Acquire, // failure: refresh the mask
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Publishes the destructor for a claimed slot.
    pub(crate) fn set_destructor(&self, slot: usize, destructor: Option<SlotDestructor>) {
        debug_assert!(slot < NUM_TLS_SLOTS);
        let encoded = destructor.map_or(0, |d| d as usize);
        self.destructors[slot].store(encoded, Ordering::Release);
    }

    /// Reads the destructor registered for `slot`.
    pub(crate) fn destructor(&self, slot: usize) -> Option<SlotDestructor> {
        debug_assert!(slot < NUM_TLS_SLOTS);
        let encoded = self.destructors[slot].load(Ordering::Acquire);
        if encoded == 0 {
            None
        } else {
            // SAFETY: non-zero cells only ever hold values produced from a
            // `SlotDestructor` in `set_destructor`.
            Some(unsafe { core::mem::transmute::<usize, SlotDestructor>(encoded) })
        }
    }

    /// Snapshot of the usage bitmap.
    pub(crate) fn snapshot(&self) -> u64 {
        self.used.load(Ordering::Acquire) & VALID_SLOT_MASK
    }

    /// Runs the exit-time destructor pass over a thread's slot array.
    ///
    /// The bitmap is snapshotted once; for every slot in use (ascending
    /// index order) holding a non-null value, the value is replaced with
    /// null and the registered destructor, if any, is invoked with it —
    /// exactly once per slot.
    ///
    /// # Safety
    /// `slots` must point at the calling thread's own slot array; no other
    /// thread may be writing it.
    pub(crate) unsafe fn run_destructors(&self, slots: NonNull<*mut c_void>) {
        let used = self.snapshot();
        // SAFETY: the mask is bounded by VALID_SLOT_MASK and the array
        // covers NUM_TLS_SLOTS cells.
        let iter = unsafe { UsedSlotsIterMut::new(slots.as_ptr(), used) };
        for (slot, cell) in iter {
            let value = core::mem::replace(cell, core::ptr::null_mut());
            if value.is_null() {
                continue;
            }
            if let Some(dtor) = self.destructor(slot) {
                dtor(value);
            }
        }
    }
}

/// Mutable iterator over the **used** cells of one thread's slot array.
///
/// Yields `(slot, &mut cell)` in ascending slot order. The usage mask is
/// fixed at creation time; slots allocated or freed afterwards are not
/// reflected.
pub(crate) struct UsedSlotsIterMut<'a> {
    mask: u64,
    slots_ptr: *mut *mut c_void,
    _marker: PhantomData<&'a mut [*mut c_void]>,
}

impl<'a> UsedSlotsIterMut<'a> {
    /// # Safety
    /// Every set bit in `mask` must index into the array behind
    /// `slots_ptr`, and the iterator must have exclusive access to it.
    pub(crate) unsafe fn new(slots_ptr: *mut *mut c_void, mask: u64) -> Self {
        Self {
            mask: mask & VALID_SLOT_MASK,
            slots_ptr,
            _marker: PhantomData,
        }
    }
}

impl<'a> Iterator for UsedSlotsIterMut<'a> {
    type Item = (usize, &'a mut *mut c_void);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.mask == 0 {
            return None;
        }
        let i = self.mask.trailing_zeros() as usize;

        // Clear the lowest set bit.
        self.mask &= !(1u64 << i);

        // SAFETY: `i` comes from the mask, which only covers valid indices.
        let cell = unsafe { &mut *self.slots_ptr.add(i) };
        Some((i, cell))
    }
}

/// Error type for slot value access.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    /// The slot index is outside the pool.
    #[error("TLS slot index out of bounds: {0}")]
    OutOfBounds(usize),
}

impl<P: hos_svc::kernel::Kernel + hos_sys_mem::vspace::StackSpace + 'static> crate::rt::ThreadRt<P> {
    /// Allocates a dynamic TLS slot, or returns `None` when all
    /// [`NUM_TLS_SLOTS`] are in use.
    ///
    /// The new slot reads as null everywhere: the calling thread's cell is
    /// nulled directly, then — under the registry lock — the cell of every
    /// registered thread, so no thread observes a value left behind by a
    /// previous occupant of the slot id. The destructor is published only
    /// after that walk.
    pub fn tls_slot_alloc(&self, destructor: Option<SlotDestructor>) -> Option<usize> {
        let slot = self.slots.claim_lowest()?;

        let _ = self.tls_set(slot, core::ptr::null_mut());

        // SAFETY: cells of other threads are only written under the
        // registry lock, here and nowhere else.
        unsafe {
            self.registry.for_each(|thread| {
                if let Some(cells) = thread.tls_slots {
                    // SAFETY: index validated by the claim; the cell belongs
                    // to a registered (live) thread.
                    unsafe {
                        core::ptr::write_volatile(cells.as_ptr().add(slot), core::ptr::null_mut());
                    }
                }
            });
        }

        self.slots.set_destructor(slot, destructor);

        #[cfg(feature = "log")]
        log::trace!("TLS slot {slot} allocated");

        Some(slot)
    }

    /// Frees a dynamic TLS slot: clears its destructor, then its usage bit.
    ///
    /// No destructors run and no live thread's cell is cleared. A value a
    /// thread still stores for this id is orphaned — and if the id is
    /// reallocated, that stale value stays visible to its thread until the
    /// new allocation's registry walk nulls it. Callers who need cleanup
    /// must run it before freeing the slot.
    pub fn tls_slot_free(&self, slot: usize) -> Result<(), SlotError> {
        if slot >= NUM_TLS_SLOTS {
            return Err(SlotError::OutOfBounds(slot));
        }
        self.slots.release(slot);

        #[cfg(feature = "log")]
        log::trace!("TLS slot {slot} freed");

        Ok(())
    }

    /// Reads the calling thread's value for `slot`.
    ///
    /// Thread-local access, no locking. Passing an id that was never
    /// allocated reads a (null-initialized) cell; that is the caller's
    /// lookout.
    pub fn tls_get(&self, slot: usize) -> Result<*mut c_void, SlotError> {
        if slot >= NUM_TLS_SLOTS {
            return Err(SlotError::OutOfBounds(slot));
        }
        let cells = crate::tls_region::slots_ptr(self.provider.tls_region_ptr());
        // SAFETY: index validated above; the cell belongs to this thread.
        Ok(unsafe { core::ptr::read_volatile(cells.as_ptr().add(slot)) })
    }

    /// Writes the calling thread's value for `slot`.
    ///
    /// Thread-local access, no locking.
    pub fn tls_set(&self, slot: usize, value: *mut c_void) -> Result<(), SlotError> {
        if slot >= NUM_TLS_SLOTS {
            return Err(SlotError::OutOfBounds(slot));
        }
        let cells = crate::tls_region::slots_ptr(self.provider.tls_region_ptr());
        // SAFETY: index validated above; the cell belongs to this thread.
        unsafe { core::ptr::write_volatile(cells.as_ptr().add(slot), value) };
        Ok(())
    }
}
