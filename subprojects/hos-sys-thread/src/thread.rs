//! The thread object.

use core::{ffi::c_void, ptr::NonNull};

use hos_svc::handle::Handle;

use crate::registry::ThreadKey;

/// A kernel thread managed by the runtime.
///
/// The object must stay at a stable address from
/// [`create`](crate::ThreadRt::create) until [`close`](crate::ThreadRt::close):
/// the entry trampoline and exit teardown reach it through a raw pointer
/// stored on the new thread's stack.
///
/// `handle` and `stack` are written by the creator; `tls_slots` and
/// `registration` are written by the thread itself (trampoline and
/// teardown, under the registry lock). A `Some` in `tls_slots` is the
/// registry-membership signal.
pub struct Thread {
    pub(crate) handle: Handle,
    pub(crate) stack: ThreadStackMem,
    pub(crate) tls_slots: Option<NonNull<*mut c_void>>,
    pub(crate) registration: Option<ThreadKey>,
}

// SAFETY: the raw pointers inside are either private bookkeeping the
// runtime synchronizes via the registry lock, or stack ranges only touched
// through the lifecycle contract. Moving the struct between threads (e.g.
// creating on one thread, waiting on another) is fine.
unsafe impl Send for Thread {}

impl Thread {
    /// A blank, not-yet-created thread record to pass to
    /// [`create`](crate::ThreadRt::create).
    pub const fn new() -> Self {
        Self {
            handle: unsafe { Handle::from_raw(hos_svc::handle::INVALID_HANDLE) },
            stack: ThreadStackMem::Vacant,
            tls_slots: None,
            registration: None,
        }
    }

    /// The kernel handle, valid after a successful create.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Usable stack size (entry-args block excluded), or 0 before create.
    pub fn stack_size(&self) -> usize {
        self.stack.stack_size()
    }

    /// Best-effort registry-membership check: `true` between the
    /// trampoline's registration and exit teardown.
    ///
    /// Read without synchronization; only meaningful once the caller has
    /// otherwise observed the relevant transition (e.g. after
    /// [`wait_for_exit`](crate::ThreadRt::wait_for_exit)).
    pub fn is_registered(&self) -> bool {
        // Volatile: written by the thread itself, read by its manager.
        unsafe { core::ptr::read_volatile(&raw const self.tls_slots).is_some() }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack memory of a created thread.
///
/// Both live variants carry the backing-memory base, the mapped mirror
/// base and the page-rounded mapped size; close() unmaps exactly that
/// range. `Owned` additionally obliges close() to free the backing memory.
pub enum ThreadStackMem {
    /// No stack yet (the record has not been through create).
    Vacant,

    /// Backing memory allocated, and freed, by the runtime.
    Owned {
        /// Backing memory base.
        mem: NonNull<c_void>,
        /// Mapped mirror base (the execution stack).
        mirror: NonNull<c_void>,
        /// Page-rounded mapped size.
        map_size: usize,
        /// Usable stack size.
        stack_size: usize,
    },

    /// Backing memory supplied, and owned, by the caller.
    Provided {
        /// Backing memory base.
        mem: NonNull<c_void>,
        /// Mapped mirror base (the execution stack).
        mirror: NonNull<c_void>,
        /// Page-rounded mapped size.
        map_size: usize,
        /// Usable stack size.
        stack_size: usize,
    },
}

impl ThreadStackMem {
    /// Returns `true` when close() must free the backing memory.
    pub fn is_owned(&self) -> bool {
        matches!(self, ThreadStackMem::Owned { .. })
    }

    /// Usable stack size, or 0 for [`ThreadStackMem::Vacant`].
    pub fn stack_size(&self) -> usize {
        match self {
            ThreadStackMem::Vacant => 0,
            ThreadStackMem::Owned { stack_size, .. }
            | ThreadStackMem::Provided { stack_size, .. } => *stack_size,
        }
    }

    /// Mirror base, if mapped.
    pub fn mirror_ptr(&self) -> Option<NonNull<c_void>> {
        match self {
            ThreadStackMem::Vacant => None,
            ThreadStackMem::Owned { mirror, .. } | ThreadStackMem::Provided { mirror, .. } => {
                Some(*mirror)
            }
        }
    }
}
