//! The fixed per-thread thread-local region.
//!
//! Every Horizon thread owns a 0x200-byte thread-local region (TLR) whose
//! base address is reachable from a CPU thread-ID register. The kernel
//! reserves the first 0x100 bytes for IPC message buffers; the runtime
//! carves the rest up as:
//!
//! ```text
//! 0x100 .. 0x108   reserved
//! 0x108 .. 0x1E0   dynamic TLS slot array (27 pointer-sized cells)
//! 0x1E0 .. 0x200   ThreadVars bookkeeping record
//! ```
//!
//! ## References
//! - [Switchbrew Wiki: Thread Local Region](https://switchbrew.org/wiki/Thread_Local_Region)

use core::{ffi::c_void, ptr::NonNull};

use hos_svc::handle::Handle;

/// Size of the thread-local region.
pub const TLS_REGION_SIZE: usize = 0x200;

/// Size of the [`ThreadVars`] record at the tail of the region.
pub const THREAD_VARS_SIZE: usize = 0x20;

/// Start offset of the dynamic TLS slot array within the region.
pub const USER_TLS_BEGIN: usize = 0x108;

/// End offset (exclusive) of the dynamic TLS slot array.
pub const USER_TLS_END: usize = TLS_REGION_SIZE - THREAD_VARS_SIZE;

/// Number of dynamic TLS slots available to a thread.
pub const NUM_TLS_SLOTS: usize = (USER_TLS_END - USER_TLS_BEGIN) / size_of::<*mut c_void>();

/// Magic value marking an initialized [`ThreadVars`] record.
pub const THREAD_VARS_MAGIC: u32 = 0x21545624; // ASCII: "!TV$"

/// Size of the thread control block that precedes a TLS segment, as assumed
/// by the compiler's thread-pointer addressing.
pub const TCB_SIZE: usize = 2 * size_of::<*mut c_void>();

/// Per-thread bookkeeping record at the tail of the thread-local region.
///
/// Written by the entry trampoline before anything else runs on a new
/// thread; the magic field is what distinguishes runtime-owned threads from
/// foreign ones.
#[derive(Debug)]
#[repr(C)]
pub struct ThreadVars {
    /// Magic value used to check if the struct is initialized.
    pub magic: u32,

    /// Kernel handle of this thread.
    pub handle: Handle,

    /// Pointer to this thread's [`Thread`](crate::Thread) object.
    pub thread_ptr: *mut c_void,

    /// Pointer to this thread's reentrant-state block.
    pub reent: *mut c_void,

    /// Thread pointer for TLS addressing: the TLS segment base minus
    /// [`TCB_SIZE`].
    pub tls_tp: *mut c_void,
}

/// Returns the [`ThreadVars`] record inside the given thread-local region.
#[inline]
pub fn thread_vars_ptr(tls_region: NonNull<u8>) -> *mut ThreadVars {
    // SAFETY: the record is within the 0x200-byte region by construction.
    unsafe { tls_region.as_ptr().add(TLS_REGION_SIZE - THREAD_VARS_SIZE) as *mut ThreadVars }
}

/// Returns the dynamic TLS slot array inside the given thread-local region.
#[inline]
pub fn slots_ptr(tls_region: NonNull<u8>) -> NonNull<*mut c_void> {
    // SAFETY: the array is within the 0x200-byte region by construction and
    // the region base is non-null.
    unsafe { NonNull::new_unchecked(tls_region.as_ptr().add(USER_TLS_BEGIN) as *mut *mut c_void) }
}

impl ThreadVars {
    /// Initializes the record in place.
    ///
    /// # Safety
    /// `vars` must point into the calling thread's own thread-local region,
    /// and nothing else may be reading it concurrently.
    pub unsafe fn init(
        vars: *mut ThreadVars,
        handle: Handle,
        thread_ptr: *mut c_void,
        reent: *mut c_void,
        tls_tp: *mut c_void,
    ) {
        unsafe {
            vars.write(ThreadVars {
                magic: THREAD_VARS_MAGIC,
                handle,
                thread_ptr,
                reent,
                tls_tp,
            });
        }
    }

    /// Returns `true` when the record has been initialized by the runtime.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        // Volatile: another path on this thread (the trampoline) writes the
        // field without synchronization.
        unsafe { core::ptr::read_volatile(&raw const self.magic) == THREAD_VARS_MAGIC }
    }

    /// Reads the thread back-pointer.
    #[inline]
    pub fn thread_ptr(&self) -> *mut c_void {
        unsafe { core::ptr::read_volatile(&raw const self.thread_ptr) }
    }

    /// Reads the kernel handle.
    #[inline]
    pub fn handle(&self) -> Handle {
        unsafe { core::ptr::read_volatile(&raw const self.handle) }
    }

    /// Reads the reentrant-state pointer.
    #[inline]
    pub fn reent(&self) -> *mut c_void {
        unsafe { core::ptr::read_volatile(&raw const self.reent) }
    }
}
