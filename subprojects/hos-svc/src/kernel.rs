//! The kernel capability interface.
//!
//! The thread runtime core does not call syscalls directly; it consumes the
//! kernel through this trait, injected at runtime-context construction. On
//! the real target [`Horizon`] forwards every operation to the typed SVC
//! wrappers; tests substitute their own implementation.

use core::{ffi::c_void, ptr::NonNull};

use crate::{
    handle::Handle,
    mem::{MapMemoryError, UnmapMemoryError},
    result::ResultCode,
    sync::WaitError,
    thread::{
        CloseHandleError, CreateThreadError, GetContextError, SetThreadActivityError,
        StartThreadError, ThreadActivity, ThreadContext,
    },
};

/// Entry point signature the kernel starts a new thread at.
pub type RawThreadEntry = unsafe extern "C" fn(*mut c_void);

/// The opaque memory/thread capability provider.
///
/// One implementor stands in for the kernel: page-granular stack mapping,
/// the thread lifecycle syscalls, the current thread's fixed thread-local
/// region, and the terminal abort sink. All operations are infallibly
/// non-blocking except [`wait_thread_exit`], which blocks without timeout.
///
/// [`wait_thread_exit`]: Kernel::wait_thread_exit
pub trait Kernel: Sync {
    /// Maps `size` bytes of `src` (the backing memory) at `dst` (a reserved
    /// range in the stack region). Page-granular.
    fn map_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), MapMemoryError>;

    /// Reverses a prior [`map_stack_memory`] call with the same arguments.
    ///
    /// # Safety
    /// The mapping must exist and no thread may still be running on it.
    ///
    /// [`map_stack_memory`]: Kernel::map_stack_memory
    unsafe fn unmap_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), UnmapMemoryError>;

    /// Creates a suspended thread entering `entry` with `arg`, its stack
    /// pointer at `stack_top`.
    fn create_thread(
        &self,
        entry: RawThreadEntry,
        arg: *mut c_void,
        stack_top: *mut c_void,
        prio: i32,
        cpuid: i32,
    ) -> Result<Handle, CreateThreadError>;

    /// Makes a created thread runnable for the first time.
    fn start_thread(&self, handle: Handle) -> Result<(), StartThreadError>;

    /// Pauses or resumes a thread.
    fn set_thread_activity(
        &self,
        handle: Handle,
        activity: ThreadActivity,
    ) -> Result<(), SetThreadActivityError>;

    /// Snapshots the register state of a (conventionally paused) thread.
    fn get_thread_context(&self, handle: Handle) -> Result<ThreadContext, GetContextError>;

    /// Blocks until the thread behind `handle` has fully exited. No timeout.
    fn wait_thread_exit(&self, handle: Handle) -> Result<(), WaitError>;

    /// Drops the kernel reference behind `handle`.
    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError>;

    /// Terminates the calling thread. Never returns.
    fn exit_thread(&self) -> !;

    /// Returns the base of the calling thread's fixed 0x200-byte
    /// thread-local region.
    fn tls_region_ptr(&self) -> NonNull<u8>;

    /// Terminal abort sink. Never returns.
    fn abort(&self, code: ResultCode) -> !;
}

/// The real Horizon kernel.
#[cfg(target_os = "horizon")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Horizon;

#[cfg(target_os = "horizon")]
impl Kernel for Horizon {
    fn map_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), MapMemoryError> {
        crate::mem::map_memory(dst, src, size)
    }

    unsafe fn unmap_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), UnmapMemoryError> {
        unsafe { crate::mem::unmap_memory(dst, src, size) }
    }

    fn create_thread(
        &self,
        entry: RawThreadEntry,
        arg: *mut c_void,
        stack_top: *mut c_void,
        prio: i32,
        cpuid: i32,
    ) -> Result<Handle, CreateThreadError> {
        crate::thread::create(entry as *mut c_void, arg, stack_top, prio, cpuid)
    }

    fn start_thread(&self, handle: Handle) -> Result<(), StartThreadError> {
        crate::thread::start(handle)
    }

    fn set_thread_activity(
        &self,
        handle: Handle,
        activity: ThreadActivity,
    ) -> Result<(), SetThreadActivityError> {
        crate::thread::set_activity(handle, activity)
    }

    fn get_thread_context(&self, handle: Handle) -> Result<ThreadContext, GetContextError> {
        crate::thread::get_context3(handle)
    }

    fn wait_thread_exit(&self, handle: Handle) -> Result<(), WaitError> {
        // SAFETY: the runtime only stores real handles it created.
        unsafe { crate::sync::wait_synchronization_single(handle, u64::MAX) }
    }

    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError> {
        crate::thread::close_handle(handle)
    }

    fn exit_thread(&self) -> ! {
        crate::thread::exit()
    }

    fn tls_region_ptr(&self) -> NonNull<u8> {
        let tls: *mut u8;
        // The read-only thread pointer holds the base of the thread-local
        // region for the current thread.
        unsafe { core::arch::asm!("mrs {}, tpidrro_el0", out(reg) tls, options(nomem, nostack)) };
        // SAFETY: the register is never zero for a live thread.
        unsafe { NonNull::new_unchecked(tls) }
    }

    fn abort(&self, code: ResultCode) -> ! {
        crate::debug::break_event(crate::debug::BreakReason::Panic, code as usize, 0)
    }
}
