//! Thread management SVCs.
//!
//! Thin wrappers around the kernel's thread lifecycle syscalls, translating
//! raw result codes into per-operation error enums. The kernel model is
//! four-phase: a thread is *created* suspended, *started*, eventually
//! *exits*, and its handle is *closed* independently of all of that.

use crate::result::Error;
#[cfg(target_os = "horizon")]
use crate::{
    error::KernelError as KError,
    handle::{Handle, INVALID_HANDLE, RawHandle},
    raw,
    result::raw::Result as RawResult,
};
#[cfg(target_os = "horizon")]
use core::ffi::c_void;

/// Scheduling activity of a thread, as set by the activity syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadActivity {
    /// Thread can run.
    Runnable = 0,
    /// Thread is paused.
    Paused = 1,
}

/// 64/32-bit CPU register view, matching the kernel context dump layout.
#[repr(C)]
#[derive(Clone, Copy)]
pub union CpuRegister {
    /// 64-bit AArch64 view (Xn).
    pub x: u64,
    /// 32-bit AArch64 view (Wn).
    pub w: u32,
    /// AArch32 view (Rn).
    pub r: u32,
}

/// 128/64/32-bit NEON register view.
#[repr(C)]
#[derive(Clone, Copy)]
pub union FpuRegister {
    /// 128-bit vector (Vn).
    pub v: u128,
    /// 64-bit double-precision view (Dn).
    pub d: f64,
    /// 32-bit single-precision view (Sn).
    pub s: f32,
}

/// CPU/FPU register dump of a paused thread.
///
/// Layout matches what the context-dump syscall writes.
#[repr(C)]
pub struct ThreadContext {
    /// General-purpose CPU registers X0..X28.
    pub cpu_gprs: [CpuRegister; 29],
    /// Frame pointer (X29).
    pub fp: u64,
    /// Link register (X30).
    pub lr: u64,
    /// Stack pointer.
    pub sp: u64,
    /// Program counter.
    pub pc: CpuRegister,
    /// Processor status register.
    pub psr: u32,
    /// NEON registers V0..V31.
    pub fpu_gprs: [FpuRegister; 32],
    /// Floating-point control register.
    pub fpcr: u32,
    /// Floating-point status register.
    pub fpsr: u32,
    /// EL0 Read/Write Software Thread ID Register.
    pub tpidr: u64,
}

impl ThreadContext {
    /// A zeroed context, for the caller to pass as a dump target.
    pub const fn zeroed() -> Self {
        // SAFETY: all fields are plain-old-data; the all-zero bit pattern is
        // valid for each of them.
        unsafe { core::mem::zeroed() }
    }

    /// Returns `true` when the saved context belongs to an AArch64 thread.
    #[inline]
    pub fn is_aarch64(&self) -> bool {
        (self.psr & 0x10) == 0
    }
}

/// Error type for thread creation.
#[derive(Debug, thiserror::Error)]
pub enum CreateThreadError {
    /// No memory for the kernel thread object.
    #[error("Out of memory")]
    OutOfMemory,
    /// The kernel ran out of generic thread-related resources.
    #[error("Out of generic thread resources")]
    OutOfResource,
    /// The per-process thread quota has been exhausted.
    #[error("Thread limit reached for process")]
    LimitReached,
    /// The process handle table contains no free slots.
    #[error("Handle table full")]
    OutOfHandles,
    /// The supplied priority is outside `0..=0x3F` or not permitted by the
    /// process.
    #[error("Invalid priority")]
    InvalidPriority,
    /// The requested CPU core is invalid or outside the process affinity
    /// mask.
    #[error("Invalid core id")]
    InvalidCoreId,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for starting a thread.
#[derive(Debug, thiserror::Error)]
pub enum StartThreadError {
    /// The supplied handle is not a valid thread handle.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for the pause/resume activity syscall.
#[derive(Debug, thiserror::Error)]
pub enum SetThreadActivityError {
    /// The supplied handle is not a valid thread handle.
    #[error("Invalid handle")]
    InvalidHandle,
    /// The thread is in a state that cannot change activity (e.g. it has
    /// already terminated).
    #[error("Invalid thread state")]
    InvalidState,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for the context dump.
#[derive(Debug, thiserror::Error)]
pub enum GetContextError {
    /// The supplied handle is not a valid thread handle.
    #[error("Invalid handle")]
    InvalidHandle,
    /// The target thread is not paused.
    #[error("Invalid thread state")]
    InvalidState,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Error type for closing a handle.
#[derive(Debug, thiserror::Error)]
pub enum CloseHandleError {
    /// The supplied handle is not valid.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Any unforeseen kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

/// Creates a new thread in the *created* (suspended) state.
///
/// The thread does not run until [`start`] is called on the returned handle.
/// `stack_top` must be 16-byte aligned and remain valid for the thread's
/// entire lifetime; `arg` is passed unchanged to `entry`.
#[cfg(target_os = "horizon")]
pub fn create(
    entry: *mut c_void,
    arg: *mut c_void,
    stack_top: *mut c_void,
    prio: i32,
    cpuid: i32,
) -> Result<Handle, CreateThreadError> {
    let mut handle: RawHandle = INVALID_HANDLE;
    let rc = unsafe { raw::create_thread(&mut handle, entry, arg, stack_top, prio, cpuid) };

    RawResult::from_raw(rc).map(unsafe { Handle::from_raw(handle) }, |rc| {
        match rc.description() {
            desc if KError::OutOfMemory == desc => CreateThreadError::OutOfMemory,
            desc if KError::OutOfResource == desc => CreateThreadError::OutOfResource,
            desc if KError::LimitReached == desc => CreateThreadError::LimitReached,
            desc if KError::OutOfHandles == desc => CreateThreadError::OutOfHandles,
            desc if KError::InvalidPriority == desc => CreateThreadError::InvalidPriority,
            desc if KError::InvalidCoreId == desc => CreateThreadError::InvalidCoreId,
            _ => CreateThreadError::Unknown(rc.into()),
        }
    })
}

/// Transitions a thread from the *created* state to *runnable*.
#[cfg(target_os = "horizon")]
pub fn start(handle: Handle) -> Result<(), StartThreadError> {
    let rc = unsafe { raw::start_thread(handle.to_raw()) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidHandle == desc => StartThreadError::InvalidHandle,
        _ => StartThreadError::Unknown(rc.into()),
    })
}

/// Sets the scheduling activity of a thread.
///
/// Pausing an already paused thread (or resuming a running one) is a no-op
/// as far as the kernel is concerned.
#[cfg(target_os = "horizon")]
pub fn set_activity(handle: Handle, activity: ThreadActivity) -> Result<(), SetThreadActivityError> {
    let rc = unsafe { raw::set_thread_activity(handle.to_raw(), activity as u32) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidHandle == desc => SetThreadActivityError::InvalidHandle,
        desc if KError::InvalidState == desc => SetThreadActivityError::InvalidState,
        _ => SetThreadActivityError::Unknown(rc.into()),
    })
}

/// Dumps the CPU/FPU context of a *paused* thread.
#[cfg(target_os = "horizon")]
pub fn get_context3(handle: Handle) -> Result<ThreadContext, GetContextError> {
    let mut ctx = ThreadContext::zeroed();
    let rc = unsafe { raw::get_thread_context3(&mut ctx, handle.to_raw()) };
    RawResult::from_raw(rc).map(ctx, |rc| match rc.description() {
        desc if KError::InvalidHandle == desc => GetContextError::InvalidHandle,
        desc if KError::InvalidState == desc => GetContextError::InvalidState,
        _ => GetContextError::Unknown(rc.into()),
    })
}

/// Exits the current thread and never returns.
#[cfg(target_os = "horizon")]
pub fn exit() -> ! {
    unsafe { raw::exit_thread() }
}

/// Closes a thread handle without affecting the thread's execution.
///
/// The kernel object is only destroyed once all outstanding handles are
/// closed; in particular this does not abort a still-running thread.
#[cfg(target_os = "horizon")]
pub fn close_handle(handle: Handle) -> Result<(), CloseHandleError> {
    let rc = unsafe { raw::close_handle(handle.to_raw()) };
    RawResult::from_raw(rc).map((), |rc| match rc.description() {
        desc if KError::InvalidHandle == desc => CloseHandleError::InvalidHandle,
        _ => CloseHandleError::Unknown(rc.into()),
    })
}
