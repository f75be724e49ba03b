//! Thread creation and the entry trampoline.

use core::{ffi::c_void, ptr::NonNull};

use hos_svc::{kernel::Kernel, thread as svc};
use hos_sys_mem::{
    alignment::round_up_to_16,
    stack::{self as stack_mem, UnmappedStackMemory},
    vspace::StackSpace,
};

use crate::{
    layout::{LayoutError, StackLayout},
    reent::{REENT_SIZE, ReentBlock},
    rt::ThreadRt,
    thread::{Thread, ThreadStackMem},
    tls_region::{self, TCB_SIZE, ThreadVars},
};

/// Thread entry point function type.
pub type ThreadFunc = unsafe extern "C" fn(*mut c_void);

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Creates a new thread in the suspended state.
    ///
    /// Plans the stack layout, maps the backing memory into a guard-paged
    /// mirror, asks the kernel for a suspended thread entering the runtime
    /// trampoline, and seeds the tail blocks (entry args, reentrant state
    /// inheriting the creator's standard streams, TLS segment from the load
    /// image). The thread does not run — and does not join the registry —
    /// until [`start`](ThreadRt::start).
    ///
    /// When `stack_mem` is `None` the backing memory is allocated here and
    /// freed by [`close`](ThreadRt::close); otherwise the caller's region
    /// (page-aligned, page-sized, at least `stack_size` bytes of which hold
    /// the layout) is used and ownership stays with the caller.
    ///
    /// Every partial acquisition unwinds in reverse order on failure: a
    /// kernel creation failure unmaps the mirror and releases its range, a
    /// mapping failure releases the range, and self-allocated backing
    /// memory is freed on any failure.
    ///
    /// # Safety
    /// - `thread` must stay at a stable address and must not be accessed
    ///   (other than through this runtime) until the thread has exited and
    ///   been closed.
    /// - When `stack_mem` is `Some`, the region must be valid for reads and
    ///   writes of `stack_size` bytes until close() returns.
    /// - `entry` must be safe to call with `arg` on the new thread.
    pub unsafe fn create(
        &'static self,
        thread: &mut Thread,
        entry: ThreadFunc,
        arg: *mut c_void,
        stack_mem: Option<NonNull<c_void>>,
        stack_size: usize,
        prio: i32,
        cpuid: i32,
    ) -> Result<(), CreateError> {
        let reent_size = round_up_to_16(REENT_SIZE);
        let tls_size = self.tls_image.segment_size();
        let args_size = size_of::<EntryArgs<P>>();

        let (layout, unmapped) = match stack_mem {
            None => {
                let layout = StackLayout::plan_owned(stack_size, reent_size, tls_size, args_size)?;
                let unmapped = UnmappedStackMemory::alloc_owned(layout.map_size())
                    .map_err(|_| CreateError::OutOfMemory)?;
                (layout, unmapped)
            }
            Some(region) => {
                let layout = StackLayout::plan_provided(
                    region.as_ptr() as usize,
                    stack_size,
                    reent_size,
                    tls_size,
                    args_size,
                )?;
                // SAFETY: alignment and size were validated by the planner;
                // the caller guarantees validity until close().
                let unmapped = unsafe { UnmappedStackMemory::from_provided(region, layout.map_size()) };
                (layout, unmapped)
            }
        };

        // SAFETY: the buffer is fresh and not mapped anywhere. A failure
        // here has already released the reservation and dropped the buffer
        // (freeing it when owned).
        let mapped = unsafe { stack_mem::map(&self.provider, unmapped)? };
        let mirror = mapped.mirror_ptr();

        let stack_top = layout.stack_top(mirror);
        let reent_ptr = layout.reent_ptr(mirror);
        let tls_ptr = layout.tls_ptr(mirror);
        let args_ptr = stack_top.as_ptr() as *mut EntryArgs<P>;

        let handle = match self.provider.create_thread(
            entry_trampoline::<P>,
            args_ptr as *mut c_void,
            stack_top.as_ptr(),
            prio,
            cpuid,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                // SAFETY: the thread never existed; nothing runs on the
                // mirror. An unmap failure here cannot be acted on.
                let _ = unsafe { stack_mem::unmap(&self.provider, mapped) };
                return Err(err.into());
            }
        };

        let parts = mapped.leak();
        thread.handle = handle;
        thread.stack = if parts.owned {
            ThreadStackMem::Owned {
                mem: parts.backing,
                mirror: parts.mirror,
                map_size: parts.size,
                stack_size: layout.usable_stack(),
            }
        } else {
            ThreadStackMem::Provided {
                mem: parts.backing,
                mirror: parts.mirror,
                map_size: parts.size,
                stack_size: layout.usable_stack(),
            }
        };
        thread.tls_slots = None;
        thread.registration = None;

        // The thread is suspended; it consumes the args block when started.
        unsafe {
            args_ptr.write(EntryArgs {
                rt: self,
                thread,
                entry,
                arg,
                reent: reent_ptr.as_ptr() as *mut c_void,
                tls: tls_ptr.as_ptr() as *mut c_void,
            });

            ReentBlock::init(reent_ptr, self.current_reent());
            self.tls_image.install(tls_ptr);
        }

        #[cfg(feature = "log")]
        log::trace!(
            "Thread created (handle {:#x}, stack {:#x} bytes, prio {prio}, cpu {cpuid})",
            handle.to_raw(),
            layout.usable_stack(),
        );

        Ok(())
    }
}

/// Thread creation arguments, written at the top of the new thread's stack.
///
/// Consumed exactly once by the trampoline; the space is ordinary stack
/// afterwards. Keep the size a 16-byte multiple so the initial stack
/// pointer stays aligned.
#[repr(C, align(16))]
pub(crate) struct EntryArgs<P: Kernel + StackSpace + 'static> {
    rt: *const ThreadRt<P>,
    thread: *mut Thread,
    entry: ThreadFunc,
    arg: *mut c_void,
    reent: *mut c_void,
    tls: *mut c_void,
}

/// The first code that runs on a new kernel thread.
///
/// Initializes the thread's bookkeeping record, joins the registry (which
/// also publishes the TLS slot array), hands control to the user entry,
/// and unconditionally runs exit teardown when it returns.
pub(crate) unsafe extern "C" fn entry_trampoline<P: Kernel + StackSpace + 'static>(
    raw_args: *mut c_void,
) {
    // Copy the args block out before anything else: it occupies stack space
    // the user entry is free to overwrite.
    let args = unsafe { core::ptr::read(raw_args as *const EntryArgs<P>) };
    let rt = unsafe { &*args.rt };

    let region = rt.provider().tls_region_ptr();
    let handle = unsafe { (*args.thread).handle() };

    unsafe {
        ThreadVars::init(
            tls_region::thread_vars_ptr(region),
            handle,
            args.thread as *mut c_void,
            args.reent,
            // The thread pointer sits one control block below the segment.
            (args.tls as *mut u8).wrapping_sub(TCB_SIZE) as *mut c_void,
        );

        // SAFETY: the thread object outlives its registration; the slot
        // array lives in this thread's own thread-local region.
        rt.registry
            .register(NonNull::new_unchecked(args.thread), tls_region::slots_ptr(region));
    }

    #[cfg(feature = "log")]
    log::trace!("Thread launched (handle {:#x})", handle.to_raw());

    unsafe { (args.entry)(args.arg) };

    rt.exit_current_thread()
}

/// Error type for thread creation.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// The caller-supplied stack region is not page-aligned or not
    /// page-sized.
    #[error("Caller-supplied stack region must be page-aligned and page-sized")]
    BadStackRegion,

    /// Backing memory could not be allocated, or the region cannot hold
    /// the reentrant-state block, the TLS segment and a usable stack.
    #[error("Out of memory")]
    OutOfMemory,

    /// Reserving or mapping the stack mirror failed.
    #[error("Stack mapping failed: {0}")]
    Map(#[from] stack_mem::MapError),

    /// The kernel rejected the thread creation request.
    #[error("Thread creation failed: {0}")]
    Kernel(#[from] svc::CreateThreadError),
}

impl From<LayoutError> for CreateError {
    fn from(value: LayoutError) -> Self {
        match value {
            LayoutError::BadStackRegion => CreateError::BadStackRegion,
            LayoutError::OutOfMemory => CreateError::OutOfMemory,
        }
    }
}
