//! The thread runtime context.
//!
//! All process-wide thread state — the live-thread registry, the TLS slot
//! table, the TLS load image and the adopted main thread — hangs off one
//! [`ThreadRt`] value, together with the kernel capabilities it consumes.
//!
//! ## Lifecycle
//! The process entry point constructs the context (typically in a `static`)
//! and calls [`ThreadRt::init_main_thread`] from the main thread before the
//! first [`create`](ThreadRt::create). The context is never torn down; it
//! must outlive every thread it manages, which is why thread creation
//! requires `&'static self`.

use core::{cell::UnsafeCell, ffi::c_void, ptr::NonNull};

use hos_svc::{
    error::{RuntimeError, ToRawResultCode},
    handle::Handle,
    kernel::Kernel,
};
use hos_sys_mem::vspace::StackSpace;
use spin::Once;

use crate::{
    reent::ReentBlock,
    registry::Registry,
    slots::SlotTable,
    thread::{Thread, ThreadStackMem},
    tls_image::TlsImage,
    tls_region::{self, ThreadVars},
};

/// The thread runtime context.
pub struct ThreadRt<P: Kernel + StackSpace + 'static> {
    pub(crate) provider: P,
    pub(crate) registry: Registry,
    pub(crate) slots: SlotTable,
    pub(crate) tls_image: TlsImage,
    main_thread: Once<MainThread>,
}

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Creates a runtime context around the given kernel capabilities and
    /// TLS load image.
    pub const fn new(provider: P, tls_image: TlsImage) -> Self {
        Self {
            provider,
            registry: Registry::new(),
            slots: SlotTable::new(),
            tls_image,
            main_thread: Once::new(),
        }
    }

    /// The injected kernel capability provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Number of threads currently registered (between trampoline and exit
    /// teardown). Diagnostic only; the value can be stale by the time the
    /// caller looks at it.
    pub fn live_threads(&self) -> usize {
        self.registry.live_count()
    }

    /// The calling thread's bookkeeping record.
    pub(crate) fn thread_vars(&self) -> *mut ThreadVars {
        tls_region::thread_vars_ptr(self.provider.tls_region_ptr())
    }

    /// Kernel handle of the calling thread, if it is runtime-owned.
    pub fn current_handle(&self) -> Option<Handle> {
        let vars = unsafe { &*self.thread_vars() };
        vars.is_initialized().then(|| vars.handle())
    }

    /// The calling thread's [`Thread`] object, if it is runtime-owned.
    ///
    /// The pointer stays valid until the thread exits.
    pub fn current_thread_ptr(&self) -> Option<NonNull<Thread>> {
        let vars = unsafe { &*self.thread_vars() };
        if !vars.is_initialized() {
            return None;
        }
        NonNull::new(vars.thread_ptr() as *mut Thread)
    }

    /// The calling thread's reentrant-state block, if it is runtime-owned.
    pub(crate) fn current_reent(&self) -> Option<NonNull<ReentBlock>> {
        let vars = unsafe { &*self.thread_vars() };
        if !vars.is_initialized() {
            return None;
        }
        NonNull::new(vars.reent() as *mut ReentBlock)
    }

    /// Adopts the calling (main) thread into the runtime.
    ///
    /// Writes the main thread's bookkeeping record and registers a thread
    /// object for it, so TLS slots, the current-thread accessors and exit
    /// teardown work on the main thread like on any spawned one. The main
    /// thread's stack is kernel-provided: `stack_base`/`stack_size`
    /// describe it, and close() is never called for it.
    ///
    /// Aborts the process when called a second time.
    ///
    /// # Safety
    /// Must be called exactly once, from the main thread, before any other
    /// runtime operation; `handle` must be the main thread's kernel handle
    /// and `reent` its initialized reentrant-state block.
    pub unsafe fn init_main_thread(
        &'static self,
        handle: Handle,
        stack_base: NonNull<c_void>,
        stack_size: usize,
        reent: *mut c_void,
    ) {
        if self.main_thread.is_completed() {
            self.provider.abort(RuntimeError::BadInput.to_rc());
        }

        let main = self.main_thread.call_once(|| {
            MainThread(UnsafeCell::new(Thread {
                handle,
                stack: ThreadStackMem::Provided {
                    mem: stack_base,
                    mirror: stack_base,
                    map_size: stack_size,
                    stack_size,
                },
                tls_slots: None,
                registration: None,
            }))
        });

        // SAFETY: the cell lives in `self`, which is 'static.
        let thread_ptr = unsafe { NonNull::new_unchecked(main.0.get()) };

        let region = self.provider.tls_region_ptr();
        unsafe {
            ThreadVars::init(
                tls_region::thread_vars_ptr(region),
                handle,
                thread_ptr.as_ptr() as *mut c_void,
                reent,
                core::ptr::null_mut(),
            );

            self.registry.register(thread_ptr, tls_region::slots_ptr(region));
        }

        #[cfg(feature = "log")]
        log::trace!("Main thread adopted (handle {:#x})", handle.to_raw());
    }
}

/// One-time cell for the adopted main thread.
///
/// The inner thread is mutated only through the registry contract (its
/// membership fields, under the registry lock), which is what makes the
/// shared cell sound.
struct MainThread(UnsafeCell<Thread>);

// SAFETY: see the type docs; all mutation goes through the registry lock.
unsafe impl Send for MainThread {}
unsafe impl Sync for MainThread {}
