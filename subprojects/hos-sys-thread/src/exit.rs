//! Exit teardown.

use core::ptr::NonNull;

use hos_svc::{
    error::{RuntimeError, ToRawResultCode},
    kernel::Kernel,
};
use hos_sys_mem::vspace::StackSpace;

use crate::{rt::ThreadRt, thread::Thread};

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Exits the calling thread.
    ///
    /// Runs on every normal entry-function return (via the trampoline) and
    /// may also be called directly by a running thread. Teardown order:
    ///
    /// 1. Snapshot the slot usage bitmap once; for every slot in use, null
    ///    this thread's cell and invoke the registered destructor with the
    ///    old value — exactly once, in ascending slot order.
    /// 2. Under the registry lock, leave the registry and clear the
    ///    membership fields (the signal [`close`](ThreadRt::close) checks).
    /// 3. Terminate the kernel thread. No further user code runs on this
    ///    stack.
    ///
    /// Aborts the process when the calling thread is not runtime-owned:
    /// without a bookkeeping record there is nothing to tear down and no
    /// way to return.
    pub fn exit_current_thread(&self) -> ! {
        let vars = unsafe { &*self.thread_vars() };
        if !vars.is_initialized() {
            self.provider.abort(RuntimeError::NotOwnedThread.to_rc());
        }
        let Some(thread) = NonNull::new(vars.thread_ptr() as *mut Thread) else {
            self.provider.abort(RuntimeError::NotOwnedThread.to_rc());
        };

        // SAFETY: reading our own thread object; the fields touched here
        // are only ever written by this thread (trampoline/teardown).
        let Some(slots) = (unsafe { thread.as_ref().tls_slots }) else {
            self.provider.abort(RuntimeError::NotOwnedThread.to_rc());
        };

        // SAFETY: the slot array is in this thread's own thread-local
        // region; nobody else writes it while we are alive.
        unsafe { self.slots.run_destructors(slots) };

        #[cfg(feature = "log")]
        log::trace!("Thread exiting (handle {:#x})", vars.handle().to_raw());

        // SAFETY: registered by the trampoline (or main-thread adoption)
        // and not yet unregistered.
        unsafe { self.registry.unregister(thread) };

        self.provider.exit_thread()
    }
}
