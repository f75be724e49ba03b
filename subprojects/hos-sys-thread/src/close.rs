//! Thread teardown: releasing stack memory and the kernel handle.

use hos_svc::{
    kernel::Kernel,
    mem::UnmapMemoryError,
    thread::CloseHandleError,
};
use hos_sys_mem::{buf::AlignedBuffer, vspace::StackSpace};

use crate::{
    rt::ThreadRt,
    thread::{Thread, ThreadStackMem},
};

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Closes a thread that has exited.
    ///
    /// Unmaps the stack mirror, releases its reserved range, frees
    /// runtime-owned backing memory, and closes the kernel handle.
    ///
    /// Termination must have been observed first (normally via
    /// [`wait_for_exit`](ThreadRt::wait_for_exit)): while the thread's
    /// membership fields are still set, close fails with
    /// [`CloseError::NotExited`] and unmaps nothing. The membership read is
    /// a best-effort check outside the registry lock — racing close against
    /// the thread's own teardown is a caller contract violation, not
    /// something this detects reliably.
    ///
    /// Close is not idempotent; a second close of the same record returns
    /// [`CloseError::NotCreated`].
    pub fn close(&self, thread: &mut Thread) -> Result<(), CloseError> {
        if thread.is_registered() {
            return Err(CloseError::NotExited);
        }

        let (mem, mirror, map_size, owned) = match &thread.stack {
            ThreadStackMem::Vacant => return Err(CloseError::NotCreated),
            ThreadStackMem::Owned {
                mem,
                mirror,
                map_size,
                ..
            } => (*mem, *mirror, *map_size, true),
            ThreadStackMem::Provided {
                mem,
                mirror,
                map_size,
                ..
            } => (*mem, *mirror, *map_size, false),
        };

        // SAFETY: the thread has exited, so nothing runs on the mirror; the
        // arguments are the ones create() mapped with. On failure the
        // mapping is still live, so nothing further is released.
        unsafe { self.provider.unmap_stack_memory(mirror, mem, map_size)? };

        // SAFETY: the range was reserved by create() and is now unmapped.
        unsafe { self.provider.release_stack_range(mirror, map_size) };

        if owned {
            // SAFETY: create() allocated exactly this block and leaked it
            // into the thread object.
            unsafe { AlignedBuffer::free_raw(mem, map_size) };
        }

        let result = self.provider.close_handle(thread.handle);

        #[cfg(feature = "log")]
        log::trace!("Thread closed (handle {:#x})", thread.handle.to_raw());

        thread.stack = ThreadStackMem::Vacant;

        result.map_err(CloseError::from)
    }
}

/// Error type for [`ThreadRt::close`].
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    /// The record has not been through a successful create (or was already
    /// closed).
    #[error("Thread has not been created")]
    NotCreated,

    /// The thread is still registered: it has not exited, or its exit has
    /// not been observed yet.
    #[error("Thread has not exited")]
    NotExited,

    /// Unmapping the stack mirror failed; nothing was released.
    #[error("Stack unmapping failed: {0}")]
    Unmap(#[from] UnmapMemoryError),

    /// Closing the kernel handle failed. Memory was already released.
    #[error("Closing the thread handle failed: {0}")]
    CloseHandle(#[from] CloseHandleError),
}
