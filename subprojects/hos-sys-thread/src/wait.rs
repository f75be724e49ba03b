//! Waiting for thread termination.

use hos_svc::{kernel::Kernel, sync::WaitError};
use hos_sys_mem::vspace::StackSpace;

use crate::{rt::ThreadRt, thread::Thread};

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Blocks until `thread` has fully exited.
    ///
    /// The wait is infinite and not cancellable from this side; a kernel
    /// failure (including an externally cancelled wait) surfaces
    /// immediately, with no retry.
    pub fn wait_for_exit(&self, thread: &Thread) -> Result<(), WaitError> {
        self.provider.wait_thread_exit(thread.handle)
    }
}
