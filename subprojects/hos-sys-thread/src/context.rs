//! Thread context inspection.

use hos_svc::{
    kernel::Kernel,
    thread::{GetContextError, ThreadContext},
};
use hos_sys_mem::vspace::StackSpace;

use crate::{rt::ThreadRt, thread::Thread};

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Snapshots the register state of `thread` for diagnostics.
    ///
    /// By convention the caller pauses the thread first; this is not
    /// enforced, and the kernel rejects the request for a running thread.
    pub fn dump_context(&self, thread: &Thread) -> Result<ThreadContext, GetContextError> {
        self.provider.get_thread_context(thread.handle)
    }
}
