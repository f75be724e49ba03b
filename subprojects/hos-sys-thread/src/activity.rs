//! Thread activity control.
//!
//! [`start`] moves a freshly created thread to runnable for the first time;
//! [`pause`]/[`resume`] stop and restart scheduling of a running thread.
//! None of them touch the thread object: registry membership changes only
//! when the thread itself runs the trampoline or teardown, so pausing a
//! thread never makes it "invisible" to slot allocation walks.
//!
//! [`start`]: ThreadRt::start
//! [`pause`]: ThreadRt::pause
//! [`resume`]: ThreadRt::resume

use hos_svc::{
    kernel::Kernel,
    thread::{SetThreadActivityError, StartThreadError, ThreadActivity},
};
use hos_sys_mem::vspace::StackSpace;

use crate::{rt::ThreadRt, thread::Thread};

impl<P: Kernel + StackSpace + 'static> ThreadRt<P> {
    /// Starts a created-but-suspended thread.
    pub fn start(&self, thread: &Thread) -> Result<(), StartThreadError> {
        self.provider.start_thread(thread.handle)
    }

    /// Pauses a thread's scheduling. Pausing an already paused thread is
    /// harmless.
    pub fn pause(&self, thread: &Thread) -> Result<(), SetThreadActivityError> {
        self.provider
            .set_thread_activity(thread.handle, ThreadActivity::Paused)
    }

    /// Resumes a previously paused thread.
    pub fn resume(&self, thread: &Thread) -> Result<(), SetThreadActivityError> {
        self.provider
            .set_thread_activity(thread.handle, ThreadActivity::Runnable)
    }
}
