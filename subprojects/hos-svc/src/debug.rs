//! Debug/abort SVC.

use crate::{raw, result::ResultCode};

/// Triggers a break debug event and does not return.
///
/// This is the terminal abort sink: the kernel suspends or kills the process
/// depending on whether a debugger is attached.
pub fn break_event(reason: BreakReason, address: usize, size: usize) -> ! {
    let _ = unsafe { raw::r#break(reason as u32, address, size) };
    unreachable!()
}

/// Break reasons for debug events.
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub enum BreakReason {
    Panic = 0,
    Assert = 1,
    User = 2,
    PreLoadDll = 3,
    PostLoadDll = 4,
    PreUnloadDll = 5,
    PostUnloadDll = 6,
    CppException = 7,
}
