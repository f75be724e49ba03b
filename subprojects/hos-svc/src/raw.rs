//! Raw _Supervisor Call (SVC)_ API.
//!
//! Each function issues exactly one `svc` instruction with the AArch64
//! calling convention the kernel expects. Nothing here validates arguments;
//! that is the typed wrappers' job.

use core::ffi::c_void;

use crate::{code::*, handle::RawHandle, mem::MemoryInfo, result::ResultCode};

/// Maps a memory range into a different range.
///
/// `Result svcMapMemory(void* dst_addr, void* src_addr, uint64_t size);`
///
/// | Arg | Name | Description |
/// | --- | --- | --- |
/// | IN | _dst_addr_ | Destination address (must lie in the stack region). |
/// | IN | _src_addr_ | Source address. |
/// | IN | _size_ | Size of the range, in bytes. Page-aligned. |
///
/// Ref: <https://switchbrew.org/wiki/SVC#MapMemory>
///
/// # Safety
/// Both ranges must be page-aligned and owned by the current process.
#[unsafe(naked)]
pub unsafe extern "C" fn map_memory(
    dst_addr: *mut c_void,
    src_addr: *mut c_void,
    size: usize,
) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const MAP_MEMORY,
    );
}

/// Unmaps a region that was previously mapped with [`map_memory`].
///
/// `Result svcUnmapMemory(void* dst_addr, void* src_addr, uint64_t size);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#UnmapMemory>
///
/// # Safety
/// The arguments must describe exactly one prior [`map_memory`] call.
#[unsafe(naked)]
pub unsafe extern "C" fn unmap_memory(
    dst_addr: *mut c_void,
    src_addr: *mut c_void,
    size: usize,
) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const UNMAP_MEMORY,
    );
}

/// Queries information about an address.
///
/// `Result svcQueryMemory(MemoryInfo* meminfo_ptr, uint32_t* pageinfo, uint64_t addr);`
///
/// | Arg | Name | Description |
/// | --- | --- | --- |
/// | OUT | _meminfo_ptr_ | Receives the memory region information. |
/// | OUT | _pageinfo_ | Receives the page information. |
/// | IN | _addr_ | Address to query. |
///
/// Ref: <https://switchbrew.org/wiki/SVC#QueryMemory>
///
/// # Safety
/// Both output pointers must be valid for writes.
#[unsafe(naked)]
pub unsafe extern "C" fn query_memory(
    meminfo_ptr: *mut MemoryInfo,
    pageinfo: *mut u32,
    addr: usize,
) -> ResultCode {
    core::arch::naked_asm!(
        "str x1, [sp, #-16]!", // Store x1 (pageinfo out pointer) on the stack
        "svc {code}",          // Issue the SVC call
        "ldr x2, [sp], #16",   // Reload the out pointer
        "str w1, [x2]",        // Store the page info
        "ret",
        code = const QUERY_MEMORY,
    );
}

/// Creates a thread in the *created* (suspended) state.
///
/// `Result svcCreateThread(Handle* out, void* entry, void* arg, void* stack_top, int prio, int cpuid);`
///
/// | Arg | Name | Description |
/// | --- | --- | --- |
/// | OUT | _out_ | Receives the new thread handle. |
/// | IN | _entry_ | Entrypoint the thread starts executing at. |
/// | IN | _arg_ | Argument placed in the entrypoint's first register. |
/// | IN | _stack_top_ | Initial stack pointer. 16-byte aligned. |
/// | IN | _prio_ | Priority, `0x00..=0x3F` (lower is higher priority). |
/// | IN | _cpuid_ | Target CPU core, or `-2` for the process default. |
///
/// Ref: <https://switchbrew.org/wiki/SVC#CreateThread>
///
/// # Safety
/// `out` must be valid for writes; `stack_top` must point at memory that
/// stays valid for the thread's whole lifetime.
#[unsafe(naked)]
pub unsafe extern "C" fn create_thread(
    out: *mut RawHandle,
    entry: *mut c_void,
    arg: *mut c_void,
    stack_top: *mut c_void,
    prio: i32,
    cpuid: i32,
) -> ResultCode {
    core::arch::naked_asm!(
        "str x0, [sp, #-16]!", // Store x0 (out handle pointer) on the stack
        "mov x0, x1",          // Shift the remaining args down one register
        "mov x1, x2",
        "mov x2, x3",
        "mov w3, w4",
        "mov w4, w5",
        "svc {code}",          // Issue the SVC call
        "ldr x2, [sp], #16",   // Reload the out pointer
        "str w1, [x2]",        // Store the new handle
        "ret",
        code = const CREATE_THREAD,
    );
}

/// Starts a freshly created thread.
///
/// `Result svcStartThread(Handle handle);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#StartThread>
///
/// # Safety
/// `handle` must refer to a thread in the *created* state.
#[unsafe(naked)]
pub unsafe extern "C" fn start_thread(handle: RawHandle) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const START_THREAD,
    );
}

/// Exits the current thread. Never returns.
///
/// `void svcExitThread(void);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#ExitThread>
///
/// # Safety
/// No further user code runs on this thread; pending cleanup must have
/// happened already.
#[unsafe(naked)]
pub unsafe extern "C" fn exit_thread() -> ! {
    core::arch::naked_asm!(
        "svc {code}",
        code = const EXIT_THREAD,
    );
}

/// Closes a handle, decrementing the reference count of the corresponding
/// kernel object.
///
/// `Result svcCloseHandle(Handle handle);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#CloseHandle>
///
/// # Safety
/// The handle must not be used again after this call.
#[unsafe(naked)]
pub unsafe extern "C" fn close_handle(handle: RawHandle) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const CLOSE_HANDLE,
    );
}

/// Waits on one or more synchronization objects, optionally with a timeout.
///
/// `Result svcWaitSynchronization(s32* index, const Handle* handles, s32 num_handles, u64 timeout_ns);`
///
/// | Arg | Name | Description |
/// | --- | --- | --- |
/// | OUT | _index_ | Receives the index of the signalled handle. |
/// | IN | _handles_ | Array of handles to wait on. At most 64. |
/// | IN | _num_handles_ | Number of handles. |
/// | IN | _timeout_ns_ | Timeout in nanoseconds; `u64::MAX` waits forever. |
///
/// Ref: <https://switchbrew.org/wiki/SVC#WaitSynchronization>
///
/// # Safety
/// `index` must be valid for writes and `handles` valid for reads for the
/// duration of the call.
#[unsafe(naked)]
pub unsafe extern "C" fn wait_synchronization(
    index: *mut i32,
    handles: *const RawHandle,
    num_handles: i32,
    timeout_ns: u64,
) -> ResultCode {
    core::arch::naked_asm!(
        "str x0, [sp, #-16]!", // Store x0 (index out pointer) on the stack
        "mov x0, x1",          // Shift the remaining args down one register
        "mov w1, w2",
        "mov x2, x3",
        "svc {code}",          // Issue the SVC call
        "ldr x2, [sp], #16",   // Reload the out pointer
        "str w1, [x2]",        // Store the signalled index
        "ret",
        code = const WAIT_SYNCHRONIZATION,
    );
}

/// Breaks execution.
///
/// `void svcBreak(u32 break_reason, u64 address, u64 size);`
///
/// With a non-notification reason this does not return.
///
/// Ref: <https://switchbrew.org/wiki/SVC#Break>
///
/// # Safety
/// Diverging control transfer; only call on a path that must not continue.
#[unsafe(naked)]
pub unsafe extern "C" fn r#break(break_reason: u32, address: usize, size: usize) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const BREAK,
    );
}

/// Retrieves information about the system, or a certain kernel object.
///
/// `Result svcGetInfo(u64* out, u32 info_type, Handle handle, u64 info_subtype);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#GetInfo>
///
/// # Safety
/// `out` must be valid for writes.
#[unsafe(naked)]
pub unsafe extern "C" fn get_info(
    out: *mut u64,
    info_type: u32,
    handle: RawHandle,
    info_subtype: u64,
) -> ResultCode {
    core::arch::naked_asm!(
        "str x0, [sp, #-16]!", // Store x0 (out pointer) on the stack
        "mov w0, w1",          // Shift the remaining args down one register
        "mov w1, w2",
        "mov x2, x3",
        "svc {code}",          // Issue the SVC call
        "ldr x2, [sp], #16",   // Reload the out pointer
        "str x1, [x2]",        // Store the info value
        "ret",
        code = const GET_INFO,
    );
}

/// Configures the pause/unpause status of a thread.
///
/// `Result svcSetThreadActivity(Handle thread, u32 paused);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#SetThreadActivity>
///
/// # Safety
/// `handle` must refer to a thread owned by the current process.
#[unsafe(naked)]
pub unsafe extern "C" fn set_thread_activity(handle: RawHandle, paused: u32) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const SET_THREAD_ACTIVITY,
    );
}

/// Dumps the registers of a paused thread.
///
/// `Result svcGetThreadContext3(ThreadContext* ctx, Handle thread);`
///
/// Ref: <https://switchbrew.org/wiki/SVC#GetThreadContext3>
///
/// # Safety
/// `ctx` must be valid for writes of a full [`crate::thread::ThreadContext`];
/// the target thread should be paused.
#[unsafe(naked)]
pub unsafe extern "C" fn get_thread_context3(
    ctx: *mut crate::thread::ThreadContext,
    handle: RawHandle,
) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}",
        "ret",
        code = const GET_THREAD_CONTEXT3,
    );
}
