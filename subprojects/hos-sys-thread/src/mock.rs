//! In-test kernel capabilities.
//!
//! [`MockOs`] implements the [`Kernel`] and [`StackSpace`] traits on top of
//! the host: reserved mirror ranges are real heap allocations, "started"
//! kernel threads are host threads running the runtime trampoline, and
//! thread exit parks the host thread after signalling waiters. The fixed
//! thread-local region is a per-host-thread buffer.

use core::{cell::UnsafeCell, ffi::c_void, ptr::NonNull};
use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    vec::Vec,
};

use hos_svc::{
    handle::Handle,
    kernel::{Kernel, RawThreadEntry},
    mem::{MapMemoryError, UnmapMemoryError},
    result::ResultCode,
    sync::WaitError,
    thread::{
        CloseHandleError, CreateThreadError, GetContextError, SetThreadActivityError,
        StartThreadError, ThreadActivity, ThreadContext,
    },
};
use hos_sys_mem::vspace::StackSpace;

use crate::tls_region::{TLS_REGION_SIZE, thread_vars_ptr};

const PAGE_SIZE: usize = 0x1000;

#[repr(align(16))]
struct TlsBuf(UnsafeCell<[u8; TLS_REGION_SIZE]>);

std::thread_local! {
    static TLS_REGION: TlsBuf = TlsBuf(UnsafeCell::new([0; TLS_REGION_SIZE]));
}

struct PendingThread {
    entry: RawThreadEntry,
    arg: usize,
}

#[derive(Default)]
struct ExitGate {
    exited: Mutex<bool>,
    cv: Condvar,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    pending: HashMap<u32, PendingThread>,
    gates: HashMap<u32, Arc<ExitGate>>,
    /// Live mappings as (dst, src, size).
    mappings: Vec<(usize, usize, usize)>,
    /// Reserved mirror ranges as (base, size).
    reservations: Vec<(usize, usize)>,
    pauses: usize,
    resumes: usize,
}

/// Host-backed kernel capabilities for tests.
pub(crate) struct MockOs {
    state: Mutex<State>,
}

impl MockOs {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 0x100,
                ..State::default()
            }),
        }
    }

    pub(crate) fn live_mappings(&self) -> usize {
        self.state.lock().unwrap().mappings.len()
    }

    pub(crate) fn live_reservations(&self) -> usize {
        self.state.lock().unwrap().reservations.len()
    }

    pub(crate) fn pause_count(&self) -> usize {
        self.state.lock().unwrap().pauses
    }

    pub(crate) fn resume_count(&self) -> usize {
        self.state.lock().unwrap().resumes
    }
}

impl Kernel for MockOs {
    fn map_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), MapMemoryError> {
        let mut state = self.state.lock().unwrap();
        state
            .mappings
            .push((dst.as_ptr() as usize, src.as_ptr() as usize, size));
        Ok(())
    }

    unsafe fn unmap_stack_memory(
        &self,
        dst: NonNull<c_void>,
        src: NonNull<c_void>,
        size: usize,
    ) -> Result<(), UnmapMemoryError> {
        let mut state = self.state.lock().unwrap();
        let entry = (dst.as_ptr() as usize, src.as_ptr() as usize, size);
        match state.mappings.iter().position(|&m| m == entry) {
            Some(pos) => {
                state.mappings.swap_remove(pos);
                Ok(())
            }
            None => Err(UnmapMemoryError::InvalidCurrentMemory),
        }
    }

    fn create_thread(
        &self,
        entry: RawThreadEntry,
        arg: *mut c_void,
        _stack_top: *mut c_void,
        _prio: i32,
        _cpuid: i32,
    ) -> Result<Handle, CreateThreadError> {
        let mut state = self.state.lock().unwrap();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.pending.insert(
            raw,
            PendingThread {
                entry,
                arg: arg as usize,
            },
        );
        state.gates.insert(raw, Arc::new(ExitGate::default()));
        Ok(unsafe { Handle::from_raw(raw) })
    }

    fn start_thread(&self, handle: Handle) -> Result<(), StartThreadError> {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state
                .pending
                .remove(&handle.to_raw())
                .ok_or(StartThreadError::InvalidHandle)?
        };

        // The host thread stands in for the kernel thread; it enters the
        // trampoline like the real one would (just not on the mirror stack)
        // and parks forever once exit_thread() runs.
        let PendingThread { entry, arg } = pending;
        std::thread::spawn(move || unsafe { entry(arg as *mut c_void) });
        Ok(())
    }

    fn set_thread_activity(
        &self,
        handle: Handle,
        activity: ThreadActivity,
    ) -> Result<(), SetThreadActivityError> {
        let mut state = self.state.lock().unwrap();
        if !state.gates.contains_key(&handle.to_raw()) {
            return Err(SetThreadActivityError::InvalidHandle);
        }
        match activity {
            ThreadActivity::Paused => state.pauses += 1,
            ThreadActivity::Runnable => state.resumes += 1,
        }
        Ok(())
    }

    fn get_thread_context(&self, handle: Handle) -> Result<ThreadContext, GetContextError> {
        let state = self.state.lock().unwrap();
        if !state.gates.contains_key(&handle.to_raw()) {
            return Err(GetContextError::InvalidHandle);
        }
        Ok(ThreadContext::zeroed())
    }

    fn wait_thread_exit(&self, handle: Handle) -> Result<(), WaitError> {
        let gate = {
            let state = self.state.lock().unwrap();
            state
                .gates
                .get(&handle.to_raw())
                .cloned()
                .ok_or(WaitError::InvalidHandle)?
        };

        let mut exited = gate.exited.lock().unwrap();
        while !*exited {
            exited = gate.cv.wait(exited).unwrap();
        }
        Ok(())
    }

    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError> {
        let mut state = self.state.lock().unwrap();
        state
            .gates
            .remove(&handle.to_raw())
            .map(|_| ())
            .ok_or(CloseHandleError::InvalidHandle)
    }

    fn exit_thread(&self) -> ! {
        // Identify ourselves the way the real kernel does not have to: the
        // trampoline stored our handle in the thread-local record.
        let region = self.tls_region_ptr();
        let handle = unsafe { (*thread_vars_ptr(region)).handle() };

        let gate = {
            let state = self.state.lock().unwrap();
            state.gates.get(&handle.to_raw()).cloned()
        };
        if let Some(gate) = gate {
            *gate.exited.lock().unwrap() = true;
            gate.cv.notify_all();
        }

        // The kernel thread is gone; the host thread just stops running
        // user code.
        loop {
            std::thread::park();
        }
    }

    fn tls_region_ptr(&self) -> NonNull<u8> {
        TLS_REGION.with(|buf| NonNull::new(buf.0.get() as *mut u8).unwrap())
    }

    fn abort(&self, code: ResultCode) -> ! {
        panic!("abort: {code:#010x}");
    }
}

impl StackSpace for MockOs {
    fn reserve_stack_range(&self, size: usize) -> Option<NonNull<c_void>> {
        let layout = Layout::from_size_align(size, PAGE_SIZE).ok()?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) } as *mut c_void)?;
        self.state
            .lock()
            .unwrap()
            .reservations
            .push((ptr.as_ptr() as usize, size));
        Some(ptr)
    }

    unsafe fn release_stack_range(&self, range: NonNull<c_void>, size: usize) {
        let entry = (range.as_ptr() as usize, size);
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.reservations.iter().position(|&r| r == entry) {
            state.reservations.swap_remove(pos);
            let layout = Layout::from_size_align(size, PAGE_SIZE).unwrap();
            unsafe { dealloc(range.as_ptr() as *mut u8, layout) };
        }
    }
}
