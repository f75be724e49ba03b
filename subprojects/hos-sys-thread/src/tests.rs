//! Lifecycle tests against the in-test kernel capabilities.

use core::{
    ffi::c_void,
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::{boxed::Box, vec::Vec};

use hos_svc::handle::Handle;

use crate::{
    CloseError, CreateError, Thread, ThreadRt,
    mock::MockOs,
    reent::REENT_SIZE,
    tls_image::TlsImage,
    tls_region::NUM_TLS_SLOTS,
};

type Rt = ThreadRt<MockOs>;

fn rt() -> &'static Rt {
    Box::leak(Box::new(ThreadRt::new(MockOs::new(), TlsImage::empty())))
}

fn rt_with_tls_size(mem_size: usize) -> &'static Rt {
    // No initialized data; the whole segment is zero-filled.
    let image = unsafe { TlsImage::from_raw_parts(core::ptr::null(), 0, mem_size) };
    Box::leak(Box::new(ThreadRt::new(MockOs::new(), image)))
}

const PAGE: usize = 0x1000;
const STACK: usize = 0x4000;

fn page_aligned_region(size: usize) -> NonNull<c_void> {
    let layout = std::alloc::Layout::from_size_align(size, PAGE).unwrap();
    NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) } as *mut c_void).unwrap()
}

unsafe extern "C" fn bump_entry(arg: *mut c_void) {
    let counter = unsafe { &*(arg as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn create_start_wait_close_leaves_no_state_behind() {
    let rt = rt();
    let live_before = rt.live_threads();

    let counter = Box::leak(Box::new(AtomicUsize::new(0)));
    let mut thread = Thread::new();
    unsafe {
        rt.create(
            &mut thread,
            bump_entry,
            counter as *const AtomicUsize as *mut c_void,
            None,
            STACK,
            0x2C,
            -2,
        )
        .unwrap();
    }
    assert!(thread.handle().is_valid());
    assert_eq!(thread.stack_size(), STACK - 48);
    assert_eq!(rt.provider().live_mappings(), 1);
    assert_eq!(rt.provider().live_reservations(), 1);

    rt.start(&thread).unwrap();
    rt.wait_for_exit(&thread).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(!thread.is_registered());

    rt.close(&mut thread).unwrap();
    assert_eq!(rt.live_threads(), live_before);
    assert_eq!(rt.provider().live_mappings(), 0);
    assert_eq!(rt.provider().live_reservations(), 0);
}

#[test]
fn provided_region_round_trip_keeps_caller_ownership() {
    let rt = rt();
    let region = page_aligned_region(2 * PAGE);

    let counter = Box::leak(Box::new(AtomicUsize::new(0)));
    let mut thread = Thread::new();
    unsafe {
        rt.create(
            &mut thread,
            bump_entry,
            counter as *const AtomicUsize as *mut c_void,
            Some(region),
            2 * PAGE,
            0x2C,
            -2,
        )
        .unwrap();
    }
    assert!(!thread.stack.is_owned());
    // Reent block and TLS segment are carved off the tail.
    assert_eq!(thread.stack_size(), 2 * PAGE - REENT_SIZE - 48);

    rt.start(&thread).unwrap();
    rt.wait_for_exit(&thread).unwrap();
    rt.close(&mut thread).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(rt.provider().live_mappings(), 0);

    // The region is the caller's to free.
    let layout = std::alloc::Layout::from_size_align(2 * PAGE, PAGE).unwrap();
    unsafe { std::alloc::dealloc(region.as_ptr() as *mut u8, layout) };
}

#[test]
fn unaligned_provided_region_fails_before_any_mapping() {
    let rt = rt();
    let region = page_aligned_region(2 * PAGE);
    let unaligned = NonNull::new(unsafe { (region.as_ptr() as *mut u8).add(16) } as *mut c_void).unwrap();

    let mut thread = Thread::new();
    let err = unsafe {
        rt.create(
            &mut thread,
            bump_entry,
            core::ptr::null_mut(),
            Some(unaligned),
            2 * PAGE,
            0x2C,
            -2,
        )
    };
    assert!(matches!(err, Err(CreateError::BadStackRegion)));

    // Unaligned size is rejected the same way.
    let err = unsafe {
        rt.create(
            &mut thread,
            bump_entry,
            core::ptr::null_mut(),
            Some(region),
            PAGE + 0x800,
            0x2C,
            -2,
        )
    };
    assert!(matches!(err, Err(CreateError::BadStackRegion)));

    assert_eq!(rt.provider().live_mappings(), 0);
    assert_eq!(rt.provider().live_reservations(), 0);

    let layout = std::alloc::Layout::from_size_align(2 * PAGE, PAGE).unwrap();
    unsafe { std::alloc::dealloc(region.as_ptr() as *mut u8, layout) };
}

#[test]
fn provided_region_smaller_than_tail_blocks_fails_oom_without_mapping() {
    // A TLS segment nearly the size of the region leaves no room for the
    // reentrant-state block.
    let rt = rt_with_tls_size(PAGE - 0x100);
    let region = page_aligned_region(PAGE);

    let mut thread = Thread::new();
    let err = unsafe {
        rt.create(
            &mut thread,
            bump_entry,
            core::ptr::null_mut(),
            Some(region),
            PAGE,
            0x2C,
            -2,
        )
    };
    assert!(matches!(err, Err(CreateError::OutOfMemory)));
    assert_eq!(rt.provider().live_mappings(), 0);
    assert_eq!(rt.provider().live_reservations(), 0);

    let layout = std::alloc::Layout::from_size_align(PAGE, PAGE).unwrap();
    unsafe { std::alloc::dealloc(region.as_ptr() as *mut u8, layout) };
}

struct GateCtrl {
    running: AtomicBool,
    release: AtomicBool,
}

unsafe extern "C" fn gated_entry(arg: *mut c_void) {
    let ctrl = unsafe { &*(arg as *const GateCtrl) };
    ctrl.running.store(true, Ordering::SeqCst);
    while !ctrl.release.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
}

#[test]
fn close_before_exit_fails_and_unmaps_nothing() {
    let rt = rt();
    let ctrl = Box::leak(Box::new(GateCtrl {
        running: AtomicBool::new(false),
        release: AtomicBool::new(false),
    }));

    let mut thread = Thread::new();
    unsafe {
        rt.create(
            &mut thread,
            gated_entry,
            ctrl as *const GateCtrl as *mut c_void,
            None,
            STACK,
            0x2C,
            -2,
        )
        .unwrap();
    }
    rt.start(&thread).unwrap();
    while !ctrl.running.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }

    assert!(thread.is_registered());
    assert!(matches!(rt.close(&mut thread), Err(CloseError::NotExited)));
    assert_eq!(rt.provider().live_mappings(), 1);

    ctrl.release.store(true, Ordering::SeqCst);
    rt.wait_for_exit(&thread).unwrap();
    rt.close(&mut thread).unwrap();
    assert_eq!(rt.provider().live_mappings(), 0);

    // The record is spent; closing again reports it.
    assert!(matches!(rt.close(&mut thread), Err(CloseError::NotCreated)));
}

#[test]
fn pause_resume_and_context_go_through_the_kernel() {
    let rt = rt();
    let ctrl = Box::leak(Box::new(GateCtrl {
        running: AtomicBool::new(false),
        release: AtomicBool::new(false),
    }));

    let mut thread = Thread::new();
    unsafe {
        rt.create(
            &mut thread,
            gated_entry,
            ctrl as *const GateCtrl as *mut c_void,
            None,
            STACK,
            0x2C,
            -2,
        )
        .unwrap();
    }
    rt.start(&thread).unwrap();

    rt.pause(&thread).unwrap();
    let ctx = rt.dump_context(&thread).unwrap();
    assert!(ctx.is_aarch64());
    rt.resume(&thread).unwrap();
    assert_eq!(rt.provider().pause_count(), 1);
    assert_eq!(rt.provider().resume_count(), 1);

    ctrl.release.store(true, Ordering::SeqCst);
    rt.wait_for_exit(&thread).unwrap();
    rt.close(&mut thread).unwrap();
}

#[test]
fn slot_ids_are_distinct_until_the_pool_is_exhausted() {
    let rt = rt();
    let mut ids = Vec::new();
    for _ in 0..NUM_TLS_SLOTS {
        ids.push(rt.tls_slot_alloc(None).unwrap());
    }
    assert_eq!(rt.tls_slot_alloc(None), None);

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), NUM_TLS_SLOTS);

    // Freeing one id makes exactly that id available again.
    rt.tls_slot_free(ids[3]).unwrap();
    assert_eq!(rt.tls_slot_alloc(None), Some(ids[3]));
}

#[test]
fn set_then_get_round_trips_on_the_same_thread() {
    let rt = rt();
    let slot = rt.tls_slot_alloc(None).unwrap();
    assert!(rt.tls_get(slot).unwrap().is_null());

    rt.tls_set(slot, 0x1234 as *mut c_void).unwrap();
    assert_eq!(rt.tls_get(slot).unwrap() as usize, 0x1234);

    assert!(rt.tls_get(NUM_TLS_SLOTS).is_err());
    assert!(rt.tls_set(NUM_TLS_SLOTS, core::ptr::null_mut()).is_err());
}

struct WorkerCtrl {
    rt: &'static Rt,
    started: AtomicBool,
    slot_ready: AtomicBool,
    slot: AtomicUsize,
    value_to_set: usize,
    observed_initial: AtomicUsize,
    observed_after_set: AtomicUsize,
}

unsafe extern "C" fn slot_worker(arg: *mut c_void) {
    let ctrl = unsafe { &*(arg as *const WorkerCtrl) };
    ctrl.started.store(true, Ordering::SeqCst);
    while !ctrl.slot_ready.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    let slot = ctrl.slot.load(Ordering::SeqCst);

    let initial = ctrl.rt.tls_get(slot).unwrap() as usize;
    ctrl.observed_initial.store(initial, Ordering::SeqCst);

    ctrl.rt.tls_set(slot, ctrl.value_to_set as *mut c_void).unwrap();
    let after = ctrl.rt.tls_get(slot).unwrap() as usize;
    ctrl.observed_after_set.store(after, Ordering::SeqCst);
}

#[test]
fn a_fresh_slot_reads_null_on_every_live_thread_until_each_sets_it() {
    let rt = rt();

    let mk_ctrl = |value| {
        &*Box::leak(Box::new(WorkerCtrl {
            rt,
            started: AtomicBool::new(false),
            slot_ready: AtomicBool::new(false),
            slot: AtomicUsize::new(usize::MAX),
            value_to_set: value,
            observed_initial: AtomicUsize::new(usize::MAX),
            observed_after_set: AtomicUsize::new(usize::MAX),
        }))
    };
    let ctrl1 = mk_ctrl(0x1111);
    let ctrl2 = mk_ctrl(0x2222);

    let mut threads = [Thread::new(), Thread::new()];
    for (thread, ctrl) in threads.iter_mut().zip([ctrl1, ctrl2]) {
        unsafe {
            rt.create(
                thread,
                slot_worker,
                ctrl as *const WorkerCtrl as *mut c_void,
                None,
                STACK,
                0x2C,
                -2,
            )
            .unwrap();
        }
        rt.start(thread).unwrap();
    }
    while !(ctrl1.started.load(Ordering::SeqCst) && ctrl2.started.load(Ordering::SeqCst)) {
        std::thread::yield_now();
    }

    // Both threads are live and registered; the slot is allocated after
    // they started.
    let slot = rt.tls_slot_alloc(None).unwrap();
    for ctrl in [ctrl1, ctrl2] {
        ctrl.slot.store(slot, Ordering::SeqCst);
        ctrl.slot_ready.store(true, Ordering::SeqCst);
    }

    for thread in &mut threads {
        rt.wait_for_exit(thread).unwrap();
        rt.close(thread).unwrap();
    }

    assert_eq!(ctrl1.observed_initial.load(Ordering::SeqCst), 0);
    assert_eq!(ctrl2.observed_initial.load(Ordering::SeqCst), 0);
    assert_eq!(ctrl1.observed_after_set.load(Ordering::SeqCst), 0x1111);
    assert_eq!(ctrl2.observed_after_set.load(Ordering::SeqCst), 0x2222);
}

static DTOR_CALLS: AtomicUsize = AtomicUsize::new(0);
static DTOR_LAST_VALUE: AtomicUsize = AtomicUsize::new(0);

fn recording_dtor(value: *mut c_void) {
    DTOR_CALLS.fetch_add(1, Ordering::SeqCst);
    DTOR_LAST_VALUE.store(value as usize, Ordering::SeqCst);
}

struct DtorCtrl {
    rt: &'static Rt,
    slot: usize,
}

unsafe extern "C" fn dtor_worker(arg: *mut c_void) {
    let ctrl = unsafe { &*(arg as *const DtorCtrl) };
    ctrl.rt.tls_set(ctrl.slot, 0xBEEF as *mut c_void).unwrap();
}

#[test]
fn destructor_runs_exactly_once_with_the_stored_value_on_exit() {
    let rt = rt();
    let slot = rt.tls_slot_alloc(Some(recording_dtor)).unwrap();
    let ctrl = Box::leak(Box::new(DtorCtrl { rt, slot }));

    let mut thread = Thread::new();
    unsafe {
        rt.create(
            &mut thread,
            dtor_worker,
            ctrl as *const DtorCtrl as *mut c_void,
            None,
            STACK,
            0x2C,
            -2,
        )
        .unwrap();
    }
    rt.start(&thread).unwrap();
    rt.wait_for_exit(&thread).unwrap();
    rt.close(&mut thread).unwrap();

    assert_eq!(DTOR_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(DTOR_LAST_VALUE.load(Ordering::SeqCst), 0xBEEF);
}

#[test]
fn main_thread_adoption_enables_the_current_thread_accessors() {
    let rt = rt();
    assert!(rt.current_handle().is_none());

    let reent = Box::leak(Box::new([0u8; REENT_SIZE]));
    let stack_marker = 0u8;
    let stack_base = NonNull::new(&stack_marker as *const u8 as *mut c_void).unwrap();
    let handle = unsafe { Handle::from_raw(0xAA) };
    unsafe { rt.init_main_thread(handle, stack_base, PAGE, reent.as_mut_ptr() as *mut c_void) };

    assert_eq!(rt.current_handle(), Some(handle));
    assert!(rt.current_thread_ptr().is_some());
    assert_eq!(rt.live_threads(), 1);
}

#[test]
fn exit_from_a_foreign_thread_aborts() {
    let rt = rt();
    let result = std::thread::spawn(move || {
        // This host thread never went through the trampoline or adoption.
        rt.exit_current_thread();
    })
    .join();
    assert!(result.is_err());
}
