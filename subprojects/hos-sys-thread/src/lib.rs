//! # hos-sys-thread
//!
//! User-space thread runtime for Horizon OS.
//!
//! The kernel's thread primitives are deliberately small: a thread is
//! created suspended, started, exits, and its handle is closed — and the
//! only per-thread storage the kernel provides is a fixed 0x200-byte
//! thread-local region. Everything else lives here:
//!
//! - stack layout and mirror mapping (stack + reentrant-state block + TLS
//!   segment in one backing allocation, mapped into a guard-paged range),
//! - the process-wide registry of live threads,
//! - dynamic TLS slots with exit-time destructors,
//! - the entry trampoline and exit teardown that keep all of the above
//!   consistent.
//!
//! All state is owned by a [`ThreadRt`] runtime context, constructed by the
//! process entry point before the first thread is spawned and alive for the
//! rest of the process. The kernel itself is consumed through the
//! [`hos_svc::kernel::Kernel`] and [`hos_sys_mem::vspace::StackSpace`]
//! capability traits.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod reent;
pub mod tls_image;
pub mod tls_region;

mod activity;
mod close;
mod context;
mod create;
mod exit;
mod layout;
mod registry;
mod rt;
mod slots;
mod thread;
mod wait;

pub use close::CloseError;
pub use create::{CreateError, ThreadFunc};
pub use registry::ThreadKey;
pub use rt::ThreadRt;
pub use slots::{SlotDestructor, SlotError};
pub use thread::{Thread, ThreadStackMem};

#[cfg(test)]
mod mock;
#[cfg(test)]
mod tests;
