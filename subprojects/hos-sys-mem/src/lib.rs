//! # hos-sys-mem
//!
//! Process memory utilities for the thread runtime: page-alignment helpers,
//! page-aligned backing buffers, the stack mapping typestate, and the
//! guard-paged virtual-range reservation capability.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod alignment;
pub mod buf;
pub mod stack;
pub mod vspace;
