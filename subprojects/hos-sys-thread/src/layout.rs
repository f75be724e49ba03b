//! Stack layout planning.
//!
//! One backing allocation holds three regions: the execution stack, the
//! reentrant-state block, and the TLS segment, in that order. The plan is
//! computed and validated once per thread creation; everything downstream
//! addresses the mapped mirror through the plan's accessors instead of
//! re-deriving offsets.
//!
//! ```text
//! +--------------------------- map_size (page multiple) ---------------------+
//! | stack (grows down)            | entry args | reent        | tls          |
//! +-------------------------------+------------+--------------+--------------+
//! 0                       usable_stack    reent_offset    tls_offset
//! ```
//!
//! The entry-args block is carved out of the top of the requested stack;
//! `usable_stack` is what remains below it.

use core::{ffi::c_void, ptr::NonNull};

use hos_sys_mem::alignment::{is_page_aligned, round_up_to_page};

/// A validated stack layout plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StackLayout {
    map_size: usize,
    usable_stack: usize,
    reent_offset: usize,
    tls_offset: usize,
    reent_size: usize,
    tls_size: usize,
    args_size: usize,
}

/// Errors produced while planning a layout.
#[derive(Debug, thiserror::Error)]
pub(crate) enum LayoutError {
    /// The caller-supplied region is not page-aligned or not page-sized.
    #[error("Caller-supplied stack region must be page-aligned and page-sized")]
    BadStackRegion,

    /// The region cannot hold the reentrant-state block, the TLS segment
    /// and a non-empty stack.
    #[error("Stack region too small")]
    OutOfMemory,
}

impl StackLayout {
    /// Plans a layout for a runtime-allocated backing region.
    ///
    /// The three regions are laid out forward from offset zero and the
    /// backing allocation is the page-rounded sum.
    pub(crate) fn plan_owned(
        stack_size: usize,
        reent_size: usize,
        tls_size: usize,
        args_size: usize,
    ) -> Result<Self, LayoutError> {
        if stack_size <= args_size {
            return Err(LayoutError::OutOfMemory);
        }

        Ok(Self {
            map_size: round_up_to_page(stack_size + reent_size + tls_size),
            // The entry-args block (and with it the initial stack pointer)
            // must stay 16-byte aligned even for unaligned stack requests.
            usable_stack: (stack_size - args_size) & !0xF,
            reent_offset: stack_size,
            tls_offset: stack_size + reent_size,
            reent_size,
            tls_size,
            args_size,
        })
    }

    /// Plans a layout inside a caller-supplied region.
    ///
    /// The region must be page-aligned and page-sized. The TLS segment goes
    /// at the tail, the reentrant-state block immediately before it, and
    /// whatever remains below is the stack.
    pub(crate) fn plan_provided(
        region_addr: usize,
        region_size: usize,
        reent_size: usize,
        tls_size: usize,
        args_size: usize,
    ) -> Result<Self, LayoutError> {
        if !is_page_aligned(region_addr) || !is_page_aligned(region_size) || region_size == 0 {
            return Err(LayoutError::BadStackRegion);
        }

        let tls_offset = region_size
            .checked_sub(tls_size)
            .ok_or(LayoutError::OutOfMemory)?;
        let reent_offset = tls_offset
            .checked_sub(reent_size)
            .ok_or(LayoutError::OutOfMemory)?;
        // The stack must not collapse to nothing.
        if reent_offset == 0 || reent_offset <= args_size {
            return Err(LayoutError::OutOfMemory);
        }

        Ok(Self {
            // Mapping is page-granular; the whole combined footprint is
            // mapped in both branches.
            map_size: round_up_to_page(region_size),
            usable_stack: (reent_offset - args_size) & !0xF,
            reent_offset,
            tls_offset,
            reent_size,
            tls_size,
            args_size,
        })
    }

    /// Page-rounded size of the whole mapped footprint.
    pub(crate) fn map_size(&self) -> usize {
        self.map_size
    }

    /// Usable stack size, with the entry-args block already subtracted.
    pub(crate) fn usable_stack(&self) -> usize {
        self.usable_stack
    }

    /// Initial stack top on the mirror: the base of the entry-args block.
    pub(crate) fn stack_top(&self, mirror: NonNull<c_void>) -> NonNull<c_void> {
        debug_assert!(self.usable_stack + self.args_size <= self.map_size);
        // SAFETY: offset validated at plan time; result is within the
        // mapped mirror and non-null.
        unsafe {
            NonNull::new_unchecked((mirror.as_ptr() as *mut u8).add(self.usable_stack) as *mut c_void)
        }
    }

    /// Reentrant-state block on the mirror.
    pub(crate) fn reent_ptr(&self, mirror: NonNull<c_void>) -> NonNull<u8> {
        debug_assert!(self.reent_offset + self.reent_size <= self.map_size);
        // SAFETY: offset validated at plan time.
        unsafe { NonNull::new_unchecked((mirror.as_ptr() as *mut u8).add(self.reent_offset)) }
    }

    /// TLS segment on the mirror.
    pub(crate) fn tls_ptr(&self, mirror: NonNull<c_void>) -> NonNull<u8> {
        debug_assert!(self.tls_offset + self.tls_size <= self.map_size);
        // SAFETY: offset validated at plan time.
        unsafe { NonNull::new_unchecked((mirror.as_ptr() as *mut u8).add(self.tls_offset)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 0x1000;
    const ARGS: usize = 48;

    #[test]
    fn owned_layout_is_forward_and_page_rounded() {
        let plan = StackLayout::plan_owned(0x4000, 352, 0x60, ARGS).unwrap();
        assert_eq!(plan.usable_stack(), 0x4000 - ARGS);
        assert_eq!(plan.reent_offset, 0x4000);
        assert_eq!(plan.tls_offset, 0x4000 + 352);
        // 0x4000 + 352 + 0x60 rounds up to the next page.
        assert_eq!(plan.map_size(), 0x5000);
    }

    #[test]
    fn owned_layout_rounds_unaligned_requests() {
        // An unaligned stack request still maps a whole number of pages.
        let plan = StackLayout::plan_owned(0x1100, 352, 0, ARGS).unwrap();
        assert_eq!(plan.map_size(), 0x2000);
    }

    #[test]
    fn owned_layout_needs_room_for_entry_args() {
        assert!(matches!(
            StackLayout::plan_owned(ARGS, 352, 0x60, ARGS),
            Err(LayoutError::OutOfMemory)
        ));
    }

    #[test]
    fn provided_layout_is_backward_from_the_tail() {
        let plan = StackLayout::plan_provided(0x10000, 2 * PAGE, 352, 0x60, ARGS).unwrap();
        assert_eq!(plan.tls_offset, 2 * PAGE - 0x60);
        assert_eq!(plan.reent_offset, 2 * PAGE - 0x60 - 352);
        assert_eq!(plan.usable_stack(), plan.reent_offset - ARGS);
        assert_eq!(plan.map_size(), 2 * PAGE);
    }

    #[test]
    fn provided_layout_rejects_unaligned_regions() {
        assert!(matches!(
            StackLayout::plan_provided(0x10010, 2 * PAGE, 352, 0x60, ARGS),
            Err(LayoutError::BadStackRegion)
        ));
        assert!(matches!(
            StackLayout::plan_provided(0x10000, PAGE + 0x10, 352, 0x60, ARGS),
            Err(LayoutError::BadStackRegion)
        ));
        assert!(matches!(
            StackLayout::plan_provided(0x10000, 0, 352, 0x60, ARGS),
            Err(LayoutError::BadStackRegion)
        ));
    }

    #[test]
    fn provided_layout_rejects_regions_smaller_than_the_tail_blocks() {
        // One page cannot hold a page of TLS plus the reent block.
        assert!(matches!(
            StackLayout::plan_provided(0x10000, PAGE, 352, PAGE, ARGS),
            Err(LayoutError::OutOfMemory)
        ));
        // Exactly reent + tls leaves no stack at all.
        assert!(matches!(
            StackLayout::plan_provided(0x10000, PAGE, PAGE - 0x60, 0x60, ARGS),
            Err(LayoutError::OutOfMemory)
        ));
    }

    #[test]
    fn accessors_address_the_mirror() {
        let plan = StackLayout::plan_owned(PAGE, 352, 0x60, ARGS).unwrap();
        let mirror = NonNull::new(0x8000_0000usize as *mut core::ffi::c_void).unwrap();
        assert_eq!(
            plan.stack_top(mirror).as_ptr() as usize,
            0x8000_0000 + PAGE - ARGS
        );
        assert_eq!(plan.reent_ptr(mirror).as_ptr() as usize, 0x8000_0000 + PAGE);
        assert_eq!(
            plan.tls_ptr(mirror).as_ptr() as usize,
            0x8000_0000 + PAGE + 352
        );
    }
}
