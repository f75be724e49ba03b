//! Kernel handle types.

/// A raw kernel handle.
pub type RawHandle = u32;

/// Invalid handle.
pub const INVALID_HANDLE: RawHandle = 0;

/// Pseudo handle for the current thread.
pub const CUR_THREAD_HANDLE: RawHandle = 0xFFFF_8000;

/// Pseudo handle for the current process.
pub const CUR_PROCESS_HANDLE: RawHandle = 0xFFFF_8001;

/// A handle to a thread kernel object.
///
/// The handle is a plain reference-counted kernel object id; copying the
/// value does not duplicate the kernel reference. Whoever owns the object it
/// came from is responsible for closing it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(RawHandle);

impl Handle {
    /// Wraps a raw handle.
    ///
    /// # Safety
    /// The caller must guarantee the raw handle is valid (or the documented
    /// pseudo handle for the current thread).
    pub const unsafe fn from_raw(raw: RawHandle) -> Self {
        Self(raw)
    }

    /// Returns the pseudo handle referring to the calling thread.
    pub const fn current_thread() -> Self {
        Self(CUR_THREAD_HANDLE)
    }

    /// Returns `true` if the handle is not the invalid handle.
    pub const fn is_valid(&self) -> bool {
        self.0 != INVALID_HANDLE
    }

    /// Returns `true` if the handle is the current-thread pseudo handle.
    pub const fn is_current_thread(&self) -> bool {
        self.0 == CUR_THREAD_HANDLE
    }

    /// Returns the raw handle value.
    pub const fn to_raw(&self) -> RawHandle {
        self.0
    }
}
