//! OS anonymous-memory reservation primitive.
//!
//! The only environmental dependency the core relies on: "reserve N
//! bytes of zero-initialized, read/write virtual memory." Anonymous
//! `mmap` pages come zero-filled from the kernel already, so no
//! explicit zeroing pass is needed.

use crate::error::HeapError;

/// Reserve `bytes` of anonymous, zero-initialized, read/write memory.
///
/// `bytes` must already be rounded up to the allocator's alignment by
/// the caller; this function does not adjust it further beyond what
/// `mmap` itself requires.
pub(crate) fn reserve(bytes: usize) -> Result<*mut u8, HeapError> {
    // SAFETY: a fixed, well-understood set of arguments to mmap(2); the
    // returned pointer is only ever used through this crate's own
    // bookkeeping of `bytes` worth of memory.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(HeapError::Reservation {
            bytes,
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        });
    }

    Ok(ptr as *mut u8)
}
