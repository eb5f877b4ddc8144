//! `extern "C"` entry points so a harness written in C, C++, or any
//! other FFI-capable language can link against this crate's `cdylib`
//! or `staticlib` output, per the linkage-compatibility requirement.
//! Each wrapper is a thin, allocation-free pass-through to the safe
//! façade in [`crate::heap`].

use crate::heap;

/// # Safety
/// May only be called with a `bytes` value representable as `usize` on
/// this platform; there is no pointer argument to misuse.
#[no_mangle]
pub unsafe extern "C" fn tsheap_init(bytes: usize) {
    heap::heap_init(bytes);
}

/// # Safety
/// No preconditions beyond the FFI boundary itself: `size` is a plain
/// value, not a pointer.
#[no_mangle]
pub unsafe extern "C" fn tsheap_alloc(size: usize) -> *mut u8 {
    heap::allocate(size)
}

/// # Safety
/// `ptr` must be null or a pointer previously returned by one of this
/// crate's allocation functions and not already passed to this
/// function (beyond the tolerated double-free no-op).
#[no_mangle]
pub unsafe extern "C" fn tsheap_free(ptr: *mut u8) {
    heap::free(ptr);
}

/// # Safety
/// `ptr` must be null or a pointer previously returned by one of this
/// crate's allocation functions.
#[no_mangle]
pub unsafe extern "C" fn tsheap_realloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    heap::reallocate(ptr, new_size)
}

/// # Safety
/// No pointer arguments; `count`/`elem_size` are plain values.
#[no_mangle]
pub unsafe extern "C" fn tsheap_zalloc(count: usize, elem_size: usize) -> *mut u8 {
    heap::zero_allocate(count, elem_size)
}

/// # Safety
/// Each out-pointer must be either null or valid for a single `usize`
/// write. A null out-pointer simply skips that field, mirroring the
/// original C signature's `NULL`-tolerant semantics.
#[no_mangle]
pub unsafe extern "C" fn tsheap_stats(
    out_total: *mut usize,
    out_free: *mut usize,
    out_largest_free: *mut usize,
) {
    let stats = heap::stats();
    if let Some(out) = out_total.as_mut() {
        *out = stats.total;
    }
    if let Some(out) = out_free.as_mut() {
        *out = stats.free;
    }
    if let Some(out) = out_largest_free.as_mut() {
        *out = stats.largest_free;
    }
}
