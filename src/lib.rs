//! # tsheap - Thread-Safe Segregated Free-List Allocator
//!
//! A general-purpose heap allocator over a single contiguous region of
//! anonymous virtual memory, reserved once from the OS at
//! initialization. Exposes the classical allocate / free / reallocate /
//! zero-allocate operations plus a statistics query, and is safe to
//! call from any number of threads concurrently — every public
//! operation takes the same single lock.
//!
//! ```text
//! block       — boundary-tagged header/footer codec
//! bucket      — size-class index (10 geometric buckets)
//! free_list   — segregated LIFO free lists, links stored in-block
//! heap        — splitter/coalescer + public façade, owns the lock
//! os          — mmap-backed anonymous memory reservation
//! ffi         — extern "C" entry points for non-Rust callers
//! ```
//!
//! There are no per-thread caches, no lock-free fast path, and no
//! growth beyond the initial reservation: once the region is
//! exhausted, `allocate` returns null until something is freed.

mod block;
mod bucket;
mod error;
mod ffi;
mod free_list;
mod os;

mod heap;

pub use heap::{allocate, free, heap_init, reallocate, stats, zero_allocate, Stats};
