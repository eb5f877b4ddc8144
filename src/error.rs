//! Internal error type for the OS-reservation path.
//!
//! Never crosses the public API: every externally observable failure
//! still surfaces as a null pointer or a silent no-op, per the heap
//! façade's contract. This exists purely so the reservation path can
//! carry a structured cause into a log line.

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum HeapError {
    #[error("mmap failed to reserve {bytes} bytes (errno {errno})")]
    Reservation { bytes: usize, errno: i32 },
}
