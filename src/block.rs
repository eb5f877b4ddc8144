//! Block header/footer codec.
//!
//! A block is framed by a header and a footer, each one machine word,
//! encoding the block's size with the low bit repurposed as the "used"
//! flag. Every size handled by this codec is a multiple of [`A`], so the
//! low bit is always free for reuse.

use core::mem;

/// Machine word size. This crate targets 64-bit hosts only.
pub(crate) const W: usize = mem::size_of::<usize>();

/// Payload alignment, in bytes.
pub(crate) const A: usize = 16;

/// Minimum size of a remainder block produced by a split.
pub(crate) const MIN_SPLIT: usize = 64;

/// `header + prev_free + next_free`, before alignment padding.
const LINK_AREA: usize = 3 * W;

/// Fixed payload offset: header/links area rounded up to [`A`].
pub(crate) const H: usize = align_up(LINK_AREA, A);

/// Every block must be at least this large so that, once freed, its
/// links and footer fit inside it.
pub(crate) const MIN_BLOCK_SIZE: usize = align_up(H + W, A);

const USED_BIT: usize = 1;

const _: () = assert!(A.is_power_of_two() && A >= 2, "A must be a power of two >= 2");
const _: () = assert!(H % A == 0, "H must stay a multiple of A for payload alignment");

#[inline]
pub(crate) const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Pack a block size and used-flag into a header/footer word.
#[inline]
pub(crate) fn pack(size: usize, used: bool) -> usize {
    debug_assert!(size % A == 0, "block size must be A-aligned");
    if used { size | USED_BIT } else { size }
}

#[inline]
pub(crate) fn size_of_word(word: usize) -> usize {
    word & !USED_BIT
}

#[inline]
pub(crate) fn is_used(word: usize) -> bool {
    word & USED_BIT != 0
}

#[inline]
unsafe fn read_at(addr: usize) -> usize {
    (addr as *const usize).read()
}

#[inline]
unsafe fn write_at(addr: usize, val: usize) {
    (addr as *mut usize).write(val);
}

/// Read the header word of the block at `addr`.
#[inline]
pub(crate) unsafe fn header(addr: usize) -> usize {
    read_at(addr)
}

#[inline]
pub(crate) unsafe fn write_header(addr: usize, word: usize) {
    write_at(addr, word);
}

/// Size in bytes of the block at `addr`, read from its header.
#[inline]
pub(crate) unsafe fn block_size(addr: usize) -> usize {
    size_of_word(header(addr))
}

/// Write the footer for a block starting at `addr`, given the same
/// encoded word used for the header. The footer offset is derived from
/// the size carried by `word` itself, so header and footer never drift.
#[inline]
pub(crate) unsafe fn write_footer(addr: usize, word: usize) {
    write_at(addr + size_of_word(word) - W, word);
}

/// Read the footer word of the block at `addr`.
#[inline]
pub(crate) unsafe fn footer(addr: usize) -> usize {
    read_at(addr + block_size(addr) - W)
}

/// Read the word immediately preceding `addr` — the footer of the
/// physical left neighbor, when one exists.
#[inline]
pub(crate) unsafe fn prev_footer(addr: usize) -> usize {
    read_at(addr - W)
}

#[inline]
pub(crate) unsafe fn prev_free(addr: usize) -> usize {
    read_at(addr + W)
}

#[inline]
pub(crate) unsafe fn set_prev_free(addr: usize, val: usize) {
    write_at(addr + W, val);
}

#[inline]
pub(crate) unsafe fn next_free(addr: usize) -> usize {
    read_at(addr + 2 * W)
}

#[inline]
pub(crate) unsafe fn set_next_free(addr: usize, val: usize) {
    write_at(addr + 2 * W, val);
}

/// Payload pointer for a used block starting at `addr`.
#[inline]
pub(crate) unsafe fn payload_ptr(addr: usize) -> *mut u8 {
    (addr + H) as *mut u8
}

/// Recover a block's start address from a payload pointer.
#[inline]
pub(crate) fn block_addr_of(payload: *mut u8) -> usize {
    payload as usize - H
}

/// Size, in bytes, that `allocate` must carve out of the heap to satisfy
/// a user request of `n` bytes: payload rounded to `A`, plus the
/// header/links/footer overhead, rounded to `A` again.
#[inline]
pub(crate) fn need_for(n: usize) -> usize {
    let n = n.max(1);
    let payload = align_up(n, A);
    align_up(payload + H + W, A)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips_size_and_flag() {
        for size in [16usize, 32, 48, 1024, 1 << 20] {
            assert_eq!(size_of_word(pack(size, false)), size);
            assert_eq!(size_of_word(pack(size, true)), size);
            assert!(!is_used(pack(size, false)));
            assert!(is_used(pack(size, true)));
        }
    }

    #[test]
    fn align_up_respects_existing_alignment() {
        assert_eq!(align_up(0, A), 0);
        assert_eq!(align_up(1, A), A);
        assert_eq!(align_up(A, A), A);
        assert_eq!(align_up(A + 1, A), 2 * A);
    }

    #[test]
    fn need_for_is_always_a_aligned_and_fits_min_block() {
        for n in [0usize, 1, 15, 16, 17, 700, 65536] {
            let need = need_for(n);
            assert_eq!(need % A, 0);
            assert!(need >= MIN_BLOCK_SIZE);
            assert!(need >= n + H + W);
        }
    }

    #[test]
    fn min_block_size_fits_header_links_and_footer() {
        assert!(MIN_BLOCK_SIZE >= H + W);
        assert_eq!(MIN_BLOCK_SIZE % A, 0);
    }
}
