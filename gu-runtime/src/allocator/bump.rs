//! Bump cursor over the newest chunk of a pool

use core::ptr::NonNull;

/// Offset cursor into the chunk currently being filled
///
/// An empty cursor (no chunk yet) has `base == null` and zero capacity, so
/// every request falls through to chunk acquisition.
pub struct BumpAllocator {
    base: *mut u8,
    used: usize,
    capacity: usize,
}

impl BumpAllocator {
    #[inline]
    pub const fn new() -> Self {
        Self {
            base: core::ptr::null_mut(),
            used: 0,
            capacity: 0,
        }
    }

    /// Carve `size` bytes at `align` out of the chunk, or None when it is full
    #[inline(always)]
    pub fn try_alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        debug_assert!(align.is_power_of_two(), "alignment must be power of 2");

        let base = NonNull::new(self.base)?;
        let cursor = base.as_ptr() as usize + self.used;
        let offset = align_up(cursor, align) - base.as_ptr() as usize;
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            return None;
        }

        self.used = end;
        // In bounds: offset + size <= capacity of the live chunk.
        NonNull::new(unsafe { base.as_ptr().add(offset) })
    }

    /// Point the cursor at a fresh chunk `[start, end)`
    #[inline]
    pub fn reset(&mut self, start: *mut u8, end: *mut u8) {
        debug_assert!(start <= end, "invalid chunk bounds");
        self.base = start;
        self.used = 0;
        self.capacity = end as usize - start as usize;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

impl Default for BumpAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `addr` up to a multiple of the power-of-two `align`
#[inline(always)]
pub(crate) const fn align_up(addr: usize, align: usize) -> usize {
    let mask = align - 1;
    (addr + mask) & !mask
}
