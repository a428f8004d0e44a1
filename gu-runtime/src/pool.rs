//! Native memory pools
//!
//! A `GuPool` is an arena: every allocation is drawn from it and the whole
//! pool is released by a single `gu_pool_free`. Live pools are tracked so a
//! second free of the same pool is detected and ignored instead of freeing
//! twice.

use crate::allocator::{Allocator, MAX_ALIGN};
use dashmap::DashSet;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

static LIVE_POOLS: Lazy<DashSet<usize>> = Lazy::new(DashSet::new);
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Arena pool (opaque to native callers)
pub struct GuPool {
    id: u64,
    alloc: Mutex<Allocator>,
}

impl GuPool {
    fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            alloc: Mutex::new(Allocator::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Total bytes reserved by this pool
    pub fn reserved(&self) -> usize {
        self.alloc.lock().stats().total_allocated
    }

    fn malloc_aligned(&self, size: usize, align: usize) -> *mut c_void {
        let align = if align == 0 { gu_mem_alignment(size) } else { align };
        match self.alloc.lock().alloc(size, align) {
            Some(ptr) => ptr.as_ptr() as *mut c_void,
            None => {
                warn!(event = "pool_exhausted", pool = self.id, size, align);
                core::ptr::null_mut()
            }
        }
    }
}

/// Largest power of two dividing `size`, capped at the pool's maximum alignment
pub const fn gu_mem_alignment(size: usize) -> usize {
    if size == 0 {
        return 1;
    }
    let align = 1usize << size.trailing_zeros();
    if align > MAX_ALIGN {
        MAX_ALIGN
    } else {
        align
    }
}

/// Number of pools created and not yet freed
pub fn live_pools() -> usize {
    LIVE_POOLS.len()
}

/// Whether `pool` points at a pool that has not been freed
pub fn is_live(pool: *const GuPool) -> bool {
    LIVE_POOLS.contains(&(pool as usize))
}

#[no_mangle]
pub extern "C" fn gu_new_pool() -> *mut GuPool {
    let pool = Box::into_raw(Box::new(GuPool::new()));
    LIVE_POOLS.insert(pool as usize);
    trace!(event = "pool_new", address = ?pool);
    pool
}

/// Free a pool and everything allocated from it.
///
/// # Safety
/// `pool` must be null or a pointer returned by `gu_new_pool`.
#[no_mangle]
pub unsafe extern "C" fn gu_pool_free(pool: *mut GuPool) {
    if pool.is_null() {
        return;
    }
    if LIVE_POOLS.remove(&(pool as usize)).is_none() {
        warn!(event = "pool_double_free", address = ?pool);
        return;
    }
    trace!(event = "pool_free", address = ?pool);
    drop(Box::from_raw(pool));
}

/// Allocate `size` zeroed bytes with the given alignment (0 picks one from the size).
///
/// # Safety
/// `pool` must be a live pool.
#[no_mangle]
pub unsafe extern "C" fn gu_malloc_aligned(pool: *mut GuPool, size: usize, align: usize) -> *mut c_void {
    match pool.as_ref() {
        Some(pool) => pool.malloc_aligned(size, align),
        None => core::ptr::null_mut(),
    }
}

/// # Safety
/// `pool` must be a live pool.
#[no_mangle]
pub unsafe extern "C" fn gu_malloc(pool: *mut GuPool, size: usize) -> *mut c_void {
    gu_malloc_aligned(pool, size, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_alignment() {
        assert_eq!(gu_mem_alignment(0), 1);
        assert_eq!(gu_mem_alignment(1), 1);
        assert_eq!(gu_mem_alignment(6), 2);
        assert_eq!(gu_mem_alignment(24), 8);
        assert_eq!(gu_mem_alignment(4096), MAX_ALIGN);
    }

    #[test]
    fn test_pool_lifecycle() {
        let pool = gu_new_pool();
        assert!(is_live(pool));

        unsafe {
            let p = gu_malloc(pool, 24) as *mut u64;
            assert!(!p.is_null());
            assert_eq!(p as usize % 8, 0);
            *p = 7;

            gu_pool_free(pool);
        }
        assert!(!is_live(pool));
    }

    #[test]
    fn test_double_free_is_ignored() {
        let pool = gu_new_pool();
        unsafe {
            gu_pool_free(pool);
            gu_pool_free(pool);
        }
        assert!(!is_live(pool));
    }

    #[test]
    fn test_null_pool_allocation() {
        unsafe {
            assert!(gu_malloc(core::ptr::null_mut(), 8).is_null());
        }
    }
}
