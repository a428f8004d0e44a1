//! Length-prefixed sequences
//!
//! Layout: a header holding the element count, padded to the pool's maximum
//! alignment, immediately followed by `len * elem_size` bytes of elements.

use crate::pool::{gu_malloc_aligned, GuPool};
use crate::allocator::MAX_ALIGN;
use std::ffi::c_void;
use tracing::trace;

#[repr(C, align(16))]
pub struct GuSeq {
    pub len: usize,
}

const _: () = assert!(core::mem::align_of::<GuSeq>() == MAX_ALIGN);

impl GuSeq {
    /// Pointer to the first element
    #[inline]
    pub fn data(&self) -> *mut c_void {
        unsafe { (self as *const GuSeq).add(1) as *mut c_void }
    }
}

/// Allocate a sequence of `len` zeroed elements of `elem_size` bytes.
///
/// # Safety
/// `pool` must be a live pool.
#[no_mangle]
pub unsafe extern "C" fn gu_make_seq(elem_size: usize, len: usize, pool: *mut GuPool) -> *mut GuSeq {
    let body = match elem_size.checked_mul(len) {
        Some(n) => n,
        None => return core::ptr::null_mut(),
    };
    let total = match body.checked_add(core::mem::size_of::<GuSeq>()) {
        Some(n) => n,
        None => return core::ptr::null_mut(),
    };

    let seq = gu_malloc_aligned(pool, total, MAX_ALIGN) as *mut GuSeq;
    if let Some(s) = seq.as_mut() {
        s.len = len;
        trace!(event = "seq_new", elem_size, len, address = ?seq);
    }
    seq
}

/// # Safety
/// `seq` must be null or a sequence made by `gu_make_seq`.
#[no_mangle]
pub unsafe extern "C" fn gu_seq_length(seq: *const GuSeq) -> usize {
    seq.as_ref().map_or(0, |s| s.len)
}

/// # Safety
/// `seq` must be null or a sequence made by `gu_make_seq`.
#[no_mangle]
pub unsafe extern "C" fn gu_seq_data(seq: *const GuSeq) -> *mut c_void {
    seq.as_ref().map_or(core::ptr::null_mut(), GuSeq::data)
}
