//! Tagged variants packed into a single word
//!
//! Small tags live in the low bits of the payload pointer as `tag + 1`
//! (payloads are at least word aligned, so those bits are free). Tags too
//! large for the low bits are stored in the byte just before the payload,
//! and the pointer is left untagged. A zero word is the null variant.

use crate::pool::{gu_malloc_aligned, GuPool};
use std::ffi::{c_int, c_void};

pub type GuVariant = usize;

pub const VARIANT_ALIGNMENT: usize = core::mem::size_of::<usize>();
pub const GU_VARIANT_NULL: c_int = -1;

/// Allocate a variant payload in `pool` and store the encoded word in `out`.
///
/// # Safety
/// `pool` must be a live pool and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn gu_alloc_variant(
    tag: u8,
    size: usize,
    align: usize,
    out: *mut GuVariant,
    pool: *mut GuPool,
) -> *mut c_void {
    let align = align.max(VARIANT_ALIGNMENT);

    if (tag as usize) > VARIANT_ALIGNMENT - 2 {
        let base = gu_malloc_aligned(pool, align + size, align) as *mut u8;
        if base.is_null() {
            *out = 0;
            return core::ptr::null_mut();
        }
        *base.add(align - 1) = tag;
        let data = base.add(align);
        *out = data as usize;
        return data as *mut c_void;
    }

    let data = gu_malloc_aligned(pool, size, align);
    *out = if data.is_null() { 0 } else { data as usize | (tag as usize + 1) };
    data
}

/// Build a variant, copying `size` payload bytes from `init` (if non-null).
///
/// # Safety
/// `pool` must be a live pool; `init` must be null or readable for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn gu_make_variant(
    tag: u8,
    size: usize,
    align: usize,
    init: *const c_void,
    pool: *mut GuPool,
) -> GuVariant {
    let mut word: GuVariant = 0;
    let data = gu_alloc_variant(tag, size, align, &mut word, pool);
    if !data.is_null() && !init.is_null() {
        core::ptr::copy_nonoverlapping(init as *const u8, data as *mut u8, size);
    }
    word
}

/// # Safety
/// `variant` must be zero or produced by `gu_make_variant`/`gu_alloc_variant`.
#[no_mangle]
pub unsafe extern "C" fn gu_variant_tag(variant: GuVariant) -> c_int {
    if variant == 0 {
        return GU_VARIANT_NULL;
    }
    let low = variant % VARIANT_ALIGNMENT;
    if low == 0 {
        let data = variant as *const u8;
        return *data.sub(1) as c_int;
    }
    low as c_int - 1
}

#[no_mangle]
pub extern "C" fn gu_variant_data(variant: GuVariant) -> *mut c_void {
    if variant == 0 {
        return core::ptr::null_mut();
    }
    (variant & !(VARIANT_ALIGNMENT - 1)) as *mut c_void
}
