//! Exception frames
//!
//! Native functions report failures by raising into a `GuExn` frame passed
//! by the caller. A raise walks the frame chain to the first frame whose
//! catch kind covers the raised type; the raiser then allocates the error
//! payload in that frame's pool. Callers poll `gu_exn_caught` afterwards.

use crate::pool::{gu_malloc_aligned, GuPool};
use crate::types::{gu_type_has_kind, GuKind, GuType};
use std::ffi::{c_int, c_void};
use tracing::{debug, error};

pub const GU_EXN_RAISED: c_int = 0;
pub const GU_EXN_OK: c_int = 1;
pub const GU_EXN_BLOCKED: c_int = 2;

#[repr(C)]
pub struct GuExnData {
    pub pool: *mut GuPool,
    pub data: *const c_void,
}

#[repr(C)]
pub struct GuExn {
    pub state: c_int,
    pub parent: *mut GuExn,
    pub catch: *const GuKind,
    pub caught: *const GuType,
    pub data: GuExnData,
}

/// Allocate a new exception frame in `pool`.
///
/// # Safety
/// `pool` must be a live pool; `parent` null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_new_exn(parent: *mut GuExn, catch: *const GuKind, pool: *mut GuPool) -> *mut GuExn {
    let exn = gu_malloc_aligned(
        pool,
        core::mem::size_of::<GuExn>(),
        core::mem::align_of::<GuExn>(),
    ) as *mut GuExn;
    if exn.is_null() {
        return exn;
    }
    exn.write(GuExn {
        state: GU_EXN_OK,
        parent,
        catch,
        caught: core::ptr::null(),
        data: GuExnData {
            pool,
            data: core::ptr::null(),
        },
    });
    exn
}

/// # Safety
/// `exn` must be null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_is_raised(exn: *const GuExn) -> bool {
    exn.as_ref().map_or(false, |e| e.state == GU_EXN_RAISED)
}

/// # Safety
/// `exn` must be null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_caught(exn: *const GuExn) -> *const GuType {
    exn.as_ref().map_or(core::ptr::null(), |e| e.caught)
}

/// # Safety
/// `exn` must be null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_caught_data(exn: *const GuExn) -> *const c_void {
    exn.as_ref().map_or(core::ptr::null(), |e| e.data.data)
}

/// # Safety
/// `exn` must be a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_clear(exn: *mut GuExn) {
    if let Some(e) = exn.as_mut() {
        e.caught = core::ptr::null();
        e.data.data = core::ptr::null();
        e.state = GU_EXN_OK;
    }
}

/// # Safety
/// `exn` must be null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_block(exn: *mut GuExn) {
    if let Some(e) = exn.as_mut() {
        if e.state == GU_EXN_RAISED {
            e.state = GU_EXN_BLOCKED;
        }
    }
}

/// # Safety
/// `exn` must be null or a live frame.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_unblock(exn: *mut GuExn) {
    if let Some(e) = exn.as_mut() {
        if e.state == GU_EXN_BLOCKED {
            e.state = GU_EXN_RAISED;
        }
    }
}

/// Raise `ty` into the frame chain starting at `base`.
///
/// Returns the payload slot of the catching frame, or null when the frame
/// had already caught something (the first raise wins) or nothing catches.
///
/// # Safety
/// `base` must be null or a live frame chain; `ty` a valid descriptor.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_raise(base: *mut GuExn, ty: *const GuType) -> *mut GuExnData {
    let mut err = base;
    while let Some(e) = err.as_mut() {
        if !e.catch.is_null() && gu_type_has_kind(ty, e.catch) {
            break;
        }
        e.state = GU_EXN_RAISED;
        err = e.parent;
    }

    let Some(e) = err.as_mut() else {
        error!(event = "exn_uncaught", ty = ?ty);
        return core::ptr::null_mut();
    };

    if e.state == GU_EXN_OK {
        debug!(event = "exn_raise", ty = ?ty, frame = ?err);
        e.caught = ty;
        e.state = GU_EXN_RAISED;
        return &mut e.data;
    }
    e.state = GU_EXN_RAISED;
    core::ptr::null_mut()
}

/// Raise `ty` and allocate a zeroed `size`-byte payload for it.
///
/// # Safety
/// Same as `gu_exn_raise`.
#[no_mangle]
pub unsafe extern "C" fn gu_exn_raise_new(base: *mut GuExn, ty: *const GuType, size: usize) -> *mut c_void {
    let Some(slot) = gu_exn_raise(base, ty).as_mut() else {
        return core::ptr::null_mut();
    };
    let data = gu_malloc_aligned(slot.pool, size, 0);
    slot.data = data;
    data
}
