//! Native helpers shared by the integration tests
//!
//! The helpers are exported through an in-process symbol table so the
//! tests import them exactly like functions of a loaded library.

#![allow(dead_code)]

use gu_interop::spec::{self, SpecRef};
use gu_interop::{ForeignFn, Gu, HostType, Library, Signature, StructBuilder};
use gu_runtime::exn::{gu_exn_raise_new, GuExn};
use gu_runtime::pool::gu_malloc_aligned;
use gu_runtime::seq::{gu_seq_data, gu_seq_length, GuSeq};
use gu_runtime::types::{gu_type__int, GuPrimType, GuType};
use gu_runtime::GuPool;
use once_cell::sync::Lazy;
use std::ffi::c_void;

#[repr(C)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

extern "C" fn helper_add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "C" fn helper_scale(x: f64, k: f64) -> f64 {
    x * k
}

extern "C" fn helper_negate(x: i8) -> i8 {
    x.wrapping_neg()
}

extern "C" fn helper_identity(p: *mut c_void) -> *mut c_void {
    p
}

extern "C" fn helper_strlen(s: *const std::ffi::c_char) -> usize {
    if s.is_null() {
        return usize::MAX;
    }
    unsafe { std::ffi::CStr::from_ptr(s).to_bytes().len() }
}

unsafe extern "C" fn helper_new_point(pool: *mut GuPool, x: i32, y: i32) -> *mut Point {
    let p = gu_malloc_aligned(pool, core::mem::size_of::<Point>(), core::mem::align_of::<Point>()) as *mut Point;
    if !p.is_null() {
        p.write(Point { x, y });
    }
    p
}

unsafe extern "C" fn helper_point_sum(p: *const Point) -> i32 {
    match p.as_ref() {
        Some(p) => p.x + p.y,
        None => -1,
    }
}

unsafe extern "C" fn helper_seq_sum(seq: *const GuSeq) -> i64 {
    if seq.is_null() {
        return -1;
    }
    let data = gu_seq_data(seq) as *const i32;
    (0..gu_seq_length(seq)).map(|i| *data.add(i) as i64).sum()
}

/// Raises an `int` carrying `code` unless `code` is zero
unsafe extern "C" fn helper_checked(code: i32, exn: *mut GuExn) -> i32 {
    if code == 0 {
        return 1;
    }
    let ty = &gu_type__int as *const GuPrimType as *const GuType;
    let data = gu_exn_raise_new(exn, ty, core::mem::size_of::<i32>()) as *mut i32;
    if let Some(slot) = data.as_mut() {
        *slot = code;
    }
    -1
}

unsafe extern "C" fn helper_apply_i32(f: Option<unsafe extern "C" fn(i32) -> i32>, x: i32) -> i32 {
    match f {
        Some(f) => f(x),
        None => i32::MIN,
    }
}

unsafe extern "C" fn helper_apply_f64(f: Option<unsafe extern "C" fn(f64) -> f64>, x: f64) -> f64 {
    match f {
        Some(f) => f(x),
        None => f64::NAN,
    }
}

unsafe extern "C" fn helper_apply_ptr(
    f: Option<unsafe extern "C" fn(*mut c_void) -> *mut c_void>,
    p: *mut c_void,
) -> *mut c_void {
    match f {
        Some(f) => f(p),
        None => core::ptr::null_mut(),
    }
}

unsafe extern "C" fn helper_apply_void(f: Option<unsafe extern "C" fn(i32)>, x: i32) -> i32 {
    if let Some(f) = f {
        f(x);
    }
    x
}

fn lookup(name: &str) -> Option<*const ()> {
    let f: *const () = match name {
        "helper_add" => helper_add as *const (),
        "helper_scale" => helper_scale as *const (),
        "helper_negate" => helper_negate as *const (),
        "helper_identity" => helper_identity as *const (),
        "helper_strlen" => helper_strlen as *const (),
        "helper_new_point" => helper_new_point as *const (),
        "helper_point_sum" => helper_point_sum as *const (),
        "helper_seq_sum" => helper_seq_sum as *const (),
        "helper_checked" => helper_checked as *const (),
        "helper_apply_i32" => helper_apply_i32 as *const (),
        "helper_apply_f64" => helper_apply_f64 as *const (),
        "helper_apply_ptr" => helper_apply_ptr as *const (),
        "helper_apply_void" => helper_apply_void as *const (),
        _ => return None,
    };
    Some(f)
}

pub fn helpers() -> Library {
    Library::from_table("helpers", lookup).with_prefix("helper_")
}

pub fn import(name: &str, args: Vec<SpecRef>, result: SpecRef) -> ForeignFn {
    unsafe { helpers().import(name, Signature::new(args, result)) }.expect("helper import")
}

pub fn gu() -> Gu {
    Gu::global().expect("builtin runtime")
}

/// `struct Point { int32 x; int32 y; }`
pub fn point_type() -> HostType {
    static POINT: Lazy<HostType> = Lazy::new(|| {
        StructBuilder::new("Point")
            .field("x", 0, spec::int(4))
            .field("y", 4, spec::int(4))
            .build()
            .expect("point type")
    });
    POINT.clone()
}

/// `Point *` results and arguments
pub fn point_ref() -> SpecRef {
    spec::reference(point_type().spec())
}
