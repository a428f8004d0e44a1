//! Output streams
//!
//! A `GuOutStream` is a polymorphic sink: a table of function pointers the
//! runtime calls with the stream itself as first argument. Host code
//! implements streams by filling in the table.

use crate::exn::GuExn;
use std::ffi::{c_char, CStr};
use tracing::trace;

/// Borrowed byte range passed by value
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct GuSlice {
    pub p: *const u8,
    pub sz: usize,
}

pub type GuOutputFn = unsafe extern "C" fn(*mut GuOutStream, GuSlice, *mut GuExn) -> usize;
pub type GuFlushFn = unsafe extern "C" fn(*mut GuOutStream, *mut GuExn);
pub type GuBufferFn = unsafe extern "C" fn(*mut GuOutStream);

#[repr(C)]
pub struct GuOutStreamFuns {
    pub begin_buffer: Option<GuBufferFn>,
    pub end_buffer: Option<GuBufferFn>,
    pub output: Option<GuOutputFn>,
    pub flush: Option<GuFlushFn>,
}

#[repr(C)]
pub struct GuOutStream {
    pub funs: *const GuOutStreamFuns,
}

/// Write `len` bytes to `stream`, returning the count the stream accepted.
///
/// # Safety
/// `stream` must be a valid stream; `data` readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn gu_out_bytes(stream: *mut GuOutStream, data: *const u8, len: usize, exn: *mut GuExn) -> usize {
    let Some(funs) = stream.as_ref().and_then(|s| s.funs.as_ref()) else {
        return 0;
    };
    let Some(output) = funs.output else {
        return 0;
    };
    trace!(event = "out_bytes", len);
    output(stream, GuSlice { p: data, sz: len }, exn)
}

/// Write a NUL-terminated string to `stream`.
///
/// # Safety
/// `stream` must be a valid stream; `s` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn gu_out_str(stream: *mut GuOutStream, s: *const c_char, exn: *mut GuExn) -> usize {
    if s.is_null() {
        return 0;
    }
    let bytes = CStr::from_ptr(s).to_bytes();
    gu_out_bytes(stream, bytes.as_ptr(), bytes.len(), exn)
}

/// # Safety
/// `stream` must be a valid stream.
#[no_mangle]
pub unsafe extern "C" fn gu_out_flush(stream: *mut GuOutStream, exn: *mut GuExn) {
    if let Some(flush) = stream.as_ref().and_then(|s| s.funs.as_ref()).and_then(|f| f.flush) {
        flush(stream, exn);
    }
}
