//! Native representations
//!
//! A `NativeLayout` says how a value looks in native memory and in a call
//! frame; a `NativeValue` is one such value held by the host, in
//! storage aligned to `MAX_ALIGN` so it can be handed to libffi directly.

use crate::address::Address;
use libffi::middle::Type;
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Calling-convention class of a native value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeKind {
    Void = 0,
    Signed = 1,
    Unsigned = 2,
    Float = 3,
    Pointer = 4,
    /// Aggregate passed by value; only size and alignment are known
    Blob = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeLayout {
    pub kind: NativeKind,
    pub size: usize,
    pub align: usize,
}

impl NativeLayout {
    pub const VOID: Self = Self::new(NativeKind::Void, 0, 1);
    pub const I8: Self = Self::int(1, true);
    pub const I16: Self = Self::int(2, true);
    pub const I32: Self = Self::int(4, true);
    pub const I64: Self = Self::int(8, true);
    pub const U8: Self = Self::int(1, false);
    pub const U16: Self = Self::int(2, false);
    pub const U32: Self = Self::int(4, false);
    pub const U64: Self = Self::int(8, false);
    pub const USIZE: Self = Self::int(core::mem::size_of::<usize>(), false);
    pub const F32: Self = Self::new(NativeKind::Float, 4, 4);
    pub const F64: Self = Self::new(NativeKind::Float, 8, 8);
    pub const POINTER: Self = Self::new(
        NativeKind::Pointer,
        core::mem::size_of::<usize>(),
        core::mem::align_of::<usize>(),
    );

    pub const fn new(kind: NativeKind, size: usize, align: usize) -> Self {
        Self { kind, size, align }
    }

    /// Integer of `size` bytes (naturally aligned)
    pub const fn int(size: usize, signed: bool) -> Self {
        let kind = if signed { NativeKind::Signed } else { NativeKind::Unsigned };
        Self::new(kind, size, size)
    }

    pub const fn blob(size: usize, align: usize) -> Self {
        Self::new(NativeKind::Blob, size, align)
    }

    #[inline]
    pub const fn is_integral(&self) -> bool {
        matches!(self.kind, NativeKind::Signed | NativeKind::Unsigned)
    }

    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self.kind, NativeKind::Float)
    }

    #[inline]
    pub const fn is_void(&self) -> bool {
        matches!(self.kind, NativeKind::Void)
    }

    /// libffi type descriptor for this layout
    pub fn ffi_type(&self) -> Type {
        match (self.kind, self.size) {
            (NativeKind::Void, _) => Type::void(),
            (NativeKind::Signed, 1) => Type::i8(),
            (NativeKind::Signed, 2) => Type::i16(),
            (NativeKind::Signed, 4) => Type::i32(),
            (NativeKind::Signed, _) => Type::i64(),
            (NativeKind::Unsigned, 1) => Type::u8(),
            (NativeKind::Unsigned, 2) => Type::u16(),
            (NativeKind::Unsigned, 4) => Type::u32(),
            (NativeKind::Unsigned, _) => Type::u64(),
            (NativeKind::Float, 4) => Type::f32(),
            (NativeKind::Float, _) => Type::f64(),
            (NativeKind::Pointer, _) => Type::pointer(),
            (NativeKind::Blob, size) => {
                let align = self.align.clamp(1, 8);
                let unit = match align {
                    1 => Type::u8(),
                    2 => Type::u16(),
                    4 => Type::u32(),
                    _ => Type::u64(),
                };
                let count = (size / align).max(1);
                Type::structure(std::iter::repeat(unit).take(count))
            }
        }
    }
}

/// Strictest alignment a host-held value (and a synthesized type) may ask for
pub const MAX_ALIGN: usize = 16;

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Slot([u8; MAX_ALIGN]);

#[inline]
fn slots_for(size: usize) -> usize {
    ((size + MAX_ALIGN - 1) / MAX_ALIGN).max(1)
}

/// A native value owned by the host
#[derive(Clone)]
pub struct NativeValue {
    layout: NativeLayout,
    slots: SmallVec<[Slot; 1]>,
}

impl NativeValue {
    /// Zero bytes of `layout`; storage honours alignments up to `MAX_ALIGN`
    pub fn zeroed(layout: NativeLayout) -> Self {
        debug_assert!(layout.align <= MAX_ALIGN, "over-aligned native value");
        Self {
            layout,
            slots: smallvec![Slot([0; MAX_ALIGN]); slots_for(layout.size)],
        }
    }

    pub fn void() -> Self {
        Self::zeroed(NativeLayout::VOID)
    }

    pub fn from_bytes(layout: NativeLayout, bytes: &[u8]) -> Self {
        let mut value = Self::zeroed(layout);
        let n = bytes.len().min(layout.size);
        value.bytes_mut()[..n].copy_from_slice(&bytes[..n]);
        value
    }

    pub fn from_i64(layout: NativeLayout, v: i64) -> Self {
        let mut value = Self::zeroed(layout);
        let p = value.as_mut_ptr();
        unsafe {
            match layout.size {
                1 => (p as *mut i8).write(v as i8),
                2 => (p as *mut i16).write(v as i16),
                4 => (p as *mut i32).write(v as i32),
                _ => (p as *mut i64).write(v),
            }
        }
        value
    }

    pub fn from_u64(layout: NativeLayout, v: u64) -> Self {
        Self::from_i64(layout, v as i64)
    }

    pub fn from_f64(layout: NativeLayout, v: f64) -> Self {
        let mut value = Self::zeroed(layout);
        let p = value.as_mut_ptr();
        unsafe {
            if layout.size == 4 {
                (p as *mut f32).write(v as f32);
            } else {
                (p as *mut f64).write(v);
            }
        }
        value
    }

    pub fn from_address(addr: Address) -> Self {
        let mut value = Self::zeroed(NativeLayout::POINTER);
        unsafe { (value.as_mut_ptr() as *mut usize).write(addr.get()) };
        value
    }

    /// Rebuild an integral value that libffi widened to a full register
    pub fn from_widened(layout: NativeLayout, word: u64) -> Self {
        match layout.kind {
            NativeKind::Signed | NativeKind::Unsigned => Self::from_i64(layout, word as i64),
            _ => {
                let mut value = Self::zeroed(layout);
                unsafe { (value.as_mut_ptr() as *mut u64).write(word) };
                value
            }
        }
    }

    /// Copy a value of `layout` out of native memory.
    ///
    /// # Safety
    /// `addr` must be valid for reads of `layout.size` bytes.
    pub unsafe fn load(addr: Address, layout: NativeLayout) -> Self {
        let mut value = Self::zeroed(layout);
        core::ptr::copy_nonoverlapping(addr.as_ptr::<u8>(), value.as_mut_ptr(), layout.size);
        value
    }

    /// Copy this value into native memory.
    ///
    /// # Safety
    /// `addr` must be valid for writes of `layout.size` bytes.
    pub unsafe fn store(&self, addr: Address) {
        core::ptr::copy_nonoverlapping(self.as_ptr(), addr.as_ptr::<u8>(), self.layout.size);
    }

    #[inline]
    pub fn layout(&self) -> NativeLayout {
        self.layout
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.slots.as_ptr() as *const u8
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.slots.as_mut_ptr() as *mut u8
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.layout.size) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.layout.size;
        unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), size) }
    }

    /// Sign-extending integer read
    pub fn to_i64(&self) -> i64 {
        let p = self.as_ptr();
        unsafe {
            match self.layout.size {
                1 => *(p as *const i8) as i64,
                2 => *(p as *const i16) as i64,
                4 => *(p as *const i32) as i64,
                _ => *(p as *const i64),
            }
        }
    }

    /// Zero-extending integer read
    pub fn to_u64(&self) -> u64 {
        let p = self.as_ptr();
        unsafe {
            match self.layout.size {
                1 => *p as u64,
                2 => *(p as *const u16) as u64,
                4 => *(p as *const u32) as u64,
                _ => *(p as *const u64),
            }
        }
    }

    pub fn to_f64(&self) -> f64 {
        let p = self.as_ptr();
        unsafe {
            if self.layout.size == 4 {
                *(p as *const f32) as f64
            } else {
                *(p as *const f64)
            }
        }
    }

    pub fn to_address(&self) -> Address {
        Address::new(unsafe { *(self.as_ptr() as *const usize) })
    }

    pub fn is_zero(&self) -> bool {
        self.bytes().iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeValue")
            .field("layout", &self.layout)
            .field("bytes", &self.bytes())
            .finish()
    }
}
