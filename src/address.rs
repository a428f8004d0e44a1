//! Raw native addresses

use std::fmt;

/// Untyped address in native memory
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Address(usize);

impl Address {
    pub const NULL: Address = Address(0);

    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    pub const fn add(self, bytes: usize) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    #[inline]
    pub const fn offset(self, bytes: isize) -> Self {
        Self(self.0.wrapping_add_signed(bytes))
    }

    #[inline]
    pub const fn is_aligned(self, align: usize) -> bool {
        align != 0 && self.0 % align == 0
    }

    /// # Safety
    /// The address must be valid for reads of `T`.
    #[inline]
    pub unsafe fn read<T: Copy>(self) -> T {
        self.as_ptr::<T>().read_unaligned()
    }

    /// # Safety
    /// The address must be valid for writes of `T`.
    #[inline]
    pub unsafe fn write<T: Copy>(self, value: T) {
        self.as_ptr::<T>().write_unaligned(value)
    }

    /// # Safety
    /// Both ranges must be valid for `len` bytes and must not overlap.
    #[inline]
    pub unsafe fn copy_from(self, src: Address, len: usize) {
        core::ptr::copy_nonoverlapping(src.as_ptr::<u8>(), self.as_ptr::<u8>(), len)
    }

    /// # Safety
    /// The address must be valid for writes of `len` bytes.
    #[inline]
    pub unsafe fn zero(self, len: usize) {
        core::ptr::write_bytes(self.as_ptr::<u8>(), 0, len)
    }
}

impl<T> From<*const T> for Address {
    fn from(ptr: *const T) -> Self {
        Self::from_ptr(ptr)
    }
}

impl<T> From<*mut T> for Address {
    fn from(ptr: *mut T) -> Self {
        Self::from_ptr(ptr)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
