//! Runtime type descriptors
//!
//! Every describable type has a descriptor record whose first field chains
//! to its *kind*; kinds are themselves records chained through `super_` up
//! to `gu_type__type`. A descriptor can therefore be viewed as a `GuKind`
//! and walked with `gu_type_has_kind`. The concrete record layout behind a
//! descriptor is determined by the first bound kind found on that walk.

use std::ffi::{c_char, c_int, c_void};

/// Pointer to a NUL-terminated static string
#[macro_export]
macro_rules! cstr {
    ($s:expr) => {
        concat!($s, "\0").as_ptr() as *const ::std::ffi::c_char
    };
}

#[repr(C)]
pub struct GuKind {
    pub super_: *const GuKind,
}

#[repr(C)]
pub struct GuType {
    pub kind_base: GuKind,
}

/// Length-prefixed static array
#[repr(C)]
pub struct GuSList<T> {
    pub len: c_int,
    pub elems: *const T,
}

impl<T> GuSList<T> {
    pub const fn empty() -> Self {
        Self {
            len: 0,
            elems: core::ptr::null(),
        }
    }

    pub const fn of<const N: usize>(elems: &'static [T; N]) -> Self {
        Self {
            len: N as c_int,
            elems: elems as *const [T; N] as *const T,
        }
    }

    /// # Safety
    /// `elems` must point at `len` initialized records.
    pub unsafe fn as_slice(&self) -> &[T] {
        if self.elems.is_null() || self.len <= 0 {
            return &[];
        }
        core::slice::from_raw_parts(self.elems, self.len as usize)
    }
}

/// Types with a known in-memory representation
#[repr(C)]
pub struct GuTypeRepr {
    pub type_base: GuType,
    pub size: usize,
    pub align: usize,
}

#[repr(C)]
pub struct GuTypeAlias {
    pub type_base: GuType,
    pub ty: *const GuType,
}

#[repr(C)]
pub struct GuTypeDef {
    pub alias_base: GuTypeAlias,
    pub name: *const c_char,
}

#[repr(C)]
pub struct GuPrimType {
    pub repr_base: GuTypeRepr,
    pub name: *const c_char,
}

#[repr(C)]
pub struct GuPointerType {
    pub repr_base: GuTypeRepr,
    pub pointed_type: *const GuType,
}

#[repr(C)]
pub struct GuMember {
    pub offset: isize,
    pub name: *const c_char,
    pub ty: *const GuType,
    pub is_flex: bool,
}

#[repr(C)]
pub struct GuStructRepr {
    pub repr_base: GuTypeRepr,
    pub name: *const c_char,
    pub members: GuSList<GuMember>,
}

#[repr(C)]
pub struct GuConstructor {
    pub c_tag: c_int,
    pub c_name: *const c_char,
    pub ty: *const GuType,
}

#[repr(C)]
pub struct GuVariantType {
    pub repr_base: GuTypeRepr,
    pub ctors: GuSList<GuConstructor>,
}

#[repr(C)]
pub struct GuEnumConstant {
    pub name: *const c_char,
    pub value: i64,
    pub enum_value: *const c_void,
}

#[repr(C)]
pub struct GuEnumType {
    pub repr_base: GuTypeRepr,
    pub constants: GuSList<GuEnumConstant>,
}

#[repr(C)]
pub struct GuSeqType {
    pub type_base: GuType,
    pub elem_type: *const GuType,
}

macro_rules! static_records {
    ($($t:ty),* $(,)?) => {
        $(
            // Descriptor records are immutable once linked.
            unsafe impl Sync for $t {}
        )*
    };
}

static_records!(
    GuKind, GuType, GuTypeRepr, GuTypeAlias, GuTypeDef, GuPrimType, GuPointerType,
    GuMember, GuStructRepr, GuConstructor, GuVariantType, GuEnumConstant, GuEnumType,
    GuSeqType,
);
unsafe impl<T: Sync> Sync for GuSList<T> {}

/// Whether `kind` occurs on the kind chain starting at `ty`.
///
/// # Safety
/// `ty` must be null or a valid descriptor.
#[no_mangle]
pub unsafe extern "C" fn gu_type_has_kind(ty: *const GuType, kind: *const GuKind) -> bool {
    let mut k = ty as *const GuKind;
    while !k.is_null() {
        if k == kind {
            return true;
        }
        k = (*k).super_;
    }
    false
}

impl GuType {
    pub const fn of_kind(kind: &'static GuKind) -> Self {
        Self {
            kind_base: GuKind { super_: kind },
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *const GuType {
        self
    }
}

impl GuTypeRepr {
    pub const fn new(kind: &'static GuKind, size: usize, align: usize) -> Self {
        Self {
            type_base: GuType::of_kind(kind),
            size,
            align,
        }
    }
}

macro_rules! kinds {
    ($($name:ident => $super_:expr;)*) => {
        $(
            #[no_mangle]
            pub static $name: GuKind = GuKind { super_: $super_ };
        )*
    };
}

kinds! {
    gu_type__type => core::ptr::null();
    gu_type__alias => &gu_type__type;
    gu_type__typedef => &gu_type__alias;
    gu_type__abstract => &gu_type__type;
    gu_type__repr => &gu_type__type;
    gu_type__struct => &gu_type__repr;
    gu_type__pointer => &gu_type__repr;
    gu_type__reference => &gu_type__pointer;
    gu_type__primitive => &gu_type__repr;
    gu_type__integer => &gu_type__primitive;
    gu_type__signed => &gu_type__integer;
    gu_type__unsigned => &gu_type__integer;
    gu_type__GuFloating => &gu_type__primitive;
    gu_type__enum => &gu_type__repr;
    gu_type__GuVariant => &gu_type__repr;
    gu_type__GuSeq => &gu_type__abstract;
    gu_type__GuOpaque => &gu_type__repr;
}

macro_rules! primitives {
    ($($name:ident: $c:ty => $kind:ident, $cname:expr;)*) => {
        $(
            #[no_mangle]
            pub static $name: GuPrimType = GuPrimType {
                repr_base: GuTypeRepr::new(
                    &$kind,
                    core::mem::size_of::<$c>(),
                    core::mem::align_of::<$c>(),
                ),
                name: cstr!($cname),
            };
        )*
    };
}

primitives! {
    gu_type__char: std::ffi::c_char => gu_type__signed, "char";
    gu_type__int: std::ffi::c_int => gu_type__signed, "int";
    gu_type__int8_t: i8 => gu_type__signed, "int8_t";
    gu_type__int16_t: i16 => gu_type__signed, "int16_t";
    gu_type__int32_t: i32 => gu_type__signed, "int32_t";
    gu_type__int64_t: i64 => gu_type__signed, "int64_t";
    gu_type__uint8_t: u8 => gu_type__unsigned, "uint8_t";
    gu_type__uint16_t: u16 => gu_type__unsigned, "uint16_t";
    gu_type__uint32_t: u32 => gu_type__unsigned, "uint32_t";
    gu_type__uint64_t: u64 => gu_type__unsigned, "uint64_t";
    gu_type__size_t: usize => gu_type__unsigned, "size_t";
    gu_type__float: f32 => gu_type__GuFloating, "float";
    gu_type__double: f64 => gu_type__GuFloating, "double";
}

/// Sequence of bytes
#[no_mangle]
pub static gu_type__GuByteSeq: GuSeqType = GuSeqType {
    type_base: GuType::of_kind(&gu_type__GuSeq),
    elem_type: &gu_type__uint8_t as *const GuPrimType as *const GuType,
};

/// Sequence of characters
#[no_mangle]
pub static gu_type__GuCharSeq: GuSeqType = GuSeqType {
    type_base: GuType::of_kind(&gu_type__GuSeq),
    elem_type: &gu_type__char as *const GuPrimType as *const GuType,
};

/// Raw address as seen by the runtime
#[no_mangle]
pub static gu_type__GuAddress: GuPointerType = GuPointerType {
    repr_base: GuTypeRepr::new(
        &gu_type__pointer,
        core::mem::size_of::<*const c_void>(),
        core::mem::align_of::<*const c_void>(),
    ),
    pointed_type: core::ptr::null(),
};
