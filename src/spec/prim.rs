//! Primitive specs: integers, floats, booleans, addresses, C strings, byte slices

use super::{CallContext, Scoped, Spec, SpecRef};
use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::native::{NativeKind, NativeLayout, NativeValue};
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::sync::Arc;

static INT_SPECS: Lazy<DashMap<(usize, bool), SpecRef>> = Lazy::new(DashMap::new);

/// Integer of `size` bytes; widths other than 1, 2, 4 and 8 are rejected
pub fn integer(size: usize, signed: bool) -> Result<SpecRef> {
    if !matches!(size, 1 | 2 | 4 | 8) {
        let name = if signed { "int" } else { "uint" };
        return Err(MarshalError::synthesis(
            format!("{}{}", name, size * 8),
            format!("unsupported integer width {}", size),
        ));
    }
    Ok(INT_SPECS
        .entry((size, signed))
        .or_insert_with(|| Arc::new(IntSpec::new(size, signed)))
        .clone())
}

fn fixed_int(size: usize, signed: bool) -> SpecRef {
    match integer(size, signed) {
        Ok(spec) => spec,
        Err(e) => panic!("{}", e),
    }
}

/// Signed integer of `size` bytes
///
/// # Panics
///
/// When `size` is not 1, 2, 4 or 8; use [`integer`] for widths read from
/// descriptors.
pub fn int(size: usize) -> SpecRef {
    fixed_int(size, true)
}

/// Unsigned integer of `size` bytes
///
/// # Panics
///
/// Same widths as [`int`].
pub fn uint(size: usize) -> SpecRef {
    fixed_int(size, false)
}

pub fn float(size: usize) -> SpecRef {
    static F32: Lazy<SpecRef> = Lazy::new(|| Arc::new(FloatSpec(NativeLayout::F32)));
    static F64: Lazy<SpecRef> = Lazy::new(|| Arc::new(FloatSpec(NativeLayout::F64)));
    match size {
        4 => F32.clone(),
        _ => F64.clone(),
    }
}

pub fn boolean() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(BoolSpec));
    SPEC.clone()
}

pub fn void() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(VoidSpec));
    SPEC.clone()
}

/// Pointer whose null value is the absent host value
pub fn address() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(AddressSpec { nullable: true }));
    SPEC.clone()
}

/// Pointer that always decodes to an address, null included
pub fn raw_address() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(AddressSpec { nullable: false }));
    SPEC.clone()
}

pub fn cstr() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(CStrSpec));
    SPEC.clone()
}

pub fn bytes() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(BytesSpec));
    SPEC.clone()
}

pub struct IntSpec {
    layout: NativeLayout,
}

impl IntSpec {
    pub fn new(size: usize, signed: bool) -> Self {
        Self {
            layout: NativeLayout::int(size, signed),
        }
    }

    fn signed(&self) -> bool {
        self.layout.kind == NativeKind::Signed
    }

    fn target(&self) -> String {
        format!(
            "{}{}",
            if self.signed() { "int" } else { "uint" },
            self.layout.size * 8
        )
    }

    fn bounds(&self) -> (i128, i128) {
        let bits = self.layout.size as u32 * 8;
        if self.signed() {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub(crate) fn check(&self, host: &Value) -> Result<i128> {
        let v: i128 = match host {
            Value::Int(v) => *v as i128,
            Value::UInt(v) => *v as i128,
            Value::Bool(b) => *b as i128,
            other => return Err(MarshalError::mismatch(self.target(), other)),
        };
        let (lo, hi) = self.bounds();
        if v < lo || v > hi {
            return Err(MarshalError::out_of_range(v, self.target()));
        }
        Ok(v)
    }
}

impl Spec for IntSpec {
    fn layout(&self) -> NativeLayout {
        self.layout
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(if self.signed() {
            Value::Int(native.to_i64())
        } else {
            Value::UInt(native.to_u64())
        })
    }

    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        let v = self.check(host)?;
        Ok(NativeValue::from_i64(self.layout, v as i64))
    }
}

pub struct FloatSpec(NativeLayout);

impl Spec for FloatSpec {
    fn layout(&self) -> NativeLayout {
        self.0
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(Value::Float(native.to_f64()))
    }

    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::Float(_) | Value::Int(_) | Value::UInt(_) => {
                let v = host.as_f64().unwrap_or_default();
                Ok(NativeValue::from_f64(self.0, v))
            }
            other => Err(MarshalError::mismatch(format!("float{}", self.0.size * 8), other)),
        }
    }
}

/// C `bool`
pub struct BoolSpec;

impl Spec for BoolSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::U8
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(Value::Bool(native.to_u64() != 0))
    }

    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        let b = match host {
            Value::Bool(b) => *b,
            Value::Int(0) | Value::UInt(0) => false,
            Value::Int(1) | Value::UInt(1) => true,
            other => return Err(MarshalError::mismatch("bool", other)),
        };
        Ok(NativeValue::from_i64(NativeLayout::U8, b as i64))
    }
}

/// No value; only meaningful as a result
pub struct VoidSpec;

impl Spec for VoidSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::VOID
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn to_host(&self, _native: &NativeValue) -> Result<Value> {
        Ok(Value::None)
    }

    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::None => Ok(NativeValue::void()),
            other => Err(MarshalError::mismatch("void", other)),
        }
    }
}

pub struct AddressSpec {
    nullable: bool,
}

impl Spec for AddressSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let addr = native.to_address();
        Ok(if addr.is_null() && self.nullable {
            Value::None
        } else {
            Value::Address(addr)
        })
    }

    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        let addr = match host {
            Value::None => Address::NULL,
            Value::Address(a) => *a,
            Value::Object(o) => o.address(),
            Value::Pool(p) => p.address(),
            other => return Err(MarshalError::mismatch("address", other)),
        };
        Ok(NativeValue::from_address(addr))
    }
}

/// NUL-terminated string; null is the absent value
pub struct CStrSpec;

impl CStrSpec {
    fn owned(host: &str) -> Result<CString> {
        CString::new(host).map_err(|_| MarshalError::TypeMismatch {
            expected: "string without interior NUL".into(),
            found: "str".into(),
        })
    }
}

impl Spec for CStrSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let addr = native.to_address();
        if addr.is_null() {
            return Ok(Value::None);
        }
        let s = unsafe { CStr::from_ptr(addr.as_ptr::<c_char>()) };
        Ok(Value::Str(s.to_string_lossy().into_owned()))
    }

    /// Copies the string into the call's pool
    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        let s = match host {
            Value::None => return Ok(NativeValue::from_address(Address::NULL)),
            Value::Str(s) => Self::owned(s)?,
            other => return Err(MarshalError::mismatch("str", other)),
        };
        let bytes = s.as_bytes_with_nul();
        let pool = ctx.pool()?;
        let dst = pool.alloc(bytes.len(), 1)?;
        unsafe { dst.copy_from(Address::from_ptr(bytes.as_ptr()), bytes.len()) };
        Ok(NativeValue::from_address(dst))
    }

    /// Lends a temporary copy for the duration of the call
    fn as_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        match host {
            Value::None => Ok(Scoped::new(NativeValue::from_address(Address::NULL))),
            Value::Str(s) => {
                let owned = Self::owned(s)?;
                let native = NativeValue::from_address(Address::from_ptr(owned.as_ptr()));
                Ok(Scoped::new(native).keep(owned))
            }
            other => Err(MarshalError::mismatch("str", other)),
        }
    }
}

/// Byte slice passed by value as `{ pointer, length }`
pub struct BytesSpec;

const SLICE_LAYOUT: NativeLayout = NativeLayout::blob(
    2 * core::mem::size_of::<usize>(),
    core::mem::align_of::<usize>(),
);

fn slice_value(ptr: Address, len: usize) -> NativeValue {
    let mut native = NativeValue::zeroed(SLICE_LAYOUT);
    let base = Address::from_ptr(native.as_mut_ptr());
    unsafe {
        base.write(ptr.get());
        base.add(core::mem::size_of::<usize>()).write(len);
    }
    native
}

impl BytesSpec {
    fn host_bytes(host: &Value) -> Result<&[u8]> {
        host.as_bytes().ok_or_else(|| MarshalError::mismatch("bytes", host))
    }
}

impl Spec for BytesSpec {
    fn layout(&self) -> NativeLayout {
        SLICE_LAYOUT
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let base = Address::from_ptr(native.as_ptr());
        let (ptr, len) = unsafe {
            (
                Address::new(base.read::<usize>()),
                base.add(core::mem::size_of::<usize>()).read::<usize>(),
            )
        };
        if ptr.is_null() || len == 0 {
            return Ok(Value::Bytes(Vec::new()));
        }
        let data = unsafe { core::slice::from_raw_parts(ptr.as_ptr::<u8>(), len) };
        Ok(Value::Bytes(data.to_vec()))
    }

    /// Copies the bytes into the call's pool
    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        let data = Self::host_bytes(host)?;
        let pool = ctx.pool()?;
        let dst = pool.alloc(data.len(), 1)?;
        unsafe { dst.copy_from(Address::from_ptr(data.as_ptr()), data.len()) };
        Ok(slice_value(dst, data.len()))
    }

    /// Lends a temporary copy for the duration of the call
    fn as_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        let buf: Box<[u8]> = Self::host_bytes(host)?.into();
        let native = slice_value(Address::from_ptr(buf.as_ptr()), buf.len());
        Ok(Scoped::new(native).keep(buf))
    }
}

macro_rules! spec_names {
    ($($t:ty => |$s:ident| $name:expr;)*) => {
        $(
            impl fmt::Debug for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let $s = self;
                    f.write_str(&$name)
                }
            }
        )*
    };
}

spec_names! {
    IntSpec => |s| s.target();
    FloatSpec => |s| format!("float{}", s.0.size * 8);
    BoolSpec => |_s| "bool".to_string();
    VoidSpec => |_s| "void".to_string();
    AddressSpec => |s| if s.nullable { "address".to_string() } else { "raw_address".to_string() };
    CStrSpec => |_s| "cstr".to_string();
    BytesSpec => |_s| "bytes".to_string();
}
