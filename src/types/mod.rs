//! Host types synthesized at runtime
//!
//! Architecture:
//! - `HostType`: identity-compared handle to one synthesized type
//! - `structs`: member-accessor types built field by field
//! - `variant`: tagged unions in the runtime's word encoding
//! - `seq`: length-prefixed arrays, memoized per element spec
//! - `enums`: integer-backed named constants
//! - `registry`: binding of native descriptor records to host types
//!
//! Host types live for the rest of the process once created.

mod enums;
mod naming;
mod registry;
mod seq;
mod structs;
mod variant;

pub use enums::{EnumBuilder, EnumSpec, EnumType};
pub use naming::{pp_prefix, strip_prefix};
pub use registry::TypeRegistry;
pub use seq::{SeqSpec, SeqType};
pub use structs::{Field, StructBuilder, StructType, StructValueSpec};
pub use variant::{Constructor, VariantBuilder, VariantSpec, VariantType};

use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::intern::intern;
use crate::native::{NativeLayout, NativeValue};
use crate::object::Object;
use crate::pool::Pool;
use crate::spec::{spec_key, CallContext, Spec, SpecRef};
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// How instances of a type are laid out and accessed
pub enum Shape {
    /// A single value converted by the spec
    Cell(SpecRef),
    Enum(EnumType),
    Struct(StructType),
    Variant(VariantType),
    Seq(SeqType),
    /// Usable only through a handle
    Opaque,
}

impl Shape {
    fn label(&self) -> &'static str {
        match self {
            Shape::Cell(_) => "cell",
            Shape::Enum(_) => "enum",
            Shape::Struct(_) => "struct",
            Shape::Variant(_) => "variant",
            Shape::Seq(_) => "seq",
            Shape::Opaque => "opaque",
        }
    }
}

struct TypeInner {
    id: u64,
    name: String,
    shape: Shape,
    spec: OnceCell<SpecRef>,
}

#[derive(Clone)]
pub struct HostType(Arc<TypeInner>);

impl HostType {
    pub(crate) fn new(name: impl Into<String>, shape: Shape) -> HostType {
        let name = name.into();
        crate::logging::log_type_synthesized(&name, shape.label());
        HostType(Arc::new(TypeInner {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            shape,
            spec: OnceCell::new(),
        }))
    }

    /// Type whose instances are single `spec` values; one per spec
    pub fn cell(spec: &SpecRef) -> HostType {
        static CELLS: Lazy<DashMap<usize, HostType>> = Lazy::new(DashMap::new);
        CELLS
            .entry(spec_key(spec))
            .or_insert_with(|| HostType::new(format!("{:?}", spec), Shape::Cell(spec.clone())))
            .clone()
    }

    pub fn opaque(name: impl Into<String>) -> HostType {
        HostType::new(name, Shape::Opaque)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    /// Native form of one instance
    pub fn layout(&self) -> NativeLayout {
        match self.shape() {
            Shape::Cell(spec) => spec.layout(),
            Shape::Enum(e) => e.layout(),
            Shape::Struct(s) => NativeLayout::blob(s.size(), s.align()),
            Shape::Variant(_) => NativeLayout::USIZE,
            Shape::Seq(_) | Shape::Opaque => NativeLayout::POINTER,
        }
    }

    /// Instances can be viewed in place at an address
    pub fn is_addressable(&self) -> bool {
        matches!(self.shape(), Shape::Cell(_) | Shape::Struct(_))
    }

    /// Default spec of this type
    pub fn spec(&self) -> SpecRef {
        self.0
            .spec
            .get_or_init(|| match self.shape() {
                Shape::Cell(spec) => spec.clone(),
                Shape::Enum(_) => Arc::new(EnumSpec::new(self.clone())),
                Shape::Struct(_) => Arc::new(StructValueSpec::new(self.clone())),
                Shape::Variant(_) => Arc::new(VariantSpec::new(self.clone())),
                Shape::Seq(_) => Arc::new(SeqSpec::new(self.clone())),
                Shape::Opaque => Arc::new(HandleSpec::new(self.clone())),
            })
            .clone()
    }

    /// Zeroed instance allocated in `pool`
    pub fn alloc(&self, pool: &Pool) -> Result<Object> {
        Object::alloc(self, pool)
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self.shape() {
            Shape::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantType> {
        match self.shape() {
            Shape::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&SeqType> {
        match self.shape() {
            Shape::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self.shape() {
            Shape::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &HostType) -> bool {
        self.id() == other.id()
    }

    /// `obj` if it is an instance of this type
    pub(crate) fn expect_instance<'a>(&self, host: &'a Value) -> Result<&'a Object> {
        match host {
            Value::Object(o) if o.ty().ptr_eq(self) => {
                o.check_live()?;
                Ok(o)
            }
            Value::Object(o) => Err(MarshalError::TypeMismatch {
                expected: self.name().to_string(),
                found: o.ty().name().to_string(),
            }),
            other => Err(MarshalError::mismatch(self.name(), other)),
        }
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

/// Handle to an opaque native object; null is the absent value
#[derive(Debug)]
pub struct HandleSpec {
    ty: HostType,
}

impl HandleSpec {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }
}

impl Spec for HandleSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn host_type(&self) -> Option<HostType> {
        Some(self.ty.clone())
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let addr = native.to_address();
        if addr.is_null() {
            return Ok(Value::None);
        }
        Ok(Value::Object(intern(&self.ty, addr)))
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::None => Ok(NativeValue::from_address(Address::NULL)),
            Value::Address(a) => Ok(NativeValue::from_address(*a)),
            _ => {
                let obj = self.ty.expect_instance(host)?;
                ctx.pin_object(obj);
                Ok(NativeValue::from_address(obj.address()))
            }
        }
    }
}
