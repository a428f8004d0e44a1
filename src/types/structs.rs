//! Struct types
//!
//! Built in two phases: declare members (eagerly or with a resolver for
//! forward and recursive references), then `build`. Member specs behind a
//! resolver are looked up on first access.

use super::{HostType, Shape};
use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::intern::intern;
use crate::native::{NativeLayout, NativeValue, MAX_ALIGN};
use crate::object::Object;
use crate::spec::{CallContext, Spec, SpecRef};
use crate::value::Value;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;

type Resolver = Box<dyn Fn() -> Result<SpecRef> + Send + Sync>;

enum FieldSpec {
    Ready(SpecRef),
    Lazy { cell: OnceCell<SpecRef>, resolve: Resolver },
}

pub struct Field {
    name: String,
    offset: usize,
    spec: FieldSpec,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn spec(&self) -> Result<SpecRef> {
        match &self.spec {
            FieldSpec::Ready(spec) => Ok(spec.clone()),
            FieldSpec::Lazy { cell, resolve } => cell.get_or_try_init(|| resolve()).cloned(),
        }
    }

    /// Layout of the member; unresolved members are assumed to be pointers
    fn layout_hint(&self) -> NativeLayout {
        match &self.spec {
            FieldSpec::Ready(spec) => spec.layout(),
            FieldSpec::Lazy { cell, .. } => cell.get().map_or(NativeLayout::POINTER, |s| s.layout()),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.offset)
    }
}

pub struct StructType {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    size: usize,
    align: usize,
}

impl StructType {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn field(&self, ty_name: &str, name: &str) -> Result<&Field> {
        self.index
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| MarshalError::UnknownField {
                ty: ty_name.to_string(),
                field: name.to_string(),
            })
    }
}

pub struct StructBuilder {
    name: String,
    fields: Vec<Field>,
    size: Option<usize>,
    align: Option<usize>,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            size: None,
            align: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, offset: usize, spec: SpecRef) -> Self {
        self.fields.push(Field {
            name: name.into(),
            offset,
            spec: FieldSpec::Ready(spec),
        });
        self
    }

    /// Member whose spec is produced by `resolve` on first access
    pub fn lazy_field(
        mut self,
        name: impl Into<String>,
        offset: usize,
        resolve: impl Fn() -> Result<SpecRef> + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            offset,
            spec: FieldSpec::Lazy {
                cell: OnceCell::new(),
                resolve: Box::new(resolve),
            },
        });
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn align(mut self, align: usize) -> Self {
        self.align = Some(align);
        self
    }

    pub fn build(self) -> Result<HostType> {
        let mut index = HashMap::with_capacity(self.fields.len());
        for (i, f) in self.fields.iter().enumerate() {
            if index.insert(f.name.clone(), i).is_some() {
                return Err(MarshalError::synthesis(&self.name, format!("duplicate member `{}`", f.name)));
            }
        }

        let align = match self.align {
            Some(a) => a,
            None => self.fields.iter().map(|f| f.layout_hint().align).max().unwrap_or(1),
        };
        if !align.is_power_of_two() {
            return Err(MarshalError::synthesis(&self.name, format!("alignment {} is not a power of two", align)));
        }
        if align > MAX_ALIGN {
            return Err(MarshalError::synthesis(&self.name, format!("alignment {} exceeds {}", align, MAX_ALIGN)));
        }
        let end = self
            .fields
            .iter()
            .map(|f| f.offset + f.layout_hint().size)
            .max()
            .unwrap_or(0);
        let size = match self.size {
            Some(s) if s < end => {
                return Err(MarshalError::synthesis(
                    &self.name,
                    format!("declared size {} but members extend to {}", s, end),
                ))
            }
            Some(s) => s,
            None => (end + align - 1) & !(align - 1),
        };

        Ok(HostType::new(
            self.name,
            Shape::Struct(StructType {
                fields: self.fields,
                index,
                size,
                align,
            }),
        ))
    }
}

/// A struct passed by value.
///
/// In memory (members, elements) the struct is viewed in place; a by-value
/// result becomes a detached copy.
#[derive(Debug)]
pub struct StructValueSpec {
    ty: HostType,
}

impl StructValueSpec {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }
}

impl Spec for StructValueSpec {
    fn layout(&self) -> NativeLayout {
        self.ty.layout()
    }

    fn host_type(&self) -> Option<HostType> {
        Some(self.ty.clone())
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(Value::Object(Object::detached(self.ty.clone(), native)))
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        let obj = self.ty.expect_instance(host)?;
        // Copied members may still point into the source's pool.
        ctx.pin_object(obj);
        Ok(unsafe { NativeValue::load(obj.address(), self.layout()) })
    }

    unsafe fn read(&self, addr: Address) -> Result<Value> {
        Ok(Value::Object(intern(&self.ty, addr)))
    }
}
