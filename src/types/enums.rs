//! Enum types: named integer constants over a sized integer

use super::naming::{pp_prefix, strip_prefix};
use super::{HostType, Shape};
use crate::error::{MarshalError, Result};
use crate::native::{NativeLayout, NativeValue};
use crate::spec::{CallContext, IntSpec, Spec};
use crate::value::Value;

pub struct EnumType {
    repr: IntSpec,
    constants: Vec<(String, i64)>,
}

impl EnumType {
    pub fn layout(&self) -> NativeLayout {
        self.repr.layout()
    }

    pub fn constants(&self) -> &[(String, i64)] {
        &self.constants
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.constants.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.constants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

pub struct EnumBuilder {
    name: String,
    prefix: Option<String>,
    size: usize,
    constants: Vec<(String, i64)>,
}

impl EnumBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            prefix: Some(pp_prefix(&name)),
            name,
            size: 4,
            constants: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_string);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn constant(mut self, name: &str, value: i64) -> Self {
        let name = strip_prefix(name, self.prefix.as_deref()).to_string();
        self.constants.push((name, value));
        self
    }

    /// Signed iff any constant is negative
    pub fn build(self) -> Result<HostType> {
        if !matches!(self.size, 1 | 2 | 4 | 8) {
            return Err(MarshalError::synthesis(&self.name, format!("unsupported width {}", self.size)));
        }
        let signed = self.constants.iter().any(|(_, v)| *v < 0);
        let repr = IntSpec::new(self.size, signed);
        for (name, v) in &self.constants {
            repr.check(&Value::Int(*v)).map_err(|_| {
                MarshalError::synthesis(&self.name, format!("constant {} = {} does not fit", name, v))
            })?;
        }
        Ok(HostType::new(
            self.name,
            Shape::Enum(EnumType {
                repr,
                constants: self.constants,
            }),
        ))
    }
}

/// Enum values are integers on the host side; constant names are accepted
/// on the way in
#[derive(Debug)]
pub struct EnumSpec {
    ty: HostType,
}

impl EnumSpec {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }

    fn enum_type(&self) -> Result<&EnumType> {
        self.ty.as_enum().ok_or_else(|| MarshalError::TypeMismatch {
            expected: "enum type".into(),
            found: self.ty.name().to_string(),
        })
    }
}

impl Spec for EnumSpec {
    fn layout(&self) -> NativeLayout {
        self.ty.layout()
    }

    fn host_type(&self) -> Option<HostType> {
        Some(self.ty.clone())
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        self.enum_type()?.repr.to_host(native)
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        let et = self.enum_type()?;
        match host {
            Value::Str(name) => {
                let v = et.value_of(name).ok_or_else(|| MarshalError::UnknownConstructor {
                    ty: self.ty.name().to_string(),
                    name: name.clone(),
                })?;
                et.repr.to_native(&Value::Int(v), ctx)
            }
            other => et.repr.to_native(other, ctx),
        }
    }
}
