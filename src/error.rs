//! Error taxonomy for the marshaling layer

use crate::library::{LoadError, SymbolError};
use crate::value::Value;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarshalError>;

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: String },

    #[error("null pointer where {0} was required")]
    NullPointer(String),

    #[error("index {index} out of bounds for length {len}")]
    Bounds { index: i64, len: usize },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{0} used after its pool was released")]
    UseAfterRelease(String),

    #[error(transparent)]
    Native(#[from] NativeException),

    #[error("callback `{name}` failed: {message}")]
    Callback { name: String, message: String },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("`{name}` takes {expected} arguments but {found} were given")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("cannot synthesize `{ty}`: {reason}")]
    Synthesis { ty: String, reason: String },

    #[error("`{ty}` has no field `{field}`")]
    UnknownField { ty: String, field: String },

    #[error("`{ty}` has no constructor `{name}`")]
    UnknownConstructor { ty: String, name: String },
}

impl MarshalError {
    pub fn mismatch(expected: impl Into<String>, found: &Value) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.type_name().to_string(),
        }
    }

    pub fn out_of_range(value: impl fmt::Display, target: impl Into<String>) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            target: target.into(),
        }
    }

    pub fn synthesis(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Synthesis {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the native library through an exception frame.
///
/// The payload is decoded with the spec of the raised type; if it is a
/// wrapper it keeps the frame's pool alive.
#[derive(Debug, Clone, Error)]
#[error("native exception `{type_name}`: {payload:?}")]
pub struct NativeException {
    pub type_name: String,
    pub payload: Value,
}
