//! Sequence types
//!
//! A sequence is a handle to a length-prefixed, fixed-stride array in a
//! pool. Every element access is bounds checked against the current length.

use super::{HostType, Shape};
use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::gu::Gu;
use crate::intern::{intern, intern_in};
use crate::native::{NativeLayout, NativeValue};
use crate::object::Object;
use crate::pool::Pool;
use crate::spec::{spec_key, CallContext, Spec, SpecRef};
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;

static SEQ_TYPES: Lazy<DashMap<(usize, usize), HostType>> = Lazy::new(DashMap::new);

pub struct SeqType {
    gu: Gu,
    elem: SpecRef,
    stride: usize,
}

impl SeqType {
    /// Sequence of `elem`; the same element spec yields the same type
    pub fn of(gu: &Gu, elem: SpecRef) -> HostType {
        SeqType::named(gu, elem, None)
    }

    pub(crate) fn named(gu: &Gu, elem: SpecRef, name: Option<&str>) -> HostType {
        SEQ_TYPES
            .entry((gu.id(), spec_key(&elem)))
            .or_insert_with(|| {
                let layout = elem.layout();
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                let name = match name {
                    Some(n) => n.to_string(),
                    None => match elem.host_type() {
                        Some(t) => format!("GuSeq<{}>", t.name()),
                        None => format!("GuSeq<{:?}>", layout.kind),
                    },
                };
                HostType::new(
                    name,
                    Shape::Seq(SeqType {
                        gu: gu.clone(),
                        elem,
                        stride,
                    }),
                )
            })
            .clone()
    }

    pub fn elem(&self) -> &SpecRef {
        &self.elem
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn length(&self, seq: Address) -> Result<usize> {
        self.gu.seq_length(seq)
    }

    /// Address of element `index`, bounds checked
    pub(crate) fn element(&self, seq: Address, index: i64) -> Result<Address> {
        let len = self.length(seq)?;
        if index < 0 || index as u64 >= len as u64 {
            return Err(MarshalError::Bounds { index, len });
        }
        Ok(self.gu.seq_data(seq)?.add(index as usize * self.stride))
    }

    /// New sequence in `pool` holding `values`
    pub fn from_list(ty: &HostType, values: &[Value], pool: &Pool) -> Result<Object> {
        let Shape::Seq(st) = ty.shape() else {
            return Err(MarshalError::TypeMismatch {
                expected: "sequence type".into(),
                found: ty.name().to_string(),
            });
        };
        let raw = st.gu.make_seq(st.stride, values.len(), pool.address())?;
        if raw.is_null() {
            return Err(MarshalError::ResourceExhausted(format!(
                "{} of {} elements",
                ty.name(),
                values.len()
            )));
        }
        let seq = intern_in(ty, raw, Some(pool.origin()));
        for (i, v) in values.iter().enumerate() {
            seq.set_index(i as i64, v.clone())?;
        }
        Ok(seq)
    }
}

/// Sequence handle; a host list is materialized in the call's pool
#[derive(Debug)]
pub struct SeqSpec {
    ty: HostType,
}

impl SeqSpec {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }
}

impl Spec for SeqSpec {
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
        let obj = match host {
            Value::None => return Ok(NativeValue::from_address(Address::NULL)),
            Value::Address(a) => return Ok(NativeValue::from_address(*a)),
            Value::List(items) => {
                let pool = ctx.pool()?;
                SeqType::from_list(&self.ty, items, &pool)?
            }
            _ => self.ty.expect_instance(host)?.clone(),
        };
        let addr = obj.address();
        ctx.pin_object(&obj);
        Ok(NativeValue::from_address(addr))
    }
}
