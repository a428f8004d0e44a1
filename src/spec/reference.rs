//! Reference specs: a pointer to a value of some type
//!
//! Inbound, a non-null pointer becomes the interned wrapper for the pointed
//! type at that address. Outbound, a wrapper passes its own address; any
//! other host value is first converted into temporary native storage.

use super::{spec_key, CallContext, Scoped, Spec, SpecRef};
use crate::address::Address;
use crate::error::Result;
use crate::intern::intern;
use crate::native::{NativeLayout, NativeValue};
use crate::types::HostType;
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

static REFERENCES: Lazy<DashMap<usize, SpecRef>> = Lazy::new(DashMap::new);

/// Pointer to values of `spec`; the same spec yields the same reference spec
pub fn reference(spec: SpecRef) -> SpecRef {
    let key = spec_key(&spec);
    if let Some(existing) = REFERENCES.get(&key) {
        return existing.clone();
    }
    let made: SpecRef = Arc::new(RefSpec::new(spec));
    REFERENCES.entry(key).or_insert(made).clone()
}

#[derive(Debug)]
pub struct RefSpec {
    ty: HostType,
    inner: SpecRef,
}

impl RefSpec {
    pub fn new(inner: SpecRef) -> Self {
        let ty = match inner.host_type() {
            Some(t) if t.is_addressable() => t,
            _ => HostType::cell(&inner),
        };
        Self { ty, inner }
    }

    /// Type of the wrappers this spec produces
    pub fn target(&self) -> &HostType {
        &self.ty
    }

    /// Address of a wrapper or raw address, pinning wrappers
    fn passthrough(&self, host: &Value, ctx: &mut CallContext) -> Result<Option<Address>> {
        match host {
            Value::None => Ok(Some(Address::NULL)),
            Value::Address(a) => Ok(Some(*a)),
            Value::Object(_) => {
                let obj = self.ty.expect_instance(host)?;
                ctx.pin_object(obj);
                Ok(Some(obj.address()))
            }
            _ => Ok(None),
        }
    }
}

impl Spec for RefSpec {
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
        Ok(Value::Object(intern(&self.ty, addr)))
    }

    /// Plain host values are stored in the call's pool
    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        if let Some(addr) = self.passthrough(host, ctx)? {
            return Ok(NativeValue::from_address(addr));
        }
        let layout = self.inner.layout();
        let addr = ctx.pool()?.alloc(layout.size.max(1), layout.align)?;
        unsafe { self.inner.write(addr, host, ctx)? };
        Ok(NativeValue::from_address(addr))
    }

    /// Plain host values live in temporary storage for the call
    fn as_native(&self, host: &Value, ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        if let Some(addr) = self.passthrough(host, ctx)? {
            return Ok(Scoped::new(NativeValue::from_address(addr)));
        }
        let temp = Box::new(self.inner.to_native(host, ctx)?);
        let addr = Address::from_ptr(temp.as_ptr());
        Ok(Scoped::new(NativeValue::from_address(addr)).keep(temp))
    }
}
