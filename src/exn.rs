//! Native exceptions
//!
//! Functions that can fail take an exception frame argument. `exn_out()`
//! is the spec for that argument: the host omits it, a fresh frame is
//! allocated in the call's pool, and after the call the frame is polled.
//! A raised exception comes back as `MarshalError::Native`, its payload
//! decoded through the raised type and pinned to the frame's pool.

use crate::address::Address;
use crate::deps;
use crate::error::{MarshalError, NativeException, Result};
use crate::gu::Gu;
use crate::logging::log_native_exception;
use crate::native::{NativeLayout, NativeValue};
use crate::pool::Pool;
use crate::spec::{CallContext, Scoped, Spec, SpecRef};
use crate::value::Value;
use once_cell::sync::Lazy;
use std::sync::Arc;

#[derive(Debug)]
pub struct ExnSpec {
    gu: Option<Gu>,
}

impl ExnSpec {
    fn gu(&self) -> Result<Gu> {
        match &self.gu {
            Some(gu) => Ok(gu.clone()),
            None => Gu::global(),
        }
    }
}

/// Exception frame parameter, bound to the global library
pub fn exn_out() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(ExnSpec { gu: None }));
    SPEC.clone()
}

/// Exception frame parameter for a specific binding
pub fn exn_out_in(gu: &Gu) -> SpecRef {
    Arc::new(ExnSpec { gu: Some(gu.clone()) })
}

/// The exception caught by `frame`, if any
fn poll(gu: &Gu, frame: Address, pool: &Pool) -> Result<()> {
    let caught = gu.exn_caught(frame)?;
    if caught.is_null() {
        return Ok(());
    }
    let data = gu.exn_caught_data(frame)?;
    let (type_name, payload) = match unsafe { gu.host_type(caught) } {
        Ok(ty) => {
            let payload = if data.is_null() {
                Value::None
            } else {
                unsafe { ty.spec().read(data)? }
            };
            (ty.name().to_string(), payload)
        }
        Err(_) => (format!("type@{}", caught), Value::Address(data)),
    };
    if let Value::Object(obj) = &payload {
        obj.adopt_origin(&pool.origin());
        deps::add_dep(obj, pool.clone());
    }
    log_native_exception(&type_name, &frame.to_string());
    Err(MarshalError::Native(NativeException { type_name, payload }))
}

impl Spec for ExnSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(Value::Address(native.to_address()))
    }

    /// Frames are only created by the scoped protocol
    fn to_native(&self, host: &Value, _ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::None => Ok(NativeValue::from_address(Address::NULL)),
            Value::Address(a) => Ok(NativeValue::from_address(*a)),
            other => Err(MarshalError::mismatch("exception frame", other)),
        }
    }

    fn as_native(&self, host: &Value, ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        if !host.is_none() {
            return Ok(Scoped::new(self.to_native(host, ctx)?));
        }
        let gu = self.gu()?;
        let pool = ctx.pool()?;
        let catch_all = gu.library().function("type__type")?;
        let frame = gu.new_exn(Address::NULL, catch_all, pool.address())?;
        if frame.is_null() {
            return Err(MarshalError::ResourceExhausted("exception frame".into()));
        }
        Ok(Scoped::new(NativeValue::from_address(frame)).on_finish(move || poll(&gu, frame, &pool)))
    }

    /// Callbacks never see the frame
    fn as_host(&self, _native: &NativeValue, _ctx: &mut CallContext) -> Result<Scoped<Option<Value>>> {
        Ok(Scoped::new(None))
    }
}
