//! Native function import and invocation
//!
//! A `Signature` lists the argument specs and the result spec of a native
//! function; a `ForeignFn` pairs it with the function's address and a
//! prepared libffi call interface.

use crate::address::Address;
use crate::deps::{self, Dependency};
use crate::error::{MarshalError, Result};
use crate::logging::{log_ffi_call, log_ffi_return};
use crate::native::NativeValue;
use crate::pool::Pool;
use crate::spec::{CallContext, Scoped, SpecRef};
use crate::value::Value;
use libffi::middle::{Cif, CodePtr};
use smallvec::SmallVec;
use std::ffi::c_void;
use std::fmt;

#[derive(Clone)]
pub struct Signature {
    args: Vec<SpecRef>,
    result: SpecRef,
}

impl Signature {
    pub fn new(args: Vec<SpecRef>, result: SpecRef) -> Self {
        Self { args, result }
    }

    pub fn args(&self) -> &[SpecRef] {
        &self.args
    }

    pub fn result(&self) -> &SpecRef {
        &self.result
    }

    pub(crate) fn cif(&self) -> Cif {
        Cif::new(
            self.args.iter().map(|s| s.layout().ffi_type()),
            self.result.layout().ffi_type(),
        )
    }

    /// Bytes libffi may write for the result (integral results are widened
    /// to a full register)
    pub(crate) fn result_buffer_size(&self) -> usize {
        self.result.layout().size.max(core::mem::size_of::<u64>())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("args", &self.args)
            .field("result", &self.result)
            .finish()
    }
}

/// Read a result buffer written by libffi
pub(crate) fn result_value(sig: &Signature, buf: &[u64]) -> NativeValue {
    let layout = sig.result.layout();
    if layout.is_integral() {
        NativeValue::from_widened(layout, buf[0])
    } else {
        let bytes = unsafe { core::slice::from_raw_parts(buf.as_ptr() as *const u8, layout.size) };
        NativeValue::from_bytes(layout, bytes)
    }
}

/// An imported native function
pub struct ForeignFn {
    name: String,
    code: Address,
    sig: Signature,
    cif: Cif,
}

// The call interface is immutable after preparation.
unsafe impl Send for ForeignFn {}
unsafe impl Sync for ForeignFn {}

static NONE: Value = Value::None;

impl ForeignFn {
    pub(crate) fn new(name: String, code: Address, sig: Signature) -> Self {
        let cif = sig.cif();
        Self { name, code, sig, cif }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.code
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Call using the thread's current pool where one is needed
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        self.call_with(args, &mut CallContext::new())
    }

    /// Call with `pool` as the explicit pool of the call
    pub fn call_in(&self, pool: &Pool, args: &[Value]) -> Result<Value> {
        self.call_with(args, &mut CallContext::with_pool(Some(pool.clone())))
    }

    pub fn call_with(&self, args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        let params = self.sig.args();
        if args.len() > params.len() {
            return Err(self.arity(args.len()));
        }

        let mut scoped: SmallVec<[Scoped<NativeValue>; 8]> = SmallVec::with_capacity(params.len());
        // Pins of dependency arguments outlive the call through the result;
        // the rest only need to survive the call itself.
        let mut kept: Vec<Dependency> = Vec::new();
        let mut held: Vec<Dependency> = Vec::new();

        for (i, spec) in params.iter().enumerate() {
            let host = match args.get(i) {
                Some(v) => v,
                None if spec.is_optional() => &NONE,
                None => return Err(self.arity(args.len())),
            };
            let mark = ctx.mark();
            scoped.push(spec.as_native(host, ctx)?);
            let pins = ctx.take_pins(mark);
            if spec.is_dependency() {
                kept.extend(pins);
            } else {
                held.extend(pins);
            }
        }

        let mut argv: SmallVec<[*mut c_void; 8]> = scoped
            .iter()
            .map(|s| s.value().as_ptr() as *mut c_void)
            .collect();
        let mut ret = vec![0u64; self.sig.result_buffer_size().div_ceil(8)];

        log_ffi_call(&self.name, params.len());
        unsafe {
            let code = CodePtr::from_ptr(self.code.as_ptr::<c_void>());
            libffi::raw::ffi_call(
                self.cif.as_raw_ptr(),
                Some(*code.as_fun()),
                ret.as_mut_ptr() as *mut c_void,
                argv.as_mut_ptr(),
            );
        }
        log_ffi_return(&self.name);

        let mut failure = None;
        for s in scoped.iter_mut() {
            if let Err(e) = s.finish() {
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let result = self.sig.result().to_host(&result_value(&self.sig, &ret))?;
        if let Value::Object(obj) = &result {
            if let Some(pool) = kept.iter().find_map(Dependency::as_pool) {
                obj.adopt_origin(&pool.origin());
            }
            deps::add_deps(obj, kept);
        }
        drop(held);
        Ok(result)
    }

    fn arity(&self, found: usize) -> MarshalError {
        MarshalError::Arity {
            name: self.name.clone(),
            expected: self.sig.args().len(),
            found,
        }
    }
}

impl fmt::Debug for ForeignFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignFn({} @ {})", self.name, self.code)
    }
}
