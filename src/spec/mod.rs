//! Specs - composable converters between native and host representations
//!
//! Architecture:
//! - `Spec`: the converter contract (simple and scoped protocols, memory access)
//! - `prim`: scalars, C strings, byte slices
//! - `proxy`: hook-based wrapping, dependency tagging, default substitution
//! - `reference`: pointer-to-T with interned inbound wrappers
//!
//! Specs are pure policies: they never own the values they convert. Any
//! scratch memory a conversion needs is either handed to the `Scoped` guard
//! (released when the call completes) or allocated in the call's pool and
//! recorded as a pin in the `CallContext`.

mod prim;
mod proxy;
mod reference;

pub use prim::{
    address, boolean, bytes, cstr, float, int, integer, raw_address, uint, void, AddressSpec, BoolSpec,
    BytesSpec, CStrSpec, FloatSpec, IntSpec, VoidSpec,
};
pub use proxy::{default, dependency, Fallback, Pinning, ProxyHooks, ProxySpec};
pub use reference::{reference, RefSpec};

use crate::address::Address;
use crate::deps::Dependency;
use crate::error::Result;
use crate::native::{NativeLayout, NativeValue};
use crate::object::Object;
use crate::pool::Pool;
use smallvec::SmallVec;
use crate::types::HostType;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type SpecRef = Arc<dyn Spec>;

/// Converter between one native representation and host values
pub trait Spec: Send + Sync + fmt::Debug {
    /// Native form of values converted by this spec
    fn layout(&self) -> NativeLayout;

    /// Arguments converted by this spec are pinned by the call's result
    fn is_dependency(&self) -> bool {
        false
    }

    /// Absent host values are acceptable
    fn is_optional(&self) -> bool {
        false
    }

    /// Host type of the values this spec produces, when it has one
    fn host_type(&self) -> Option<HostType> {
        None
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value>;

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue>;

    /// Scoped outbound conversion; the guard outlives the native call
    fn as_native(&self, host: &Value, ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        Ok(Scoped::new(self.to_native(host, ctx)?))
    }

    /// Scoped inbound conversion; `None` hides the argument from the host
    fn as_host(&self, native: &NativeValue, _ctx: &mut CallContext) -> Result<Scoped<Option<Value>>> {
        Ok(Scoped::new(Some(self.to_host(native)?)))
    }

    /// Decode the value stored at `addr`.
    ///
    /// # Safety
    /// `addr` must be valid for reads of `self.layout().size` bytes.
    unsafe fn read(&self, addr: Address) -> Result<Value> {
        self.to_host(&NativeValue::load(addr, self.layout()))
    }

    /// Encode `host` into the storage at `addr`.
    ///
    /// # Safety
    /// `addr` must be valid for writes of `self.layout().size` bytes.
    unsafe fn write(&self, addr: Address, host: &Value, ctx: &mut CallContext) -> Result<()> {
        self.to_native(host, ctx)?.store(addr);
        Ok(())
    }
}

/// Default spec of a host type (memoized per type)
pub fn spec_for(ty: &HostType) -> SpecRef {
    ty.spec()
}

/// Identity of a spec, stable while the spec is alive
pub(crate) fn spec_key(spec: &SpecRef) -> usize {
    Arc::as_ptr(spec) as *const () as usize
}

/// Per-call conversion state
///
/// Carries the explicit pool of the call (if any) and the dependencies
/// conversions recorded; the caller decides which pins outlive the call.
#[derive(Default)]
pub struct CallContext {
    pool: Option<Pool>,
    pins: Vec<Dependency>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: Option<Pool>) -> Self {
        Self {
            pool,
            pins: Vec::new(),
        }
    }

    pub fn explicit_pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    /// Pool for allocations made by this call: the explicit pool, else the
    /// thread's current pool, else a fresh one. The pool is pinned.
    pub fn pool(&mut self) -> Result<Pool> {
        let pool = match &self.pool {
            Some(pool) => pool.clone(),
            None => {
                let pool = Pool::get()?;
                self.pool = Some(pool.clone());
                pool
            }
        };
        self.pin(Dependency::Pool(pool.clone()));
        Ok(pool)
    }

    pub fn pin(&mut self, dep: Dependency) {
        self.pins.push(dep);
    }

    /// Pin a wrapper together with the pool its memory lives in
    pub fn pin_object(&mut self, obj: &Object) {
        if let Some(pool) = obj.home_pool() {
            self.pin(Dependency::Pool(pool));
        }
        self.pin(Dependency::Object(obj.clone()));
    }

    #[inline]
    pub fn mark(&self) -> usize {
        self.pins.len()
    }

    /// Pins recorded since `mark`
    pub fn take_pins(&mut self, mark: usize) -> Vec<Dependency> {
        self.pins.split_off(mark.min(self.pins.len()))
    }

    pub fn take_all_pins(&mut self) -> Vec<Dependency> {
        std::mem::take(&mut self.pins)
    }
}

type FinishHook = Box<dyn FnOnce() -> Result<()>>;

/// A converted value plus whatever must stay alive until the call returns.
///
/// Resources held by the guard are released when it is dropped, on every
/// exit path. Finish hooks run only when the call completed normally, in
/// the order they were registered.
pub struct Scoped<T> {
    value: T,
    keep: Vec<Box<dyn Any>>,
    finish: SmallVec<[FinishHook; 1]>,
}

impl<T> Scoped<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            keep: Vec::new(),
            finish: SmallVec::new(),
        }
    }

    /// Keep `resource` alive for the lifetime of the guard
    pub fn keep(mut self, resource: impl Any) -> Self {
        self.keep.push(Box::new(resource));
        self
    }

    /// Run `hook` after the native call returns
    pub fn on_finish(mut self, hook: impl FnOnce() -> Result<()> + 'static) -> Self {
        self.finish.push(Box::new(hook));
        self
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scoped<U> {
        Scoped {
            value: f(self.value),
            keep: self.keep,
            finish: self.finish,
        }
    }

    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Scoped<U>> {
        Ok(Scoped {
            value: f(self.value)?,
            keep: self.keep,
            finish: self.finish,
        })
    }

    /// Run every finish hook once; resources stay held until drop.
    ///
    /// All hooks run even when one fails; the first failure is returned.
    pub fn finish(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for hook in std::mem::take(&mut self.finish) {
            let result = hook();
            if outcome.is_ok() {
                outcome = result;
            }
        }
        outcome
    }
}

impl<T: fmt::Debug> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("value", &self.value)
            .field("held", &self.keep.len())
            .finish()
    }
}
