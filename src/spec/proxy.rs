//! Proxy specs
//!
//! A proxy delegates to an inner spec and adjusts values on the way through:
//! host -> `unwrap` -> inner -> `wrap_native` -> native on the way out, and
//! native -> `unwrap_native` -> inner -> `wrap` -> host on the way in.

use super::{spec_key, CallContext, Scoped, Spec, SpecRef};
use crate::address::Address;
use crate::error::Result;
use crate::native::{NativeLayout, NativeValue};
use crate::types::HostType;
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Hooks applied around the inner spec. Every hook defaults to identity.
pub trait ProxyHooks: Send + Sync + fmt::Debug {
    fn wrap(&self, host: Value) -> Result<Value> {
        Ok(host)
    }

    fn unwrap<'a>(&self, host: &'a Value, _ctx: &mut CallContext) -> Result<Cow<'a, Value>> {
        Ok(Cow::Borrowed(host))
    }

    fn wrap_native(&self, native: NativeValue) -> Result<NativeValue> {
        Ok(native)
    }

    fn unwrap_native<'a>(&self, native: &'a NativeValue) -> Result<Cow<'a, NativeValue>> {
        Ok(Cow::Borrowed(native))
    }

    /// Whether the native hooks change the representation; when they don't,
    /// memory access goes straight to the inner spec.
    fn transforms_native(&self) -> bool {
        false
    }

    fn layout(&self, inner: NativeLayout) -> NativeLayout {
        inner
    }

    fn is_dependency(&self, inner: bool) -> bool {
        inner
    }

    fn is_optional(&self, inner: bool) -> bool {
        inner
    }
}

#[derive(Debug, Clone)]
pub struct ProxySpec {
    inner: SpecRef,
    hooks: Arc<dyn ProxyHooks>,
}

impl ProxySpec {
    pub fn new(inner: SpecRef, hooks: impl ProxyHooks + 'static) -> Self {
        Self {
            inner,
            hooks: Arc::new(hooks),
        }
    }

    pub fn inner(&self) -> &SpecRef {
        &self.inner
    }
}

impl Spec for ProxySpec {
    fn layout(&self) -> NativeLayout {
        self.hooks.layout(self.inner.layout())
    }

    fn is_dependency(&self) -> bool {
        self.hooks.is_dependency(self.inner.is_dependency())
    }

    fn is_optional(&self) -> bool {
        self.hooks.is_optional(self.inner.is_optional())
    }

    fn host_type(&self) -> Option<HostType> {
        self.inner.host_type()
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let native = self.hooks.unwrap_native(native)?;
        self.hooks.wrap(self.inner.to_host(&native)?)
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        let host = self.hooks.unwrap(host, ctx)?;
        self.hooks.wrap_native(self.inner.to_native(&host, ctx)?)
    }

    fn as_native(&self, host: &Value, ctx: &mut CallContext) -> Result<Scoped<NativeValue>> {
        let host = self.hooks.unwrap(host, ctx)?;
        self.inner
            .as_native(&host, ctx)?
            .try_map(|native| self.hooks.wrap_native(native))
    }

    fn as_host(&self, native: &NativeValue, ctx: &mut CallContext) -> Result<Scoped<Option<Value>>> {
        let native = self.hooks.unwrap_native(native)?;
        self.inner
            .as_host(&native, ctx)?
            .try_map(|host| host.map(|h| self.hooks.wrap(h)).transpose())
    }

    unsafe fn read(&self, addr: Address) -> Result<Value> {
        if self.hooks.transforms_native() {
            self.to_host(&NativeValue::load(addr, self.layout()))
        } else {
            self.hooks.wrap(self.inner.read(addr)?)
        }
    }

    unsafe fn write(&self, addr: Address, host: &Value, ctx: &mut CallContext) -> Result<()> {
        if self.hooks.transforms_native() {
            self.to_native(host, ctx)?.store(addr);
            Ok(())
        } else {
            let host = self.hooks.unwrap(host, ctx)?;
            self.inner.write(addr, &host, ctx)
        }
    }
}

/// Marks an argument as pinned by the call's result
#[derive(Debug)]
pub struct Pinning;

impl ProxyHooks for Pinning {
    fn is_dependency(&self, _inner: bool) -> bool {
        true
    }
}

static DEPENDENCIES: Lazy<DashMap<usize, SpecRef>> = Lazy::new(DashMap::new);

/// Dependency-holder view of `spec`; the same spec yields the same proxy
pub fn dependency(spec: SpecRef) -> SpecRef {
    if spec.is_dependency() {
        return spec;
    }
    DEPENDENCIES
        .entry(spec_key(&spec))
        .or_insert_with(|| Arc::new(ProxySpec::new(spec.clone(), Pinning)))
        .clone()
}

type MakeFallback = dyn Fn(&mut CallContext) -> Result<Value> + Send + Sync;

/// Substitutes a computed value for an absent host value
#[derive(Clone)]
pub struct Fallback {
    name: &'static str,
    make: Arc<MakeFallback>,
}

impl Fallback {
    pub fn new(
        name: &'static str,
        make: impl Fn(&mut CallContext) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            make: Arc::new(make),
        }
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fallback({})", self.name)
    }
}

impl ProxyHooks for Fallback {
    fn unwrap<'a>(&self, host: &'a Value, ctx: &mut CallContext) -> Result<Cow<'a, Value>> {
        if host.is_none() {
            Ok(Cow::Owned((self.make)(ctx)?))
        } else {
            Ok(Cow::Borrowed(host))
        }
    }

    fn is_optional(&self, _inner: bool) -> bool {
        true
    }
}

/// `spec` with `fallback` standing in for absent values
pub fn default(spec: SpecRef, fallback: Fallback) -> SpecRef {
    Arc::new(ProxySpec::new(spec, fallback))
}
