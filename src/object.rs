//! Wrapper objects
//!
//! An `Object` stands for a region of native memory holding a value of a
//! known host type. Interned wrappers view pool memory; detached wrappers
//! own a copy of a by-value result.

use crate::address::Address;
use crate::deps::{self, Dependency};
use crate::error::{MarshalError, Result};
use crate::intern;
use crate::native::NativeValue;
use crate::pool::{Pool, PoolOrigin};
use crate::spec::{CallContext, Spec, SpecRef};
use crate::types::{HostType, Shape};
use crate::value::Value;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};

pub struct ObjectInner {
    ty: HostType,
    addr: Address,
    origin: OnceCell<PoolOrigin>,
    storage: Option<Box<NativeValue>>,
    interned: bool,
}

// Access to the viewed memory is unsynchronized by contract: a pool and its
// wrappers are used from one thread at a time.
unsafe impl Send for ObjectInner {}
unsafe impl Sync for ObjectInner {}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let me = self as *const ObjectInner;
        if self.interned {
            intern::forget(self.ty.id(), self.addr, me);
        }
        deps::forget(me as usize);
    }
}

#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

/// Non-owning observation of a wrapper
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Object {
    pub(crate) fn interned(ty: HostType, addr: Address, origin: Option<PoolOrigin>) -> Object {
        let cell = OnceCell::new();
        if let Some(origin) = origin {
            let _ = cell.set(origin);
        }
        Object(Arc::new(ObjectInner {
            ty,
            addr,
            origin: cell,
            storage: None,
            interned: true,
        }))
    }

    /// Host-owned copy of a by-value native result
    pub fn detached(ty: HostType, native: &NativeValue) -> Object {
        let mut copy = Box::new(native.clone());
        let addr = Address::from_ptr(copy.as_mut_ptr());
        Object(Arc::new(ObjectInner {
            ty,
            addr,
            origin: OnceCell::new(),
            storage: Some(copy),
            interned: false,
        }))
    }

    /// Zeroed instance of `ty` allocated in `pool`
    pub fn alloc(ty: &HostType, pool: &Pool) -> Result<Object> {
        let layout = ty.layout();
        let addr = pool.alloc(layout.size.max(1), layout.align)?;
        unsafe { addr.zero(layout.size) };
        Ok(intern::intern_in(ty, addr, Some(pool.origin())))
    }

    pub(crate) fn from_inner(inner: Arc<ObjectInner>) -> Object {
        Object(inner)
    }

    pub(crate) fn inner(&self) -> &Arc<ObjectInner> {
        &self.0
    }

    #[inline]
    pub fn ty(&self) -> &HostType {
        &self.0.ty
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.0.addr
    }

    /// Identity of this wrapper
    #[inline]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    pub fn is_detached(&self) -> bool {
        self.0.storage.is_some()
    }

    pub fn origin(&self) -> Option<&PoolOrigin> {
        self.0.origin.get()
    }

    /// Pool this wrapper's memory lives in, while it is alive
    pub fn home_pool(&self) -> Option<Pool> {
        self.origin().and_then(PoolOrigin::upgrade)
    }

    /// Record `origin` unless one is already known
    pub(crate) fn adopt_origin(&self, origin: &PoolOrigin) {
        let _ = self.0.origin.set(origin.clone());
    }

    /// The pool this wrapper came from has been released
    pub fn is_stale(&self) -> bool {
        self.origin().map_or(false, PoolOrigin::is_released)
    }

    pub fn check_live(&self) -> Result<()> {
        if self.is_stale() {
            return Err(MarshalError::UseAfterRelease(format!(
                "{} at {}",
                self.ty().name(),
                self.address()
            )));
        }
        Ok(())
    }

    /// Values read through this wrapper live in the same pool
    fn adopt(&self, value: Value) -> Value {
        if let (Value::Object(child), Some(origin)) = (&value, self.origin()) {
            child.adopt_origin(origin);
        }
        value
    }

    /// Store `value` at `addr` through `spec`, pinning whatever it needed
    fn write_through(&self, spec: &SpecRef, addr: Address, value: &Value) -> Result<()> {
        let home = self.home_pool();
        let mut ctx = CallContext::with_pool(home.clone());
        unsafe { spec.write(addr, value, &mut ctx)? };
        let Some(home) = home else {
            deps::add_deps(self, ctx.take_all_pins());
            return Ok(());
        };
        for dep in ctx.take_all_pins() {
            match &dep {
                Dependency::Pool(p) if p.ptr_eq(&home) => {}
                // A wrapper over the same pool is covered by the pool itself.
                // Only its own prerequisites are carried over, so mutually
                // referencing wrappers never hold each other.
                Dependency::Object(o) if o.origin().map_or(false, |origin| origin.is(&home)) => {
                    let inherited = deps::deps_of(o).into_iter().filter(|d| !Self::is_covered_by(d, &home));
                    deps::add_deps(self, inherited);
                }
                _ => deps::add_dep(self, dep),
            }
        }
        Ok(())
    }

    /// `dep` only keeps memory of `home` alive
    fn is_covered_by(dep: &Dependency, home: &Pool) -> bool {
        match dep {
            Dependency::Pool(p) => p.ptr_eq(home),
            Dependency::Object(o) => o.origin().map_or(false, |origin| origin.is(home)),
            Dependency::Keep(_) => false,
        }
    }

    fn shape_error(&self, wanted: &str) -> MarshalError {
        MarshalError::TypeMismatch {
            expected: wanted.to_string(),
            found: self.ty().name().to_string(),
        }
    }

    // ===== Struct access =====

    pub fn get(&self, field: &str) -> Result<Value> {
        self.check_live()?;
        let Shape::Struct(st) = self.ty().shape() else {
            return Err(self.shape_error("struct"));
        };
        let f = st.field(self.ty().name(), field)?;
        let spec = f.spec()?;
        let value = unsafe { spec.read(self.address().add(f.offset()))? };
        Ok(self.adopt(value))
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.check_live()?;
        let Shape::Struct(st) = self.ty().shape() else {
            return Err(self.shape_error("struct"));
        };
        let f = st.field(self.ty().name(), field)?;
        let spec = f.spec()?;
        self.write_through(&spec, self.address().add(f.offset()), &value.into())
    }

    // ===== Scalar cells and enums =====

    pub fn value(&self) -> Result<Value> {
        self.check_live()?;
        match self.ty().shape() {
            Shape::Cell(_) | Shape::Enum(_) => {
                let value = unsafe { self.ty().spec().read(self.address())? };
                Ok(self.adopt(value))
            }
            _ => Err(self.shape_error("scalar")),
        }
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.check_live()?;
        match self.ty().shape() {
            Shape::Cell(_) | Shape::Enum(_) => {
                self.write_through(&self.ty().spec(), self.address(), &value.into())
            }
            _ => Err(self.shape_error("scalar")),
        }
    }

    // ===== Variants =====

    fn variant_word(&self) -> Result<usize> {
        self.check_live()?;
        match self.ty().shape() {
            Shape::Variant(_) => Ok(unsafe { self.address().read::<usize>() }),
            _ => Err(self.shape_error("variant")),
        }
    }

    /// Constructor name of this variant
    pub fn tag(&self) -> Result<String> {
        let word = self.variant_word()?;
        let Shape::Variant(vt) = self.ty().shape() else {
            return Err(self.shape_error("variant"));
        };
        Ok(vt.ctor_for_word(self.ty().name(), word)?.name().to_string())
    }

    pub fn payload(&self) -> Result<Value> {
        let word = self.variant_word()?;
        let Shape::Variant(vt) = self.ty().shape() else {
            return Err(self.shape_error("variant"));
        };
        let value = vt.read_payload(self.ty().name(), word)?;
        Ok(self.adopt(value))
    }

    // ===== Sequences =====

    pub fn len(&self) -> Result<usize> {
        self.check_live()?;
        match self.ty().shape() {
            Shape::Seq(seq) => seq.length(self.address()),
            _ => Err(self.shape_error("sequence")),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn element(&self, index: i64) -> Result<(SpecRef, Address)> {
        self.check_live()?;
        let Shape::Seq(seq) = self.ty().shape() else {
            return Err(self.shape_error("sequence"));
        };
        let addr = seq.element(self.address(), index)?;
        Ok((seq.elem().clone(), addr))
    }

    pub fn index(&self, index: i64) -> Result<Value> {
        let (spec, addr) = self.element(index)?;
        let value = unsafe { spec.read(addr)? };
        Ok(self.adopt(value))
    }

    pub fn set_index(&self, index: i64, value: impl Into<Value>) -> Result<()> {
        let (spec, addr) = self.element(index)?;
        self.write_through(&spec, addr, &value.into())
    }

    /// Snapshot of every element
    pub fn to_host_list(&self) -> Result<Vec<Value>> {
        let n = self.len()?;
        (0..n as i64).map(|i| self.index(i)).collect()
    }

    // ===== Punning =====

    /// The same memory viewed as `ty`, sharing this wrapper's prerequisites
    pub fn pun(&self, ty: &HostType) -> Result<Object> {
        self.check_live()?;
        if ty.id() == self.ty().id() {
            return Ok(self.clone());
        }
        let other = intern::intern_in(ty, self.address(), self.origin().cloned());
        deps::copy_deps(self, &other);
        if self.is_detached() {
            deps::add_dep(&other, self.clone());
        }
        Ok(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ty().name(), self.address())?;
        if self.is_detached() {
            write!(f, " (detached)")?;
        }
        Ok(())
    }
}
