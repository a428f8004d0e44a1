//! Pools
//!
//! A `Pool` owns one native arena. Handles are shared; the arena is freed
//! once, when the last handle (including handles held by dependency edges)
//! goes away. Wrappers remember the pool they came from through a
//! `PoolOrigin` and turn stale when that pool is gone.

use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::gu::Gu;
use crate::native::{NativeLayout, NativeValue};
use crate::spec::{dependency, CallContext, Fallback, ProxySpec, Spec, SpecRef};
use crate::value::Value;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

static LIVE_POOLS: AtomicUsize = AtomicUsize::new(0);

struct PoolInner {
    gu: Gu,
    raw: Address,
    owned: bool,
}

// The arena is only touched through the runtime's own synchronization.
unsafe impl Send for PoolInner {}
unsafe impl Sync for PoolInner {}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        LIVE_POOLS.fetch_sub(1, Ordering::Relaxed);
        debug!(event = "pool_release", pool = %self.raw);
        if let Err(e) = self.gu.pool_free(self.raw) {
            warn!(pool = %self.raw, error = %e, "failed to free pool");
        }
    }
}

#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

/// Outcome of `Pool::release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The arena was freed
    Now,
    /// Other holders remain; the arena is freed when the last one goes
    Deferred,
}

impl Pool {
    /// Fresh pool from the process-wide binding
    pub fn new() -> Result<Pool> {
        Pool::new_in(&Gu::global()?)
    }

    pub fn new_in(gu: &Gu) -> Result<Pool> {
        let raw = gu.new_pool()?;
        if raw.is_null() {
            return Err(MarshalError::ResourceExhausted("native pool creation failed".into()));
        }
        LIVE_POOLS.fetch_add(1, Ordering::Relaxed);
        debug!(event = "pool_new", pool = %raw);
        Ok(Pool(Arc::new(PoolInner {
            gu: gu.clone(),
            raw,
            owned: true,
        })))
    }

    /// Handle to a pool owned by native code; never freed from the host
    pub fn borrowed(gu: &Gu, raw: Address) -> Pool {
        Pool(Arc::new(PoolInner {
            gu: gu.clone(),
            raw,
            owned: false,
        }))
    }

    /// Give up this handle
    pub fn release(self) -> Released {
        match Arc::try_unwrap(self.0) {
            Ok(inner) => {
                drop(inner);
                Released::Now
            }
            Err(shared) => {
                debug!(pool = %shared.raw, holders = Arc::strong_count(&shared) - 1, "pool release deferred");
                Released::Deferred
            }
        }
    }

    /// Native address of the arena handle
    #[inline]
    pub fn address(&self) -> Address {
        self.0.raw
    }

    pub fn gu(&self) -> &Gu {
        &self.0.gu
    }

    pub fn is_owned(&self) -> bool {
        self.0.owned
    }

    pub fn ptr_eq(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// `size` bytes at `align` (0 picks the runtime's default alignment)
    pub fn alloc(&self, size: usize, align: usize) -> Result<Address> {
        let addr = self.0.gu.malloc_aligned(self.0.raw, size, align)?;
        if addr.is_null() && size > 0 {
            return Err(MarshalError::ResourceExhausted(format!(
                "allocation of {} bytes in pool {}",
                size, self.0.raw
            )));
        }
        Ok(addr)
    }

    pub fn origin(&self) -> PoolOrigin {
        PoolOrigin(Arc::downgrade(&self.0))
    }

    /// The thread's current pool, if one is installed
    pub fn current() -> Option<Pool> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// The current pool, or a fresh one when none is installed
    pub fn get() -> Result<Pool> {
        match Pool::current() {
            Some(pool) => Ok(pool),
            None => Pool::new(),
        }
    }

    /// Install `pool` as current until the returned guard drops
    pub fn shift(pool: Option<Pool>) -> PoolScope {
        let prev = CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), pool));
        PoolScope { prev: Some(prev) }
    }

    /// Run `f` with `pool` as the current pool
    pub fn with<R>(pool: &Pool, f: impl FnOnce() -> R) -> R {
        let _scope = Pool::shift(Some(pool.clone()));
        f()
    }

    /// Run `f` with a fresh current pool, returning it alongside the result
    pub fn scoped<R>(f: impl FnOnce(&Pool) -> Result<R>) -> Result<(Pool, R)> {
        let pool = Pool::new()?;
        let out = Pool::with(&pool, || f(&pool))?;
        Ok((pool, out))
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pool({}{})", self.0.raw, if self.0.owned { "" } else { ", borrowed" })
    }
}

/// Number of live host-owned pools
pub fn live_pools() -> usize {
    LIVE_POOLS.load(Ordering::Relaxed)
}

/// Weak link from a wrapper to the pool its memory lives in
#[derive(Clone)]
pub struct PoolOrigin(Weak<PoolInner>);

impl PoolOrigin {
    /// The arena has been freed
    #[inline]
    pub fn is_released(&self) -> bool {
        self.0.strong_count() == 0
    }

    pub fn upgrade(&self) -> Option<Pool> {
        self.0.upgrade().map(Pool)
    }

    pub fn is(&self, pool: &Pool) -> bool {
        Weak::as_ptr(&self.0) == Arc::as_ptr(&pool.0)
    }
}

impl fmt::Debug for PoolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(p) => write!(f, "PoolOrigin({})", p.raw),
            None => write!(f, "PoolOrigin(released)"),
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Pool>> = const { RefCell::new(None) };
}

/// Restores the previously current pool on drop, including during unwinding
pub struct PoolScope {
    prev: Option<Option<Pool>>,
}

impl Drop for PoolScope {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            // Swap out first so the displaced pool drops outside the borrow.
            let displaced = CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), prev));
            drop(displaced);
        }
    }
}

/// A pool passed to native code as its arena handle
#[derive(Debug)]
pub struct PoolRefSpec;

impl Spec for PoolRefSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        let raw = native.to_address();
        if raw.is_null() {
            return Ok(Value::None);
        }
        Ok(Value::Pool(Pool::borrowed(&Gu::global()?, raw)))
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::Pool(p) => {
                ctx.pin(p.clone().into());
                Ok(NativeValue::from_address(p.address()))
            }
            other => Err(MarshalError::mismatch("pool", other)),
        }
    }
}

pub fn pool_ref() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(PoolRefSpec));
    SPEC.clone()
}

/// Pool parameter of an allocating function.
///
/// Omitted means the call's explicit pool, then the current pool, else a
/// fresh one; in every case the pool is pinned by the result.
pub fn pool_out() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| {
        let fallback = Fallback::new("pool", |ctx| ctx.pool().map(Value::Pool));
        dependency(Arc::new(ProxySpec::new(pool_ref(), fallback)))
    });
    SPEC.clone()
}
