//! Intern table
//!
//! At most one live wrapper per (native type, address). Entries hold weak
//! references; a wrapper removes its own entry when it is dropped.

use crate::address::Address;
use crate::object::{Object, ObjectInner};
use crate::pool::PoolOrigin;
use crate::types::HostType;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::{Arc, Weak};
use tracing::trace;

type Key = (u64, usize);

static TABLE: Lazy<DashMap<Key, Weak<ObjectInner>>> = Lazy::new(DashMap::new);

/// The wrapper for `ty` at `addr`, created on first use.
///
/// # Panics
/// If `addr` is null.
pub fn intern(ty: &HostType, addr: Address) -> Object {
    intern_in(ty, addr, None)
}

/// Like [`intern`], recording `origin` on a newly created wrapper.
///
/// A wrapper whose pool has been released is never returned; it is
/// replaced by a fresh one.
pub fn intern_in(ty: &HostType, addr: Address, origin: Option<PoolOrigin>) -> Object {
    assert!(!addr.is_null(), "interning a null {}", ty.name());
    let key = (ty.id(), addr.get());
    // A replaced stale wrapper must be dropped after the entry lock is gone.
    let mut replaced = None;
    let obj = match TABLE.entry(key) {
        Entry::Occupied(mut e) => match e.get().upgrade().map(Object::from_inner) {
            Some(existing) if !existing.is_stale() => {
                trace!(event = "intern_hit", ty = ty.name(), addr = %addr);
                existing
            }
            found => {
                trace!(event = "intern_miss", ty = ty.name(), addr = %addr, stale = found.is_some());
                let obj = Object::interned(ty.clone(), addr, origin);
                e.insert(Arc::downgrade(obj.inner()));
                replaced = found;
                obj
            }
        },
        Entry::Vacant(e) => {
            trace!(event = "intern_miss", ty = ty.name(), addr = %addr, stale = false);
            let obj = Object::interned(ty.clone(), addr, origin);
            e.insert(Arc::downgrade(obj.inner()));
            obj
        }
    };
    drop(replaced);
    obj
}

/// Existing live wrapper for `ty` at `addr`, without creating one
pub fn lookup(ty: &HostType, addr: Address) -> Option<Object> {
    let weak = TABLE.get(&(ty.id(), addr.get()))?.clone();
    weak.upgrade().map(Object::from_inner)
}

/// Number of entries, live or not yet purged
pub fn len() -> usize {
    TABLE.len()
}

/// Remove the entry for `(ty, addr)` if it still belongs to `inner`
pub(crate) fn forget(ty_id: u64, addr: Address, inner: *const ObjectInner) {
    TABLE.remove_if(&(ty_id, addr.get()), |_, weak| Weak::as_ptr(weak) == inner);
}
