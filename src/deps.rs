//! Dependency graph
//!
//! Records "the prerequisite must stay valid while the dependent can still
//! be read". Edges are keyed by the identity of the dependent wrapper and
//! disappear when that wrapper is dropped; they are never removed otherwise.

use crate::object::Object;
use crate::pool::Pool;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Something a dependent keeps alive
#[derive(Clone)]
pub enum Dependency {
    Pool(Pool),
    Object(Object),
    /// Arbitrary host keep-alive token
    Keep(Arc<dyn Any + Send + Sync>),
}

impl Dependency {
    pub fn keep(token: impl Any + Send + Sync) -> Self {
        Dependency::Keep(Arc::new(token))
    }

    pub fn as_pool(&self) -> Option<&Pool> {
        match self {
            Dependency::Pool(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Pool(p) => write!(f, "Pool({:?})", p),
            Dependency::Object(o) => write!(f, "Object({:?})", o),
            Dependency::Keep(_) => write!(f, "Keep(..)"),
        }
    }
}

impl From<Pool> for Dependency {
    fn from(p: Pool) -> Self {
        Dependency::Pool(p)
    }
}

impl From<Object> for Dependency {
    fn from(o: Object) -> Self {
        Dependency::Object(o)
    }
}

static GRAPH: Lazy<DashMap<usize, Vec<Dependency>>> = Lazy::new(DashMap::new);

/// Pin `dep` for as long as `dependent` lives
pub fn add_dep(dependent: &Object, dep: impl Into<Dependency>) {
    let dep = dep.into();
    if let Dependency::Object(o) = &dep {
        if o.ptr_eq(dependent) {
            return;
        }
    }
    trace!(event = "dep_add", dependent = %dependent.address(), dep = ?dep);
    GRAPH.entry(dependent.id()).or_default().push(dep);
}

pub fn add_deps(dependent: &Object, deps: impl IntoIterator<Item = Dependency>) {
    for dep in deps {
        add_dep(dependent, dep);
    }
}

/// Give `to` every prerequisite `from` has
pub fn copy_deps(from: &Object, to: &Object) {
    let deps = deps_of(from);
    add_deps(to, deps);
}

/// Snapshot of the prerequisites of `dependent`
pub fn deps_of(dependent: &Object) -> Vec<Dependency> {
    GRAPH
        .get(&dependent.id())
        .map(|deps| deps.clone())
        .unwrap_or_default()
}

/// Number of dependents with at least one edge
pub fn dependents() -> usize {
    GRAPH.len()
}

/// Drop every edge of the dependent identified by `id`
pub(crate) fn forget(id: usize) {
    // Prerequisites may themselves be wrappers whose drop re-enters the map;
    // release the shard lock before dropping them.
    let removed = GRAPH.remove(&id);
    drop(removed);
}
