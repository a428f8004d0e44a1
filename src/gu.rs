//! Library binding
//!
//! `Gu` is one loaded libgu: the runtime functions the marshaling layer
//! relies on, imported through ordinary signatures, plus the registry of
//! types synthesized from the library's descriptors.

use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::func::{ForeignFn, Signature};
use crate::library::Library;
use crate::spec::{self, SpecRef};
use crate::types::{HostType, TypeRegistry};
use crate::value::Value;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::info;

/// Process configuration for the global binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuConfig {
    /// Shared library to open; `None` uses the runtime linked in-process
    pub library: Option<String>,
    pub prefix: String,
}

impl Default for GuConfig {
    fn default() -> Self {
        Self {
            library: None,
            prefix: "gu_".to_string(),
        }
    }
}

impl GuConfig {
    /// From `GU_LIBRARY` and `GU_PREFIX`
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            library: var("GU_LIBRARY").filter(|s| !s.is_empty()),
            prefix: var("GU_PREFIX").unwrap_or(defaults.prefix),
        }
    }

    pub fn open(&self) -> Result<Library> {
        Ok(match &self.library {
            Some(path) => Library::load(path)?.with_prefix(&self.prefix),
            None => Library::builtin().with_prefix(&self.prefix),
        })
    }
}

struct Imports {
    new_pool: ForeignFn,
    pool_free: ForeignFn,
    malloc_aligned: ForeignFn,
    make_seq: ForeignFn,
    seq_length: ForeignFn,
    seq_data: ForeignFn,
    make_variant: ForeignFn,
    variant_tag: ForeignFn,
    variant_data: ForeignFn,
    new_exn: ForeignFn,
    exn_caught: ForeignFn,
    exn_caught_data: ForeignFn,
}

impl Imports {
    fn load(lib: &Library) -> Result<Self> {
        let addr = spec::raw_address;
        let size = || spec::uint(core::mem::size_of::<usize>());
        let sig = |args: Vec<SpecRef>, result: SpecRef| Signature::new(args, result);
        // These signatures mirror the runtime's C declarations.
        unsafe {
            Ok(Self {
                new_pool: lib.import("new_pool", sig(vec![], addr()))?,
                pool_free: lib.import("pool_free", sig(vec![addr()], spec::void()))?,
                malloc_aligned: lib.import("malloc_aligned", sig(vec![addr(), size(), size()], addr()))?,
                make_seq: lib.import("make_seq", sig(vec![size(), size(), addr()], addr()))?,
                seq_length: lib.import("seq_length", sig(vec![addr()], size()))?,
                seq_data: lib.import("seq_data", sig(vec![addr()], addr()))?,
                make_variant: lib.import(
                    "make_variant",
                    sig(vec![spec::uint(1), size(), size(), addr(), addr()], size()),
                )?,
                variant_tag: lib.import("variant_tag", sig(vec![size()], spec::int(4)))?,
                variant_data: lib.import("variant_data", sig(vec![size()], addr()))?,
                new_exn: lib.import("new_exn", sig(vec![addr(), addr(), addr()], addr()))?,
                exn_caught: lib.import("exn_caught", sig(vec![addr()], addr()))?,
                exn_caught_data: lib.import("exn_caught_data", sig(vec![addr()], addr()))?,
            })
        }
    }
}

struct GuInner {
    lib: Library,
    fns: Imports,
    registry: TypeRegistry,
}

#[derive(Clone)]
pub struct Gu(Arc<GuInner>);

#[derive(Clone)]
pub struct WeakGu(Weak<GuInner>);

impl WeakGu {
    pub fn upgrade(&self) -> Option<Gu> {
        self.0.upgrade().map(Gu)
    }
}

static GLOBAL: OnceCell<Gu> = OnceCell::new();

fn address_of(v: Value) -> Address {
    match v {
        Value::Address(a) => a,
        _ => Address::NULL,
    }
}

fn usize_of(v: Value) -> usize {
    v.as_u64().unwrap_or_default() as usize
}

impl Gu {
    /// The process-wide binding, configured from the environment on first use
    pub fn global() -> Result<Gu> {
        GLOBAL
            .get_or_try_init(|| {
                let config = GuConfig::from_env();
                info!(library = ?config.library, prefix = %config.prefix, "binding libgu");
                Gu::new(config.open()?)
            })
            .cloned()
    }

    pub fn new(lib: Library) -> Result<Gu> {
        let fns = Imports::load(&lib)?;
        let registry = TypeRegistry::new(&lib);
        Ok(Gu(Arc::new(GuInner { lib, fns, registry })))
    }

    pub fn library(&self) -> &Library {
        &self.0.lib
    }

    pub(crate) fn registry(&self) -> &TypeRegistry {
        &self.0.registry
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn downgrade(&self) -> WeakGu {
        WeakGu(Arc::downgrade(&self.0))
    }

    /// Import another function of this library.
    ///
    /// # Safety
    /// The native function must have the declared signature.
    pub unsafe fn import(&self, name: &str, sig: Signature) -> Result<ForeignFn> {
        self.0.lib.import(name, sig)
    }

    // ===== Types =====

    /// Host type of the descriptor exported as `type__<name>`
    pub fn type_named(&self, name: &str) -> Result<HostType> {
        let desc = self.descriptor(name)?;
        unsafe { self.0.registry.host_type(self, desc, Some(name)) }
    }

    pub fn descriptor(&self, name: &str) -> Result<Address> {
        self.0.registry.descriptor(&self.0.lib, name)
    }

    /// Host type of the descriptor at `desc`.
    ///
    /// # Safety
    /// `desc` must point at a descriptor record that outlives the binding.
    pub unsafe fn host_type(&self, desc: Address) -> Result<HostType> {
        self.0.registry.host_type(self, desc, None)
    }

    /// Spec for values typed by the descriptor at `desc` (pointer
    /// descriptors yield reference specs).
    ///
    /// # Safety
    /// `desc` must be null or point at a descriptor record that outlives
    /// the binding.
    pub unsafe fn spec_for_descriptor(&self, desc: Address) -> Result<SpecRef> {
        self.0.registry.spec_for(self, desc)
    }

    pub fn type_count(&self) -> usize {
        self.0.registry.len()
    }

    // ===== Runtime calls =====

    pub(crate) fn new_pool(&self) -> Result<Address> {
        self.0.fns.new_pool.call(&[]).map(address_of)
    }

    pub(crate) fn pool_free(&self, pool: Address) -> Result<()> {
        self.0.fns.pool_free.call(&[pool.into()]).map(drop)
    }

    pub(crate) fn malloc_aligned(&self, pool: Address, size: usize, align: usize) -> Result<Address> {
        self.0
            .fns
            .malloc_aligned
            .call(&[pool.into(), size.into(), align.into()])
            .map(address_of)
    }

    pub(crate) fn make_seq(&self, elem_size: usize, len: usize, pool: Address) -> Result<Address> {
        self.0
            .fns
            .make_seq
            .call(&[elem_size.into(), len.into(), pool.into()])
            .map(address_of)
    }

    pub(crate) fn seq_length(&self, seq: Address) -> Result<usize> {
        self.0.fns.seq_length.call(&[seq.into()]).map(usize_of)
    }

    pub(crate) fn seq_data(&self, seq: Address) -> Result<Address> {
        self.0.fns.seq_data.call(&[seq.into()]).map(address_of)
    }

    pub(crate) fn make_variant(
        &self,
        tag: u8,
        size: usize,
        align: usize,
        init: Address,
        pool: Address,
    ) -> Result<usize> {
        self.0
            .fns
            .make_variant
            .call(&[tag.into(), size.into(), align.into(), init.into(), pool.into()])
            .map(usize_of)
    }

    pub(crate) fn variant_tag(&self, word: usize) -> Result<i32> {
        let tag = self.0.fns.variant_tag.call(&[word.into()])?;
        tag.as_i64()
            .map(|t| t as i32)
            .ok_or_else(|| MarshalError::mismatch("int", &tag))
    }

    pub(crate) fn variant_data(&self, word: usize) -> Result<Address> {
        self.0.fns.variant_data.call(&[word.into()]).map(address_of)
    }

    pub(crate) fn new_exn(&self, parent: Address, catch: Address, pool: Address) -> Result<Address> {
        self.0
            .fns
            .new_exn
            .call(&[parent.into(), catch.into(), pool.into()])
            .map(address_of)
    }

    pub(crate) fn exn_caught(&self, exn: Address) -> Result<Address> {
        self.0.fns.exn_caught.call(&[exn.into()]).map(address_of)
    }

    pub(crate) fn exn_caught_data(&self, exn: Address) -> Result<Address> {
        self.0.fns.exn_caught_data.call(&[exn.into()]).map(address_of)
    }
}

impl fmt::Debug for Gu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gu")
            .field("library", &self.0.lib)
            .field("types", &self.0.registry.len())
            .finish()
    }
}
