//! Bridge specs: host objects as native polymorphic objects
//!
//! Native libraries model interfaces as a struct whose first member points
//! to a table of function pointers, each taking the struct itself as first
//! argument. A `BridgeSpec` synthesizes such a struct for a host object:
//! one trampoline per declared slot, dispatching to
//! `NativeMethods::call_method`. Shims are memoized per host object and
//! dropped once the object is gone.

use crate::address::Address;
use crate::bridge::{make_bridge, Bridge};
use crate::deps::Dependency;
use crate::error::{MarshalError, Result};
use crate::func::Signature;
use crate::native::{NativeLayout, NativeValue};
use crate::spec::{self, CallContext, Scoped, Spec, SpecRef};
use crate::value::{HostRef, NativeMethods, Value};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Receiver pointer: passed to native code, hidden from the host
#[derive(Debug)]
struct HiddenPointer;

impl Spec for HiddenPointer {
    fn layout(&self) -> NativeLayout {
        NativeLayout::POINTER
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        Ok(Value::Address(native.to_address()))
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        spec::raw_address().to_native(host, ctx)
    }

    fn as_host(&self, _native: &NativeValue, _ctx: &mut CallContext) -> Result<Scoped<Option<Value>>> {
        Ok(Scoped::new(None))
    }
}

/// Pointer argument native code passes but the host never sees
pub fn hidden_pointer() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| Arc::new(HiddenPointer));
    SPEC.clone()
}

struct Slot {
    name: String,
    /// Arguments after the receiver
    sig: Signature,
}

#[repr(C)]
struct NativeShim {
    funs: *const usize,
    handle: usize,
}

/// Native face of one host object
struct Shim {
    native: Box<NativeShim>,
    _table: Box<[usize]>,
    _bridges: Vec<Bridge>,
    target: Weak<dyn NativeMethods>,
}

// The shim is immutable after construction; the target is Send + Sync.
unsafe impl Send for Shim {}
unsafe impl Sync for Shim {}

impl Shim {
    fn address(&self) -> Address {
        Address::from_ptr(self.native.as_ref() as *const NativeShim)
    }
}

pub struct VTableBuilder {
    name: String,
    slots: Vec<Option<Slot>>,
}

impl VTableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    /// Next table entry; `sig` lists the arguments after the receiver
    pub fn slot(mut self, name: &str, sig: Signature) -> Self {
        self.slots.push(Some(Slot {
            name: name.to_string(),
            sig,
        }));
        self
    }

    /// Next table entry left null
    pub fn empty_slot(mut self) -> Self {
        self.slots.push(None);
        self
    }

    pub fn build(self) -> SpecRef {
        self.build_bridge()
    }

    /// Same as `build`, keeping the concrete type for shim inspection
    pub fn build_bridge(self) -> Arc<BridgeSpec> {
        Arc::new(BridgeSpec {
            name: self.name,
            slots: self.slots,
            shims: DashMap::new(),
        })
    }
}

pub struct BridgeSpec {
    name: String,
    slots: Vec<Option<Slot>>,
    shims: DashMap<usize, Arc<Shim>>,
}

impl BridgeSpec {
    fn make_shim(&self, host: &HostRef) -> Arc<Shim> {
        let target = Arc::downgrade(host.target());
        let mut bridges = Vec::new();
        let mut table = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let Some(slot) = slot else {
                table.push(0usize);
                continue;
            };
            let mut args = vec![hidden_pointer()];
            args.extend(slot.sig.args().iter().cloned());
            let sig = Signature::new(args, slot.sig.result().clone());
            let weak = target.clone();
            let method = slot.name.clone();
            let bridge = make_bridge(format!("{}.{}", self.name, slot.name), sig, move |args| {
                let target = weak
                    .upgrade()
                    .ok_or_else(|| MarshalError::UseAfterRelease(format!("host object behind `{}`", method)))?;
                target.call_method(&method, args)
            });
            table.push(bridge.code_ptr().get());
            bridges.push(bridge);
        }
        let table = table.into_boxed_slice();
        let native = Box::new(NativeShim {
            funs: table.as_ptr(),
            handle: host.id(),
        });
        Arc::new(Shim {
            native,
            _table: table,
            _bridges: bridges,
            target,
        })
    }

    /// Shim for `host`, created on first use
    fn shim(&self, host: &HostRef) -> Arc<Shim> {
        self.sweep();
        if let Some(shim) = self.shims.get(&host.id()) {
            if shim.target.strong_count() > 0 {
                return shim.clone();
            }
        }
        let shim = self.make_shim(host);
        trace!(spec = %self.name, host = ?host, shim = %shim.address(), "bridge shim created");
        self.shims.insert(host.id(), shim.clone());
        shim
    }

    /// Drop shims whose host object is gone
    fn sweep(&self) {
        let dead: Vec<Arc<Shim>> = {
            let keys: Vec<usize> = self
                .shims
                .iter()
                .filter(|e| e.value().target.strong_count() == 0)
                .map(|e| *e.key())
                .collect();
            keys.into_iter()
                .filter_map(|k| {
                    self.shims
                        .remove_if(&k, |_, shim| shim.target.strong_count() == 0)
                        .map(|(_, v)| v)
                })
                .collect()
        };
        drop(dead);
    }

    /// Shims of host objects that are still alive
    pub fn len(&self) -> usize {
        self.sweep();
        self.shims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for BridgeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge {}", self.name)
    }
}

impl Spec for BridgeSpec {
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
        self.sweep();
        let found = self
            .shims
            .iter()
            .find(|e| e.value().address() == addr)
            .and_then(|e| e.value().target.upgrade());
        Ok(match found {
            Some(target) => Value::Host(HostRef::from_arc(target)),
            None => Value::Address(addr),
        })
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        match host {
            Value::None => Ok(NativeValue::from_address(Address::NULL)),
            Value::Address(a) => Ok(NativeValue::from_address(*a)),
            Value::Host(h) => {
                let shim = self.shim(h);
                let addr = shim.address();
                ctx.pin(Dependency::Keep(shim));
                Ok(NativeValue::from_address(addr))
            }
            other => Err(MarshalError::mismatch(format!("host object for {}", self.name), other)),
        }
    }
}

/// `GuOutStream`: `output(self, slice, exn) -> size_t` and `flush(self, exn)`.
///
/// `output` receives the bytes and returns how many were consumed; `flush`
/// receives nothing.
pub fn out_stream() -> SpecRef {
    static SPEC: Lazy<SpecRef> = Lazy::new(|| {
        let size = spec::uint(core::mem::size_of::<usize>());
        VTableBuilder::new("GuOutStream")
            .empty_slot()
            .empty_slot()
            .slot("output", Signature::new(vec![spec::bytes(), hidden_pointer()], size))
            .slot("flush", Signature::new(vec![hidden_pointer()], spec::void()))
            .build()
    });
    SPEC.clone()
}

/// Host writer usable as an out stream
pub struct WriterStream<W>(Mutex<W>);

impl<W: Write + Send> WriterStream<W> {
    pub fn new(writer: W) -> Self {
        Self(Mutex::new(writer))
    }

    pub fn into_inner(self) -> W {
        self.0.into_inner()
    }
}

impl<W: Write + Send> NativeMethods for WriterStream<W> {
    fn call_method(&self, slot: &str, args: &[Value]) -> Result<Value> {
        let io = |e: std::io::Error| MarshalError::Callback {
            name: slot.to_string(),
            message: e.to_string(),
        };
        match slot {
            "output" => {
                let data = args
                    .first()
                    .and_then(Value::as_bytes)
                    .ok_or_else(|| MarshalError::mismatch("bytes", args.first().unwrap_or(&Value::None)))?;
                self.0.lock().write_all(data).map_err(io)?;
                Ok(Value::UInt(data.len() as u64))
            }
            "flush" => {
                self.0.lock().flush().map_err(io)?;
                Ok(Value::None)
            }
            other => Err(MarshalError::Callback {
                name: other.to_string(),
                message: "no such method on a writer stream".into(),
            }),
        }
    }

    fn type_name(&self) -> &str {
        "writer stream"
    }
}
