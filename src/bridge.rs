//! Callback bridge
//!
//! `make_bridge` turns a host closure into a native function pointer. The
//! trampoline converts native arguments through the signature's specs,
//! runs the closure, and converts the result back. A failing closure, by
//! error or by panic, never unwinds into native code: the failure is logged,
//! parked in the bridge's error slot, and the result type's zero value is
//! returned instead.

use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::func::Signature;
use crate::logging::log_callback_failure;
use crate::native::{NativeKind, NativeValue};
use crate::spec::{CallContext, Scoped};
use crate::value::Value;
use libffi::middle::Closure;
use libffi::raw::ffi_cif;
use parking_lot::Mutex;
use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_BRIDGES: AtomicUsize = AtomicUsize::new(0);

type HostFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

struct BridgeState {
    name: String,
    sig: Signature,
    f: Box<HostFn>,
    error: Mutex<Option<MarshalError>>,
}

impl BridgeState {
    /// Convert the native arguments, run the closure, convert the result
    unsafe fn invoke(&self, args: *const *const c_void) -> Result<NativeValue> {
        let mut ctx = CallContext::new();
        let mut scopes: Vec<Scoped<Option<Value>>> = Vec::with_capacity(self.sig.args().len());
        let mut host_args = Vec::with_capacity(self.sig.args().len());
        for (i, spec) in self.sig.args().iter().enumerate() {
            let p = *args.add(i);
            let native = NativeValue::load(Address::from_ptr(p), spec.layout());
            let scoped = spec.as_host(&native, &mut ctx)?;
            if let Some(v) = scoped.value() {
                host_args.push(v.clone());
            }
            scopes.push(scoped);
        }

        let result = (self.f)(&host_args)?;
        let native = self.sig.result().to_native(&result, &mut ctx)?;
        for s in scopes.iter_mut() {
            s.finish()?;
        }
        Ok(native)
    }

    fn fail(&self, error: MarshalError) {
        log_callback_failure(&self.name, &error.to_string());
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Store `native` in libffi's result buffer; integral results fill a whole
/// register-sized slot.
unsafe fn write_result(result: *mut u8, native: &NativeValue) {
    let layout = native.layout();
    match layout.kind {
        NativeKind::Void => {}
        NativeKind::Signed => (result as *mut u64).write_unaligned(native.to_i64() as u64),
        NativeKind::Unsigned => (result as *mut u64).write_unaligned(native.to_u64()),
        _ => core::ptr::copy_nonoverlapping(native.as_ptr(), result, layout.size),
    }
}

unsafe extern "C" fn trampoline(
    _cif: &ffi_cif,
    result: &mut u64,
    args: *const *const c_void,
    state: &BridgeState,
) {
    let out = result as *mut u64 as *mut u8;
    let outcome = catch_unwind(AssertUnwindSafe(|| state.invoke(args)));
    let native = match outcome {
        Ok(Ok(native)) => native,
        Ok(Err(e)) => {
            state.fail(e);
            NativeValue::zeroed(state.sig.result().layout())
        }
        Err(panic) => {
            state.fail(MarshalError::Callback {
                name: state.name.clone(),
                message: panic_message(panic.as_ref()),
            });
            NativeValue::zeroed(state.sig.result().layout())
        }
    };
    write_result(out, &native);
}

/// A host closure callable from native code
pub struct Bridge {
    // Dropped before the state it points into.
    closure: Closure<'static>,
    state: Box<BridgeState>,
}

// The closure's code is immutable and the state is Sync.
unsafe impl Send for Bridge {}
unsafe impl Sync for Bridge {}

/// Native function pointer for `f` with signature `sig`
pub fn make_bridge(
    name: impl Into<String>,
    sig: Signature,
    f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
) -> Bridge {
    let cif = sig.cif();
    let state = Box::new(BridgeState {
        name: name.into(),
        sig,
        f: Box::new(f),
        error: Mutex::new(None),
    });
    // The state is boxed and outlives the closure.
    let userdata: &'static BridgeState = unsafe { &*(state.as_ref() as *const BridgeState) };
    let closure = Closure::new(cif, trampoline, userdata);
    LIVE_BRIDGES.fetch_add(1, Ordering::Relaxed);
    Bridge { closure, state }
}

impl Bridge {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn signature(&self) -> &Signature {
        &self.state.sig
    }

    /// Entry point to hand to native code
    pub fn code_ptr(&self) -> Address {
        Address::new(*self.closure.code_ptr() as usize)
    }

    /// Take the parked failure, if any
    pub fn take_error(&self) -> Option<MarshalError> {
        self.state.error.lock().take()
    }

    pub fn has_error(&self) -> bool {
        self.state.error.lock().is_some()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        LIVE_BRIDGES.fetch_sub(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bridge({} @ {})", self.state.name, self.code_ptr())
    }
}

impl From<&Bridge> for Value {
    fn from(b: &Bridge) -> Self {
        Value::Address(b.code_ptr())
    }
}

/// Number of bridges alive
pub fn live_bridges() -> usize {
    LIVE_BRIDGES.load(Ordering::Relaxed)
}
