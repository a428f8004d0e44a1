//! gu-interop - marshaling between Rust and the libgu arena library
//!
//! Design: native values are described by composable specs; wrappers for
//! native memory are interned per address; pools own the memory and are kept
//! alive by the wrappers that depend on them.
//!
//! Architecture:
//! - `spec` - converters between native representations and host values
//! - `intern` - one live wrapper per (type, address)
//! - `deps` - keep-alive edges from wrappers to pools and other wrappers
//! - `pool` - arena handles and the thread's current pool
//! - `types` - struct, variant, sequence and enum synthesis from descriptors
//! - `func` - native function import and invocation
//! - `bridge` / `vtable` - host closures and host objects as native callables
//! - `exn` - native exception frames
//! - `gu` - the loaded library binding

pub mod address;
pub mod bridge;
pub mod deps;
pub mod error;
pub mod exn;
pub mod func;
pub mod gu;
pub mod intern;
pub mod library;
pub mod logging;
pub mod native;
pub mod object;
pub mod pool;
pub mod spec;
pub mod types;
pub mod value;
pub mod vtable;

pub use address::Address;
pub use bridge::{make_bridge, Bridge};
pub use deps::{add_dep, copy_deps, Dependency};
pub use error::{MarshalError, NativeException, Result};
pub use exn::{exn_out, exn_out_in};
pub use func::{ForeignFn, Signature};
pub use gu::{Gu, GuConfig};
pub use intern::intern;
pub use library::{Library, LoadError, SymbolError};
pub use native::{NativeKind, NativeLayout, NativeValue, MAX_ALIGN};
pub use object::{Object, WeakObject};
pub use pool::{pool_out, pool_ref, Pool, PoolScope, Released};
pub use spec::{spec_for, CallContext, Scoped, Spec, SpecRef};
pub use types::{HostType, SeqType, Shape, StructBuilder, VariantBuilder, VariantType};
pub use value::{HostRef, NativeMethods, Value};
pub use vtable::{out_stream, BridgeSpec, VTableBuilder, WriterStream};

/// Counters of the process-wide tables
pub fn stats() -> InteropStats {
    InteropStats {
        intern_entries: intern::len(),
        dependents: deps::dependents(),
        live_pools: pool::live_pools(),
        live_bridges: bridge::live_bridges(),
    }
}

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropStats {
    pub intern_entries: usize,
    pub dependents: usize,
    pub live_pools: usize,
    pub live_bridges: usize,
}
