//! gu-runtime - arena pools and runtime type descriptors behind the libgu C ABI
//!
//! Architecture:
//! - `allocator`: bump allocation over pool-owned chunks
//! - `pool`: `GuPool` lifecycle and aligned allocation
//! - `seq`, `variant`: length-prefixed arrays and word-packed tagged unions
//! - `exn`: exception frames polled by callers
//! - `stream`: function-table output streams
//! - `types`: descriptor records and the static kind hierarchy
//!
//! Every exported function uses the C ABI, so the same code serves hosts
//! that `dlopen` the static library and hosts that link it as an rlib and
//! resolve symbols through [`lookup`].

#![allow(non_upper_case_globals)]

pub mod allocator;
pub mod exn;
pub mod pool;
pub mod seq;
pub mod stream;
pub mod types;
pub mod variant;

mod symbols;

pub use pool::GuPool;
pub use symbols::{lookup, symbol_names};
