//! In-process symbol table
//!
//! Lets a host resolve the runtime's exported functions and descriptor
//! records by name without going through the dynamic loader.

use crate::exn::*;
use crate::pool::*;
use crate::seq::*;
use crate::stream::*;
use crate::types::*;
use crate::variant::*;

macro_rules! symbol_table {
    (fns { $($f:ident),* $(,)? } statics { $($s:ident),* $(,)? }) => {
        /// Address of the exported symbol `name`
        pub fn lookup(name: &str) -> Option<*const ()> {
            match name {
                $(stringify!($f) => Some($f as *const ()),)*
                $(stringify!($s) => Some(&$s as *const _ as *const ()),)*
                _ => None,
            }
        }

        /// Names of every exported symbol
        pub fn symbol_names() -> &'static [&'static str] {
            &[$(stringify!($f),)* $(stringify!($s),)*]
        }
    };
}

symbol_table! {
    fns {
        gu_new_pool, gu_pool_free, gu_malloc, gu_malloc_aligned,
        gu_make_seq, gu_seq_length, gu_seq_data,
        gu_alloc_variant, gu_make_variant, gu_variant_tag, gu_variant_data,
        gu_new_exn, gu_exn_is_raised, gu_exn_caught, gu_exn_caught_data,
        gu_exn_clear, gu_exn_block, gu_exn_unblock, gu_exn_raise, gu_exn_raise_new,
        gu_out_bytes, gu_out_str, gu_out_flush,
        gu_type_has_kind,
    }
    statics {
        gu_type__type, gu_type__alias, gu_type__typedef, gu_type__abstract,
        gu_type__repr, gu_type__struct, gu_type__pointer, gu_type__reference,
        gu_type__primitive, gu_type__integer, gu_type__signed, gu_type__unsigned,
        gu_type__GuFloating, gu_type__enum, gu_type__GuVariant, gu_type__GuSeq,
        gu_type__GuOpaque,
        gu_type__char, gu_type__int,
        gu_type__int8_t, gu_type__int16_t, gu_type__int32_t, gu_type__int64_t,
        gu_type__uint8_t, gu_type__uint16_t, gu_type__uint32_t, gu_type__uint64_t,
        gu_type__size_t, gu_type__float, gu_type__double,
        gu_type__GuByteSeq, gu_type__GuCharSeq, gu_type__GuAddress,
    }
}
