mod common;

use common::{gu, import};
use gu_interop::spec;
use gu_interop::{
    exn_out, make_bridge, out_stream, CallContext, HostRef, MarshalError, NativeMethods, Signature,
    Spec, VTableBuilder, Value, WriterStream,
};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn i32_to_i32() -> Signature {
    Signature::new(vec![spec::int(4)], spec::int(4))
}

// ===== Bridge Tests =====

#[test]
fn test_bridge_int_result() {
    let apply = import("apply_i32", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let triple = make_bridge("triple", i32_to_i32(), |args| {
        Ok(Value::Int(args[0].as_i64().unwrap_or_default() * 3))
    });
    assert_eq!(apply.call(&[(&triple).into(), 14.into()]).unwrap(), Value::Int(42));
    assert_eq!(apply.call(&[(&triple).into(), (-2).into()]).unwrap(), Value::Int(-6));
    assert!(!triple.has_error());
}

#[test]
fn test_bridge_error_returns_zero() {
    let apply = import("apply_i32", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let failing = make_bridge("failing", i32_to_i32(), |_| {
        Err(MarshalError::Callback {
            name: "failing".into(),
            message: "nope".into(),
        })
    });
    assert_eq!(apply.call(&[(&failing).into(), 1.into()]).unwrap(), Value::Int(0));
    assert!(matches!(
        failing.take_error(),
        Some(MarshalError::Callback { message, .. }) if message == "nope"
    ));
    assert!(failing.take_error().is_none());
}

#[test]
fn test_bridge_panic_is_contained() {
    let apply = import("apply_i32", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let panicking = make_bridge("panicking", i32_to_i32(), |_| panic!("boom"));
    assert_eq!(apply.call(&[(&panicking).into(), 1.into()]).unwrap(), Value::Int(0));
    match panicking.take_error() {
        Some(MarshalError::Callback { name, message }) => {
            assert_eq!(name, "panicking");
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_bridge_keeps_first_failure() {
    let apply = import("apply_i32", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let bridge = make_bridge("first", i32_to_i32(), |args| {
        Err(MarshalError::Callback {
            name: "first".into(),
            message: format!("call {}", args[0].as_i64().unwrap_or_default()),
        })
    });
    apply.call(&[(&bridge).into(), 1.into()]).unwrap();
    apply.call(&[(&bridge).into(), 2.into()]).unwrap();
    assert!(matches!(
        bridge.take_error(),
        Some(MarshalError::Callback { message, .. }) if message == "call 1"
    ));
}

#[test]
fn test_bridge_result_out_of_range() {
    let apply = import("apply_i32", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let big = make_bridge("big", i32_to_i32(), |_| Ok(Value::Int(i64::MAX)));
    assert_eq!(apply.call(&[(&big).into(), 0.into()]).unwrap(), Value::Int(0));
    assert!(matches!(big.take_error(), Some(MarshalError::OutOfRange { .. })));
}

#[test]
fn test_bridge_float_result() {
    let apply = import("apply_f64", vec![spec::raw_address(), spec::float(8)], spec::float(8));
    let sig = Signature::new(vec![spec::float(8)], spec::float(8));
    let half = make_bridge("half", sig.clone(), |args| Ok(Value::Float(args[0].as_f64().unwrap_or_default() / 2.0)));
    assert_eq!(apply.call(&[(&half).into(), 5.0.into()]).unwrap(), Value::Float(2.5));

    let failing = make_bridge("failing_f64", sig, |_| Err(MarshalError::NullPointer("x".into())));
    assert_eq!(apply.call(&[(&failing).into(), 5.0.into()]).unwrap(), Value::Float(0.0));
    assert!(failing.has_error());
}

#[test]
fn test_bridge_pointer_result() {
    let apply = import("apply_ptr", vec![spec::raw_address(), spec::raw_address()], spec::address());
    let sig = Signature::new(vec![spec::raw_address()], spec::raw_address());
    let echo = make_bridge("echo", sig.clone(), |args| Ok(args[0].clone()));
    let target = gu_interop::Address::new(0x1000);
    assert_eq!(apply.call(&[(&echo).into(), target.into()]).unwrap(), Value::Address(target));

    let failing = make_bridge("failing_ptr", sig, |_| panic!("no pointer"));
    assert_eq!(apply.call(&[(&failing).into(), target.into()]).unwrap(), Value::None);
    assert!(failing.has_error());
}

#[test]
fn test_bridge_void_result() {
    static SEEN: AtomicI64 = AtomicI64::new(0);
    let apply = import("apply_void", vec![spec::raw_address(), spec::int(4)], spec::int(4));
    let sig = Signature::new(vec![spec::int(4)], spec::void());
    let record = make_bridge("record", sig, |args| {
        SEEN.store(args[0].as_i64().unwrap_or_default(), Ordering::SeqCst);
        Ok(Value::None)
    });
    assert_eq!(apply.call(&[(&record).into(), 17.into()]).unwrap(), Value::Int(17));
    assert_eq!(SEEN.load(Ordering::SeqCst), 17);
}

#[test]
fn test_bridges_are_counted() {
    let before = gu_interop::stats().live_bridges;
    let bridge = make_bridge("counted", i32_to_i32(), |args| Ok(args[0].clone()));
    assert!(gu_interop::stats().live_bridges >= before + 1);
    assert_eq!(bridge.name(), "counted");
    assert!(!bridge.code_ptr().is_null());
}

// ===== Exception Tests =====

#[test]
fn test_native_exception_raised() {
    let checked = import("checked", vec![spec::int(4), exn_out()], spec::int(4));
    match checked.call(&[7.into()]) {
        Err(MarshalError::Native(exn)) => {
            assert_eq!(exn.payload, Value::Int(7));
            assert!(!exn.type_name.is_empty());
        }
        other => panic!("expected a native exception, got {:?}", other),
    }
}

#[test]
fn test_no_exception_passes_result() {
    let checked = import("checked", vec![spec::int(4), exn_out()], spec::int(4));
    assert_eq!(checked.call(&[0.into()]).unwrap(), Value::Int(1));
    assert_eq!(checked.call(&[0.into(), Value::None]).unwrap(), Value::Int(1));
}

// ===== Out Stream Tests =====

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_out_stream_receives_bytes() {
    let gu = gu();
    let out_str = unsafe {
        gu.import(
            "out_str",
            Signature::new(vec![out_stream(), spec::cstr(), exn_out()], spec::uint(8)),
        )
    }
    .unwrap();
    let flush = unsafe { gu.import("out_flush", Signature::new(vec![out_stream(), exn_out()], spec::void())) }.unwrap();

    let buf = SharedBuf::default();
    let stream = HostRef::new(WriterStream::new(buf.clone()));
    assert_eq!(out_str.call(&[stream.clone().into(), "hello ".into()]).unwrap(), Value::UInt(6));
    assert_eq!(out_str.call(&[stream.clone().into(), "world".into()]).unwrap(), Value::UInt(5));
    flush.call(&[stream.into()]).unwrap();
    assert_eq!(buf.0.lock().as_slice(), b"hello world");
}

struct Refusing;

impl NativeMethods for Refusing {
    fn call_method(&self, slot: &str, _args: &[Value]) -> gu_interop::Result<Value> {
        Err(MarshalError::Callback {
            name: slot.to_string(),
            message: "closed".into(),
        })
    }
}

#[test]
fn test_out_stream_failure_is_contained() {
    let gu = gu();
    let out_str = unsafe {
        gu.import(
            "out_str",
            Signature::new(vec![out_stream(), spec::cstr(), exn_out()], spec::uint(8)),
        )
    }
    .unwrap();
    let stream = HostRef::new(Refusing);
    assert_eq!(out_str.call(&[stream.into(), "lost".into()]).unwrap(), Value::UInt(0));
}

#[test]
fn test_dead_shims_swept_without_new_bridges() {
    let spec = VTableBuilder::new("Pinger")
        .slot("ping", Signature::new(vec![], spec::int(4)))
        .build_bridge();
    let first = HostRef::new(Refusing);
    let second = HostRef::new(Refusing);

    let mut ctx = CallContext::new();
    let a = spec.to_native(&first.clone().into(), &mut ctx).unwrap();
    let again = spec.to_native(&first.clone().into(), &mut ctx).unwrap();
    assert_eq!(a.to_address(), again.to_address());
    spec.to_native(&second.clone().into(), &mut ctx).unwrap();
    drop(ctx);
    assert_eq!(spec.len(), 2);

    drop(first);
    assert_eq!(spec.len(), 1);
    drop(second);
    assert!(spec.is_empty());
}
