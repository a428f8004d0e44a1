mod common;

use common::{gu, import, point_ref, point_type};
use gu_interop::spec::{self, dependency};
use gu_interop::{
    intern, pool_out, stats, Address, CallContext, MarshalError, Object, Pool, Released, Value,
};

// ===== Scalar Call Tests =====

#[test]
fn test_call_primitives() {
    let add = import("add", vec![spec::int(4), spec::int(4)], spec::int(4));
    assert_eq!(add.call(&[2.into(), 40.into()]).unwrap(), Value::Int(42));
    assert_eq!(add.call(&[(-5).into(), 3.into()]).unwrap(), Value::Int(-2));

    let scale = import("scale", vec![spec::float(8), spec::float(8)], spec::float(8));
    assert_eq!(scale.call(&[1.5.into(), 4.into()]).unwrap(), Value::Float(6.0));
}

#[test]
fn test_narrow_signed_result() {
    let negate = import("negate", vec![spec::int(1)], spec::int(1));
    assert_eq!(negate.call(&[5.into()]).unwrap(), Value::Int(-5));
    assert_eq!(negate.call(&[(-128).into()]).unwrap(), Value::Int(-128));
    assert!(matches!(
        negate.call(&[200.into()]),
        Err(MarshalError::OutOfRange { .. })
    ));
}

#[test]
fn test_arity_checks() {
    let add = import("add", vec![spec::int(4), spec::int(4)], spec::int(4));
    assert!(matches!(
        add.call(&[1.into()]),
        Err(MarshalError::Arity { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
        add.call(&[1.into(), 2.into(), 3.into()]),
        Err(MarshalError::Arity { found: 3, .. })
    ));
}

#[test]
fn test_cstr_argument() {
    let strlen = import("strlen", vec![spec::cstr()], spec::uint(8));
    assert_eq!(strlen.call(&["hello".into()]).unwrap(), Value::UInt(5));
    assert_eq!(strlen.call(&["".into()]).unwrap(), Value::UInt(0));
    // An omitted optional argument is passed as null.
    assert_eq!(strlen.call(&[]).unwrap(), Value::UInt(u64::MAX));
}

// ===== Identity Tests =====

#[test]
fn test_pointer_identity() {
    let pool = Pool::new().unwrap();
    let new_point = import("new_point", vec![pool_out(), spec::int(4), spec::int(4)], point_ref());
    let identity = import("identity", vec![point_ref()], point_ref());

    let p = new_point.call_in(&pool, &[Value::None, 3.into(), 4.into()]).unwrap();
    let q = identity.call(&[p.clone()]).unwrap();
    assert_eq!(p, q);

    let p = p.into_object().unwrap();
    let again = intern(&point_type(), p.address());
    assert!(again.ptr_eq(&p));
    assert_eq!(p.get("x").unwrap(), Value::Int(3));
    assert_eq!(p.get("y").unwrap(), Value::Int(4));
}

#[test]
fn test_null_pointer_is_absent() {
    let identity = import("identity", vec![point_ref()], point_ref());
    assert_eq!(identity.call(&[Value::None]).unwrap(), Value::None);
}

#[test]
fn test_plain_value_through_reference() {
    let sum = import("point_sum", vec![point_ref()], spec::int(4));
    let pool = Pool::new().unwrap();
    let p = point_type().alloc(&pool).unwrap();
    p.set("x", 10).unwrap();
    p.set("y", 32).unwrap();
    assert_eq!(sum.call(&[p.into()]).unwrap(), Value::Int(42));
    assert_eq!(sum.call(&[Value::None]).unwrap(), Value::Int(-1));
}

#[test]
fn test_wrong_wrapper_type_rejected() {
    let sum = import("point_sum", vec![point_ref()], spec::int(4));
    let pool = Pool::new().unwrap();
    let cell = gu_interop::HostType::cell(&spec::int(8)).alloc(&pool).unwrap();
    assert!(matches!(
        sum.call(&[cell.into()]),
        Err(MarshalError::TypeMismatch { .. })
    ));
}

// ===== Pool Lifetime Tests =====

#[test]
fn test_result_pins_pool() {
    let new_point = import("new_point", vec![pool_out(), spec::int(4), spec::int(4)], point_ref());
    let pool = Pool::new().unwrap();
    let origin = pool.origin();

    let p = new_point.call(&[pool.clone().into(), 1.into(), 2.into()]).unwrap();
    assert_eq!(pool.release(), Released::Deferred);
    assert!(!origin.is_released());

    let p = p.into_object().unwrap();
    assert_eq!(p.get("y").unwrap(), Value::Int(2));
    drop(p);
    assert!(origin.is_released());
}

#[test]
fn test_omitted_pool_uses_current() {
    let new_point = import("new_point", vec![pool_out(), spec::int(4), spec::int(4)], point_ref());
    let (pool, p) = Pool::scoped(|_| new_point.call(&[Value::None, 5.into(), 6.into()])).unwrap();
    let p = p.into_object().unwrap();
    assert!(p.origin().unwrap().is(&pool));
    assert!(p.home_pool().unwrap().ptr_eq(&pool));
}

#[test]
fn test_omitted_pool_without_current() {
    assert!(Pool::current().is_none());
    let new_point = import("new_point", vec![pool_out(), spec::int(4), spec::int(4)], point_ref());
    let p = new_point.call(&[Value::None, 7.into(), 8.into()]).unwrap();
    let p = p.into_object().unwrap();
    // The fresh pool is only reachable through the wrapper.
    let origin = p.origin().unwrap().clone();
    assert!(!origin.is_released());
    drop(p);
    assert!(origin.is_released());
}

#[test]
fn test_release_without_holders_is_immediate() {
    let pool = Pool::new().unwrap();
    let ty = point_type();
    let p = ty.alloc(&pool).unwrap();
    p.set("x", 42).unwrap();
    let weak = p.downgrade();

    assert_eq!(pool.release(), Released::Now);
    assert!(p.is_stale());
    assert!(matches!(p.get("x"), Err(MarshalError::UseAfterRelease(_))));
    assert!(matches!(p.set("y", 1), Err(MarshalError::UseAfterRelease(_))));

    drop(p);
    assert!(!weak.is_alive());
}

#[test]
fn test_string_field_write_stays_in_home_pool() {
    let ty = gu_interop::StructBuilder::new("Named")
        .field("id", 0, spec::int(4))
        .field("name", 8, spec::cstr())
        .build()
        .unwrap();
    let pool = Pool::new().unwrap();
    let obj = ty.alloc(&pool).unwrap();
    obj.set("id", 42).unwrap();
    obj.set("name", "x").unwrap();
    assert_eq!(obj.get("name").unwrap(), Value::Str("x".into()));

    assert_eq!(pool.release(), Released::Now);
    assert!(matches!(obj.get("id"), Err(MarshalError::UseAfterRelease(_))));
    assert!(matches!(obj.get("name"), Err(MarshalError::UseAfterRelease(_))));
}

#[test]
fn test_interned_wrapper_replaced_after_release() {
    let ty = point_type();
    let pool = Pool::new().unwrap();
    let old = ty.alloc(&pool).unwrap();
    let addr = old.address();
    assert_eq!(pool.release(), Released::Now);

    let fresh = intern(&ty, addr);
    assert!(!fresh.ptr_eq(&old));
    assert!(!fresh.is_stale());
}

#[test]
fn test_cross_pool_write_pins_source() {
    let ty = gu_interop::StructBuilder::new("Holder")
        .field("target", 0, point_ref())
        .build()
        .unwrap();
    let home = Pool::new().unwrap();
    let other = Pool::new().unwrap();
    let holder = ty.alloc(&home).unwrap();
    let target = point_type().alloc(&other).unwrap();
    target.set("x", 9).unwrap();

    holder.set("target", target.clone()).unwrap();
    drop(target);
    assert_eq!(other.release(), Released::Deferred);

    let back = holder.get("target").unwrap().into_object().unwrap();
    assert_eq!(back.get("x").unwrap(), Value::Int(9));
}

#[test]
fn test_dependency_argument_pins_result() {
    let identity = import("identity", vec![dependency(point_ref())], spec::reference(spec::int(4)));
    let pool = Pool::new().unwrap();
    let p = point_type().alloc(&pool).unwrap();
    p.set("x", 77).unwrap();

    let cell = identity.call(&[p.clone().into()]).unwrap().into_object().unwrap();
    let weak = p.downgrade();
    drop(p);
    // The result keeps its dependency argument alive.
    assert!(weak.is_alive());
    assert_eq!(cell.value().unwrap(), Value::Int(77));
    drop(cell);
    assert!(!weak.is_alive());
}

#[test]
fn test_reference_field_keeps_second_pool_alive() {
    let ty = gu_interop::StructBuilder::new("Link")
        .field("id", 0, spec::int(4))
        .field("target", 8, point_ref())
        .build()
        .unwrap();
    let first = Pool::new().unwrap();
    let second = Pool::new().unwrap();
    let holder = ty.alloc(&first).unwrap();
    holder.set("id", 1).unwrap();
    let target = point_type().alloc(&second).unwrap();
    target.set("x", 5).unwrap();
    target.set("y", 6).unwrap();

    holder.set("target", target.clone()).unwrap();
    let weak_target = target.downgrade();
    drop(target);
    assert_eq!(second.release(), Released::Deferred);

    let a = holder.get("target").unwrap().into_object().unwrap();
    let b = holder.get("target").unwrap().into_object().unwrap();
    assert!(a.ptr_eq(&b));
    assert!(weak_target.upgrade().unwrap().ptr_eq(&a));
    assert_eq!(a.get("y").unwrap(), Value::Int(6));
    drop(b);

    assert_eq!(first.release(), Released::Now);
    assert!(matches!(holder.get("id"), Err(MarshalError::UseAfterRelease(_))));
    assert!(matches!(holder.get("target"), Err(MarshalError::UseAfterRelease(_))));
    // The second pool outlives the first only through the holder's edge.
    assert_eq!(a.get("x").unwrap(), Value::Int(5));

    drop(holder);
    assert!(matches!(a.get("x"), Err(MarshalError::UseAfterRelease(_))));
}

fn node_type() -> gu_interop::HostType {
    static NODE: once_cell::sync::Lazy<gu_interop::HostType> = once_cell::sync::Lazy::new(|| {
        gu_interop::StructBuilder::new("Node")
            .field("v", 0, spec::int(4))
            .lazy_field("next", 8, || Ok(spec::reference(node_type().spec())))
            .build()
            .unwrap()
    });
    NODE.clone()
}

#[test]
fn test_same_pool_cycle_is_collected() {
    let pool = Pool::new().unwrap();
    let a = node_type().alloc(&pool).unwrap();
    let b = node_type().alloc(&pool).unwrap();
    a.set("v", 1).unwrap();
    b.set("v", 2).unwrap();
    a.set("next", b.clone()).unwrap();
    b.set("next", a.clone()).unwrap();

    let next = a.get("next").unwrap().into_object().unwrap();
    assert!(next.ptr_eq(&b));
    assert_eq!(next.get("v").unwrap(), Value::Int(2));
    drop(next);

    let (weak_a, weak_b) = (a.downgrade(), b.downgrade());
    drop(a);
    drop(b);
    assert!(!weak_a.is_alive());
    assert!(!weak_b.is_alive());
    assert_eq!(pool.release(), Released::Now);
}

#[test]
fn test_same_pool_reference_inherits_target_edges() {
    let ty = gu_interop::StructBuilder::new("Outer")
        .field("inner", 0, spec::reference(node_type().spec()))
        .build()
        .unwrap();
    let home = Pool::new().unwrap();
    let other = Pool::new().unwrap();
    let outer = ty.alloc(&home).unwrap();
    let inner = node_type().alloc(&home).unwrap();
    let far = node_type().alloc(&other).unwrap();
    far.set("v", 8).unwrap();
    inner.set("next", far.clone()).unwrap();

    outer.set("inner", inner.clone()).unwrap();
    drop(inner);
    drop(far);
    // `inner` is gone but its edge to the other pool moved to `outer`.
    assert_eq!(other.release(), Released::Deferred);
    let far = outer
        .get("inner")
        .unwrap()
        .into_object()
        .unwrap()
        .get("next")
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(far.get("v").unwrap(), Value::Int(8));
}

// ===== Context Tests =====

#[test]
fn test_explicit_context_pool() {
    let pool = Pool::new().unwrap();
    let mut ctx = CallContext::with_pool(Some(pool.clone()));
    assert!(ctx.pool().unwrap().ptr_eq(&pool));
    assert!(ctx.explicit_pool().is_some());
}

#[test]
fn test_shift_restores_previous_pool() {
    let outer = Pool::new().unwrap();
    let inner = Pool::new().unwrap();
    let _a = Pool::shift(Some(outer.clone()));
    {
        let _b = Pool::shift(Some(inner.clone()));
        assert!(Pool::current().unwrap().ptr_eq(&inner));
    }
    assert!(Pool::current().unwrap().ptr_eq(&outer));
}

// ===== Stats Tests =====

#[test]
fn test_stats_track_wrappers() {
    let pool = Pool::new().unwrap();
    let before = stats();
    assert!(before.live_pools >= 1);
    let objs: Vec<Object> = (0..8).map(|_| point_type().alloc(&pool).unwrap()).collect();
    assert!(stats().intern_entries >= objs.len());
    let addrs: Vec<Address> = objs.iter().map(Object::address).collect();
    drop(objs);
    for addr in addrs {
        assert!(gu_interop::intern::lookup(&point_type(), addr).is_none());
    }
    let _ = gu();
}
