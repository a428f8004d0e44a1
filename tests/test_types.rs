mod common;

use common::{gu, import};
use gu_interop::spec;
use gu_interop::types::{EnumBuilder, SeqType, VariantBuilder, VariantType};
use gu_interop::{Address, HostType, MarshalError, Pool, Released, Shape, Value};
use gu_runtime::cstr;
use gu_runtime::types::*;

// ===== Variant Tests =====

fn shape_type() -> HostType {
    VariantBuilder::new(&gu(), "Shape")
        .ctor(0, "SHAPE_CIRCLE", Some(spec::float(8)))
        .ctor(1, "SHAPE_SQUARE", Some(spec::int(4)))
        .ctor(2, "SHAPE_EMPTY", None)
        .ctor(42, "SHAPE_FAR", Some(spec::int(8)))
        .build()
        .unwrap()
}

#[test]
fn test_variant_round_trip() {
    let ty = shape_type();
    let pool = Pool::new().unwrap();

    let circle = VariantType::make(&ty, "CIRCLE", 2.5, Some(&pool)).unwrap();
    assert_eq!(circle.tag().unwrap(), "CIRCLE");
    assert_eq!(circle.payload().unwrap(), Value::Float(2.5));

    let far = VariantType::make(&ty, "FAR", -9i64, Some(&pool)).unwrap();
    assert_eq!(far.tag().unwrap(), "FAR");
    assert_eq!(far.payload().unwrap(), Value::Int(-9));

    let empty = VariantType::make(&ty, "EMPTY", Value::None, Some(&pool)).unwrap();
    assert_eq!(empty.tag().unwrap(), "EMPTY");
    assert_eq!(empty.payload().unwrap(), Value::None);
}

#[test]
fn test_variant_validates_payload() {
    let ty = shape_type();
    let pool = Pool::new().unwrap();
    assert!(matches!(
        VariantType::make(&ty, "SQUARE", "wide", Some(&pool)),
        Err(MarshalError::TypeMismatch { .. })
    ));
    assert!(matches!(
        VariantType::make(&ty, "EMPTY", 1, Some(&pool)),
        Err(MarshalError::TypeMismatch { .. })
    ));
    assert!(matches!(
        VariantType::make(&ty, "TRIANGLE", 1, Some(&pool)),
        Err(MarshalError::UnknownConstructor { .. })
    ));
}

#[test]
fn test_variant_pins_its_pool() {
    let ty = shape_type();
    let pool = Pool::new().unwrap();
    let square = VariantType::make(&ty, "SQUARE", 7, Some(&pool)).unwrap();
    assert_eq!(pool.release(), Released::Deferred);
    assert_eq!(square.payload().unwrap(), Value::Int(7));
}

#[test]
fn test_variant_builder_rejects_bad_tags() {
    let dup = VariantBuilder::new(&gu(), "Dup")
        .ctor(1, "A", None)
        .ctor(1, "B", None)
        .build();
    assert!(matches!(dup, Err(MarshalError::Synthesis { .. })));

    let wide = VariantBuilder::new(&gu(), "Wide").ctor(256, "A", None).build();
    assert!(matches!(wide, Err(MarshalError::Synthesis { .. })));
}

#[test]
fn test_variant_capacity_checks_eager_payloads() {
    let small = VariantBuilder::new(&gu(), "Small")
        .capacity(4)
        .ctor(0, "SMALL_BIG", Some(spec::int(8)))
        .build();
    assert!(matches!(small, Err(MarshalError::Synthesis { .. })));
}

#[test]
fn test_variant_capacity_checks_lazy_payloads() {
    let ty = VariantBuilder::new(&gu(), "Small")
        .capacity(4)
        .lazy_ctor(0, "SMALL_BIG", || Ok(Some(spec::int(8))))
        .lazy_ctor(1, "SMALL_FIT", || Ok(Some(spec::int(4))))
        .build()
        .unwrap();
    let Shape::Variant(vt) = ty.shape() else {
        panic!("expected a variant shape");
    };
    assert_eq!(vt.capacity(), Some(4));

    let pool = Pool::new().unwrap();
    assert!(matches!(
        VariantType::make(&ty, "BIG", 1i64 << 40, Some(&pool)),
        Err(MarshalError::Synthesis { .. })
    ));
    let big = vt.constructor(ty.name(), "BIG").unwrap();
    assert!(matches!(big.spec(), Err(MarshalError::Synthesis { .. })));

    let fit = VariantType::make(&ty, "FIT", 7, Some(&pool)).unwrap();
    assert_eq!(fit.tag().unwrap(), "FIT");
    assert_eq!(fit.payload().unwrap(), Value::Int(7));
}

// ===== Sequence Tests =====

#[test]
fn test_sequence_bounds() {
    let ty = SeqType::of(&gu(), spec::int(4));
    let pool = Pool::new().unwrap();
    let seq = SeqType::from_list(&ty, &[1.into(), 2.into(), 3.into()], &pool).unwrap();

    assert_eq!(seq.len().unwrap(), 3);
    assert_eq!(seq.index(2).unwrap(), Value::Int(3));
    assert!(matches!(seq.index(3), Err(MarshalError::Bounds { index: 3, len: 3 })));
    assert!(matches!(seq.index(-1), Err(MarshalError::Bounds { index: -1, .. })));
    assert!(matches!(seq.set_index(3, 0), Err(MarshalError::Bounds { .. })));

    seq.set_index(0, 10).unwrap();
    assert_eq!(seq.to_host_list().unwrap(), vec![Value::Int(10), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_sequence_types_are_memoized() {
    let a = SeqType::of(&gu(), spec::int(4));
    let b = SeqType::of(&gu(), spec::int(4));
    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&SeqType::of(&gu(), spec::int(8))));
}

#[test]
fn test_list_argument_materialized() {
    let ty = SeqType::of(&gu(), spec::int(4));
    let sum = import("seq_sum", vec![ty.spec()], spec::int(8));
    let list = Value::List(vec![4.into(), 5.into(), 6.into()]);
    let (_pool, total) = Pool::scoped(|_| sum.call(&[list])).unwrap();
    assert_eq!(total, Value::Int(15));
    assert_eq!(sum.call(&[Value::None]).unwrap(), Value::Int(-1));
}

// ===== Enum Tests =====

#[test]
fn test_enum_constants() {
    let ty = EnumBuilder::new("ColorMode")
        .constant("COLOR_MODE_RGB", 0)
        .constant("COLOR_MODE_CMYK", 1)
        .build()
        .unwrap();
    let e = ty.as_enum().unwrap();
    assert_eq!(e.value_of("CMYK"), Some(1));
    assert_eq!(e.name_of(0), Some("RGB"));

    let pool = Pool::new().unwrap();
    let cell = ty.alloc(&pool).unwrap();
    cell.set_value("CMYK").unwrap();
    assert_eq!(cell.value().unwrap(), Value::Int(1));
    assert!(matches!(
        cell.set_value("HSV"),
        Err(MarshalError::UnknownConstructor { .. })
    ));
}

#[test]
fn test_enum_signedness_follows_constants() {
    let ty = EnumBuilder::new("Sign").size(1).constant("NEG", -1).build().unwrap();
    let pool = Pool::new().unwrap();
    let cell = ty.alloc(&pool).unwrap();
    cell.set_value(-1).unwrap();
    assert_eq!(cell.value().unwrap(), Value::Int(-1));

    let bad = EnumBuilder::new("Tiny").size(1).constant("BIG", 300).build();
    assert!(matches!(bad, Err(MarshalError::Synthesis { .. })));
}

// ===== Struct Tests =====

#[test]
fn test_struct_builder_validation() {
    let dup = gu_interop::StructBuilder::new("Dup")
        .field("a", 0, spec::int(4))
        .field("a", 4, spec::int(4))
        .build();
    assert!(matches!(dup, Err(MarshalError::Synthesis { .. })));

    let short = gu_interop::StructBuilder::new("Short")
        .field("a", 0, spec::int(8))
        .size(4)
        .build();
    assert!(matches!(short, Err(MarshalError::Synthesis { .. })));
}

#[test]
fn test_struct_alignment_is_capped() {
    let wide = gu_interop::StructBuilder::new("Wide")
        .field("a", 0, spec::int(8))
        .align(gu_interop::MAX_ALIGN)
        .build()
        .unwrap();
    assert_eq!(wide.layout().align, gu_interop::MAX_ALIGN);

    let over = gu_interop::StructBuilder::new("Over")
        .field("a", 0, spec::int(8))
        .align(2 * gu_interop::MAX_ALIGN)
        .build();
    assert!(matches!(over, Err(MarshalError::Synthesis { ref ty, .. }) if ty == "Over"));
}

#[test]
fn test_unknown_field() {
    let ty = gu_interop::StructBuilder::new("One").field("a", 0, spec::int(4)).build().unwrap();
    let pool = Pool::new().unwrap();
    let obj = ty.alloc(&pool).unwrap();
    assert!(matches!(obj.get("b"), Err(MarshalError::UnknownField { .. })));
    assert!(matches!(obj.tag(), Err(MarshalError::TypeMismatch { .. })));
}

#[test]
fn test_embedded_struct_is_a_view() {
    let inner = gu_interop::StructBuilder::new("Inner").field("v", 0, spec::int(4)).build().unwrap();
    let outer = gu_interop::StructBuilder::new("Outer")
        .field("tag", 0, spec::int(4))
        .field("inner", 4, inner.spec())
        .build()
        .unwrap();
    let pool = Pool::new().unwrap();
    let obj = outer.alloc(&pool).unwrap();
    let view = obj.get("inner").unwrap().into_object().unwrap();
    view.set("v", 5).unwrap();
    assert_eq!(view.address(), obj.address().add(4));
    let again = obj.get("inner").unwrap().into_object().unwrap();
    assert!(again.ptr_eq(&view));
    assert_eq!(again.get("v").unwrap(), Value::Int(5));
}

#[test]
fn test_pun_shares_prerequisites() {
    let ty = gu_interop::StructBuilder::new("Pair")
        .field("a", 0, spec::int(4))
        .field("b", 4, spec::int(4))
        .build()
        .unwrap();
    let pool = Pool::new().unwrap();
    let obj = ty.alloc(&pool).unwrap();
    obj.set("a", 3).unwrap();
    let cell = obj.pun(&HostType::cell(&spec::int(4))).unwrap();
    assert_eq!(cell.address(), obj.address());
    assert_eq!(cell.value().unwrap(), Value::Int(3));
    assert!(obj.pun(&ty).unwrap().ptr_eq(&obj));
}

// ===== Descriptor Tests =====

macro_rules! ty_of {
    ($record:expr) => {
        &$record as *const _ as *const GuType
    };
}

static VEC2_MEMBERS: [GuMember; 2] = [
    GuMember { offset: 0, name: cstr!("dx"), ty: ty_of!(gu_type__int32_t), is_flex: false },
    GuMember { offset: 8, name: cstr!("scale"), ty: ty_of!(gu_type__double), is_flex: false },
];

static VEC2: GuStructRepr = GuStructRepr {
    repr_base: GuTypeRepr::new(&gu_type__struct, 16, 8),
    name: cstr!("Vec2"),
    members: GuSList::of(&VEC2_MEMBERS),
};

static VEC2_ALIAS: GuTypeDef = GuTypeDef {
    alias_base: GuTypeAlias { type_base: GuType::of_kind(&gu_type__typedef), ty: ty_of!(VEC2) },
    name: cstr!("Vec2"),
};

static NODE_PTR: GuPointerType = GuPointerType {
    repr_base: GuTypeRepr::new(&gu_type__pointer, core::mem::size_of::<usize>(), core::mem::align_of::<usize>()),
    pointed_type: ty_of!(NODE),
};

static NODE_MEMBERS: [GuMember; 2] = [
    GuMember { offset: 0, name: cstr!("value"), ty: ty_of!(gu_type__int64_t), is_flex: false },
    GuMember { offset: 8, name: cstr!("next"), ty: ty_of!(NODE_PTR), is_flex: false },
];

static NODE: GuStructRepr = GuStructRepr {
    repr_base: GuTypeRepr::new(&gu_type__struct, 16, 8),
    name: cstr!("Node"),
    members: GuSList::of(&NODE_MEMBERS),
};

static EXPR_CTORS: [GuConstructor; 2] = [
    GuConstructor { c_tag: 0, c_name: cstr!("EXPR_LIT"), ty: ty_of!(gu_type__int32_t) },
    GuConstructor { c_tag: 1, c_name: cstr!("EXPR_NEG"), ty: ty_of!(EXPR) },
];

static EXPR: GuVariantType = GuVariantType {
    repr_base: GuTypeRepr::new(&gu_type__GuVariant, core::mem::size_of::<usize>(), core::mem::align_of::<usize>()),
    ctors: GuSList::of(&EXPR_CTORS),
};

static MODE_CONSTANTS: [GuEnumConstant; 2] = [
    GuEnumConstant { name: cstr!("MODE_FAST"), value: 0, enum_value: core::ptr::null() },
    GuEnumConstant { name: cstr!("MODE_SAFE"), value: 1, enum_value: core::ptr::null() },
];

static MODE: GuEnumType = GuEnumType {
    repr_base: GuTypeRepr::new(&gu_type__enum, 4, 4),
    constants: GuSList::of(&MODE_CONSTANTS),
};

static INT24: GuPrimType = GuPrimType {
    repr_base: GuTypeRepr::new(&gu_type__signed, 3, 1),
    name: cstr!("int24_t"),
};

fn desc<T>(record: &'static T) -> Address {
    Address::from_ptr(record as *const T)
}

#[test]
fn test_struct_from_descriptor() {
    let gu = gu();
    let ty = unsafe { gu.host_type(desc(&VEC2)) }.unwrap();
    assert_eq!(ty.name(), "Vec2");
    assert_eq!(ty.layout().size, 16);
    assert!(matches!(ty.shape(), Shape::Struct(_)));

    let pool = Pool::new().unwrap();
    let v = ty.alloc(&pool).unwrap();
    v.set("dx", -3).unwrap();
    v.set("scale", 0.5).unwrap();
    assert_eq!(v.get("dx").unwrap(), Value::Int(-3));
    assert_eq!(v.get("scale").unwrap(), Value::Float(0.5));

    let again = unsafe { gu.host_type(desc(&VEC2)) }.unwrap();
    assert!(again.ptr_eq(&ty));
    let aliased = unsafe { gu.host_type(desc(&VEC2_ALIAS)) }.unwrap();
    assert!(aliased.ptr_eq(&ty));
}

#[test]
fn test_recursive_struct_from_descriptor() {
    let gu = gu();
    let ty = unsafe { gu.host_type(desc(&NODE)) }.unwrap();
    let pool = Pool::new().unwrap();
    let head = ty.alloc(&pool).unwrap();
    let tail = ty.alloc(&pool).unwrap();
    head.set("value", 1).unwrap();
    tail.set("value", 2).unwrap();
    head.set("next", tail.clone()).unwrap();

    let next = head.get("next").unwrap().into_object().unwrap();
    assert!(next.ptr_eq(&tail));
    assert_eq!(next.get("value").unwrap(), Value::Int(2));
    assert_eq!(tail.get("next").unwrap(), Value::None);
}

#[test]
fn test_recursive_variant_from_descriptor() {
    let gu = gu();
    let ty = unsafe { gu.host_type(desc(&EXPR)) }.unwrap();
    let pool = Pool::new().unwrap();
    let lit = VariantType::make(&ty, "EXPR_LIT", 8, Some(&pool)).unwrap();
    let neg = VariantType::make(&ty, "EXPR_NEG", lit.clone(), Some(&pool)).unwrap();

    assert_eq!(neg.tag().unwrap(), "EXPR_NEG");
    let inner = neg.payload().unwrap().into_object().unwrap();
    assert_eq!(inner.tag().unwrap(), "EXPR_LIT");
    assert_eq!(inner.payload().unwrap(), Value::Int(8));
}

#[test]
fn test_enum_from_descriptor() {
    let gu = gu();
    let ty = unsafe { gu.host_type(desc(&MODE)) }.unwrap();
    let e = ty.as_enum().unwrap();
    assert_eq!(e.value_of("MODE_SAFE"), Some(1));
    assert_eq!(ty.layout().size, 4);
}

#[test]
fn test_odd_primitive_width_is_synthesis_error() {
    let gu = gu();
    let err = unsafe { gu.host_type(desc(&INT24)) }.unwrap_err();
    assert!(matches!(err, MarshalError::Synthesis { ref ty, .. } if ty == "int24_t"));
}

#[test]
fn test_named_runtime_types() {
    let gu = gu();
    let int = gu.type_named("int").unwrap();
    assert!(matches!(int.shape(), Shape::Cell(_)));
    assert_eq!(int.layout().size, 4);

    let bytes = gu.type_named("GuByteSeq").unwrap();
    assert!(bytes.as_seq().is_some());
    assert_eq!(bytes.as_seq().unwrap().stride(), 1);

    assert!(gu.type_named("no_such_type").is_err());
    assert!(gu.type_count() >= 2);
}
