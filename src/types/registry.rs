//! Descriptor registry
//!
//! Maps native type-descriptor records to host types. A descriptor is
//! classified by walking its kind chain to the first kind with a binding;
//! the synthesized type is cached per descriptor address.

use super::{EnumBuilder, HostType, SeqType, StructBuilder, VariantBuilder};
use crate::address::Address;
use crate::error::{MarshalError, Result};
use crate::gu::{Gu, WeakGu};
use crate::library::Library;
use crate::logging::perf;
use crate::spec::{self, SpecRef};
use dashmap::DashMap;
use gu_runtime::types::{
    GuConstructor, GuEnumConstant, GuEnumType, GuKind, GuMember, GuPointerType, GuPrimType,
    GuSeqType, GuStructRepr, GuTypeAlias, GuTypeDef, GuVariantType,
};
use std::ffi::{c_char, CStr};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Struct,
    Variant,
    Seq,
    Enum,
    Pointer,
    TypeDef,
    Alias,
    Signed,
    Unsigned,
    Floating,
    Opaque,
}

const BINDINGS: &[(&str, Binding)] = &[
    ("struct", Binding::Struct),
    ("GuVariant", Binding::Variant),
    ("GuSeq", Binding::Seq),
    ("enum", Binding::Enum),
    ("reference", Binding::Pointer),
    ("pointer", Binding::Pointer),
    ("typedef", Binding::TypeDef),
    ("alias", Binding::Alias),
    ("signed", Binding::Signed),
    ("unsigned", Binding::Unsigned),
    ("GuFloating", Binding::Floating),
    ("GuOpaque", Binding::Opaque),
    ("abstract", Binding::Opaque),
];

unsafe fn c_name(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

pub struct TypeRegistry {
    kinds: Vec<(Address, Binding)>,
    types: DashMap<usize, HostType>,
    named: DashMap<String, Address>,
}

impl TypeRegistry {
    /// Resolve the kind records `library` exports; kinds it lacks stay unbound
    pub fn new(library: &Library) -> Self {
        let kinds = BINDINGS
            .iter()
            .filter_map(|(name, b)| match library.function(&format!("type__{}", name)) {
                Ok(addr) => Some((addr, *b)),
                Err(e) => {
                    debug!(kind = name, error = %e, "kind not exported");
                    None
                }
            })
            .collect();
        Self {
            kinds,
            types: DashMap::new(),
            named: DashMap::new(),
        }
    }

    fn binding_of(&self, desc: Address) -> Option<Binding> {
        let mut k = unsafe { (*desc.as_ptr::<GuKind>()).super_ };
        while !k.is_null() {
            let addr = Address::from_ptr(k);
            if let Some((_, b)) = self.kinds.iter().find(|(a, _)| *a == addr) {
                return Some(*b);
            }
            k = unsafe { (*k).super_ };
        }
        None
    }

    /// Descriptor exported as `type__<name>`
    pub fn descriptor(&self, library: &Library, name: &str) -> Result<Address> {
        if let Some(addr) = self.named.get(name) {
            return Ok(*addr);
        }
        let addr = library.function(&format!("type__{}", name))?;
        self.named.insert(name.to_string(), addr);
        Ok(addr)
    }

    /// Host type of the descriptor at `desc`.
    ///
    /// # Safety
    /// `desc` must point at a live descriptor record.
    pub unsafe fn host_type(&self, gu: &Gu, desc: Address, name: Option<&str>) -> Result<HostType> {
        if desc.is_null() {
            return Err(MarshalError::NullPointer("type descriptor".into()));
        }
        if let Some(t) = self.types.get(&desc.get()) {
            return Ok(t.clone());
        }
        let ty = self.synthesize(gu, desc, name)?;
        // Another thread may have won; keep the first type.
        Ok(self.types.entry(desc.get()).or_insert(ty).clone())
    }

    /// Spec of a member or payload typed by `desc`
    ///
    /// # Safety
    /// `desc` must be null or point at a live descriptor record.
    pub unsafe fn spec_for(&self, gu: &Gu, desc: Address) -> Result<SpecRef> {
        if desc.is_null() {
            return Ok(spec::address());
        }
        match self.binding_of(desc) {
            Some(Binding::Pointer) => {
                let pointed = (*desc.as_ptr::<GuPointerType>()).pointed_type;
                if pointed.is_null() {
                    return Ok(spec::address());
                }
                let inner = self.spec_for(gu, Address::from_ptr(pointed))?;
                Ok(spec::reference(inner))
            }
            _ => Ok(self.host_type(gu, desc, None)?.spec()),
        }
    }

    unsafe fn synthesize(&self, gu: &Gu, desc: Address, name: Option<&str>) -> Result<HostType> {
        let _perf = perf::track("type_synthesis");
        let binding = self.binding_of(desc).ok_or_else(|| {
            MarshalError::synthesis(name.unwrap_or("<anonymous>"), format!("no bound kind for descriptor {}", desc))
        })?;
        let fallback_name = || name.map(str::to_string).unwrap_or_else(|| format!("{:?}@{}", binding, desc));

        match binding {
            Binding::Struct => {
                let rec = &*desc.as_ptr::<GuStructRepr>();
                let ty_name = name.map(str::to_string).or_else(|| c_name(rec.name)).unwrap_or_else(fallback_name);
                let mut b = StructBuilder::new(ty_name)
                    .size(rec.repr_base.size)
                    .align(rec.repr_base.align.max(1));
                for m in rec.members.as_slice() {
                    b = self.member(gu, b, m)?;
                }
                b.build()
            }
            Binding::Variant => {
                let rec = &*desc.as_ptr::<GuVariantType>();
                let mut b = match name {
                    Some(n) => VariantBuilder::new(gu, n),
                    None => VariantBuilder::new(gu, fallback_name()).prefix(None),
                };
                for c in rec.ctors.as_slice() {
                    b = self.ctor(gu, b, c)?;
                }
                b.build()
            }
            Binding::Seq => {
                let rec = &*desc.as_ptr::<GuSeqType>();
                let elem = self.spec_for(gu, Address::from_ptr(rec.elem_type))?;
                Ok(SeqType::named(gu, elem, name))
            }
            Binding::Enum => {
                let rec = &*desc.as_ptr::<GuEnumType>();
                let mut b = match name {
                    Some(n) => EnumBuilder::new(n),
                    None => EnumBuilder::new(fallback_name()).prefix(None),
                }
                .size(rec.repr_base.size);
                for c in rec.constants.as_slice() {
                    b = constant(b, c);
                }
                b.build()
            }
            Binding::Pointer => Ok(HostType::cell(&self.spec_for(gu, desc)?)),
            Binding::TypeDef => {
                let rec = &*desc.as_ptr::<GuTypeDef>();
                let target_name = c_name(rec.name);
                self.host_type(gu, Address::from_ptr(rec.alias_base.ty), target_name.as_deref().or(name))
            }
            Binding::Alias => {
                let rec = &*desc.as_ptr::<GuTypeAlias>();
                self.host_type(gu, Address::from_ptr(rec.ty), name)
            }
            Binding::Signed | Binding::Unsigned | Binding::Floating => {
                let rec = &*desc.as_ptr::<GuPrimType>();
                let size = rec.repr_base.size;
                let width_error = || {
                    MarshalError::synthesis(
                        c_name(rec.name).unwrap_or_else(fallback_name),
                        format!("unsupported primitive width {}", size),
                    )
                };
                let spec = match binding {
                    Binding::Signed | Binding::Unsigned => {
                        spec::integer(size, binding == Binding::Signed).map_err(|_| width_error())?
                    }
                    Binding::Floating if matches!(size, 4 | 8) => spec::float(size),
                    _ => return Err(width_error()),
                };
                Ok(HostType::cell(&spec))
            }
            Binding::Opaque => Ok(HostType::opaque(fallback_name())),
        }
    }

    unsafe fn member(&self, gu: &Gu, b: StructBuilder, m: &GuMember) -> Result<StructBuilder> {
        let name = c_name(m.name).unwrap_or_default();
        if m.offset < 0 {
            return Err(MarshalError::synthesis(&name, format!("negative offset {}", m.offset)));
        }
        let weak = gu.downgrade();
        let desc = Address::from_ptr(m.ty);
        Ok(b.lazy_field(name, m.offset as usize, move || resolve(&weak, desc)))
    }

    unsafe fn ctor(&self, gu: &Gu, b: VariantBuilder, c: &GuConstructor) -> Result<VariantBuilder> {
        let name = c_name(c.c_name).unwrap_or_default();
        let weak = gu.downgrade();
        let desc = Address::from_ptr(c.ty);
        if desc.is_null() {
            return Ok(b.ctor(c.c_tag, &name, None));
        }
        Ok(b.lazy_ctor(c.c_tag, &name, move || resolve(&weak, desc).map(Some)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

unsafe fn constant(b: EnumBuilder, c: &GuEnumConstant) -> EnumBuilder {
    let name = c_name(c.name).unwrap_or_default();
    b.constant(&name, c.value)
}

fn resolve(weak: &WeakGu, desc: Address) -> Result<SpecRef> {
    let gu = weak
        .upgrade()
        .ok_or_else(|| MarshalError::synthesis(desc.to_string(), "library binding was dropped"))?;
    unsafe { gu.registry().spec_for(&gu, desc) }
}
