//! Variant types
//!
//! A variant value is one machine word: null for the absent variant,
//! otherwise a pointer to the payload in a pool with the constructor tag in
//! the low bits or in the byte before the payload. The runtime owns the
//! encoding; this side only goes through its functions.

use super::naming::{pp_prefix, strip_prefix};
use super::{HostType, Shape};
use crate::address::Address;
use crate::deps;
use crate::error::{MarshalError, Result};
use crate::gu::Gu;
use crate::native::{NativeLayout, NativeValue};
use crate::object::Object;
use crate::pool::Pool;
use crate::spec::{CallContext, Spec, SpecRef};
use crate::value::Value;
use once_cell::sync::OnceCell;

type PayloadResolver = Box<dyn Fn() -> Result<Option<SpecRef>> + Send + Sync>;

pub struct Constructor {
    tag: i32,
    name: String,
    /// `None` for constructors without payload
    spec: OnceCell<Option<SpecRef>>,
    resolve: Option<PayloadResolver>,
    /// Owning type name and payload capacity, filled in by `build`
    owner: String,
    capacity: Option<usize>,
}

impl Constructor {
    pub fn tag(&self) -> i32 {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload spec, resolving it on first use
    ///
    /// A resolved payload larger than the type's capacity is a synthesis
    /// error and is never cached.
    pub fn spec(&self) -> Result<Option<SpecRef>> {
        self.spec
            .get_or_try_init(|| {
                let spec = match &self.resolve {
                    Some(resolve) => resolve()?,
                    None => None,
                };
                self.check_capacity(spec.as_ref())?;
                Ok(spec)
            })
            .cloned()
    }

    fn check_capacity(&self, spec: Option<&SpecRef>) -> Result<()> {
        let (Some(cap), Some(spec)) = (self.capacity, spec) else {
            return Ok(());
        };
        let size = spec.layout().size;
        if size > cap {
            return Err(MarshalError::synthesis(
                &self.owner,
                format!("payload of `{}` needs {} bytes, capacity is {}", self.name, size, cap),
            ));
        }
        Ok(())
    }
}

pub struct VariantType {
    gu: Gu,
    capacity: Option<usize>,
    ctors: Vec<Constructor>,
}

impl VariantType {
    /// Largest payload the native side reserves, when declared
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.ctors
    }

    pub fn constructor(&self, ty_name: &str, name: &str) -> Result<&Constructor> {
        self.ctors
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MarshalError::UnknownConstructor {
                ty: ty_name.to_string(),
                name: name.to_string(),
            })
    }

    pub(crate) fn ctor_for_word(&self, ty_name: &str, word: usize) -> Result<&Constructor> {
        let tag = self.gu.variant_tag(word)?;
        self.ctors
            .iter()
            .find(|c| c.tag == tag)
            .ok_or_else(|| MarshalError::UnknownConstructor {
                ty: ty_name.to_string(),
                name: format!("#{}", tag),
            })
    }

    pub(crate) fn read_payload(&self, ty_name: &str, word: usize) -> Result<Value> {
        let ctor = self.ctor_for_word(ty_name, word)?;
        match ctor.spec()? {
            Some(spec) => {
                let data = self.gu.variant_data(word)?;
                unsafe { spec.read(data) }
            }
            None => Ok(Value::None),
        }
    }

    /// New variant `ctor(payload)`, allocated in `pool` (or the current pool).
    ///
    /// The payload is validated against the constructor's spec first. The
    /// result is a detached word that pins the pool holding its payload.
    pub fn make(
        ty: &HostType,
        ctor: &str,
        payload: impl Into<Value>,
        pool: Option<&Pool>,
    ) -> Result<Object> {
        let Shape::Variant(vt) = ty.shape() else {
            return Err(MarshalError::TypeMismatch {
                expected: "variant type".into(),
                found: ty.name().to_string(),
            });
        };
        let c = vt.constructor(ty.name(), ctor)?;
        let payload = payload.into();
        let mut ctx = CallContext::with_pool(pool.cloned());
        let native = match c.spec()? {
            Some(spec) => spec.to_native(&payload, &mut ctx)?,
            None if payload.is_none() => NativeValue::void(),
            None => return Err(MarshalError::mismatch("no payload", &payload)),
        };
        let pool = ctx.pool()?;
        let layout = native.layout();
        let init = if layout.size == 0 {
            Address::NULL
        } else {
            Address::from_ptr(native.as_ptr())
        };
        let word = vt
            .gu
            .make_variant(c.tag as u8, layout.size, layout.align, init, pool.address())?;
        if word == 0 {
            return Err(MarshalError::ResourceExhausted(format!("variant {}", ty.name())));
        }
        let obj = Object::detached(ty.clone(), &NativeValue::from_u64(NativeLayout::USIZE, word as u64));
        obj.adopt_origin(&pool.origin());
        deps::add_deps(&obj, ctx.take_all_pins());
        Ok(obj)
    }
}

pub struct VariantBuilder {
    gu: Gu,
    name: String,
    prefix: Option<String>,
    capacity: Option<usize>,
    ctors: Vec<Constructor>,
}

impl VariantBuilder {
    /// Constructor names lose the `pp_prefix` of `name`
    pub fn new(gu: &Gu, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            gu: gu.clone(),
            prefix: Some(pp_prefix(&name)),
            name,
            capacity: None,
            ctors: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_string);
        self
    }

    pub fn ctor(mut self, tag: i32, name: &str, spec: Option<SpecRef>) -> Self {
        let name = strip_prefix(name, self.prefix.as_deref()).to_string();
        self.ctors.push(Constructor {
            tag,
            name,
            spec: OnceCell::with_value(spec),
            resolve: None,
            owner: String::new(),
            capacity: None,
        });
        self
    }

    /// Constructor whose payload spec is produced by `resolve` on first use
    pub fn lazy_ctor(
        mut self,
        tag: i32,
        name: &str,
        resolve: impl Fn() -> Result<Option<SpecRef>> + Send + Sync + 'static,
    ) -> Self {
        let name = strip_prefix(name, self.prefix.as_deref()).to_string();
        self.ctors.push(Constructor {
            tag,
            name,
            spec: OnceCell::new(),
            resolve: Some(Box::new(resolve)),
            owner: String::new(),
            capacity: None,
        });
        self
    }

    /// Largest payload the native side reserves for this type
    pub fn capacity(mut self, size: usize) -> Self {
        self.capacity = Some(size);
        self
    }

    pub fn build(mut self) -> Result<HostType> {
        for c in &mut self.ctors {
            c.owner = self.name.clone();
            c.capacity = self.capacity;
        }
        for c in &self.ctors {
            if !(0..=u8::MAX as i32).contains(&c.tag) {
                return Err(MarshalError::synthesis(&self.name, format!("tag {} of `{}` out of range", c.tag, c.name)));
            }
            if self.ctors.iter().filter(|o| o.tag == c.tag).count() > 1 {
                return Err(MarshalError::synthesis(&self.name, format!("duplicate tag {}", c.tag)));
            }
            // Lazy payloads are checked when they resolve.
            if let Some(spec) = c.spec.get() {
                c.check_capacity(spec.as_ref())?;
            }
        }
        Ok(HostType::new(
            self.name,
            Shape::Variant(VariantType {
                gu: self.gu,
                capacity: self.capacity,
                ctors: self.ctors,
            }),
        ))
    }
}

/// Variant word; null is the absent value
#[derive(Debug)]
pub struct VariantSpec {
    ty: HostType,
}

impl VariantSpec {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }
}

impl Spec for VariantSpec {
    fn layout(&self) -> NativeLayout {
        NativeLayout::USIZE
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn host_type(&self) -> Option<HostType> {
        Some(self.ty.clone())
    }

    fn to_host(&self, native: &NativeValue) -> Result<Value> {
        if native.is_zero() {
            return Ok(Value::None);
        }
        Ok(Value::Object(Object::detached(self.ty.clone(), native)))
    }

    fn to_native(&self, host: &Value, ctx: &mut CallContext) -> Result<NativeValue> {
        if host.is_none() {
            return Ok(NativeValue::zeroed(NativeLayout::USIZE));
        }
        let obj = self.ty.expect_instance(host)?;
        ctx.pin_object(obj);
        Ok(unsafe { NativeValue::load(obj.address(), NativeLayout::USIZE) })
    }
}
