//! Native library handles and symbol resolution
//!
//! A library is either a shared object opened with `dlopen` or an
//! in-process symbol table (such as the one `gu-runtime` exports). Function
//! imports apply the library's prefix; descriptor lookups do not.

use crate::address::Address;
use crate::error::Result;
use crate::func::{ForeignFn, Signature};
use core::ffi::c_void;
use core::ptr::NonNull;
use std::ffi::CString;
use std::fmt;
use std::path::Path;

/// Resolver for libraries linked into the process
pub type SymbolTable = fn(&str) -> Option<*const ()>;

enum Source {
    #[cfg(unix)]
    Dynamic(NonNull<c_void>),
    Table(SymbolTable),
}

/// Handle to a loaded native library
pub struct Library {
    name: String,
    prefix: String,
    source: Source,
}

impl Library {
    /// Load library by name, searching the standard library paths
    pub fn load(name: &str) -> std::result::Result<Self, LoadError> {
        Self::load_impl(name)
    }

    /// Load library from a path
    pub fn load_path(path: impl AsRef<Path>) -> std::result::Result<Self, LoadError> {
        let path = path.as_ref().to_str().ok_or(LoadError::InvalidName)?;
        Self::load_impl(path)
    }

    /// Wrap an in-process symbol table
    pub fn from_table(name: &str, table: SymbolTable) -> Self {
        Self {
            name: name.to_string(),
            prefix: String::new(),
            source: Source::Table(table),
        }
    }

    /// The runtime linked into this process
    pub fn builtin() -> Self {
        Self::from_table("gu-runtime", gu_runtime::lookup).with_prefix("gu_")
    }

    /// Prefix prepended to imported function names
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> std::result::Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL);
            NonNull::new(handle)
                .map(|h| Self {
                    name: name.to_string(),
                    prefix: String::new(),
                    source: Source::Dynamic(h),
                })
                .ok_or_else(|| {
                    let err = libc::dlerror();
                    let msg = if !err.is_null() {
                        std::ffi::CStr::from_ptr(err).to_string_lossy().into_owned()
                    } else {
                        "unknown error".into()
                    };
                    LoadError::LoadFailed(msg)
                })
        }
    }

    #[cfg(not(unix))]
    fn load_impl(name: &str) -> std::result::Result<Self, LoadError> {
        Err(LoadError::LoadFailed(format!("dynamic loading unsupported: {}", name)))
    }

    /// Address of the exact symbol `name`
    pub fn symbol(&self, name: &str) -> std::result::Result<Address, SymbolError> {
        let ptr = match &self.source {
            #[cfg(unix)]
            Source::Dynamic(handle) => {
                let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;
                unsafe { libc::dlsym(handle.as_ptr(), cname.as_ptr()) as *const () }
            }
            Source::Table(table) => table(name).unwrap_or(core::ptr::null()),
        };
        if ptr.is_null() {
            Err(SymbolError::NotFound(name.to_string()))
        } else {
            Ok(Address::from_ptr(ptr))
        }
    }

    /// Address of the function `name` after applying the prefix
    pub fn function(&self, name: &str) -> std::result::Result<Address, SymbolError> {
        self.symbol(&format!("{}{}", self.prefix, name))
    }

    /// Import the function `name` with the given signature.
    ///
    /// # Safety
    /// The native function must actually have the declared signature.
    pub unsafe fn import(&self, name: &str, signature: Signature) -> Result<ForeignFn> {
        let code = self.function(name)?;
        Ok(ForeignFn::new(format!("{}{}", self.prefix, name), code, signature))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Source::Dynamic(handle) = &self.source {
            unsafe {
                libc::dlclose(handle.as_ptr());
            }
        }
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Library loading errors
#[derive(Debug)]
pub enum LoadError {
    InvalidName,
    LoadFailed(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug)]
pub enum SymbolError {
    InvalidName,
    NotFound(String),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound(name) => write!(f, "Symbol not found: {}", name),
        }
    }
}

impl std::error::Error for SymbolError {}
