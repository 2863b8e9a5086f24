//! Resolving engine entry points at run time
//!
//! Thin wrapper around `dlopen`/`dlsym` so the adapter can be pointed at
//! `libyottadb.so` (or any library exporting variadic routines).

use core::ffi::{c_char, c_void, CStr};
use core::fmt;
use core::ptr::NonNull;
use std::ffi::CString;

use super::native::NativeRoutine;
use crate::logging::debug;

/// Handle to a dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
}

impl Library {
    /// Load library by name, searching the standard library paths
    pub fn load(name: &str) -> Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;
        let handle = unsafe { libc::dlopen(cname.as_ptr(), libc::RTLD_NOW) };
        let handle = NonNull::new(handle).ok_or_else(|| LoadError::LoadFailed(last_dl_error()))?;
        debug!(target: "ydb_varargs::ffi", library = name, "library loaded");
        Ok(Self { handle })
    }

    /// The running executable and everything already linked into it
    pub fn this_process() -> Result<Self, LoadError> {
        let handle = unsafe { libc::dlopen(core::ptr::null(), libc::RTLD_NOW) };
        NonNull::new(handle)
            .map(|handle| Self { handle })
            .ok_or_else(|| LoadError::LoadFailed(last_dl_error()))
    }

    /// Resolve a variadic routine by symbol name
    ///
    /// # Safety
    /// The symbol must name a C function taking word-sized arguments, as
    /// required by `NativeRoutine::from_ptr`.
    pub unsafe fn routine(&self, name: &str) -> Result<NativeRoutine, SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;
        let ptr = libc::dlsym(self.handle.as_ptr(), cname.as_ptr());
        NativeRoutine::from_ptr(ptr).ok_or_else(|| SymbolError::NotFound(name.to_string()))
    }
}

fn last_dl_error() -> String {
    let err: *const c_char = unsafe { libc::dlerror() };
    if err.is_null() {
        "Unknown error".into()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Library({:p})", self.handle.as_ptr())
    }
}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
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
#[derive(Debug, Clone, PartialEq, Eq)]
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
