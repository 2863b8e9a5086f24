//! Variadic call adapter
//!
//! Hands a parameter list to a variadic routine. Everything that can be
//! checked on this side (word count, slot kinds) is checked before native
//! code runs; the one real variadic call happens in the C trampoline
//! `ydbvp_call_plist`, which switches on `n` and calls the target with
//! exactly `n` word-sized arguments.
//!
//! Architecture:
//! - `native.rs` - trampoline bindings and `NativeRoutine`
//! - `library.rs` - resolving routines with `dlopen`/`dlsym`

#[cfg(unix)]
mod library;
mod native;

#[cfg(unix)]
pub use library::{Library, LoadError, SymbolError};
pub use native::{ydbvp_max_params, NativeFn, NativeRoutine, YDBVP_ERR_PLIST};

use core::ffi::c_int;
use core::fmt;

use crate::abi::CallingConvention;
use crate::logging::{log_ffi_call, log_ffi_error, log_ffi_return};
use crate::plist::{ParamKind, ParamList, PlistError, RawHandle, MAX_VPARAMS};
use crate::signature::{Arity, CallSignature};

/// A routine paired with the signature it reads its arguments by
#[derive(Debug, Clone, Copy)]
pub struct VariadicCall<'s> {
    routine: NativeRoutine,
    signature: &'s CallSignature,
}

impl<'s> VariadicCall<'s> {
    #[inline]
    pub const fn new(routine: NativeRoutine, signature: &'s CallSignature) -> Self {
        Self { routine, signature }
    }

    #[inline]
    pub fn routine(&self) -> NativeRoutine {
        self.routine
    }

    #[inline]
    pub fn signature(&self) -> &'s CallSignature {
        self.signature
    }

    /// Call the routine with the contents of `plist`
    ///
    /// Returns the routine's status. Slot count and kinds are checked against
    /// the signature first; no native code runs when they disagree.
    ///
    /// # Safety
    /// Caller must ensure:
    /// - The routine really reads the kinds its signature lists
    /// - Every descriptor or pointer in `plist` is still alive
    pub unsafe fn invoke(&self, plist: &ParamList) -> Result<c_int, CallError> {
        let kinds = plist.kinds();
        if !self.signature.arity_matches(kinds.len()) {
            return Err(self.reject(CallError::CountMismatch {
                routine: self.signature.name().to_string(),
                expected: self.signature.arity(),
                got: kinds.len(),
            }));
        }
        if let Some((position, expected, found)) = self.signature.first_mismatch(kinds) {
            return Err(self.reject(CallError::SignatureMismatch {
                routine: self.signature.name().to_string(),
                position,
                expected,
                found,
            }));
        }
        self.invoke_raw(plist.len(), plist.as_raw())
    }

    /// Call the routine with a list known only by its handle
    ///
    /// `arg_count` is the number of words the caller believes the list holds.
    /// It must equal `handle.count` and be a word count the signature can
    /// produce; otherwise the list is not read at all.
    ///
    /// # Safety
    /// Same as [`invoke`](Self::invoke), and `handle` must point to a live
    /// list whose native `n` equals `handle.count`.
    pub unsafe fn invoke_raw(&self, arg_count: usize, handle: RawHandle) -> Result<c_int, CallError> {
        let name = self.signature.name();
        if arg_count != handle.count
            || arg_count > MAX_VPARAMS
            || !self.signature.accepts_words(arg_count, CallingConvention::default())
        {
            return Err(self.reject(CallError::CountMismatch {
                routine: name.to_string(),
                expected: self.signature.arity(),
                got: arg_count,
            }));
        }
        if handle.ptr.is_null() {
            return Err(self.reject(CallError::Rejected { routine: name.to_string() }));
        }

        log_ffi_call(name, arg_count);
        let status = native::ydbvp_call_plist(self.routine.as_fn(), handle.ptr);
        log_ffi_return(name, status);

        if status == YDBVP_ERR_PLIST {
            return Err(CallError::Rejected { routine: name.to_string() });
        }
        Ok(status)
    }

    fn reject(&self, err: CallError) -> CallError {
        log_ffi_error(self.signature.name(), &err.to_string());
        err
    }
}

/// Function call errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// List length does not fit the routine's signature
    CountMismatch { routine: String, expected: Arity, got: usize },
    /// Slot kind differs from what the routine reads at that position
    SignatureMismatch {
        routine: String,
        position: usize,
        expected: ParamKind,
        found: ParamKind,
    },
    /// The trampoline refused the list
    Rejected { routine: String },
    Plist(PlistError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { routine, expected, got } => {
                write!(f, "{}: expected {} arguments, got {}", routine, expected, got)
            }
            Self::SignatureMismatch { routine, position, expected, found } => write!(
                f,
                "{}: argument {} should be {} but is {}",
                routine, position, expected, found
            ),
            Self::Rejected { routine } => {
                write!(f, "{}: parameter list rejected by trampoline", routine)
            }
            Self::Plist(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Plist(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PlistError> for CallError {
    fn from(err: PlistError) -> Self {
        Self::Plist(err)
    }
}

#[cfg(test)]
mod tests;
