//! Native side of the call adapter (`csrc/vplist.c`)

use core::ffi::{c_int, c_void};
use core::fmt;

use crate::plist::RawPlist;

/// Shape every variadic target is called through: a leading word followed
/// by up to `MAX_VPARAMS - 1` more
pub type NativeFn = unsafe extern "C" fn(usize, ...) -> c_int;

/// Status the trampoline returns when it refuses a list without calling the target
pub const YDBVP_ERR_PLIST: c_int = -0x7fff_fff0;

extern "C" {
    /// Expand `plist` into a real variadic call of `func`
    pub fn ydbvp_call_plist(func: NativeFn, plist: *const RawPlist) -> c_int;

    /// `MAX_VPARAMS` as compiled into the trampoline
    pub fn ydbvp_max_params() -> c_int;
}

/// Address of a variadic routine
#[derive(Clone, Copy)]
pub struct NativeRoutine(NativeFn);

impl NativeRoutine {
    #[inline]
    pub const fn new(func: NativeFn) -> Self {
        Self(func)
    }

    /// Routine at a raw address, e.g. from `dlsym`
    ///
    /// # Safety
    /// `ptr` must be the address of a C function whose arguments are all
    /// passed like `uintptr_t` values.
    #[inline]
    pub unsafe fn from_ptr(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(core::mem::transmute::<*const c_void, NativeFn>(ptr)))
        }
    }

    #[inline]
    pub fn as_fn(self) -> NativeFn {
        self.0
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NativeRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeRoutine({:#x})", self.addr())
    }
}
