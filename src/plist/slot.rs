//! Parameter slots

use core::ffi::c_void;
use core::fmt;

use crate::buffer::YdbBuffer;

/// What a slot holds, as recorded alongside the native words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Leading argument count of routines like `ydbvp_plist_test`
    Count,
    Int,
    /// 64-bit value; two words on 32-bit targets
    U64,
    Buffer,
    /// Pointer to the first of consecutive buffer descriptors
    BufferArray,
    Ptr,
}

impl ParamKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Int => "int",
            Self::U64 => "u64",
            Self::Buffer => "buffer",
            Self::BufferArray => "buffer array",
            Self::Ptr => "pointer",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One logical parameter
///
/// Pointers are stored as-is. The pointee must stay alive until the list has
/// been consumed by a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Count(usize),
    Int(isize),
    U64(u64),
    Buffer(*const YdbBuffer),
    BufferArray(*const YdbBuffer),
    Ptr(*const c_void),
}

impl Slot {
    #[inline]
    pub const fn kind(&self) -> ParamKind {
        match self {
            Self::Count(_) => ParamKind::Count,
            Self::Int(_) => ParamKind::Int,
            Self::U64(_) => ParamKind::U64,
            Self::Buffer(_) => ParamKind::Buffer,
            Self::BufferArray(_) => ParamKind::BufferArray,
            Self::Ptr(_) => ParamKind::Ptr,
        }
    }

    /// Word value of a single-word slot; `None` for `U64`, whose layout
    /// depends on the target
    #[inline]
    pub fn word(&self) -> Option<usize> {
        match *self {
            Self::Count(n) => Some(n),
            Self::Int(v) => Some(v as usize),
            Self::U64(_) => None,
            Self::Buffer(p) | Self::BufferArray(p) => Some(p as usize),
            Self::Ptr(p) => Some(p as usize),
        }
    }
}

impl From<&YdbBuffer> for Slot {
    #[inline]
    fn from(buf: &YdbBuffer) -> Self {
        Self::Buffer(buf as *const YdbBuffer)
    }
}
