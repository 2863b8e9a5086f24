//! Calling signatures of variadic routines
//!
//! A native list carries no type information, so the kinds a routine pulls
//! with `va_arg` are written down here once and checked on the Rust side
//! before a list is handed over. A routine takes its `fixed` parameters
//! followed by any number of `repeat` groups.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::abi::CallingConvention;
use crate::plist::{ParamKind, MAX_VPARAMS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    pub name: Cow<'static, str>,
    pub fixed: Cow<'static, [ParamKind]>,
    pub repeat: Cow<'static, [ParamKind]>,
}

/// How many logical parameters a signature accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    /// `fixed` plus any multiple of `step`
    AtLeast { fixed: usize, step: usize },
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{}", n),
            Self::AtLeast { fixed, step } => write!(f, "{} + k*{}", fixed, step),
        }
    }
}

impl CallSignature {
    /// Signature with a fixed parameter list
    pub const fn fixed(name: &'static str, params: &'static [ParamKind]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            fixed: Cow::Borrowed(params),
            repeat: Cow::Borrowed(&[]),
        }
    }

    /// Signature with fixed leading parameters and a repeated group
    pub const fn with_repeat(
        name: &'static str,
        fixed: &'static [ParamKind],
        repeat: &'static [ParamKind],
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            fixed: Cow::Borrowed(fixed),
            repeat: Cow::Borrowed(repeat),
        }
    }

    /// Signature built at run time, e.g. for one echo call
    pub fn dynamic(name: impl Into<String>, params: Vec<ParamKind>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            fixed: Cow::Owned(params),
            repeat: Cow::Borrowed(&[]),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        if self.repeat.is_empty() {
            Arity::Exactly(self.fixed.len())
        } else {
            Arity::AtLeast { fixed: self.fixed.len(), step: self.repeat.len() }
        }
    }

    /// Whether `count` logical parameters fit this signature
    pub fn arity_matches(&self, count: usize) -> bool {
        match self.arity() {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast { fixed, step } => count >= fixed && (count - fixed) % step == 0,
        }
    }

    /// Kind expected at logical position `index`
    pub fn kind_at(&self, index: usize) -> Option<ParamKind> {
        if index < self.fixed.len() {
            return Some(self.fixed[index]);
        }
        if self.repeat.is_empty() {
            return None;
        }
        Some(self.repeat[(index - self.fixed.len()) % self.repeat.len()])
    }

    /// First position whose kind differs, as `(position, expected, found)`
    pub fn first_mismatch(&self, kinds: &[ParamKind]) -> Option<(usize, ParamKind, ParamKind)> {
        kinds.iter().enumerate().find_map(|(i, &found)| match self.kind_at(i) {
            Some(expected) if expected == found => None,
            // Positions past a fixed signature are reported by the arity check
            None => None,
            Some(expected) => Some((i, expected, found)),
        })
    }

    /// Whether a list of `words` native words can be a call of this routine
    ///
    /// Walks the layout the same way `ParamList` writes it, so 64-bit values
    /// on 32-bit targets (and their padding) are counted.
    pub fn accepts_words(&self, words: usize, convention: CallingConvention) -> bool {
        let mut used = 0;
        let mut index = 0;
        loop {
            if used == words && self.arity_matches(index) {
                return true;
            }
            if used >= words {
                return false;
            }
            match self.kind_at(index) {
                Some(ParamKind::U64) => used += convention.u64_layout(used).span(),
                Some(_) => used += 1,
                None => return false,
            }
            index += 1;
            if used > MAX_VPARAMS {
                return false;
            }
        }
    }
}

/// The routine in `csrc/vplist_probe.c` that checks one fixed scenario
pub static VPLIST_TEST: CallSignature = CallSignature::fixed(
    "ydbvp_plist_test",
    &[ParamKind::Count, ParamKind::Int, ParamKind::Buffer, ParamKind::Buffer],
);

/// `ydb_lock_st(tptoken, errstr, timeout_nsec, namecount, [varname, subs_used, subsarray]...)`
pub static LOCK_ST: CallSignature = CallSignature::with_repeat(
    "ydb_lock_st",
    &[ParamKind::U64, ParamKind::Buffer, ParamKind::U64, ParamKind::Int],
    &[ParamKind::BufferArray, ParamKind::Int, ParamKind::BufferArray],
);

static REGISTRY: Lazy<HashMap<&'static str, &'static CallSignature>> = Lazy::new(|| {
    [&VPLIST_TEST, &LOCK_ST]
        .into_iter()
        .map(|sig| (sig.name_static(), sig))
        .collect()
});

impl CallSignature {
    fn name_static(&'static self) -> &'static str {
        &self.name
    }
}

/// Signature of a known routine
pub fn lookup(name: &str) -> Option<&'static CallSignature> {
    REGISTRY.get(name).copied()
}
