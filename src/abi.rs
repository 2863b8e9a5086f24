//! ABI (Application Binary Interface) handling
//!
//! Parameter lists are arrays of machine words. A 64-bit value needs two
//! words on 32-bit targets, and the order and alignment of those words depends
//! on the calling convention.

/// Calling convention of the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    C,
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention (Windows)
    Win64,
    /// ARM AAPCS (ARM 32-bit)
    Aapcs,
    /// ARM64 calling convention
    Aarch64,
}

/// Where the words of a 64-bit parameter go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U64Layout {
    /// Skip one word before the value
    pub pad: bool,
    /// Words the value occupies (1 or 2)
    pub words: usize,
}

impl U64Layout {
    /// Total words consumed, padding included
    #[inline]
    pub const fn span(self) -> usize {
        self.words + self.pad as usize
    }
}

impl CallingConvention {
    /// Get platform default
    #[inline]
    pub const fn default() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Aapcs;

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::C;
    }

    /// Maximum register arguments for this convention
    #[inline]
    pub const fn max_register_args(self) -> usize {
        match self {
            Self::C => 6,
            Self::SysV => 6,    // RDI, RSI, RDX, RCX, R8, R9
            Self::Win64 => 4,   // RCX, RDX, R8, R9
            Self::Aapcs => 4,   // R0-R3
            Self::Aarch64 => 8, // X0-X7
        }
    }

    /// Layout of a 64-bit parameter whose first word would land at `index`
    ///
    /// On AAPCS a 64-bit value passed in registers must start in an even
    /// register, so an odd register slot is left unused.
    #[inline]
    pub const fn u64_layout(self, index: usize) -> U64Layout {
        if WORD_BITS == 64 {
            return U64Layout { pad: false, words: 1 };
        }
        let pad = matches!(self, Self::Aapcs)
            && cfg!(target_endian = "little")
            && index % 2 == 1
            && index < self.max_register_args();
        U64Layout { pad, words: 2 }
    }

    /// Split a 64-bit value into words in the order the callee reads them
    #[inline]
    pub fn split_u64(self, value: u64) -> [usize; 2] {
        let low = (value & 0xffff_ffff) as usize;
        let high = (value >> 32) as usize;
        if cfg!(target_endian = "little") {
            [low, high]
        } else {
            [high, low]
        }
    }

    /// Reassemble a value produced by `split_u64`
    #[inline]
    pub fn join_u64(self, first: usize, second: usize) -> u64 {
        let (low, high) = if cfg!(target_endian = "little") {
            (first, second)
        } else {
            (second, first)
        };
        ((high as u64 & 0xffff_ffff) << 32) | (low as u64 & 0xffff_ffff)
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::default()
    }
}

/// Width of one parameter list slot
pub const WORD_BITS: u32 = usize::BITS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_default_is_stable() {
        assert_eq!(CallingConvention::default(), <CallingConvention as Default>::default());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn u64_is_one_word_on_64_bit() {
        for conv in [CallingConvention::SysV, CallingConvention::Aapcs, CallingConvention::C] {
            for index in 0..6 {
                assert_eq!(conv.u64_layout(index), U64Layout { pad: false, words: 1 });
            }
        }
    }

    #[test]
    #[cfg(target_pointer_width = "32")]
    fn aapcs_pads_odd_register_slots() {
        let conv = CallingConvention::Aapcs;
        assert!(!conv.u64_layout(0).pad);
        assert!(conv.u64_layout(1).pad);
        assert!(!conv.u64_layout(2).pad);
        assert!(conv.u64_layout(3).pad);
        assert!(!conv.u64_layout(5).pad);
        assert_eq!(conv.u64_layout(1).span(), 3);
        assert!(!CallingConvention::C.u64_layout(1).pad);
    }

    #[test]
    fn split_and_join_agree() {
        let conv = CallingConvention::default();
        let value = 0x0123_4567_89ab_cdef_u64;
        let [a, b] = conv.split_u64(value);
        assert_eq!(conv.join_u64(a, b), value);
    }
}
