//! In-order reader over parameter list words
//!
//! The words carry no type information; the reader decides what each one is,
//! exactly as `va_arg` does on the native side.

use core::ffi::c_int;

use crate::abi::CallingConvention;
use crate::buffer::YdbBuffer;

#[derive(Debug, Clone)]
pub struct ArgCursor<'a> {
    words: &'a [usize],
    pos: usize,
    convention: CallingConvention,
}

impl<'a> ArgCursor<'a> {
    #[inline]
    pub fn new(words: &'a [usize], convention: CallingConvention) -> Self {
        Self { words, pos: 0, convention }
    }

    /// Index of the next word
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.words.len() - self.pos
    }

    #[inline]
    pub fn next_word(&mut self) -> Option<usize> {
        let word = *self.words.get(self.pos)?;
        self.pos += 1;
        Some(word)
    }

    #[inline]
    pub fn next_int(&mut self) -> Option<isize> {
        self.next_word().map(|w| w as isize)
    }

    /// Next word read as a C `int`, keeping only the low bits
    #[inline]
    pub fn next_c_int(&mut self) -> Option<c_int> {
        self.next_word().map(|w| w as c_int)
    }

    /// Next 64-bit value, following the same layout `ParamList` writes
    pub fn next_u64(&mut self) -> Option<u64> {
        let layout = self.convention.u64_layout(self.pos);
        if self.remaining() < layout.span() {
            return None;
        }
        if layout.pad {
            self.pos += 1;
        }
        if layout.words == 1 {
            return self.next_word().map(|w| w as u64);
        }
        let first = self.next_word()?;
        let second = self.next_word()?;
        Some(self.convention.join_u64(first, second))
    }

    #[inline]
    pub fn next_ptr<T>(&mut self) -> Option<*const T> {
        self.next_word().map(|w| w as *const T)
    }

    #[inline]
    pub fn next_buffer_ptr(&mut self) -> Option<*const YdbBuffer> {
        self.next_ptr()
    }

    /// Next word as a buffer descriptor; `None` when exhausted or null
    ///
    /// # Safety
    /// A non-null word must be the address of a descriptor valid for `'b`.
    #[inline]
    pub unsafe fn next_buffer<'b>(&mut self) -> Option<&'b YdbBuffer> {
        self.next_buffer_ptr()?.as_ref()
    }
}
