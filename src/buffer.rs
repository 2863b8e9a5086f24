//! Buffer descriptors - the unit of data exchange with the engine
//!
//! `YdbBuffer` has the exact layout of the engine's `ydb_buffer_t`.
//! `BufferT` owns one descriptor plus its backing bytes, both in C-allocated
//! memory so their addresses stay put while native code holds them.

use core::ffi::c_char;
use core::fmt;
use core::ptr::{self, NonNull};
use std::io;

use crate::logging::{log_allocation, log_deallocation};

/// Engine buffer descriptor (`ydb_buffer_t`)
///
/// `len_used <= len_alloc` for everything this crate writes. The engine may
/// report `len_used > len_alloc` after a call to say how much space it needed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct YdbBuffer {
    pub len_alloc: u32,
    pub len_used: u32,
    pub buf_addr: *mut c_char,
}

impl YdbBuffer {
    /// Descriptor addressing nothing
    #[inline]
    pub const fn empty() -> Self {
        Self {
            len_alloc: 0,
            len_used: 0,
            buf_addr: ptr::null_mut(),
        }
    }

    /// Descriptor over `len_alloc` bytes at `addr`, of which `len_used` are in use
    #[inline]
    pub const fn over(addr: *mut u8, len_used: u32, len_alloc: u32) -> Self {
        Self {
            len_alloc,
            len_used,
            buf_addr: addr as *mut c_char,
        }
    }

    /// Whether the engine reported more data than fits
    #[inline]
    pub const fn is_overflowed(&self) -> bool {
        self.len_used > self.len_alloc
    }

    /// Used bytes of the descriptor
    ///
    /// # Safety
    /// `buf_addr` must point to at least `len_alloc` readable bytes that
    /// stay valid for `'a`.
    pub unsafe fn bytes<'a>(&self) -> Result<&'a [u8], BufferError> {
        if self.is_overflowed() {
            return Err(BufferError::OutOfBounds {
                required: self.len_used as usize,
                capacity: self.len_alloc,
            });
        }
        if self.len_used == 0 || self.buf_addr.is_null() {
            return Ok(&[]);
        }
        Ok(core::slice::from_raw_parts(
            self.buf_addr as *const u8,
            self.len_used as usize,
        ))
    }
}

impl Default for YdbBuffer {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

/// Owned buffer in native memory
pub struct BufferT {
    desc: NonNull<YdbBuffer>,
}

impl BufferT {
    /// Allocate a buffer able to hold `capacity` bytes
    pub fn alloc(capacity: u32) -> Result<Self, BufferError> {
        unsafe {
            let desc = libc::calloc(1, core::mem::size_of::<YdbBuffer>()) as *mut YdbBuffer;
            let desc = NonNull::new(desc).ok_or(BufferError::AllocationFailure {
                bytes: core::mem::size_of::<YdbBuffer>(),
            })?;

            // malloc(0) may legitimately return null, so always ask for a byte
            let bytes = (capacity as usize).max(1);
            let data = libc::malloc(bytes) as *mut c_char;
            if data.is_null() {
                libc::free(desc.as_ptr() as *mut libc::c_void);
                return Err(BufferError::AllocationFailure { bytes });
            }
            log_allocation(bytes, data as *const u8);

            desc.as_ptr().write(YdbBuffer {
                len_alloc: capacity,
                len_used: 0,
                buf_addr: data,
            });
            Ok(Self { desc })
        }
    }

    /// Allocate a buffer sized for `bytes` and fill it
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        let capacity = u32::try_from(bytes.len()).map_err(|_| BufferError::OutOfBounds {
            required: bytes.len(),
            capacity: u32::MAX,
        })?;
        let mut buf = Self::alloc(capacity)?;
        buf.set_bytes(bytes)?;
        Ok(buf)
    }

    /// Allocated length
    #[inline]
    pub fn len_alloc(&self) -> u32 {
        self.descriptor().len_alloc
    }

    /// Used length, as last written by this crate or the engine
    #[inline]
    pub fn len_used(&self) -> u32 {
        self.descriptor().len_used
    }

    /// Set the used length without touching the bytes
    pub fn set_len_used(&mut self, len: u32) -> Result<(), BufferError> {
        let desc = self.descriptor_mut();
        if len > desc.len_alloc {
            return Err(BufferError::OutOfBounds {
                required: len as usize,
                capacity: desc.len_alloc,
            });
        }
        desc.len_used = len;
        Ok(())
    }

    /// Mark the buffer empty
    #[inline]
    pub fn clear(&mut self) {
        self.descriptor_mut().len_used = 0;
    }

    /// Copy `value` into the buffer; nothing changes if it does not fit
    pub fn set_bytes(&mut self, value: &[u8]) -> Result<(), BufferError> {
        let desc = self.descriptor_mut();
        if value.len() > desc.len_alloc as usize {
            return Err(BufferError::OutOfBounds {
                required: value.len(),
                capacity: desc.len_alloc,
            });
        }
        unsafe {
            ptr::copy_nonoverlapping(value.as_ptr(), desc.buf_addr as *mut u8, value.len());
        }
        desc.len_used = value.len() as u32;
        Ok(())
    }

    #[inline]
    pub fn set_str(&mut self, value: &str) -> Result<(), BufferError> {
        self.set_bytes(value.as_bytes())
    }

    /// Used bytes; fails if the engine left `len_used > len_alloc`
    pub fn as_bytes(&self) -> Result<&[u8], BufferError> {
        // The descriptor points into memory this value owns
        unsafe { self.descriptor().bytes() }
    }

    /// Copy of as many used bytes as are actually allocated
    pub fn to_vec(&self) -> Vec<u8> {
        let desc = self.descriptor();
        let len = desc.len_used.min(desc.len_alloc) as usize;
        let mut out = Vec::with_capacity(len);
        unsafe {
            ptr::copy_nonoverlapping(desc.buf_addr as *const u8, out.as_mut_ptr(), len);
            out.set_len(len);
        }
        out
    }

    /// Grow the allocation to at least `capacity` bytes, keeping the contents
    pub fn ensure_capacity(&mut self, capacity: u32) -> Result<(), BufferError> {
        let desc = self.descriptor_mut();
        if capacity <= desc.len_alloc {
            return Ok(());
        }
        let old = desc.buf_addr;
        let data = unsafe { libc::realloc(old as *mut libc::c_void, capacity as usize) } as *mut c_char;
        if data.is_null() {
            return Err(BufferError::AllocationFailure {
                bytes: capacity as usize,
            });
        }
        log_deallocation(old as *const u8);
        log_allocation(capacity as usize, data as *const u8);
        desc.buf_addr = data;
        desc.len_alloc = capacity;
        desc.len_used = desc.len_used.min(capacity);
        Ok(())
    }

    /// Descriptor, for reading
    #[inline]
    pub fn descriptor(&self) -> &YdbBuffer {
        unsafe { self.desc.as_ref() }
    }

    #[inline]
    fn descriptor_mut(&mut self) -> &mut YdbBuffer {
        unsafe { self.desc.as_mut() }
    }

    /// Stable address of the descriptor, for parameter lists and engine calls
    #[inline]
    pub fn as_ptr(&self) -> *const YdbBuffer {
        self.desc.as_ptr()
    }

    /// Stable mutable address of the descriptor, for engine output parameters
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut YdbBuffer {
        self.desc.as_ptr()
    }

    /// Print descriptor fields and contents
    pub fn dump<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let desc = self.descriptor();
        write!(
            w,
            "BufferT.Dump(): cbuftptr: {:p}, buf_addr: {:p}, len_alloc: {}, len_used: {}",
            self.desc.as_ptr(),
            desc.buf_addr,
            desc.len_alloc,
            desc.len_used
        )?;
        if desc.len_used > 0 {
            write!(w, ", value: {}", String::from_utf8_lossy(&self.to_vec()))?;
        }
        writeln!(w)
    }
}

impl fmt::Debug for BufferT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = self.descriptor();
        f.debug_struct("BufferT")
            .field("len_alloc", &desc.len_alloc)
            .field("len_used", &desc.len_used)
            .field("value", &String::from_utf8_lossy(&self.to_vec()))
            .finish()
    }
}

impl Drop for BufferT {
    fn drop(&mut self) {
        unsafe {
            let data = self.desc.as_ref().buf_addr;
            if !data.is_null() {
                log_deallocation(data as *const u8);
                libc::free(data as *mut libc::c_void);
            }
            libc::free(self.desc.as_ptr() as *mut libc::c_void);
        }
    }
}

/// Buffer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Length would exceed the allocation
    OutOfBounds { required: usize, capacity: u32 },
    AllocationFailure { bytes: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { required, capacity } => write!(
                f,
                "Buffer too small: {} bytes required, {} allocated",
                required, capacity
            ),
            Self::AllocationFailure { bytes } => {
                write!(f, "Failed to allocate {} bytes of native memory", bytes)
            }
        }
    }
}

impl std::error::Error for BufferError {}
