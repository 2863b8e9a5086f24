//! Variadic parameter lists
//!
//! A `ParamList` owns a native block laid out like the engine's
//! `gparam_list`: a word count `n` followed by `n` argument words. The block
//! lives in C-allocated memory and is only ever handed to native code through
//! a `RawHandle`.
//!
//! Architecture:
//! - `slot.rs` - what one parameter holds (`Slot`, `ParamKind`)
//! - `cursor.rs` - in-order reader over the appended words (`ArgCursor`)

mod cursor;
mod slot;

pub use cursor::ArgCursor;
pub use slot::{ParamKind, Slot};

use core::ffi::c_void;
use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use std::io;

use crate::abi::CallingConvention;
use crate::buffer::YdbBuffer;
use crate::logging::{debug, log_allocation, log_deallocation, trace};

/// Most arguments a single variadic call can take (`MAXVPARMS` in the engine)
pub const MAX_VPARAMS: usize = 36;

/// Native layout of a parameter list: `{ intptr_t n; uintptr_t arg[]; }`
#[repr(C)]
pub struct RawPlist {
    pub n: isize,
    pub arg: [usize; 0],
}

/// Address and word count of a native parameter list
///
/// This is what crosses the boundary. Nothing ties `count` to the native
/// `n` field; call adapters check both before the list is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHandle {
    pub ptr: *const RawPlist,
    pub count: usize,
}

impl RawHandle {
    #[inline]
    pub const fn from_raw_parts(ptr: *const RawPlist, count: usize) -> Self {
        Self { ptr, count }
    }

    /// The `n` stored in the native block
    ///
    /// # Safety
    /// `ptr` must point to a live parameter list.
    #[inline]
    pub unsafe fn native_count(&self) -> isize {
        ptr::addr_of!((*self.ptr).n).read()
    }
}

/// Builder for one variadic argument list
///
/// ```
/// use ydb_varargs::plist::ParamList;
///
/// let mut plist = ParamList::create(4).unwrap();
/// plist.append_int(42).unwrap();
/// assert_eq!(plist.len(), 1);
/// ```
///
/// The native block belongs to the thread that built it:
///
/// ```compile_fail
/// use ydb_varargs::plist::ParamList;
///
/// let plist = ParamList::create(4).unwrap();
/// std::thread::spawn(move || plist.len());
/// ```
pub struct ParamList {
    raw: NonNull<RawPlist>,
    capacity: usize,
    kinds: Vec<ParamKind>,
    convention: CallingConvention,
}

impl ParamList {
    /// Allocate a list with room for `capacity` words
    pub fn create(capacity: usize) -> Result<Self, PlistError> {
        if capacity > MAX_VPARAMS {
            return Err(PlistError::CapacityExceeded {
                requested: capacity,
                capacity: MAX_VPARAMS,
            });
        }
        let bytes = size_of::<isize>() + capacity * size_of::<usize>();
        let raw = unsafe { libc::calloc(1, bytes) } as *mut RawPlist;
        let raw = NonNull::new(raw).ok_or(PlistError::AllocationFailure { bytes })?;
        log_allocation(bytes, raw.as_ptr() as *const u8);
        debug!(target: "ydb_varargs::plist", capacity, "parameter list created");

        Ok(Self {
            raw,
            capacity,
            kinds: Vec::with_capacity(capacity),
            convention: CallingConvention::default(),
        })
    }

    /// Append one parameter
    ///
    /// Either every word of the slot is stored or, when it does not fit,
    /// nothing is and the list is unchanged.
    pub fn append(&mut self, slot: Slot) -> Result<(), PlistError> {
        let start = self.len();
        let (words, used) = self.encode(slot, start);
        if start + used > self.capacity {
            return Err(PlistError::CapacityExceeded {
                requested: start + used,
                capacity: self.capacity,
            });
        }
        unsafe {
            let args = self.args_mut();
            for (i, word) in words[..used].iter().enumerate() {
                args.add(start + i).write(*word);
            }
            self.set_count(start + used);
        }
        self.kinds.push(slot.kind());
        trace!(target: "ydb_varargs::plist", kind = %slot.kind(), n = start + used, "appended");
        Ok(())
    }

    fn encode(&self, slot: Slot, start: usize) -> ([usize; 3], usize) {
        let mut words = [0usize; 3];
        let used = match slot {
            Slot::U64(value) => {
                let layout = self.convention.u64_layout(start);
                if layout.words == 1 {
                    words[0] = value as usize;
                } else {
                    let offset = layout.pad as usize;
                    let [first, second] = self.convention.split_u64(value);
                    words[offset] = first;
                    words[offset + 1] = second;
                }
                layout.span()
            }
            Slot::Count(n) => {
                words[0] = n;
                1
            }
            Slot::Int(v) => {
                words[0] = v as usize;
                1
            }
            Slot::Buffer(p) | Slot::BufferArray(p) => {
                words[0] = p as usize;
                1
            }
            Slot::Ptr(p) => {
                words[0] = p as usize;
                1
            }
        };
        (words, used)
    }

    #[inline]
    pub fn append_count(&mut self, count: usize) -> Result<(), PlistError> {
        self.append(Slot::Count(count))
    }

    #[inline]
    pub fn append_int(&mut self, value: isize) -> Result<(), PlistError> {
        self.append(Slot::Int(value))
    }

    #[inline]
    pub fn append_u64(&mut self, value: u64) -> Result<(), PlistError> {
        self.append(Slot::U64(value))
    }

    /// Append the address of `buf`; it must outlive the call using this list
    #[inline]
    pub fn append_buffer(&mut self, buf: &YdbBuffer) -> Result<(), PlistError> {
        self.append(Slot::Buffer(buf))
    }

    /// Append the address of the first of `bufs`
    #[inline]
    pub fn append_buffer_array(&mut self, bufs: &[YdbBuffer]) -> Result<(), PlistError> {
        self.append(Slot::BufferArray(bufs.as_ptr()))
    }

    #[inline]
    pub fn append_ptr<T>(&mut self, ptr: *const T) -> Result<(), PlistError> {
        self.append(Slot::Ptr(ptr as *const c_void))
    }

    /// Forget every slot; the native block is kept
    pub fn reset(&mut self) {
        unsafe { self.set_count(0) };
        self.kinds.clear();
        trace!(target: "ydb_varargs::plist", "reset");
    }

    /// Number of words appended (the native `n`)
    #[inline]
    pub fn len(&self) -> usize {
        unsafe { ptr::addr_of!((*self.raw.as_ptr()).n).read() as usize }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Word capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Kinds of the logical slots, in order
    #[inline]
    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    #[inline]
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// The appended words
    #[inline]
    pub fn words(&self) -> &[usize] {
        unsafe { core::slice::from_raw_parts(self.args(), self.len()) }
    }

    /// Reader over the appended words
    #[inline]
    pub fn cursor(&self) -> ArgCursor<'_> {
        ArgCursor::new(self.words(), self.convention)
    }

    /// Handle for native code
    #[inline]
    pub fn as_raw(&self) -> RawHandle {
        RawHandle::from_raw_parts(self.raw.as_ptr(), self.len())
    }

    /// Print the list one word per line
    pub fn dump<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let n = self.len();
        writeln!(w, "   Total of {} elements in this variadic plist", n)?;
        let args = self.args();
        for (i, word) in self.words().iter().enumerate() {
            let addr = unsafe { args.add(i) };
            writeln!(w, "   Elem {} ({:p}) Value: {} (0x{:x})", i, addr, word, word)?;
        }
        Ok(())
    }

    #[inline]
    fn args(&self) -> *const usize {
        unsafe { ptr::addr_of!((*self.raw.as_ptr()).arg) as *const usize }
    }

    #[inline]
    fn args_mut(&mut self) -> *mut usize {
        unsafe { ptr::addr_of_mut!((*self.raw.as_ptr()).arg) as *mut usize }
    }

    #[inline]
    unsafe fn set_count(&mut self, n: usize) {
        ptr::addr_of_mut!((*self.raw.as_ptr()).n).write(n as isize);
    }
}

impl fmt::Debug for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamList")
            .field("n", &self.len())
            .field("capacity", &self.capacity)
            .field("kinds", &self.kinds)
            .finish()
    }
}

impl Drop for ParamList {
    fn drop(&mut self) {
        log_deallocation(self.raw.as_ptr() as *const u8);
        unsafe { libc::free(self.raw.as_ptr() as *mut libc::c_void) };
    }
}

/// Parameter list errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlistError {
    AllocationFailure { bytes: usize },
    CapacityExceeded { requested: usize, capacity: usize },
    /// Parameter added to a connection's list before `vp_start`
    NotStarted,
    /// Connection list used before it was ever allocated
    NotAllocated,
}

impl fmt::Display for PlistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure { bytes } => {
                write!(f, "Failed to allocate {} bytes for parameter list", bytes)
            }
            Self::CapacityExceeded { requested, capacity } => write!(
                f,
                "Variadic list needs {} parameters but holds at most {}",
                requested, capacity
            ),
            Self::NotStarted => write!(f, "vp_start() was not called before vp_add_param()"),
            Self::NotAllocated => write!(f, "variadic list has not been allocated"),
        }
    }
}

impl std::error::Error for PlistError {}
