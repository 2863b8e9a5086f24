//! ydb-varargs - variadic parameter lists for YottaDB's C API
//!
//! Builds argument lists for the engine's variadic entry points (such as
//! `ydb_lock_st`) at run time and hands them across the C boundary through a
//! native trampoline that performs the real variadic call.
//!
//! Layers, leaves first:
//! - `buffer` - `ydb_buffer_t` descriptors and owned native buffers
//! - `plist` - the `gparam_list` builder and its reader
//! - `signature` - what each variadic routine reads, checked before calling
//! - `call` - the adapter in front of the C trampoline
//! - `probe` - native consumers used to verify lists end to end
//! - `conn` / `node` - per-thread state and database keys built on the above

pub mod abi;
pub mod buffer;
pub mod call;
pub mod config;
pub mod conn;
pub mod error;
pub mod logging;
pub mod node;
pub mod plist;
pub mod probe;
pub mod signature;

// Re-export core types
pub use buffer::{BufferError, BufferT, YdbBuffer};
pub use call::{CallError, NativeRoutine, VariadicCall};
pub use config::Config;
pub use conn::{with_conn, Conn, ConnId};
pub use error::{Error, Result};
pub use node::{Node, Subscript, NO_SUBS};
pub use plist::{ParamKind, ParamList, PlistError, RawHandle, Slot, MAX_VPARAMS};
pub use signature::CallSignature;

/// Set up logging from `YDBVP_LOG_*`; safe to call more than once
pub fn init() {
    logging::init();
}
