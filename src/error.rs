//! Crate-level error type
//!
//! Module errors (`BufferError`, `PlistError`, `CallError`) stay close to the
//! code that raises them; `Error` aggregates them together with the failures
//! that only make sense at the connection and node level.

use core::ffi::c_int;
use core::fmt;
use std::io;

use crate::buffer::BufferError;
use crate::call::CallError;
use crate::plist::PlistError;

/// Result alias used by connection and node operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by connection and node operations
#[derive(Debug)]
pub enum Error {
    Buffer(BufferError),
    Plist(PlistError),
    Call(CallError),
    /// String longer than the engine accepts
    InvalidStringLength { len: usize, max: usize },
    /// Subscript index outside `0..len` (after resolving negative indexes)
    InvalidSubscriptIndex { index: isize, len: usize },
    /// Write attempted on a node that was not produced for iteration
    ImmutableNode,
    /// Node built by a different connection
    ForeignNode { node_conn: u64, conn: u64 },
    /// The thread's default connection is already borrowed further up the stack
    ConnInUse,
    /// Status returned by the engine together with its message text
    Engine { code: c_int, message: String },
    /// Engine error string not in `code,(SimpleThreadAPI),text` form
    MessageInvalid(String),
    Config(String),
    Io(io::Error),
}

impl Error {
    /// Engine status code, if this error came from the engine
    pub fn code(&self) -> Option<c_int> {
        match self {
            Self::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(err) => write!(f, "{}", err),
            Self::Plist(err) => write!(f, "{}", err),
            Self::Call(err) => write!(f, "{}", err),
            Self::InvalidStringLength { len, max } => {
                write!(f, "Invalid string length {}: max {}", len, max)
            }
            Self::InvalidSubscriptIndex { index, len } => {
                write!(f, "subscript {} out of bounds (0-{})", index, len)
            }
            Self::ImmutableNode => write!(f, "node is immutable"),
            Self::ForeignNode { node_conn, conn } => write!(
                f,
                "node belongs to connection {} but was used on connection {}",
                node_conn, conn
            ),
            Self::ConnInUse => write!(f, "thread connection is already in use"),
            Self::Engine { message, .. } => write!(f, "{}", message),
            Self::MessageInvalid(msg) => {
                write!(f, "could not parse YottaDB error message: {}", msg)
            }
            Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Io(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Buffer(err) => Some(err),
            Self::Plist(err) => Some(err),
            Self::Call(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BufferError> for Error {
    fn from(err: BufferError) -> Self {
        Self::Buffer(err)
    }
}

impl From<PlistError> for Error {
    fn from(err: PlistError) -> Self {
        Self::Plist(err)
    }
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        Self::Call(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
