//! Database node handles
//!
//! A `Node` stores its varname and subscripts back to back in one owned byte
//! region and keeps an array of buffer descriptors pointing into it, so the
//! whole key can be handed to an engine call as `(buffers, len - 1, &buffers[1])`
//! without copying.
//!
//! Nodes are immutable unless produced by [`Node::mutated`]. A mutable node
//! reserves extra room after its final subscript so iteration can rewrite it
//! in place with [`Node::mutate`].

use core::fmt;

use crate::buffer::YdbBuffer;
use crate::config::YDB_MAX_STR;
use crate::conn::{Conn, ConnId};
use crate::error::{Error, Result};

/// Room reserved after the final subscript of a mutable node
pub const PREALLOC_SUBSCRIPT: usize = 40;

/// Shorthand for a node with no subscripts: `conn.node("x", NO_SUBS)`
pub const NO_SUBS: [&str; 0] = [];

/// One varname or subscript, as raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscript(pub Vec<u8>);

impl Subscript {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Subscript {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Subscript {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&String> for Subscript {
    fn from(s: &String) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Subscript {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

impl From<Vec<u8>> for Subscript {
    fn from(b: Vec<u8>) -> Self {
        Self(b)
    }
}

macro_rules! subscript_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Subscript {
            fn from(n: $t) -> Self {
                Self(n.to_string().into_bytes())
            }
        })*
    };
}

subscript_from_number!(i32, i64, u32, u64, isize, usize, f64);

/// Where one string sits in the node's byte region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: u32,
    alloc: u32,
}

/// Varname plus subscripts, laid out for engine calls
///
/// ```
/// use ydb_varargs::conn::Conn;
///
/// let conn = Conn::new().unwrap();
/// let node = conn.node("^x", [1, 2]).unwrap();
/// assert_eq!(node.to_string(), "^x(1,2)");
/// ```
///
/// Its descriptors point into memory owned by this thread's node:
///
/// ```compile_fail
/// use ydb_varargs::conn::Conn;
///
/// let node = Conn::new().unwrap().node("^x", [1]).unwrap();
/// std::thread::spawn(move || node.len());
/// ```
pub struct Node {
    conn: ConnId,
    data: Vec<u8>,
    spans: Vec<Span>,
    /// Descriptors over `data`, one per span
    buffers: Vec<YdbBuffer>,
    mutable: bool,
}

impl Node {
    /// Lay out `parts` contiguously, reserving `slack` bytes after the last one
    fn build<'a, I>(conn: ConnId, parts: I, slack: usize, mutable: bool) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let parts: Vec<&[u8]> = parts.into_iter().collect();
        let last = parts.len().saturating_sub(1);

        let mut data = Vec::new();
        let mut spans = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if part.len() > YDB_MAX_STR {
                return Err(Error::InvalidStringLength { len: part.len(), max: YDB_MAX_STR });
            }
            let extra = if i == last { slack } else { 0 };
            spans.push(Span {
                offset: data.len(),
                len: part.len() as u32,
                alloc: (part.len() + extra) as u32,
            });
            data.extend_from_slice(part);
            data.resize(data.len() + extra, 0);
        }

        let mut node = Self { conn, data, spans, buffers: Vec::new(), mutable };
        node.rebuild_buffers();
        Ok(node)
    }

    /// Point the descriptor array at the current byte region
    fn rebuild_buffers(&mut self) {
        let base = self.data.as_mut_ptr();
        self.buffers = self
            .spans
            .iter()
            // Offsets are within `data` by construction
            .map(|span| YdbBuffer::over(unsafe { base.add(span.offset) }, span.len, span.alloc))
            .collect();
    }

    fn used(&self, span: &Span) -> &[u8] {
        &self.data[span.offset..span.offset + span.len as usize]
    }

    fn with_tail<'a>(&'a self, tail: &'a [Subscript]) -> impl Iterator<Item = &'a [u8]> {
        self.spans
            .iter()
            .map(move |span| self.used(span))
            .chain(tail.iter().map(Subscript::as_bytes))
    }

    /// Node with `subs` appended to this node's subscripts
    pub fn child<I, S>(&self, subs: I) -> Result<Node>
    where
        I: IntoIterator<Item = S>,
        S: Into<Subscript>,
    {
        let subs: Vec<Subscript> = subs.into_iter().map(Into::into).collect();
        Self::build(self.conn, self.with_tail(&subs), 0, false)
    }

    /// Immutable copy of this node
    pub fn clone_node(&self) -> Node {
        self.copy_for(self.conn)
    }

    fn copy_for(&self, conn: ConnId) -> Node {
        let mut spans = Vec::with_capacity(self.spans.len());
        let mut data = Vec::with_capacity(self.datasize());
        for span in &self.spans {
            spans.push(Span { offset: data.len(), len: span.len, alloc: span.len });
            data.extend_from_slice(self.used(span));
        }
        let mut node = Self { conn, data, spans, buffers: Vec::new(), mutable: false };
        node.rebuild_buffers();
        node
    }

    /// Varname (index 0) or subscript; negative indexes count from the end
    pub fn subscript(&self, index: isize) -> Result<Vec<u8>> {
        let len = self.len();
        let resolved = if index < 0 { len as isize + index } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(Error::InvalidSubscriptIndex { index: resolved, len });
        }
        Ok(self.used(&self.spans[resolved as usize]).to_vec())
    }

    /// Varname followed by every subscript
    pub fn subscripts(&self) -> Vec<Vec<u8>> {
        self.spans.iter().map(|span| self.used(span).to_vec()).collect()
    }

    /// Number of strings, varname included
    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Bytes allocated for all strings, reserved room included
    #[inline]
    pub fn datasize(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    #[inline]
    pub fn conn_id(&self) -> ConnId {
        self.conn
    }

    /// Descriptors in engine order: varname, then subscripts
    #[inline]
    pub fn buffers(&self) -> &[YdbBuffer] {
        &self.buffers
    }

    /// Mutable copy with the final subscript replaced by `value`
    pub fn mutated(&self, value: impl Into<Subscript>) -> Result<Node> {
        let value = value.into();
        let keep = self.spans.len().saturating_sub(1);
        let head = self.spans[..keep].iter().map(|span| self.used(span));
        Self::build(
            self.conn,
            head.chain(std::iter::once(value.as_bytes())),
            PREALLOC_SUBSCRIPT,
            true,
        )
    }

    /// Replace the final subscript of a mutable node
    ///
    /// Rewrites in place when the reserved room suffices; otherwise the node
    /// is rebuilt (still mutable) with fresh room after the new value.
    pub fn mutate(&mut self, value: impl Into<Subscript>) -> Result<()> {
        if !self.mutable {
            return Err(Error::ImmutableNode);
        }
        let value = value.into();
        let last = self.spans.len() - 1;
        let span = self.spans[last];
        if value.0.len() > span.alloc as usize {
            *self = self.mutated(value)?;
            return Ok(());
        }
        self.data[span.offset..span.offset + value.0.len()].copy_from_slice(&value.0);
        self.spans[last].len = value.0.len() as u32;
        self.buffers[last].len_used = value.0.len() as u32;
        Ok(())
    }
}

impl Conn {
    /// Node for `varname(subs...)` bound to this connection
    pub fn node<I, S>(&self, varname: &str, subs: I) -> Result<Node>
    where
        I: IntoIterator<Item = S>,
        S: Into<Subscript>,
    {
        let subs: Vec<Subscript> = subs.into_iter().map(Into::into).collect();
        let parts = std::iter::once(varname.as_bytes()).chain(subs.iter().map(Subscript::as_bytes));
        Node::build(self.id(), parts, 0, false)
    }

    /// Immutable copy of `node` bound to this connection
    pub fn clone_node(&self, node: &Node) -> Node {
        node.copy_for(self.id())
    }
}

/// ZWRITE-style rendering of one subscript
///
/// Canonical numbers print bare. Anything else is quoted, with `"` doubled,
/// control characters as `$C(..)` and bytes above 127 as `$ZCH(..)`, the
/// pieces joined with `_`.
pub fn quote(value: &[u8]) -> String {
    if is_canonical_number(value) {
        return String::from_utf8_lossy(value).into_owned();
    }
    if value.is_empty() {
        return "\"\"".to_string();
    }

    #[derive(PartialEq, Clone, Copy)]
    enum Run {
        Text,
        Control,
        High,
    }
    let class = |b: u8| match b {
        0x20..=0x7e => Run::Text,
        0x80..=0xff => Run::High,
        _ => Run::Control,
    };

    let mut pieces: Vec<String> = Vec::new();
    let mut start = 0;
    while start < value.len() {
        let run = class(value[start]);
        let end = value[start..]
            .iter()
            .position(|&b| class(b) != run)
            .map_or(value.len(), |n| start + n);
        let chunk = &value[start..end];
        let codes = || chunk.iter().map(u8::to_string).collect::<Vec<_>>().join(",");
        pieces.push(match run {
            Run::Text => format!("\"{}\"", String::from_utf8_lossy(chunk).replace('"', "\"\"")),
            Run::Control => format!("$C({})", codes()),
            Run::High => format!("$ZCH({})", codes()),
        });
        start = end;
    }
    pieces.join("_")
}

fn is_canonical_number(value: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(value) else {
        return false;
    };
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => n.to_string() == text,
        _ => false,
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut spans = self.spans.iter();
        if let Some(varname) = spans.next() {
            f.write_str(&String::from_utf8_lossy(self.used(varname)))?;
        }
        for (i, span) in spans.enumerate() {
            f.write_str(if i == 0 { "(" } else { "," })?;
            f.write_str(&quote(self.used(span)))?;
        }
        if self.spans.len() > 1 {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.to_string())
            .field("conn", &self.conn)
            .field("datasize", &self.datasize())
            .field("mutable", &self.mutable)
            .finish()
    }
}
