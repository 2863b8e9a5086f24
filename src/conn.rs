//! Per-thread connection state
//!
//! A `Conn` owns the native memory every engine call needs: the error string
//! buffer, a reusable value buffer and the variadic parameter list. It holds
//! raw pointers and is neither `Send` nor `Sync`, so each thread builds its
//! own (or uses the thread's default through [`with_conn`]).

use core::ffi::c_int;
use std::cell::RefCell;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::buffer::{BufferT, YdbBuffer};
use crate::call::{NativeRoutine, VariadicCall};
use crate::config::{Config, ConnConfig};
use crate::error::{Error, Result};
use crate::logging::{debug, trace};
use crate::node::Node;
use crate::plist::{ParamList, PlistError, Slot};
use crate::signature::LOCK_ST;

/// Normal return status
pub const YDB_OK: c_int = 0;

/// Lock not acquired within the timeout
pub const YDB_LOCK_TIMEOUT: c_int = 30001;

/// Transaction token outside of any transaction
pub const YDB_NOTTP: u64 = 0;

/// Marker between the code and the text of an engine error message
const MESSAGE_PATTERN: &str = ",(SimpleThreadAPI),";

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a connection, recorded in the nodes it builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Native state for engine calls on one thread
///
/// ```compile_fail
/// use ydb_varargs::conn::Conn;
///
/// let conn = Conn::new().unwrap();
/// std::thread::spawn(move || conn.id());
/// ```
///
/// ```compile_fail
/// use ydb_varargs::conn::Conn;
///
/// fn shared<T: Sync>(_: &T) {}
/// shared(&Conn::new().unwrap());
/// ```
pub struct Conn {
    id: ConnId,
    tptoken: u64,
    errstr: BufferT,
    value: BufferT,
    vplist: Option<ParamList>,
    vp_started: bool,
    max_params: usize,
    config: ConnConfig,
}

impl Conn {
    /// Connection with default sizes
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let conn = Self {
            id: ConnId::next(),
            tptoken: YDB_NOTTP,
            errstr: BufferT::alloc(config.conn.errstr_size)?,
            value: BufferT::alloc(config.conn.value_overalloc)?,
            vplist: None,
            vp_started: false,
            max_params: config.plist.max_params,
            config: config.conn.clone(),
        };
        debug!(target: "ydb_varargs::conn", id = conn.id.get(), "connection created");
        Ok(conn)
    }

    #[inline]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Transaction token passed to every engine call
    #[inline]
    pub fn tptoken(&self) -> u64 {
        self.tptoken
    }

    /// Empty the error string so a failing call cannot leave a stale message
    #[inline]
    pub fn prep_api(&mut self) {
        self.errstr.clear();
    }

    // ===== Value and error buffers =====

    /// Make room in the value buffer for `size` bytes
    ///
    /// Growth reserves `value_overalloc` extra bytes for later, larger values.
    pub fn ensure_value_size(&mut self, size: usize) -> Result<()> {
        if size > self.config.max_string {
            return Err(Error::InvalidStringLength { len: size, max: self.config.max_string });
        }
        if size > self.value.len_alloc() as usize {
            let capacity = size as u32 + self.config.value_overalloc;
            trace!(target: "ydb_varargs::conn", size, capacity, "growing value buffer");
            self.value.ensure_capacity(capacity)?;
        }
        Ok(())
    }

    /// Store `value` in the value buffer
    pub fn set_value(&mut self, value: &[u8]) -> Result<&YdbBuffer> {
        self.ensure_value_size(value.len())?;
        self.value.set_bytes(value)?;
        Ok(self.value.descriptor())
    }

    /// Current contents of the value buffer
    pub fn value(&self) -> Vec<u8> {
        self.value.to_vec()
    }

    #[inline]
    pub fn value_buffer(&self) -> &BufferT {
        &self.value
    }

    /// Value buffer, for engine calls that write into it
    #[inline]
    pub fn value_buffer_mut(&mut self) -> &mut BufferT {
        &mut self.value
    }

    #[inline]
    pub fn error_buffer(&self) -> &BufferT {
        &self.errstr
    }

    #[inline]
    pub fn error_buffer_mut(&mut self) -> &mut BufferT {
        &mut self.errstr
    }

    /// Message left by the last engine call
    pub fn error_string(&self) -> String {
        String::from_utf8_lossy(&self.errstr.to_vec()).into_owned()
    }

    /// Turn an engine status into a result, using the message the engine
    /// left in the error buffer
    pub fn last_error(&self, status: c_int) -> Result<()> {
        if status == YDB_OK {
            return Ok(());
        }
        Err(self.status_error(status))
    }

    fn status_error(&self, status: c_int) -> Error {
        let msg = self.error_string();
        if msg.is_empty() {
            // Nothing was written since prep_api()
            return Error::Engine {
                code: status,
                message: format!("error {} (no message text available)", status),
            };
        }
        match msg.find(MESSAGE_PATTERN) {
            Some(index) => Error::Engine {
                code: status,
                message: msg[index + MESSAGE_PATTERN.len()..].to_string(),
            },
            None => Error::MessageInvalid(msg),
        }
    }

    /// Status code recorded at the front of the error message, negated the
    /// way engine calls return it; `YDB_OK` if there is no message
    pub fn last_code(&self) -> Result<c_int> {
        let msg = self.error_string();
        if msg.is_empty() {
            return Ok(YDB_OK);
        }
        let code = msg
            .split_once(',')
            .and_then(|(code, _)| code.trim().parse::<i64>().ok())
            .ok_or_else(|| Error::MessageInvalid(msg.clone()))?;
        c_int::try_from(-code).map_err(|_| Error::MessageInvalid(msg))
    }

    // ===== Variadic parameter list =====

    fn vp_alloc(&mut self) -> Result<&mut ParamList> {
        let plist = match self.vplist.take() {
            Some(plist) => plist,
            None => ParamList::create(self.max_params)?,
        };
        Ok(self.vplist.insert(plist))
    }

    /// Begin a new parameter list; required before the first `vp_add_param`
    pub fn vp_start(&mut self) -> Result<()> {
        self.vp_alloc()?.reset();
        self.vp_started = true;
        Ok(())
    }

    /// Add the next parameter of the pending call
    pub fn vp_add_param(&mut self, slot: Slot) -> Result<()> {
        let started = self.vp_started;
        let plist = self.vp_alloc()?;
        if !started {
            return Err(PlistError::NotStarted.into());
        }
        plist.append(slot)?;
        Ok(())
    }

    /// Add a 64-bit parameter (two words on 32-bit targets)
    #[inline]
    pub fn vp_add_param64(&mut self, value: u64) -> Result<()> {
        self.vp_add_param(Slot::U64(value))
    }

    /// Add the address of a buffer descriptor
    #[inline]
    pub fn vp_add_buffer(&mut self, buf: *const YdbBuffer) -> Result<()> {
        self.vp_add_param(Slot::Buffer(buf))
    }

    /// Call `call` with the pending list, then empty the list
    ///
    /// # Safety
    /// Same as [`VariadicCall::invoke`].
    pub unsafe fn vp_call(&mut self, call: &VariadicCall<'_>) -> Result<c_int> {
        if !self.vp_started {
            return Err(PlistError::NotStarted.into());
        }
        self.prep_api();
        let plist = self.vplist.as_mut().ok_or(PlistError::NotAllocated)?;
        let result = call.invoke(plist);
        plist.reset();
        Ok(result?)
    }

    /// Print the pending list
    pub fn vp_dump<W: io::Write>(&self, w: &mut W) -> Result<()> {
        let plist = self.vplist.as_ref().ok_or(PlistError::NotAllocated)?;
        plist.dump(w)?;
        Ok(())
    }

    /// Pending list, if one was ever allocated
    #[inline]
    pub fn vplist(&self) -> Option<&ParamList> {
        self.vplist.as_ref()
    }

    // ===== Locks =====

    /// Release all locks held and acquire locks on `nodes` through `routine`,
    /// waiting up to `timeout`
    ///
    /// Returns `true` if the locks were acquired and `false` on timeout.
    ///
    /// # Safety
    /// `routine` must take `ydb_lock_st` arguments.
    pub unsafe fn lock_with(
        &mut self,
        routine: NativeRoutine,
        timeout: Duration,
        nodes: &[&Node],
    ) -> Result<bool> {
        if let Some(node) = nodes.iter().find(|node| node.conn_id() != self.id) {
            return Err(Error::ForeignNode { node_conn: node.conn_id().get(), conn: self.id.get() });
        }
        let timeout_nsec = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let errstr = self.errstr.as_ptr();

        self.vp_start()?;
        self.vp_add_param64(self.tptoken)?;
        self.vp_add_buffer(errstr)?;
        self.vp_add_param64(timeout_nsec)?;
        self.vp_add_param(Slot::Int(nodes.len() as isize))?;
        for node in nodes {
            let buffers = node.buffers();
            self.vp_add_param(Slot::BufferArray(buffers.as_ptr()))?;
            self.vp_add_param(Slot::Int(node.len() as isize - 1))?;
            self.vp_add_param(Slot::BufferArray(buffers[1..].as_ptr()))?;
        }

        let status = self.vp_call(&VariadicCall::new(routine, &LOCK_ST))?;
        match status {
            YDB_OK => Ok(true),
            YDB_LOCK_TIMEOUT => Ok(false),
            _ => Err(self.status_error(status)),
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("tptoken", &self.tptoken)
            .field("vplist", &self.vplist)
            .finish()
    }
}

thread_local! {
    static THREAD_CONN: RefCell<Option<Conn>> = RefCell::new(None);
}

/// Run `f` with this thread's default connection, creating it on first use
///
/// The connection is borrowed mutably for the duration of `f`; a nested call
/// returns [`Error::ConnInUse`].
pub fn with_conn<R>(f: impl FnOnce(&mut Conn) -> R) -> Result<R> {
    THREAD_CONN.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| Error::ConnInUse)?;
        let conn = match slot.take() {
            Some(conn) => conn,
            None => Conn::new()?,
        };
        Ok(f(slot.insert(conn)))
    })
}
