//! Native consumers for checking parameter lists end to end
//!
//! `csrc/vplist_probe.c` provides three routines:
//! - `ydbvp_plist_test` checks one fixed scenario (3 arguments: 42,
//!   "Buffer one", "Buffer two") and prints a `VPLST: FAIL test - ...` line
//!   naming what it expected and what it received
//! - `ydbvp_plist_echo` copies back whatever it is told to read
//! - `ydbvp_lock_probe` takes `ydb_lock_st` arguments and records the names
//!
//! `verify` performs the fixed-scenario checks on the Rust side through an
//! `ArgCursor`, without crossing into C.

use core::ffi::{c_char, c_int, CStr};
use core::fmt;
use std::ffi::CString;

use crate::buffer::{BufferError, BufferT};
use crate::call::{CallError, NativeFn, NativeRoutine, VariadicCall};
use crate::plist::{ParamKind, ParamList, PlistError, MAX_VPARAMS};
use crate::signature::{CallSignature, VPLIST_TEST};

/// Arguments following the count in the fixed scenario
pub const EXPECTED_ARGS: usize = 3;
pub const EXPECTED_VAL: isize = 42;
pub const EXPECTED_BUF1: &str = "Buffer one";
pub const EXPECTED_BUF2: &str = "Buffer two";

/// Largest buffer the echo routine copies back
pub const ECHO_MAX_BYTES: usize = 64;

/// Most names one lock call can carry: `(MAX_VPARAMS - 4) / 3`
pub const LOCK_MAX_NAMES: usize = (MAX_VPARAMS - 4) / 3;

#[repr(C)]
struct EchoCapture {
    count: usize,
    ints: [isize; MAX_VPARAMS],
    lens: [u32; MAX_VPARAMS],
    bytes: [[u8; ECHO_MAX_BYTES]; MAX_VPARAMS],
}

#[repr(C)]
struct LockCapture {
    tptoken: u64,
    timeout_nsec: u64,
    namecount: c_int,
    lens: [u32; LOCK_MAX_NAMES],
    names: [[u8; ECHO_MAX_BYTES]; LOCK_MAX_NAMES],
}

extern "C" {
    fn ydbvp_plist_test(argcnt: c_int, ...) -> c_int;
    fn ydbvp_plist_echo(count: usize, ...) -> c_int;
    fn ydbvp_lock_probe(tptoken: u64, ...) -> c_int;
    fn ydbvp_lock_probe_capture() -> *const LockCapture;
    fn ydbvp_plist_test_diagnostic() -> *const c_char;
    fn ydbvp_plist_test_set_verbose(flag: c_int);
}

/// `ydbvp_plist_test`, callable through the trampoline
pub fn plist_test_routine() -> NativeRoutine {
    let func: unsafe extern "C" fn(c_int, ...) -> c_int = ydbvp_plist_test;
    // The trampoline passes the count as a full word; the routine reads an int
    NativeRoutine::new(unsafe { core::mem::transmute::<_, NativeFn>(func) })
}

/// `ydbvp_plist_echo`, callable through the trampoline
pub fn echo_routine() -> NativeRoutine {
    NativeRoutine::new(ydbvp_plist_echo)
}

/// `ydbvp_lock_probe`, a stand-in for `ydb_lock_st`
pub fn lock_probe_routine() -> NativeRoutine {
    let func: unsafe extern "C" fn(u64, ...) -> c_int = ydbvp_lock_probe;
    NativeRoutine::new(unsafe { core::mem::transmute::<_, NativeFn>(func) })
}

/// Last failure message recorded by a probe routine on this thread
pub fn diagnostic() -> String {
    let msg = unsafe { ydbvp_plist_test_diagnostic() };
    if msg.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

/// Print buffer descriptors as the probe routines read them
pub fn set_verbose(verbose: bool) {
    unsafe { ydbvp_plist_test_set_verbose(verbose as c_int) }
}

// ===== Fixed scenario =====

/// Result of running the fixed-scenario routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// 0 on success, 1 on failure
    pub status: c_int,
    pub diagnostic: String,
}

impl ProbeOutcome {
    #[inline]
    pub fn passed(&self) -> bool {
        self.status == 0
    }
}

/// Arguments for `ydbvp_plist_test`, expected or deliberately wrong
pub struct FixedScenario {
    pub count: usize,
    pub value: isize,
    first: BufferT,
    second: BufferT,
}

impl FixedScenario {
    /// The arguments the routine expects
    pub fn expected() -> Result<Self, BufferError> {
        Self::new(
            EXPECTED_ARGS,
            EXPECTED_VAL,
            EXPECTED_BUF1.as_bytes(),
            EXPECTED_BUF2.as_bytes(),
        )
    }

    pub fn new(count: usize, value: isize, first: &[u8], second: &[u8]) -> Result<Self, BufferError> {
        Ok(Self {
            count,
            value,
            first: BufferT::from_bytes(first)?,
            second: BufferT::from_bytes(second)?,
        })
    }

    pub fn first(&self) -> &BufferT {
        &self.first
    }

    pub fn second(&self) -> &BufferT {
        &self.second
    }

    /// Mutable access to the first buffer, e.g. to shorten `len_used`
    pub fn first_mut(&mut self) -> &mut BufferT {
        &mut self.first
    }

    pub fn second_mut(&mut self) -> &mut BufferT {
        &mut self.second
    }

    /// Replace the contents of `plist` with this scenario
    pub fn fill(&self, plist: &mut ParamList) -> Result<(), PlistError> {
        plist.reset();
        plist.append_count(self.count)?;
        plist.append_int(self.value)?;
        plist.append_buffer(self.first.descriptor())?;
        plist.append_buffer(self.second.descriptor())?;
        Ok(())
    }

    /// Fill `plist` and hand it to the native routine
    pub fn run(&self, plist: &mut ParamList) -> Result<ProbeOutcome, CallError> {
        self.fill(plist)?;
        // The buffers are owned by `self` and outlive the call
        unsafe { run_native(plist) }
    }
}

/// Hand `plist` to `ydbvp_plist_test`
///
/// # Safety
/// Every buffer slot in `plist` must point to a live descriptor.
pub unsafe fn run_native(plist: &ParamList) -> Result<ProbeOutcome, CallError> {
    let call = VariadicCall::new(plist_test_routine(), &VPLIST_TEST);
    let status = call.invoke(plist)?;
    Ok(ProbeOutcome { status, diagnostic: diagnostic() })
}

/// Fixed-scenario failure detected on the Rust side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Values are compared and reported as the C `int` the routine reads
    CountMismatch { expected: c_int, received: c_int },
    IntMismatch { expected: c_int, received: c_int },
    /// `slot` is 1 or 2
    ContentMismatch { slot: usize, expected: Vec<u8>, received: Vec<u8> },
    MissingArgument { position: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { expected, received } => write!(
                f,
                "VPLST: FAIL test - Argument count is wrong - expected arg count {} but received {}",
                expected, received
            ),
            Self::IntMismatch { expected, received } => write!(
                f,
                "VPLST: FAIL test - First parameter is wrong - expected {} but received {}",
                expected, received
            ),
            Self::ContentMismatch { slot, expected, received } => write!(
                f,
                "VPLST: FAIL test - Buffer{} content is wrong - expected {} but received {}",
                slot,
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(received)
            ),
            Self::MissingArgument { position } => {
                write!(f, "VPLST: FAIL test - Argument {} is missing", position)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check the fixed scenario by reading `plist` the way the native routine does
///
/// # Safety
/// Buffer slots must point to live descriptors.
pub unsafe fn verify(plist: &ParamList) -> Result<(), ValidationError> {
    let mut cursor = plist.cursor();

    // Both leading slots are read with va_arg(.., int): only the low bits count
    let count = cursor.next_c_int().ok_or(ValidationError::MissingArgument { position: 0 })?;
    let expected_count = EXPECTED_ARGS as c_int;
    if count != expected_count {
        return Err(ValidationError::CountMismatch { expected: expected_count, received: count });
    }

    let value = cursor.next_c_int().ok_or(ValidationError::MissingArgument { position: 1 })?;
    let expected_value = EXPECTED_VAL as c_int;
    if value != expected_value {
        return Err(ValidationError::IntMismatch { expected: expected_value, received: value });
    }

    for (slot, expected) in [(1, EXPECTED_BUF1), (2, EXPECTED_BUF2)] {
        let ptr = cursor
            .next_buffer_ptr()
            .ok_or(ValidationError::MissingArgument { position: slot + 1 })?;
        let received = match ptr.as_ref() {
            Some(buf) => {
                let len = buf.len_used.min(buf.len_alloc) as usize;
                if len == 0 || buf.buf_addr.is_null() {
                    Vec::new()
                } else {
                    core::slice::from_raw_parts(buf.buf_addr as *const u8, len).to_vec()
                }
            }
            None => Vec::new(),
        };
        // Length first, like the native check, so a shortened len_used fails
        // even when the leading bytes agree
        let matches = ptr.as_ref().map_or(false, |buf| buf.len_used as usize == expected.len())
            && received == expected.as_bytes();
        if !matches {
            return Err(ValidationError::ContentMismatch {
                slot,
                expected: expected.as_bytes().to_vec(),
                received,
            });
        }
    }
    Ok(())
}

// ===== Echo =====

/// One value passed to or read back from the echo routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Echoed {
    Int(isize),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub enum ProbeError {
    Buffer(BufferError),
    Plist(PlistError),
    Call(CallError),
    /// The routine ran and reported a failure
    Failed { status: c_int, diagnostic: String },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(err) => write!(f, "{}", err),
            Self::Plist(err) => write!(f, "{}", err),
            Self::Call(err) => write!(f, "{}", err),
            Self::Failed { status, diagnostic } => {
                write!(f, "probe returned {}: {}", status, diagnostic)
            }
        }
    }
}

impl std::error::Error for ProbeError {}

impl From<BufferError> for ProbeError {
    fn from(err: BufferError) -> Self {
        Self::Buffer(err)
    }
}

impl From<PlistError> for ProbeError {
    fn from(err: PlistError) -> Self {
        Self::Plist(err)
    }
}

impl From<CallError> for ProbeError {
    fn from(err: CallError) -> Self {
        Self::Call(err)
    }
}

/// Pass `values` through `ydbvp_plist_echo` and return what it read
pub fn echo(values: &[Echoed]) -> Result<Vec<Echoed>, ProbeError> {
    let kinds: String = values
        .iter()
        .map(|v| match v {
            Echoed::Int(_) => 'i',
            Echoed::Bytes(_) => 'b',
        })
        .collect();
    let kinds = CString::new(kinds).map_err(|_| ProbeError::Failed {
        status: -1,
        diagnostic: "kind string contains NUL".into(),
    })?;

    let buffers = values
        .iter()
        .filter_map(|v| match v {
            Echoed::Bytes(bytes) => Some(BufferT::from_bytes(bytes)),
            Echoed::Int(_) => None,
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Boxed so the capture block does not sit on the stack
    let mut capture: Box<EchoCapture> = Box::new(unsafe { core::mem::zeroed() });

    let mut plist = ParamList::create(MAX_VPARAMS)?;
    let mut signature = vec![ParamKind::Count, ParamKind::Ptr, ParamKind::Ptr];
    plist.append_count(values.len())?;
    plist.append_ptr(kinds.as_ptr())?;
    plist.append_ptr(&mut *capture as *mut EchoCapture)?;
    let mut next_buffer = buffers.iter();
    for value in values {
        match value {
            Echoed::Int(v) => {
                plist.append_int(*v)?;
                signature.push(ParamKind::Int);
            }
            Echoed::Bytes(_) => {
                if let Some(buf) = next_buffer.next() {
                    plist.append_buffer(buf.descriptor())?;
                }
                signature.push(ParamKind::Buffer);
            }
        }
    }

    let signature = CallSignature::dynamic("ydbvp_plist_echo", signature);
    // kinds, capture and buffers all outlive the call
    let status = unsafe { VariadicCall::new(echo_routine(), &signature).invoke(&plist)? };
    if status != 0 {
        return Err(ProbeError::Failed { status, diagnostic: diagnostic() });
    }

    let echoed = values
        .iter()
        .enumerate()
        .take(capture.count)
        .map(|(i, value)| match value {
            Echoed::Int(_) => Echoed::Int(capture.ints[i]),
            Echoed::Bytes(_) => {
                let len = (capture.lens[i] as usize).min(ECHO_MAX_BYTES);
                Echoed::Bytes(capture.bytes[i][..len].to_vec())
            }
        })
        .collect();
    Ok(echoed)
}

// ===== Lock stand-in =====

/// What `ydbvp_lock_probe` received in its last call on this thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub tptoken: u64,
    pub timeout_nsec: u64,
    pub namecount: c_int,
    /// Each name rendered as `varname(sub1,sub2)`
    pub names: Vec<Vec<u8>>,
}

pub fn last_lock_record() -> LockRecord {
    let capture = unsafe { &*ydbvp_lock_probe_capture() };
    let shown = (capture.namecount.max(0) as usize).min(LOCK_MAX_NAMES);
    LockRecord {
        tptoken: capture.tptoken,
        timeout_nsec: capture.timeout_nsec,
        namecount: capture.namecount,
        names: (0..shown)
            .map(|i| {
                let len = (capture.lens[i] as usize).min(ECHO_MAX_BYTES);
                capture.names[i][..len].to_vec()
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_scenario_passes_natively() {
        let scenario = FixedScenario::expected().unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert!(outcome.passed(), "{}", outcome.diagnostic);
        assert_eq!(outcome.diagnostic, "");
    }

    #[test]
    fn expected_scenario_passes_in_rust() {
        let scenario = FixedScenario::expected().unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        scenario.fill(&mut plist).unwrap();
        assert_eq!(unsafe { verify(&plist) }, Ok(()));
    }

    #[test]
    fn wrong_int_is_named_in_diagnostic() {
        let scenario =
            FixedScenario::new(3, 41, EXPECTED_BUF1.as_bytes(), EXPECTED_BUF2.as_bytes()).unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert_eq!(outcome.status, 1);
        assert_eq!(
            outcome.diagnostic,
            "VPLST: FAIL test - First parameter is wrong - expected 42 but received 41"
        );
        assert_eq!(
            unsafe { verify(&plist) }.unwrap_err().to_string(),
            outcome.diagnostic
        );
    }

    #[test]
    fn wrong_count_is_named_in_diagnostic() {
        let scenario =
            FixedScenario::new(2, 42, EXPECTED_BUF1.as_bytes(), EXPECTED_BUF2.as_bytes()).unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert_eq!(outcome.status, 1);
        assert!(outcome.diagnostic.contains("expected arg count 3 but received 2"));
    }

    #[test]
    fn shortened_len_used_fails_both_checks() {
        let mut scenario = FixedScenario::expected().unwrap();
        scenario.second_mut().set_len_used(9).unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert_eq!(outcome.status, 1);
        assert!(outcome.diagnostic.contains("Buffer2 content is wrong"));
        assert!(outcome.diagnostic.ends_with("received Buffer tw"));

        match unsafe { verify(&plist) } {
            Err(ValidationError::ContentMismatch { slot, received, .. }) => {
                assert_eq!(slot, 2);
                assert_eq!(received, b"Buffer tw".to_vec());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn high_bits_of_int_slots_are_ignored() {
        let scenario = FixedScenario::new(
            EXPECTED_ARGS + (1 << 32),
            EXPECTED_VAL + (1 << 32),
            EXPECTED_BUF1.as_bytes(),
            EXPECTED_BUF2.as_bytes(),
        )
        .unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert!(outcome.passed(), "{}", outcome.diagnostic);
        assert_eq!(unsafe { verify(&plist) }, Ok(()));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn truncated_int_is_reported_like_native() {
        let scenario = FixedScenario::new(
            EXPECTED_ARGS,
            41 + (7 << 32),
            EXPECTED_BUF1.as_bytes(),
            EXPECTED_BUF2.as_bytes(),
        )
        .unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        assert_eq!(outcome.status, 1);
        let err = unsafe { verify(&plist) }.unwrap_err();
        assert_eq!(err, ValidationError::IntMismatch { expected: 42, received: 41 });
        assert_eq!(err.to_string(), outcome.diagnostic);
    }

    #[test]
    fn lock_name_limit_fills_a_full_list() {
        assert_eq!(LOCK_MAX_NAMES, 10);
        assert!(4 + 3 * LOCK_MAX_NAMES <= MAX_VPARAMS);
        assert!(4 + 3 * (LOCK_MAX_NAMES + 1) > MAX_VPARAMS);
    }

    #[test]
    fn echo_returns_what_it_was_given() {
        let values = vec![
            Echoed::Int(-7),
            Echoed::Bytes(b"abc".to_vec()),
            Echoed::Int(isize::MAX),
            Echoed::Bytes(Vec::new()),
        ];
        assert_eq!(echo(&values).unwrap(), values);
    }

    #[test]
    fn echo_rejects_oversized_buffer() {
        let values = vec![Echoed::Bytes(vec![b'x'; ECHO_MAX_BYTES + 1])];
        match echo(&values) {
            Err(ProbeError::Failed { status, diagnostic }) => {
                assert_eq!(status, 1);
                assert!(diagnostic.contains("position 0 is unusable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn echo_rejects_too_many_values() {
        let values = vec![Echoed::Int(1); MAX_VPARAMS];
        assert!(matches!(
            echo(&values),
            Err(ProbeError::Plist(PlistError::CapacityExceeded { .. }))
        ));
    }
}
