//! Call adapter tests

use super::*;
use crate::buffer::BufferT;
use crate::plist::{ParamList, RawHandle};
use crate::probe::{self, FixedScenario};
use crate::signature::VPLIST_TEST;

fn plist_test() -> VariadicCall<'static> {
    VariadicCall::new(probe::plist_test_routine(), &VPLIST_TEST)
}

// ===== Trampoline =====

#[test]
fn trampoline_agrees_on_max_params() {
    assert_eq!(unsafe { ydbvp_max_params() }, MAX_VPARAMS as c_int);
}

#[test]
fn trampoline_refuses_empty_list() {
    let plist = ParamList::create(4).unwrap();
    let status = unsafe {
        native::ydbvp_call_plist(probe::plist_test_routine().as_fn(), plist.as_raw().ptr)
    };
    assert_eq!(status, YDBVP_ERR_PLIST);
}

#[test]
fn invoke_reaches_native_routine() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    scenario.fill(&mut plist).unwrap();
    assert_eq!(unsafe { plist_test().invoke(&plist) }, Ok(0));
}

#[test]
fn invoke_raw_with_matching_handle() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    scenario.fill(&mut plist).unwrap();
    let handle = plist.as_raw();
    assert_eq!(unsafe { plist_test().invoke_raw(4, handle) }, Ok(0));
}

// ===== Count validation =====

#[test]
fn short_list_is_rejected_before_native_code() {
    let b1 = BufferT::from_bytes(b"Buffer one").unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    plist.append_count(3).unwrap();
    plist.append_int(42).unwrap();
    plist.append_buffer(b1.descriptor()).unwrap();

    let err = unsafe { plist_test().invoke(&plist) }.unwrap_err();
    assert_eq!(
        err,
        CallError::CountMismatch {
            routine: "ydbvp_plist_test".into(),
            expected: Arity::Exactly(4),
            got: 3,
        }
    );
    assert_eq!(err.to_string(), "ydbvp_plist_test: expected 4 arguments, got 3");
}

#[test]
fn poisoned_handle_is_rejected() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    scenario.fill(&mut plist).unwrap();

    // Count claims more words than the list holds
    let poisoned = RawHandle::from_raw_parts(plist.as_raw().ptr, 5);
    assert!(matches!(
        unsafe { plist_test().invoke_raw(5, poisoned) },
        Err(CallError::CountMismatch { got: 5, .. })
    ));

    // Caller and handle disagree
    assert!(matches!(
        unsafe { plist_test().invoke_raw(4, poisoned) },
        Err(CallError::CountMismatch { got: 4, .. })
    ));
}

#[test]
fn oversized_count_never_reaches_native_code() {
    // The pointer is never dereferenced when the count is rejected
    let bogus = RawHandle::from_raw_parts(core::ptr::null(), MAX_VPARAMS + 1);
    assert!(matches!(
        unsafe { plist_test().invoke_raw(MAX_VPARAMS + 1, bogus) },
        Err(CallError::CountMismatch { .. })
    ));
}

#[test]
fn null_handle_is_rejected() {
    let null = RawHandle::from_raw_parts(core::ptr::null(), 4);
    assert_eq!(
        unsafe { plist_test().invoke_raw(4, null) },
        Err(CallError::Rejected { routine: "ydbvp_plist_test".into() })
    );
}

// ===== Kind validation =====

#[test]
fn swapped_slots_are_a_signature_mismatch() {
    let b1 = BufferT::from_bytes(b"Buffer one").unwrap();
    let b2 = BufferT::from_bytes(b"Buffer two").unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    plist.append_count(3).unwrap();
    plist.append_buffer(b1.descriptor()).unwrap();
    plist.append_int(42).unwrap();
    plist.append_buffer(b2.descriptor()).unwrap();

    let err = unsafe { plist_test().invoke(&plist) }.unwrap_err();
    assert_eq!(
        err,
        CallError::SignatureMismatch {
            routine: "ydbvp_plist_test".into(),
            position: 1,
            expected: ParamKind::Int,
            found: ParamKind::Buffer,
        }
    );
    assert!(err.to_string().contains("argument 1 should be int but is buffer"));
}

#[test]
fn plist_errors_convert() {
    let err: CallError = PlistError::NotStarted.into();
    assert!(std::error::Error::source(&err).is_some());
}

// ===== Library loading =====

#[cfg(unix)]
mod library {
    use super::super::*;

    #[test]
    fn missing_library_fails_to_load() {
        let err = Library::load("libydbvp-does-not-exist.so").unwrap_err();
        assert!(matches!(err, LoadError::LoadFailed(_)));
    }

    #[test]
    fn interior_nul_is_invalid() {
        assert_eq!(Library::load("lib\0c").unwrap_err(), LoadError::InvalidName);
    }

    #[test]
    fn resolves_libc_variadic() {
        let lib = Library::this_process().unwrap();
        let printf = unsafe { lib.routine("printf") }.unwrap();
        assert_ne!(printf.addr(), 0);
    }

    #[test]
    fn missing_symbol_is_reported() {
        let lib = Library::this_process().unwrap();
        assert_eq!(
            unsafe { lib.routine("ydbvp_no_such_symbol") }.unwrap_err(),
            SymbolError::NotFound("ydbvp_no_such_symbol".into())
        );
    }
}
