//! End-to-end checks of parameter lists against the native probe routines

use proptest::prelude::*;
use ydb_varargs::call::{CallError, VariadicCall};
use ydb_varargs::plist::{ParamList, RawHandle, MAX_VPARAMS};
use ydb_varargs::probe::{self, Echoed, FixedScenario, ValidationError};
use ydb_varargs::signature::{Arity, VPLIST_TEST};

fn plist_test() -> VariadicCall<'static> {
    VariadicCall::new(probe::plist_test_routine(), &VPLIST_TEST)
}

/// Words whose low 32 bits are drawn from near the expected value, with
/// arbitrary high bits on 64-bit targets
fn int_word(low: isize) -> impl Strategy<Value = isize> {
    prop_oneof![
        (low - 2)..(low + 3),
        any::<isize>(),
        any::<isize>().prop_map(move |v| (v & !(u32::MAX as isize)) | low),
    ]
}

fn echo_value() -> impl Strategy<Value = Echoed> {
    prop_oneof![
        any::<isize>().prop_map(Echoed::Int),
        prop::collection::vec(any::<u8>(), 0..=probe::ECHO_MAX_BYTES).prop_map(Echoed::Bytes),
    ]
}

// ===== Fixed scenario =====

#[test]
fn fixed_scenario_passes() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    let outcome = scenario.run(&mut plist).unwrap();
    assert_eq!(outcome.status, 0);
    assert!(outcome.passed());
}

#[test]
fn wrong_value_fails_with_diagnostic() {
    let scenario = FixedScenario::new(
        probe::EXPECTED_ARGS,
        41,
        probe::EXPECTED_BUF1.as_bytes(),
        probe::EXPECTED_BUF2.as_bytes(),
    )
    .unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    let outcome = scenario.run(&mut plist).unwrap();
    assert_eq!(outcome.status, 1);
    assert!(outcome.diagnostic.contains("expected 42 but received 41"));
}

#[test]
fn wrong_content_fails_with_diagnostic() {
    let scenario = FixedScenario::new(
        probe::EXPECTED_ARGS,
        probe::EXPECTED_VAL,
        b"Buffer ONE",
        probe::EXPECTED_BUF2.as_bytes(),
    )
    .unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    let outcome = scenario.run(&mut plist).unwrap();
    assert_eq!(outcome.status, 1);
    assert_eq!(
        outcome.diagnostic,
        "VPLST: FAIL test - Buffer1 content is wrong - expected Buffer one but received Buffer ONE"
    );

    let err = unsafe { probe::verify(&plist) }.unwrap_err();
    assert!(matches!(err, ValidationError::ContentMismatch { slot: 1, .. }));
    assert_eq!(err.to_string(), outcome.diagnostic);
}

#[test]
fn shortened_length_fails_even_with_matching_prefix() {
    let mut scenario = FixedScenario::expected().unwrap();
    scenario.second_mut().set_len_used(9).unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    let outcome = scenario.run(&mut plist).unwrap();
    assert_eq!(outcome.status, 1);
    assert!(outcome.diagnostic.contains("Buffer2 content is wrong"));
    assert!(matches!(
        unsafe { probe::verify(&plist) },
        Err(ValidationError::ContentMismatch { slot: 2, .. })
    ));
}

#[test]
fn reset_then_shorter_sequence_is_not_polluted() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    scenario.fill(&mut plist).unwrap();
    assert_eq!(plist.len(), 4);

    plist.reset();
    plist.append_count(2).unwrap();
    plist.append_int(probe::EXPECTED_VAL).unwrap();
    plist.append_buffer(scenario.first().descriptor()).unwrap();
    assert_eq!(plist.len(), 3);

    // The stale fourth word from the earlier sequence is not counted
    let err = unsafe { plist_test().invoke(&plist) }.unwrap_err();
    assert_eq!(
        err,
        CallError::CountMismatch {
            routine: "ydbvp_plist_test".into(),
            expected: Arity::Exactly(4),
            got: 3,
        }
    );
    assert!(matches!(
        unsafe { probe::verify(&plist) },
        Err(ValidationError::CountMismatch { expected: 3, received: 2 })
    ));

    // Filling again restores a passing list
    let outcome = scenario.run(&mut plist).unwrap();
    assert!(outcome.passed(), "{}", outcome.diagnostic);
}

#[test]
fn one_list_serves_many_calls() {
    let scenario = FixedScenario::expected().unwrap();
    let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
    for _ in 0..16 {
        assert!(scenario.run(&mut plist).unwrap().passed());
    }
}

// ===== Properties =====

proptest! {
    #[test]
    fn prop_wrong_count_never_reaches_native_code(count in 0..=(2 * MAX_VPARAMS)) {
        prop_assume!(count != 4);
        // Null pointer: a call that got through would fault
        let handle = RawHandle::from_raw_parts(core::ptr::null(), count);
        let result = unsafe { plist_test().invoke_raw(count, handle) };
        let is_count_mismatch = matches!(result, Err(CallError::CountMismatch { .. }));
        prop_assert!(is_count_mismatch, "count {} gave {:?}", count, result);
    }

    #[test]
    fn prop_short_lists_are_refused(len in 1usize..4) {
        let scenario = FixedScenario::expected().unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        scenario.fill(&mut plist).unwrap();
        let handle = RawHandle::from_raw_parts(plist.as_raw().ptr, len);
        let result = unsafe { plist_test().invoke_raw(len, handle) };
        let is_count_mismatch = matches!(result, Err(CallError::CountMismatch { got, .. }) if got == len);
        prop_assert!(is_count_mismatch);
    }

    #[test]
    fn prop_echo_returns_values_in_order(
        values in prop::collection::vec(echo_value(), 0..=(MAX_VPARAMS - 3))
    ) {
        let echoed = probe::echo(&values).unwrap();
        prop_assert_eq!(echoed, values);
    }

    #[test]
    fn prop_rust_and_native_checks_agree(
        count in int_word(probe::EXPECTED_ARGS as isize),
        value in int_word(probe::EXPECTED_VAL),
        cut in 0u32..=10,
    ) {
        let mut scenario = FixedScenario::new(
            count as usize,
            value,
            probe::EXPECTED_BUF1.as_bytes(),
            probe::EXPECTED_BUF2.as_bytes(),
        )
        .unwrap();
        scenario.second_mut().set_len_used(cut).unwrap();
        let mut plist = ParamList::create(MAX_VPARAMS).unwrap();
        let outcome = scenario.run(&mut plist).unwrap();
        let rust = unsafe { probe::verify(&plist) };
        prop_assert_eq!(outcome.passed(), rust.is_ok());
        if let Err(err) = rust {
            prop_assert_eq!(err.to_string(), outcome.diagnostic);
        }
    }
}
