//! Exact Z/W reconstruction of the square-division protocol, driven through
//! both parties' instances by hand.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;
use secure_id3::division::{Error, SquareDivisionInitiator, SquareDivisionTerminal};
use secure_id3::messages::{ClassValue, GiniGainResult};
use secure_id3::paillier::KeyPair;

fn counts(pairs: &[(&str, u64)]) -> BTreeMap<ClassValue, u64> {
    pairs
        .iter()
        .map(|&(class_value, count)| (ClassValue::from(class_value), count))
        .collect()
}

/// Runs one complete square-division computation between two parties and
/// returns the recombined `(Z, W)` pair and the final result.
fn run_division(
    initiator_counts: &BTreeMap<ClassValue, u64>,
    terminal_counts: &BTreeMap<ClassValue, u64>,
) -> (BigUint, BigUint, GiniGainResult) {
    let keys = Arc::new(KeyPair::generate(256));
    let mut initiator = SquareDivisionInitiator::new(keys.clone());
    let mut terminal = SquareDivisionTerminal::new(keys.public_key().clone());

    let mult = initiator.start_multiplications(initiator_counts);
    let mult = terminal
        .multiplication_forward(terminal_counts, &mult)
        .expect("known class values");
    let mult = terminal.multiplication_backward(&mult).expect("in order");

    let add = initiator.multiplication_backward(&mult).expect("in order");
    let add = terminal.addition_forward(&add).expect("in order");
    let add = terminal.addition_backward(&add).expect("in order");
    initiator.addition_backward(&add).expect("in order");

    let shares = vec![terminal.output_shares().expect("finished")];
    let (z, w) = initiator.reconstruct_z_w(&shares).expect("finished");
    let result = initiator.compute_result(&shares).expect("finished");
    (z, w, result)
}

#[test]
fn z_is_sum_of_squared_combined_counts() {
    // Combined counts: yes = 3 + 1 = 4, no = 1 + 1 = 2.
    // Z = 4² + 2² = 20, W = 4 + 2 = 6.
    let (z, w, result) = run_division(
        &counts(&[("yes", 3), ("no", 1)]),
        &counts(&[("yes", 1), ("no", 1)]),
    );
    assert_eq!(z, BigUint::from(20u32));
    assert_eq!(w, BigUint::from(6u32));
    assert_eq!(result.ratio, 20.0 / 6.0);
}

#[test]
fn counts_observed_by_only_one_party_each() {
    // Combined counts: yes = 0 + 2 = 2, no = 2 + 0 = 2.
    // Z = 2² + 2² = 8, W = 4.
    let (z, w, result) = run_division(
        &counts(&[("yes", 0), ("no", 2)]),
        &counts(&[("yes", 2), ("no", 0)]),
    );
    assert_eq!(z, BigUint::from(8u32));
    assert_eq!(w, BigUint::from(4u32));
    assert_eq!(result.ratio, 2.0);
}

#[test]
fn all_zero_counts_yield_ratio_zero() {
    let (z, w, result) = run_division(
        &counts(&[("yes", 0), ("no", 0)]),
        &counts(&[("yes", 0), ("no", 0)]),
    );
    assert_eq!(z, BigUint::from(0u32));
    assert_eq!(w, BigUint::from(0u32));
    assert_eq!(result.ratio, 0.0);
    assert_eq!(result.class_value, None);
}

#[test]
fn single_record_split_yields_the_pure_sentinel() {
    // Z = W = 1, the ratio the tree builder treats as a pure split.
    let (z, w, result) = run_division(&counts(&[("yes", 1)]), &counts(&[("yes", 0)]));
    assert_eq!(z, BigUint::from(1u32));
    assert_eq!(w, BigUint::from(1u32));
    assert_eq!(result.ratio, 1.0);
}

#[test]
fn terminal_class_value_takes_precedence() {
    let (_, _, result) = run_division(
        &counts(&[("yes", 2), ("no", 0)]),
        &counts(&[("yes", 0), ("no", 3)]),
    );
    // The terminal party observed a nonzero "no" count last; its observation
    // wins over the initiator's own "yes".
    assert_eq!(result.class_value, Some(ClassValue::from("no")));
}

#[test]
fn initiator_class_value_is_the_fallback() {
    let (_, _, result) = run_division(
        &counts(&[("yes", 2), ("no", 1)]),
        &counts(&[("yes", 0), ("no", 0)]),
    );
    // The terminal party saw nothing, so the initiator's last nonzero class
    // value is attributed.
    assert_eq!(result.class_value, Some(ClassValue::from("yes")));
}

#[test]
fn unknown_class_value_is_rejected() {
    let keys = Arc::new(KeyPair::generate(256));
    let mut initiator = SquareDivisionInitiator::new(keys.clone());
    let mut terminal = SquareDivisionTerminal::new(keys.public_key().clone());

    let mult = initiator.start_multiplications(&counts(&[("yes", 1), ("no", 2)]));
    // The terminal party's count map does not know "no".
    let err = terminal
        .multiplication_forward(&counts(&[("yes", 1)]), &mult)
        .expect_err("class value missing");
    assert!(matches!(err, Error::UnknownClassValue(cv) if cv == ClassValue::from("no")));
}
