//! Reconstruction properties of the secure addition/multiplication engine
//! across whole party chains.

use std::sync::{Arc, OnceLock};

use num_bigint::BigUint;
use proptest::collection::vec;
use proptest::prelude::*;
use secure_id3::computation::{
    Addition, Initiator, Multiplication, Operation, Participant, reconstruct,
};
use secure_id3::paillier::KeyPair;

/// Key generation dominates the test runtime, so all chains share one pair.
fn keys() -> Arc<KeyPair> {
    static KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyPair::generate(256))).clone()
}

/// Runs a full forward/backward pass over a chain with the given inputs,
/// the first input belonging to the initiator, and reconstructs the result.
fn run_chain<O: Operation>(inputs: &[u64]) -> BigUint {
    let keys = keys();
    let mut initiator = Initiator::new(inputs[0], keys.clone());
    let mut participants: Vec<Participant<O>> = inputs[1..]
        .iter()
        .map(|&input| Participant::new(input, keys.public_key().clone()))
        .collect();

    let mut ciphertext = initiator.start();
    for participant in &mut participants {
        ciphertext = participant.forward_step(&ciphertext).expect("in order");
    }
    for participant in &mut participants {
        ciphertext = participant.backward_step(&ciphertext).expect("in order");
    }
    initiator.decrypt_output_share(&ciphertext);

    let shares: Vec<BigUint> = initiator
        .output_share()
        .into_iter()
        .chain(participants.iter().filter_map(Participant::output_share))
        .cloned()
        .collect();
    assert_eq!(shares.len(), inputs.len());

    reconstruct::<O>(keys.public_key().n(), &shares)
}

#[test]
fn addition_reconstructs_two_party_sum() {
    assert_eq!(run_chain::<Addition>(&[10, 5]), BigUint::from(15u32));
}

#[test]
fn addition_reconstructs_four_party_sum() {
    assert_eq!(run_chain::<Addition>(&[10, 5, 12, 4]), BigUint::from(31u32));
}

#[test]
fn addition_of_zeros_reconstructs_zero() {
    assert_eq!(run_chain::<Addition>(&[0, 0, 0]), BigUint::from(0u32));
}

#[test]
fn multiplication_reconstructs_two_party_product() {
    assert_eq!(run_chain::<Multiplication>(&[6, 7]), BigUint::from(42u32));
}

#[test]
fn multiplication_with_zero_factor_reconstructs_zero() {
    assert_eq!(run_chain::<Multiplication>(&[13, 0]), BigUint::from(0u32));
}

#[test]
fn multiplication_reconstructs_three_party_product() {
    assert_eq!(
        run_chain::<Multiplication>(&[3, 11, 20]),
        BigUint::from(660u32)
    );
}

#[test]
fn reconstruction_is_invariant_to_role_assignment() {
    // The same inputs must reconstruct to the same result no matter which
    // party acts as initiator.
    assert_eq!(run_chain::<Addition>(&[23, 42]), run_chain::<Addition>(&[42, 23]));
    assert_eq!(
        run_chain::<Multiplication>(&[23, 42]),
        run_chain::<Multiplication>(&[42, 23])
    );
}

proptest! {
    // Chains are expensive (every step is a Paillier operation), so keep the
    // case count moderate.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn addition_reconstructs_any_sum(inputs in vec(0u64..=u32::MAX as u64, 1..5)) {
        let expected: u64 = inputs.iter().sum();
        prop_assert_eq!(run_chain::<Addition>(&inputs), BigUint::from(expected));
    }

    #[test]
    fn multiplication_reconstructs_any_product(inputs in vec(0u64..=0xFFFF, 1..5)) {
        let expected: u64 = inputs.iter().product();
        prop_assert_eq!(run_chain::<Multiplication>(&inputs), BigUint::from(expected));
    }
}
