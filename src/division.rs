//! The secure square-division protocol computing the Gini-impurity ratio of
//! one `(attribute, value)` split without revealing any party's counts.
//!
//! For per-class counts `c_i` held by the individual parties, the protocol
//! computes the two scalars
//!
//! ```text
//! Z = Σ_class (Σ_party c)²      W = Σ_class Σ_party c
//! ```
//!
//! using the identity `(x + y)² = x² + y² + 2xy`: one multiplication round of
//! the [`crate::computation`] engine per class value obtains the cross-term
//! `2xy` in secret-shared form, and one addition round combines the local
//! `Z` and `W` contributions of all parties. The ratio `Z / W` is revealed
//! only to the initiator, and only after all modular recombination; the
//! individual counts never leave their party.
//!
//! [`SquareDivisionInitiator`] is the querying side, [`SquareDivisionTerminal`]
//! the last (and in this implementation: only) hop of the chain, acting as
//! multiplication and addition participant in the same message exchange.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::computation::{
    Addition, Initiator, Multiplication, Participant, StepError, reconstruct,
};
use crate::messages::{
    AdditionResults, ClassValue, GiniGainResult, MultiplicationResult, SquareDivisionResult,
};
use crate::paillier::{KeyPair, PublicKey};

/// A failure of one square-division instance.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message referenced a class value absent from the local count map.
    #[error("class value {0} is missing from the expected count map")]
    UnknownClassValue(ClassValue),
    /// A message arrived for a protocol phase this instance has not reached.
    #[error("instance has not completed the {0} phase")]
    PhaseNotReached(&'static str),
    /// The underlying computation engine rejected a step.
    #[error(transparent)]
    Step(#[from] StepError),
}

/// Initiator side of one square-division computation.
///
/// Driven by the initiator controller through the forward/backward rounds in
/// order: [`start_multiplications`](Self::start_multiplications),
/// [`multiplication_backward`](Self::multiplication_backward),
/// [`addition_backward`](Self::addition_backward),
/// [`compute_result`](Self::compute_result).
#[derive(Debug)]
pub struct SquareDivisionInitiator {
    keys: Arc<KeyPair>,
    multiplications: BTreeMap<ClassValue, Initiator>,
    z: Option<Initiator>,
    w: Option<Initiator>,
    class_value: Option<ClassValue>,
}

impl SquareDivisionInitiator {
    /// Creates a fresh instance for one `(attribute, value)` query.
    pub fn new(keys: Arc<KeyPair>) -> Self {
        SquareDivisionInitiator {
            keys,
            multiplications: BTreeMap::new(),
            z: None,
            w: None,
            class_value: None,
        }
    }

    /// Starts one multiplication-engine instance per class value, seeded with
    /// the local count, and returns the ciphertexts entering the forward
    /// pass.
    pub fn start_multiplications(
        &mut self,
        counts: &BTreeMap<ClassValue, u64>,
    ) -> Vec<MultiplicationResult> {
        let mut results = Vec::with_capacity(counts.len());
        for (class_value, &count) in counts {
            if count != 0 {
                self.class_value = Some(class_value.clone());
            }

            let multiplication = Initiator::new(count, self.keys.clone());
            let ciphertext = multiplication.start();
            self.multiplications
                .insert(class_value.clone(), multiplication);

            results.push(MultiplicationResult {
                class_value: class_value.clone(),
                ciphertext,
            });
        }
        results
    }

    /// Consumes the backward multiplication results, decrypting the per-class
    /// cross-term shares, and starts the addition round for the local `Z` and
    /// `W` contributions.
    pub fn multiplication_backward(
        &mut self,
        results: &[MultiplicationResult],
    ) -> Result<AdditionResults, Error> {
        for result in results {
            let multiplication = self
                .multiplications
                .get_mut(&result.class_value)
                .ok_or_else(|| Error::UnknownClassValue(result.class_value.clone()))?;
            multiplication.decrypt_output_share(&result.ciphertext);
        }

        let z = Initiator::new(self.local_z()?, self.keys.clone());
        let w = Initiator::new(self.local_w(), self.keys.clone());
        let results = AdditionResults {
            for_z: z.start(),
            for_w: w.start(),
        };
        self.z = Some(z);
        self.w = Some(w);
        Ok(results)
    }

    /// Decrypts the initiator's own `Z` and `W` addition output shares from
    /// the backward addition results.
    pub fn addition_backward(&mut self, results: &AdditionResults) -> Result<(), Error> {
        let z = self
            .z
            .as_mut()
            .ok_or(Error::PhaseNotReached("addition forward"))?;
        z.decrypt_output_share(&results.for_z);
        let w = self
            .w
            .as_mut()
            .ok_or(Error::PhaseNotReached("addition forward"))?;
        w.decrypt_output_share(&results.for_w);
        Ok(())
    }

    /// Recombines the initiator's shares with the terminal parties' shares
    /// into the plain `(Z, W)` pair, modulo `n`.
    pub fn reconstruct_z_w(
        &self,
        shares: &[SquareDivisionResult],
    ) -> Result<(BigUint, BigUint), Error> {
        let own_z = self
            .z
            .as_ref()
            .and_then(Initiator::output_share)
            .ok_or(Error::PhaseNotReached("addition backward"))?;
        let own_w = self
            .w
            .as_ref()
            .and_then(Initiator::output_share)
            .ok_or(Error::PhaseNotReached("addition backward"))?;

        let n = self.keys.public_key().n();
        let z = reconstruct::<Addition>(
            n,
            std::iter::once(own_z).chain(shares.iter().map(|s| &s.output_share_z)),
        );
        let w = reconstruct::<Addition>(
            n,
            std::iter::once(own_w).chain(shares.iter().map(|s| &s.output_share_w)),
        );
        Ok((z, w))
    }

    /// Computes the final ratio from the terminal parties' output shares.
    ///
    /// The resolved class value is the last one reported by a terminal
    /// party, defaulting to the initiator's own locally observed nonzero
    /// class value. `W == 0` is a defined boundary case yielding ratio `0`.
    pub fn compute_result(&self, shares: &[SquareDivisionResult]) -> Result<GiniGainResult, Error> {
        let (z, w) = self.reconstruct_z_w(shares)?;

        let mut class_value = self.class_value.clone();
        for share in shares {
            if share.class_value.is_some() {
                class_value = share.class_value.clone();
            }
        }

        let ratio = if w.is_zero() {
            0.0
        } else {
            z.to_f64().unwrap_or(f64::INFINITY) / w.to_f64().unwrap_or(f64::INFINITY)
        };

        Ok(GiniGainResult { class_value, ratio })
    }

    /// `Σ count² + 2 Σ cross-term-share` over all per-class multiplications.
    fn local_z(&self) -> Result<BigUint, Error> {
        let mut result = BigUint::zero();
        for multiplication in self.multiplications.values() {
            let share = multiplication
                .output_share()
                .ok_or(Error::PhaseNotReached("multiplication backward"))?;
            result += multiplication.private_input().pow(2);
            result += share * 2u32;
        }
        Ok(result)
    }

    /// `Σ count` over all per-class multiplications.
    fn local_w(&self) -> BigUint {
        self.multiplications
            .values()
            .map(|m| m.private_input())
            .sum()
    }
}

/// Terminal-party side of one square-division computation.
///
/// The terminal party is the last hop of the chain, so it takes both the
/// forward and the backward step of each round within a single message
/// exchange.
#[derive(Debug)]
pub struct SquareDivisionTerminal {
    key: PublicKey,
    multiplications: BTreeMap<ClassValue, Participant<Multiplication>>,
    inputs: Vec<BigUint>,
    multiplication_shares: Vec<BigUint>,
    z: Option<Participant<Addition>>,
    w: Option<Participant<Addition>>,
    class_value: Option<ClassValue>,
}

impl SquareDivisionTerminal {
    /// Creates a fresh instance for one `(attribute, value)` query.
    pub fn new(key: PublicKey) -> Self {
        SquareDivisionTerminal {
            key,
            multiplications: BTreeMap::new(),
            inputs: Vec::new(),
            multiplication_shares: Vec::new(),
            z: None,
            w: None,
            class_value: None,
        }
    }

    /// Runs the multiplication forward step for every class value present in
    /// the initiator's message, seeded with the local counts.
    pub fn multiplication_forward(
        &mut self,
        counts: &BTreeMap<ClassValue, u64>,
        prev: &[MultiplicationResult],
    ) -> Result<Vec<MultiplicationResult>, Error> {
        let mut results = Vec::with_capacity(prev.len());
        for result in prev {
            let count = *counts
                .get(&result.class_value)
                .ok_or_else(|| Error::UnknownClassValue(result.class_value.clone()))?;
            if count != 0 {
                self.class_value = Some(result.class_value.clone());
            }
            self.inputs.push(BigUint::from(count));

            let mut multiplication: Participant<Multiplication> =
                Participant::new(count, self.key.clone());
            let ciphertext = multiplication.forward_step(&result.ciphertext)?;
            self.multiplications
                .insert(result.class_value.clone(), multiplication);

            results.push(MultiplicationResult {
                class_value: result.class_value.clone(),
                ciphertext,
            });
        }
        Ok(results)
    }

    /// Runs the multiplication backward step, retaining the per-class output
    /// shares for the later `Z` computation.
    pub fn multiplication_backward(
        &mut self,
        prev: &[MultiplicationResult],
    ) -> Result<Vec<MultiplicationResult>, Error> {
        let mut results = Vec::with_capacity(prev.len());
        for result in prev {
            let multiplication = self
                .multiplications
                .get_mut(&result.class_value)
                .ok_or_else(|| Error::UnknownClassValue(result.class_value.clone()))?;
            let ciphertext = multiplication.backward_step(&result.ciphertext)?;

            let share = multiplication
                .output_share()
                .ok_or(Error::PhaseNotReached("multiplication backward"))?;
            self.multiplication_shares.push(share.clone());

            results.push(MultiplicationResult {
                class_value: result.class_value.clone(),
                ciphertext,
            });
        }
        Ok(results)
    }

    /// Runs the addition forward step over the local `Z` and `W`
    /// contributions.
    pub fn addition_forward(&mut self, prev: &AdditionResults) -> Result<AdditionResults, Error> {
        let mut z: Participant<Addition> = Participant::new(self.local_z(), self.key.clone());
        let mut w: Participant<Addition> = Participant::new(self.local_w(), self.key.clone());

        let results = AdditionResults {
            for_z: z.forward_step(&prev.for_z)?,
            for_w: w.forward_step(&prev.for_w)?,
        };
        self.z = Some(z);
        self.w = Some(w);
        Ok(results)
    }

    /// Runs the addition backward step, generating this party's `Z` and `W`
    /// output shares.
    pub fn addition_backward(&mut self, prev: &AdditionResults) -> Result<AdditionResults, Error> {
        let z = self
            .z
            .as_mut()
            .ok_or(Error::PhaseNotReached("addition forward"))?;
        let for_z = z.backward_step(&prev.for_z)?;
        let w = self
            .w
            .as_mut()
            .ok_or(Error::PhaseNotReached("addition forward"))?;
        let for_w = w.backward_step(&prev.for_w)?;
        Ok(AdditionResults { for_z, for_w })
    }

    /// Reports this party's `Z` and `W` output shares plus its locally
    /// resolved class value.
    pub fn output_shares(&self) -> Result<SquareDivisionResult, Error> {
        let output_share_z = self
            .z
            .as_ref()
            .and_then(Participant::output_share)
            .ok_or(Error::PhaseNotReached("addition backward"))?;
        let output_share_w = self
            .w
            .as_ref()
            .and_then(Participant::output_share)
            .ok_or(Error::PhaseNotReached("addition backward"))?;

        Ok(SquareDivisionResult {
            output_share_z: output_share_z.clone(),
            output_share_w: output_share_w.clone(),
            class_value: self.class_value.clone(),
        })
    }

    fn local_z(&self) -> BigUint {
        let squares: BigUint = self.inputs.iter().map(|input| input.pow(2)).sum();
        let cross_terms: BigUint = self.multiplication_shares.iter().map(|s| s * 2u32).sum();
        squares + cross_terms
    }

    fn local_w(&self) -> BigUint {
        self.inputs.iter().sum()
    }
}
