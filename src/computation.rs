//! The generic two-role secret-sharing engine for secure addition and
//! multiplication.
//!
//! One [`Initiator`] and one or more [`Participant`]s compute the sum or the
//! product of their private inputs without any message in transit revealing an
//! operand. A protocol run proceeds in two passes through a fixed chain of
//! parties:
//!
//! 1. The initiator encrypts its input ([`Initiator::start`]) and the
//!    resulting ciphertext travels through every participant's
//!    [`Participant::forward_step`], homomorphically accumulating the inputs.
//! 2. The ciphertext travels back through every participant's
//!    [`Participant::backward_step`], where each party strips off a freshly
//!    drawn random *output share*. The initiator decrypts the fully unwound
//!    ciphertext ([`Initiator::decrypt_output_share`]) to obtain its own
//!    share.
//!
//! Combining all output shares with [`reconstruct`] yields the true result;
//! any proper subset of shares is uniformly random and reveals nothing.
//!
//! The forward pass must visit every participant exactly once before the
//! backward pass begins, and the backward pass must visit the same parties in
//! the same order. Each [`Participant`] tracks its protocol round and refuses
//! out-of-order or repeated steps with a [`StepError`] instead of silently
//! corrupting the result.

use std::marker::PhantomData;
use std::sync::Arc;

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};

use crate::paillier::{KeyPair, PublicKey};

/// A violation of the forward/backward step sequencing of a protocol run.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StepError {
    /// The forward step of this instance was already taken.
    #[error("forward step was already taken for this instance")]
    ForwardAlreadyTaken,
    /// A backward step was attempted before (or after) its time.
    #[error("backward step requires exactly one preceding forward step")]
    BackwardOutOfOrder,
    /// A ciphertext or blinding value had no inverse modulo n².
    #[error("value is not invertible modulo n squared")]
    NotInvertible,
}

/// One of the two arithmetic operations the engine can be instantiated with.
///
/// Implemented by the [`Addition`] and [`Multiplication`] markers; the
/// methods define how a party folds its input into the travelling ciphertext,
/// how it strips off its output share, and how output shares recombine into
/// the final result.
pub trait Operation {
    /// Folds `input` into the intermediate ciphertext `prev` of the previous
    /// party.
    fn forward(input: &BigUint, key: &PublicKey, prev: &BigUint) -> BigUint;

    /// Draws a fresh random output share in `[0, n²)`.
    fn draw_share(key: &PublicKey) -> BigUint;

    /// Removes `share` from the intermediate ciphertext `prev`.
    fn backward(share: &BigUint, key: &PublicKey, prev: &BigUint) -> Result<BigUint, StepError>;

    /// The neutral element of the share recombination.
    fn identity() -> BigUint;

    /// Folds one output share into the recombination accumulator, modulo `n`.
    fn combine(acc: BigUint, share: &BigUint, n: &BigUint) -> BigUint;
}

/// Secure summation: the travelling ciphertext accumulates inputs via the
/// additive homomorphism, shares recombine multiplicatively.
#[derive(Debug)]
pub enum Addition {}

impl Operation for Addition {
    fn forward(input: &BigUint, key: &PublicKey, prev: &BigUint) -> BigUint {
        (key.encrypt(input) * prev) % key.n_squared()
    }

    fn draw_share(key: &PublicKey) -> BigUint {
        // The addition backward step raises the ciphertext to the inverse of
        // the share, so only invertible shares are usable.
        let mut rng = rand::thread_rng();
        loop {
            let share = rng.gen_biguint_below(key.n_squared());
            if share.modinv(key.n_squared()).is_some() {
                return share;
            }
        }
    }

    fn backward(share: &BigUint, key: &PublicKey, prev: &BigUint) -> Result<BigUint, StepError> {
        let inverse = share
            .modinv(key.n_squared())
            .ok_or(StepError::NotInvertible)?;
        Ok(prev.modpow(&inverse, key.n_squared()))
    }

    fn identity() -> BigUint {
        BigUint::one()
    }

    fn combine(acc: BigUint, share: &BigUint, n: &BigUint) -> BigUint {
        (acc * share) % n
    }
}

/// Secure multiplication: the travelling ciphertext accumulates inputs via
/// exponentiation, shares recombine additively.
#[derive(Debug)]
pub enum Multiplication {}

impl Operation for Multiplication {
    fn forward(input: &BigUint, key: &PublicKey, prev: &BigUint) -> BigUint {
        prev.modpow(input, key.n_squared())
    }

    fn draw_share(key: &PublicKey) -> BigUint {
        rand::thread_rng().gen_biguint_below(key.n_squared())
    }

    fn backward(share: &BigUint, key: &PublicKey, prev: &BigUint) -> Result<BigUint, StepError> {
        let blind = key
            .encrypt(share)
            .modinv(key.n_squared())
            .ok_or(StepError::NotInvertible)?;
        Ok((prev * blind) % key.n_squared())
    }

    fn identity() -> BigUint {
        BigUint::zero()
    }

    fn combine(acc: BigUint, share: &BigUint, n: &BigUint) -> BigUint {
        (acc + share) % n
    }
}

/// Protocol round a [`Participant`] is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Created,
    Forwarded,
    Finished,
}

/// The party that starts a secure computation and is the only one able to
/// decrypt.
///
/// Its output share is the decrypted backward-pass result rather than a
/// random value.
#[derive(Debug)]
pub struct Initiator {
    private_input: BigUint,
    keys: Arc<KeyPair>,
    output_share: Option<BigUint>,
}

impl Initiator {
    /// Creates an initiator over `private_input`.
    pub fn new(private_input: impl Into<BigUint>, keys: Arc<KeyPair>) -> Self {
        Initiator {
            private_input: private_input.into(),
            keys,
            output_share: None,
        }
    }

    /// Encrypts the private input, producing the ciphertext that enters the
    /// forward pass.
    pub fn start(&self) -> BigUint {
        self.keys.public_key().encrypt(&self.private_input)
    }

    /// Decrypts the fully unwound backward-pass ciphertext and stores the
    /// plaintext as this party's output share.
    pub fn decrypt_output_share(&mut self, ciphertext: &BigUint) {
        self.output_share = Some(self.keys.decrypt(ciphertext));
    }

    /// The input this party contributes.
    pub fn private_input(&self) -> &BigUint {
        &self.private_input
    }

    /// The output share, once [`Initiator::decrypt_output_share`] has run.
    pub fn output_share(&self) -> Option<&BigUint> {
        self.output_share.as_ref()
    }
}

/// A non-initiating party in a secure computation chain.
///
/// Generic over the [`Operation`]; use `Participant<Addition>` or
/// `Participant<Multiplication>`.
#[derive(Debug)]
pub struct Participant<O> {
    private_input: BigUint,
    key: PublicKey,
    output_share: Option<BigUint>,
    round: Round,
    _op: PhantomData<O>,
}

impl<O: Operation> Participant<O> {
    /// Creates a participant over `private_input`, encrypting under `key`.
    pub fn new(private_input: impl Into<BigUint>, key: PublicKey) -> Self {
        Participant {
            private_input: private_input.into(),
            key,
            output_share: None,
            round: Round::Created,
            _op: PhantomData,
        }
    }

    /// Folds this party's input into the intermediate result of the previous
    /// party and advances to the backward round.
    pub fn forward_step(&mut self, prev: &BigUint) -> Result<BigUint, StepError> {
        if self.round != Round::Created {
            return Err(StepError::ForwardAlreadyTaken);
        }
        self.round = Round::Forwarded;
        Ok(O::forward(&self.private_input, &self.key, prev))
    }

    /// Draws a fresh output share, strips it off the intermediate result and
    /// finishes this instance.
    pub fn backward_step(&mut self, prev: &BigUint) -> Result<BigUint, StepError> {
        if self.round != Round::Forwarded {
            return Err(StepError::BackwardOutOfOrder);
        }
        let share = O::draw_share(&self.key);
        let result = O::backward(&share, &self.key, prev)?;
        self.output_share = Some(share);
        self.round = Round::Finished;
        Ok(result)
    }

    /// The input this party contributes.
    pub fn private_input(&self) -> &BigUint {
        &self.private_input
    }

    /// The output share, once the backward step has run.
    pub fn output_share(&self) -> Option<&BigUint> {
        self.output_share.as_ref()
    }
}

/// Recombines the output shares of all parties into the final result,
/// modulo `n`.
///
/// The caller must pass exactly one share per party (initiator included);
/// fewer shares yield a uniformly random value.
pub fn reconstruct<'a, O: Operation>(
    n: &BigUint,
    shares: impl IntoIterator<Item = &'a BigUint>,
) -> BigUint {
    shares
        .into_iter()
        .fold(O::identity(), |acc, share| O::combine(acc, share, n))
}
