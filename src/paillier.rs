//! The Paillier cryptosystem, the additively homomorphic encryption scheme
//! underlying the secret-sharing engine in [`crate::computation`].
//!
//! Paillier ciphertexts support two homomorphisms that the protocol stack
//! relies on:
//!
//! - multiplying two ciphertexts yields an encryption of the *sum* of their
//!   plaintexts: `E(a) * E(b) mod n² = E(a + b mod n)`,
//! - raising a ciphertext to a plaintext power yields an encryption of the
//!   *product*: `E(a)^b mod n² = E(a * b mod n)`.
//!
//! The plaintext space is the integers modulo `n`, ciphertexts live modulo
//! `n²`. Only the party holding the [`KeyPair`] can decrypt; everyone else
//! works with the [`PublicKey`] alone.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::ThreadRng;

/// Number of Miller-Rabin rounds used during prime generation.
///
/// 25 random bases push the error probability below 2^-50, which is the
/// customary choice for key material of the sizes used here.
const MILLER_RABIN_ROUNDS: usize = 25;

/// The public half of a Paillier key pair.
///
/// Sufficient to encrypt and to perform the homomorphic operations, but not
/// to decrypt.
#[derive(Debug, Clone)]
pub struct PublicKey {
    n: BigUint,
    n_squared: BigUint,
    g: BigUint,
}

impl PublicKey {
    /// The modulus `n` of the plaintext space.
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// The modulus `n²` of the ciphertext space.
    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// Encrypts `plaintext` under this key with fresh randomness.
    ///
    /// Plaintexts are reduced modulo `n` before encryption, so callers may
    /// pass values from a larger domain (the protocol encrypts blinding
    /// values drawn modulo `n²`).
    pub fn encrypt(&self, plaintext: &BigUint) -> BigUint {
        let mut rng = rand::thread_rng();
        let r = loop {
            let r = rng.gen_biguint_below(&self.n);
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                break r;
            }
        };

        let m = plaintext % &self.n;
        let g_m = self.g.modpow(&m, &self.n_squared);
        let r_n = r.modpow(&self.n, &self.n_squared);
        (g_m * r_n) % &self.n_squared
    }
}

/// A full Paillier key pair, held only by the initiating party.
#[derive(Debug, Clone)]
pub struct KeyPair {
    public: PublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl KeyPair {
    /// Generates a fresh key pair whose modulus `n` has (roughly) the given
    /// bit length.
    ///
    /// The two primes are drawn independently at `bits / 2` each, so `n`
    /// ends up with `bits` or `bits - 1` significant bits.
    pub fn generate(bits: u64) -> KeyPair {
        let mut rng = rand::thread_rng();
        loop {
            let p = generate_prime(bits / 2, &mut rng);
            let q = generate_prime(bits / 2, &mut rng);
            if p == q {
                continue;
            }

            let n = &p * &q;
            let n_squared = &n * &n;
            let g = &n + 1u32;

            let one = BigUint::one();
            let lambda = (&p - &one).lcm(&(&q - &one));

            // mu = L(g^lambda mod n²)^-1 mod n, with L(u) = (u - 1) / n.
            let u = g.modpow(&lambda, &n_squared);
            let l = (&u - &one) / &n;
            let Some(mu) = l.modinv(&n) else {
                // gcd(L(g^lambda), n) != 1; only possible for degenerate
                // prime choices, so draw again.
                continue;
            };

            return KeyPair {
                public: PublicKey { n, n_squared, g },
                lambda,
                mu,
            };
        }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Decrypts `ciphertext`, returning the plaintext modulo `n`.
    pub fn decrypt(&self, ciphertext: &BigUint) -> BigUint {
        let n = &self.public.n;
        let u = ciphertext.modpow(&self.lambda, &self.public.n_squared);
        let l = (&u - 1u32) / n;
        (l * &self.mu) % n
    }
}

/// Draws random odd candidates of the given bit length until one passes the
/// Miller-Rabin test.
fn generate_prime(bits: u64, rng: &mut ThreadRng) -> BigUint {
    loop {
        let mut candidate = rng.gen_biguint(bits);
        // Force the top bit for the full length, the bottom bit for oddness.
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probable_prime(&candidate, rng) {
            return candidate;
        }
    }
}

const SMALL_PRIMES: [u32; 15] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47];

/// Miller-Rabin primality test with random bases.
fn is_probable_prime(n: &BigUint, rng: &mut ThreadRng) -> bool {
    for p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if n == &p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let one = BigUint::one();
    let two = &one + &one;
    let n_minus_one = n - &one;

    // n - 1 = d * 2^s with d odd
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let keys = KeyPair::generate(256);
        for m in [0u32, 1, 42, 65_537] {
            let m = BigUint::from(m);
            let c = keys.public_key().encrypt(&m);
            assert_eq!(keys.decrypt(&c), m);
        }
    }

    #[test]
    fn ciphertext_product_is_plaintext_sum() {
        let keys = KeyPair::generate(256);
        let pk = keys.public_key();
        let a = BigUint::from(1234u32);
        let b = BigUint::from(5678u32);
        let c = (pk.encrypt(&a) * pk.encrypt(&b)) % pk.n_squared();
        assert_eq!(keys.decrypt(&c), &a + &b);
    }

    #[test]
    fn ciphertext_power_is_plaintext_product() {
        let keys = KeyPair::generate(256);
        let pk = keys.public_key();
        let a = BigUint::from(321u32);
        let b = BigUint::from(17u32);
        let c = pk.encrypt(&a).modpow(&b, pk.n_squared());
        assert_eq!(keys.decrypt(&c), &a * &b);
    }

    #[test]
    fn encryption_is_randomized() {
        let keys = KeyPair::generate(256);
        let m = BigUint::from(7u32);
        let c1 = keys.public_key().encrypt(&m);
        let c2 = keys.public_key().encrypt(&m);
        assert_ne!(c1, c2);
    }
}
