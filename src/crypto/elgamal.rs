use num::traits::{One, Pow};
use num::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::group::{gen_pow, Element, Exponent};

/// An exponential ElGamal ciphertext `(A, B) = (g^ξ, K^(m + ξ))`, where `K` is the joint
/// election public key, `m` the plaintext and `ξ` the one-time nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    /// The one-time public key `A = g^ξ`.
    pub pad: Element,
    /// The encoding `B = K^(m + ξ)`.
    pub data: Element,
}

impl Ciphertext {
    pub fn encrypt(public_key: &Element, plaintext: u32, nonce: &Exponent) -> Ciphertext {
        let exponent = nonce + &Exponent::new(BigUint::from(plaintext));
        Ciphertext {
            pad: gen_pow(nonce),
            data: public_key.pow(&exponent),
        }
    }

    /// `(1, 1)` encrypts zero under any key, with zero as the nonce.
    pub fn zero() -> Ciphertext {
        Ciphertext {
            pad: Element::one(),
            data: Element::one(),
        }
    }

    /// Homomorphic addition: the result encrypts the sum of the two plaintexts.
    pub fn h_add(&self, other: &Ciphertext) -> Ciphertext {
        Ciphertext {
            pad: &self.pad * &other.pad,
            data: &self.data * &other.data,
        }
    }

    /// Remove the mask `M = A^s` from `B`, leaving `K^m`.
    pub fn unmask(&self, mask: &Element) -> Element {
        &self.data / mask
    }

    /// Decrypt with the full election secret `s`, returning `K^m`. Only a test or a single
    /// key holder can do this; threshold decryption reconstructs the same mask without `s`.
    pub fn decrypt_with_secret(&self, secret_key: &Exponent) -> Element {
        self.unmask(&self.pad.pow(secret_key))
    }
}
