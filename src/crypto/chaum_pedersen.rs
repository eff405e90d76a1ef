use num::traits::Pow;
use serde::{Deserialize, Serialize};

use crate::crypto::group::{generator, Element, Exponent};

/// A compact Chaum-Pedersen proof of discrete-log equality, `(c, v)`.
///
/// It proves that the prover knows `s` with `K = g^s` and `M = A^s` for a public key `K`, a
/// ciphertext pad `A` and a decryption mask `M`, without revealing `s`. The commitments
/// `(a, b) = (g^u, A^u)` are not stored: the verifier recomputes them as
///
/// * `a = g^v · K^c`
/// * `b = A^v · M^c`
///
/// and accepts iff hashing the transcript with those commitments reproduces `c`. The
/// response satisfies `v = u - c·s (mod q)`.
///
/// In threshold decryption `u`, `s` and `v` are never held by one party: each trustee holds
/// its own `u_i` and share `s_i`, and the combined proof has the same shape as a proof by a
/// single key holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaumPedersenProof {
    pub challenge: Exponent,
    pub response: Exponent,
}

impl ChaumPedersenProof {
    pub fn new(challenge: Exponent, response: Exponent) -> ChaumPedersenProof {
        ChaumPedersenProof {
            challenge,
            response,
        }
    }

    /// Recompute the commitments `(a, b)` for `public_key`, `pad` and `mask`.
    pub fn commitments(
        &self,
        public_key: &Element,
        pad: &Element,
        mask: &Element,
    ) -> (Element, Element) {
        let c = &self.challenge;
        let v = &self.response;
        let a = &generator().pow(v) * &public_key.pow(c);
        let b = &pad.pow(v) * &mask.pow(c);
        (a, b)
    }

    /// Use this proof to establish that `mask = pad^s` where `public_key = g^s`. The callback
    /// `gen_challenge` maps the recomputed commitments to the expected challenge.
    pub fn verify_decryption(
        &self,
        public_key: &Element,
        pad: &Element,
        mask: &Element,
        gen_challenge: impl FnOnce(&Element, &Element) -> Exponent,
    ) -> bool {
        let (a, b) = self.commitments(public_key, pad, mask);
        gen_challenge(&a, &b) == self.challenge
    }

    /// Check the transcript against commitments that are already known, as the orchestrator
    /// does for each trustee's partial response: `a == g^v·K^c` and `b == A^v·M^c`.
    pub fn transcript_ok(
        &self,
        public_key: &Element,
        pad: &Element,
        mask: &Element,
        a: &Element,
        b: &Element,
    ) -> bool {
        let (expected_a, expected_b) = self.commitments(public_key, pad, mask);
        &expected_a == a && &expected_b == b
    }
}
