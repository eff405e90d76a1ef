use num::traits::Pow;
use serde::{Deserialize, Serialize};

use crate::crypto::group::{gen_pow, generator, Element, Exponent};
use crate::crypto::hash::UInt256;
use crate::hash_elems;

/// A proof of possession of the secret `a` behind a published coefficient commitment
/// `K = g^a`.
///
/// The prover commits to `h = g^u` for a random `u`, derives `c = H(H_P; 0x10, i, j, K, h)`
/// and responds with `v = u - c·a (mod q)`. Only `(c, v)` are published; the verifier
/// recomputes `h = g^v · K^c` and checks the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    pub challenge: Exponent,
    pub response: Exponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Challenge,
}

impl SchnorrProof {
    /// Prove knowledge of `secret` for the `coefficient_index`-th commitment of the guardian
    /// at `x_coordinate`.
    pub fn prove(
        parameter_base_hash: &UInt256,
        x_coordinate: u32,
        coefficient_index: u32,
        secret: &Exponent,
        one_time_exponent: &Exponent,
    ) -> SchnorrProof {
        let commitment = gen_pow(secret);
        let h = gen_pow(one_time_exponent);
        let challenge =
            challenge(parameter_base_hash, x_coordinate, coefficient_index, &commitment, &h);
        let response = one_time_exponent - &(&challenge * secret);
        SchnorrProof {
            challenge,
            response,
        }
    }

    pub fn check(
        &self,
        parameter_base_hash: &UInt256,
        x_coordinate: u32,
        coefficient_index: u32,
        commitment: &Element,
    ) -> Result<(), Error> {
        let h = &generator().pow(&self.response) * &commitment.pow(&self.challenge);
        let expected = challenge(
            parameter_base_hash,
            x_coordinate,
            coefficient_index,
            commitment,
            &h,
        );
        if expected == self.challenge {
            Ok(())
        } else {
            Err(Error::Challenge)
        }
    }
}

fn challenge(
    parameter_base_hash: &UInt256,
    x_coordinate: u32,
    coefficient_index: u32,
    commitment: &Element,
    h: &Element,
) -> Exponent {
    hash_elems!(parameter_base_hash; 0x10_u8, x_coordinate, coefficient_index, commitment, h)
        .to_exponent()
}
