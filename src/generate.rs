//! A trusted-dealer election for simulations and tests.
//!
//! This is not a key ceremony: one party draws every guardian's polynomial and hands out the
//! shares. In a real election each guardian draws its own polynomial and the shares travel over
//! private channels, but the published records and the resulting key shares have the same form.

use num::traits::{One, Zero};
use num::BigUint;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::elgamal::Ciphertext;
use crate::crypto::group::{gen_pow, random_exponent, Exponent};
use crate::crypto::hashed_elgamal::HashedCiphertext;
use crate::crypto::schnorr::SchnorrProof;
use crate::decryption::ballot::{
    EncryptedBallot, EncryptedContest, EncryptedSelection, CONTEST_DATA_LABEL,
};
use crate::election::{compute_parameter_base_hash, ElectionContext};
use crate::errors::Error;
use crate::guardian::{Guardian, Guardians};
use crate::trustee::{DecryptingTrustee, Trustee};

pub struct GeneratedElection {
    pub context: ElectionContext,
    pub guardians: Arc<Guardians>,
    /// Indexed like the roster: trustee `i` has x coordinate `i + 1`.
    pub trustees: Vec<Arc<DecryptingTrustee>>,
    /// The joint secret `s = Σ_i a_i0`. Only a dealer knows it.
    pub secret_key: Exponent,
}

impl GeneratedElection {
    /// The trustees at the given x coordinates, as the orchestrator takes them.
    pub fn present(&self, x_coordinates: &[u32]) -> Vec<Arc<dyn Trustee>> {
        self.trustees
            .iter()
            .filter(|t| x_coordinates.contains(&t.x_coordinate()))
            .map(|t| Arc::clone(t) as Arc<dyn Trustee>)
            .collect()
    }

    pub fn all_present(&self) -> Vec<Arc<dyn Trustee>> {
        self.trustees
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn Trustee>)
            .collect()
    }
}

/// Deal a `quorum`-of-`number_of_guardians` election over `manifest`.
pub fn generate(
    rng: &mut impl Rng,
    manifest: &str,
    number_of_guardians: u32,
    quorum: u32,
    session_ttl: Duration,
) -> Result<GeneratedElection, Error> {
    let parameter_base_hash = compute_parameter_base_hash();

    // coefficients[i][j] = a_ij, the j-th coefficient of guardian i's polynomial.
    let coefficients: Vec<Vec<Exponent>> = (0..number_of_guardians)
        .map(|_| (0..quorum).map(|_| random_exponent(rng)).collect())
        .collect();

    let mut guardians = Vec::with_capacity(coefficients.len());
    for (i, poly) in coefficients.iter().enumerate() {
        let x = i as u32 + 1;
        let coefficient_proofs = poly
            .iter()
            .enumerate()
            .map(|(j, a)| {
                SchnorrProof::prove(&parameter_base_hash, x, j as u32, a, &random_exponent(rng))
            })
            .collect();
        guardians.push(Guardian {
            guardian_id: guardian_id(x),
            x_coordinate: x,
            coefficient_commitments: poly.iter().map(gen_pow).collect(),
            coefficient_proofs,
        });
    }

    let guardians = Guardians::new(guardians)?;
    let context = ElectionContext::new(manifest, &guardians, quorum)?;

    let trustees = guardians
        .iter()
        .map(|g| {
            let share = key_share(&coefficients, g.x_coordinate);
            Arc::new(DecryptingTrustee::new(
                g.guardian_id.clone(),
                g.x_coordinate,
                gen_pow(&coefficients[g.x_coordinate as usize - 1][0]),
                share,
                session_ttl,
            ))
        })
        .collect();

    let secret_key = coefficients
        .iter()
        .fold(Exponent::zero(), |s, poly| &s + &poly[0]);

    Ok(GeneratedElection {
        context,
        guardians: Arc::new(guardians),
        trustees,
        secret_key,
    })
}

pub fn guardian_id(x_coordinate: u32) -> String {
    format!("guardian-{}", x_coordinate)
}

/// `P(x) = Σ_i Σ_j a_ij·x^j`, the share of the guardian at `x`.
fn key_share(coefficients: &[Vec<Exponent>], x: u32) -> Exponent {
    let x = Exponent::new(BigUint::from(x));
    let mut share = Exponent::zero();
    for poly in coefficients {
        let mut x_pow = Exponent::one();
        for a in poly {
            share = &share + &(a * &x_pow);
            x_pow = &x_pow * &x;
        }
    }
    share
}

/// Encrypt one ballot: `votes[c][s]` is the value of selection `s` in contest `c`, and
/// `contest_data[c]`, if present, is that contest's payload.
pub fn encrypt_ballot(
    rng: &mut impl Rng,
    context: &ElectionContext,
    ballot_id: &str,
    votes: &[Vec<u32>],
    contest_data: &[Option<Vec<u8>>],
) -> EncryptedBallot {
    let k = &context.joint_public_key;
    let contests = votes
        .iter()
        .enumerate()
        .map(|(c, selections)| {
            let contest_id = contest_id(c);
            let selections = selections
                .iter()
                .enumerate()
                .map(|(s, &v)| EncryptedSelection {
                    selection_id: selection_id(s),
                    ciphertext: Ciphertext::encrypt(k, v, &random_exponent(rng)),
                })
                .collect();
            let contest_data = contest_data.get(c).and_then(Option::as_ref).map(|data| {
                HashedCiphertext::encrypt(
                    data,
                    k,
                    &context.extended_base_hash,
                    CONTEST_DATA_LABEL,
                    &contest_id,
                    &random_exponent(rng),
                )
            });
            EncryptedContest {
                contest_id,
                selections,
                contest_data,
            }
        })
        .collect();
    EncryptedBallot {
        ballot_id: ballot_id.to_owned(),
        contests,
    }
}

pub fn contest_id(index: usize) -> String {
    format!("contest-{}", index)
}

pub fn selection_id(index: usize) -> String {
    format!("selection-{}", index)
}
