use num::traits::{One, Pow};
use num::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::crypto::group::{Element, Exponent};
use crate::crypto::hash::UInt256;
use crate::crypto::schnorr::SchnorrProof;
use crate::errors::{Error, ErrorContext, ErrorMessages};
use crate::metrics::{Metrics, MetricsSnapshot};

/// The published record of one guardian after the key ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub guardian_id: String,

    /// The point at which the other guardians evaluated their polynomials for this guardian's
    /// key share. Unique and positive.
    pub x_coordinate: u32,

    /// `K_ij = g^{a_ij}` for the guardian's secret polynomial coefficients `a_ij`.
    pub coefficient_commitments: Vec<Element>,

    /// One proof of possession per commitment.
    pub coefficient_proofs: Vec<SchnorrProof>,
}

impl Guardian {
    /// The guardian's election public key `K_i0`.
    pub fn public_key(&self) -> Option<&Element> {
        self.coefficient_commitments.get(0)
    }

    /// Check every coefficient proof and that commitments and proofs line up.
    pub fn validate(&self, parameter_base_hash: &UInt256, ctx: &mut ErrorContext) {
        let mut ctx = ctx.scope(format!("guardian {}", self.guardian_id));
        ctx.check(
            self.coefficient_commitments.len() == self.coefficient_proofs.len(),
            format!(
                "{} commitments but {} proofs",
                self.coefficient_commitments.len(),
                self.coefficient_proofs.len()
            ),
        );
        for (j, (commitment, proof)) in self
            .coefficient_commitments
            .iter()
            .zip(&self.coefficient_proofs)
            .enumerate()
        {
            ctx.check(
                commitment.is_valid_residue(),
                format!("commitment {} is not a valid residue", j),
            );
            if proof
                .check(parameter_base_hash, self.x_coordinate, j as u32, commitment)
                .is_err()
            {
                ctx.add(format!("coefficient proof {} does not verify", j));
            }
        }
    }

    /// `Π_k K_ik^{x^k}`: this guardian's polynomial evaluated in the exponent at `x`.
    fn commitment_at(&self, x: u32) -> (Element, u64) {
        let x = Exponent::new(BigUint::from(x));
        let mut x_pow = Exponent::one();
        let mut product = Element::one();
        for commitment in &self.coefficient_commitments {
            product = &product * &commitment.pow(&x_pow);
            x_pow = &x_pow * &x;
        }
        (product, self.coefficient_commitments.len() as u64)
    }
}

/// The full guardian roster, with `g^{P(x_ℓ)}` cached for every guardian `ℓ`.
///
/// `gexp(ℓ) = Π_j Π_k K_jk^{x_ℓ^k}` equals `g` raised to guardian `ℓ`'s key share, so it is
/// the public key a trustee's partial decryption is checked against.
#[derive(Debug)]
pub struct Guardians {
    guardians: Vec<Guardian>,
    index: HashMap<String, usize>,
    gexp: Vec<Element>,
    metrics: Metrics,
}

impl Guardians {
    /// Build the roster, reporting every structural problem at once.
    pub fn new(guardians: Vec<Guardian>) -> Result<Guardians, Error> {
        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        ctx.check(!guardians.is_empty(), "no guardians");

        let mut index = HashMap::new();
        let mut coordinates = BTreeSet::new();
        for (i, g) in guardians.iter().enumerate() {
            if index.insert(g.guardian_id.clone(), i).is_some() {
                ctx.add(format!("duplicate guardian id {}", g.guardian_id));
            }
            let mut ctx = ctx.scope(format!("guardian {}", g.guardian_id));
            ctx.check(g.x_coordinate > 0, "x coordinate must be positive");
            ctx.check(
                coordinates.insert(g.x_coordinate),
                format!("x coordinate {} is already taken", g.x_coordinate),
            );
            ctx.check(
                !g.coefficient_commitments.is_empty(),
                "no coefficient commitments",
            );
        }
        if !errs.is_empty() {
            return Err(Error::Configuration(errs));
        }

        let mut roster = Guardians {
            guardians,
            index,
            gexp: Vec::new(),
            metrics: Metrics::new(),
        };
        roster.gexp = roster
            .guardians
            .iter()
            .map(|g| roster.gexp_for(g.x_coordinate))
            .collect();
        debug!(
            guardians = roster.guardians.len(),
            exponentiations = roster.metrics.snapshot().exponentiations,
            "precomputed guardian commitments"
        );
        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.guardians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardians.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Guardian> {
        self.guardians.iter()
    }

    pub fn get(&self, guardian_id: &str) -> Option<&Guardian> {
        self.index.get(guardian_id).map(|&i| &self.guardians[i])
    }

    /// The cached `g^{P(x)}` of a guardian on the roster.
    pub fn gexp(&self, guardian_id: &str) -> Option<&Element> {
        self.index.get(guardian_id).map(|&i| &self.gexp[i])
    }

    /// `g^{P(x)}` for an arbitrary coordinate: cached if it belongs to a guardian on the roster,
    /// computed otherwise.
    pub fn gexp_for(&self, x_coordinate: u32) -> Element {
        if let Some(i) = self
            .guardians
            .iter()
            .position(|g| g.x_coordinate == x_coordinate)
        {
            if let Some(cached) = self.gexp.get(i) {
                return cached.clone();
            }
        }
        let mut product = Element::one();
        for g in &self.guardians {
            let (at_x, exps) = g.commitment_at(x_coordinate);
            self.metrics.add_exponentiations(exps);
            product = &product * &at_x;
        }
        product
    }

    /// `K = Π_i K_i0`.
    pub fn joint_public_key(&self) -> Element {
        self.guardians
            .iter()
            .filter_map(Guardian::public_key)
            .fold(Element::one(), |k, ki| &k * ki)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::group::gen_pow;

    fn guardian(id: &str, x: u32, coefficients: &[u32]) -> Guardian {
        Guardian {
            guardian_id: id.to_owned(),
            x_coordinate: x,
            coefficient_commitments: coefficients.iter().map(|&a| gen_pow(&a.into())).collect(),
            coefficient_proofs: Vec::new(),
        }
    }

    #[test]
    fn gexp_is_g_to_the_polynomial_sum() {
        // P_1(x) = 3 + 5x, P_2(x) = 7 + 11x, so at x = 2 the shares sum to 13 + 29 = 42.
        let roster =
            Guardians::new(vec![guardian("a", 1, &[3, 5]), guardian("b", 2, &[7, 11])]).unwrap();
        assert_eq!(roster.gexp("b"), Some(&gen_pow(&42_u32.into())));
        assert_eq!(roster.gexp_for(3), gen_pow(&(18_u32 + 40).into()));
        assert_eq!(roster.joint_public_key(), gen_pow(&10_u32.into()));
        assert_eq!(roster.metrics().exponentiations, 2 * 4 + 4);
    }

    #[test]
    fn roster_problems_are_reported_together() {
        let result = Guardians::new(vec![
            guardian("a", 1, &[3]),
            guardian("a", 0, &[4]),
            guardian("c", 1, &[]),
        ]);
        match result {
            Err(Error::Configuration(errs)) => assert_eq!(errs.len(), 4, "{}", errs),
            other => panic!("expected a configuration error, got {:?}", other.map(|g| g.len())),
        }
    }
}
