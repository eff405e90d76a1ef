//! Election-wide public values every proof is bound to.

use serde::{Deserialize, Serialize};

use crate::crypto::group::{generator, prime, subgroup_prime, Element};
use crate::crypto::hash::UInt256;
use crate::errors::{Error, ErrorMessages};
use crate::guardian::Guardians;
use crate::hash_elems;

/// Hash key for the parameter base hash: the protocol version, zero padded to 32 bytes.
const PROTOCOL_VERSION: &[u8] = b"v2.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionContext {
    pub number_of_guardians: u32,
    pub quorum: u32,

    /// `H_P`, binding the group parameters.
    pub parameter_base_hash: UInt256,

    /// `H_B`, binding the manifest and the guardian counts.
    pub election_base_hash: UInt256,

    /// `H_E`, binding the key ceremony. Every protocol hash is keyed with it.
    pub extended_base_hash: UInt256,

    /// `K = Π_i K_i0`.
    pub joint_public_key: Element,
}

impl ElectionContext {
    /// Derive the context from a manifest and a validated guardian roster.
    ///
    /// Fails if the quorum is out of range, if a guardian's polynomial does not have exactly
    /// `quorum` coefficients, or if any coefficient proof is invalid.
    pub fn new(
        manifest: &str,
        guardians: &Guardians,
        quorum: u32,
    ) -> Result<ElectionContext, Error> {
        let n = guardians.len() as u32;
        let parameter_base_hash = compute_parameter_base_hash();

        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        ctx.check(
            quorum >= 1 && quorum <= n,
            format!("quorum {} is not between 1 and {}", quorum, n),
        );
        for g in guardians.iter() {
            ctx.check(
                g.coefficient_commitments.len() == quorum as usize,
                format!(
                    "guardian {} has {} coefficients, expected {}",
                    g.guardian_id,
                    g.coefficient_commitments.len(),
                    quorum
                ),
            );
            g.validate(&parameter_base_hash, &mut ctx);
        }
        if !errs.is_empty() {
            return Err(Error::Configuration(errs));
        }

        let election_base_hash =
            compute_election_base_hash(&parameter_base_hash, manifest, n, quorum);
        let joint_public_key = guardians.joint_public_key();
        let extended_base_hash =
            compute_extended_base_hash(&election_base_hash, &joint_public_key, guardians);

        Ok(ElectionContext {
            number_of_guardians: n,
            quorum,
            parameter_base_hash,
            election_base_hash,
            extended_base_hash,
            joint_public_key,
        })
    }
}

/// `H_P = H(ver; 0x00, p, q, g)`.
pub fn compute_parameter_base_hash() -> UInt256 {
    let mut key = [0_u8; 32];
    key[..PROTOCOL_VERSION.len()].copy_from_slice(PROTOCOL_VERSION);
    hash_elems!(
        &key[..];
        0x00_u8,
        prime().to_bytes_be(),
        subgroup_prime().to_bytes_be(),
        generator(),
    )
}

/// `H_B = H(H_P; 0x01, manifest, n, k)`.
pub fn compute_election_base_hash(
    parameter_base_hash: &UInt256,
    manifest: &str,
    number_of_guardians: u32,
    quorum: u32,
) -> UInt256 {
    hash_elems!(parameter_base_hash; 0x01_u8, manifest, number_of_guardians, quorum)
}

/// `H_E = H(H_B; 0x12, K, K_10, ..., K_nk)`, with commitments in roster order.
pub fn compute_extended_base_hash(
    election_base_hash: &UInt256,
    joint_public_key: &Element,
    guardians: &Guardians,
) -> UInt256 {
    let commitments: Vec<u8> = guardians
        .iter()
        .flat_map(|g| g.coefficient_commitments.iter())
        .flat_map(Element::to_bytes)
        .collect();
    hash_elems!(election_base_hash; 0x12_u8, joint_public_key, commitments)
}
