//! The private side of a guardian: a trustee holds one key share and answers the two rounds
//! of a threshold decryption.
//!
//! Round one ([`Trustee::decrypt`]) returns, for each pad `A_i`, the partial decryption
//! `M_i = A_i^s` and Chaum-Pedersen commitments `(a_i, b_i) = (g^u_i, A_i^u_i)`. The nonces
//! `u_i` are derived from a fresh seed that the trustee keeps under a random batch id. Round two
//! ([`Trustee::challenge`]) consumes that seed, regenerates the same `u_i` and answers each
//! challenge `c_i` with `v_i = u_i - c_i·s`.

use num::traits::Pow;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::crypto::group::{gen_pow, random_exponent, Element, Exponent};
use crate::crypto::nonces::Nonces;
use crate::errors::TrusteeError;
use crate::metrics::{Metrics, MetricsSnapshot};

pub mod session;

use session::SessionStore;

/// Opaque handle linking a trustee's round-one output to its round-two challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl BatchId {
    /// Returned for an empty batch, for which no session is stored.
    pub const NONE: BatchId = BatchId(0);
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One trustee's contribution for one ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDecryption {
    /// `M_i = A^s_i`.
    pub mi: Element,
    /// `a = g^u`.
    pub a: Element,
    /// `b = A^u`.
    pub b: Element,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDecryptions {
    pub batch_id: BatchId,
    pub partial_decryptions: Vec<PartialDecryption>,
    /// Indices of pads that are not in the order-`q` subgroup. Their entries are still filled
    /// in but prove nothing.
    #[serde(default)]
    pub invalid_pads: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponses {
    pub batch_id: BatchId,
    pub responses: Vec<Exponent>,
}

/// A key-share holder, in process or behind an RPC boundary.
pub trait Trustee: Send + Sync {
    fn id(&self) -> &str;

    fn x_coordinate(&self) -> u32;

    /// Must equal the published key of the guardian with the same id.
    fn guardian_public_key(&self) -> &Element;

    /// Round one. An empty batch succeeds without opening a session.
    fn decrypt(&self, pads: &[Element]) -> Result<PartialDecryptions, TrusteeError>;

    /// Round two. `challenges[i]` answers pad `i` of the batch; each batch can be challenged
    /// once.
    fn challenge(
        &self,
        batch_id: BatchId,
        challenges: &[Exponent],
    ) -> Result<ChallengeResponses, TrusteeError>;
}

/// The in-process trustee.
#[derive(Debug)]
pub struct DecryptingTrustee {
    id: String,
    x_coordinate: u32,
    guardian_public_key: Element,
    key_share: Exponent,
    sessions: SessionStore,
    metrics: Metrics,
}

impl DecryptingTrustee {
    pub fn new(
        id: impl Into<String>,
        x_coordinate: u32,
        guardian_public_key: Element,
        key_share: Exponent,
        session_ttl: Duration,
    ) -> DecryptingTrustee {
        DecryptingTrustee {
            id: id.into(),
            x_coordinate,
            guardian_public_key,
            key_share,
            sessions: SessionStore::new(session_ttl),
            metrics: Metrics::new(),
        }
    }

    /// Round-one sessions not yet challenged or expired.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn expire_stale_sessions(&self) -> usize {
        self.sessions.expire_stale()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Trustee for DecryptingTrustee {
    fn id(&self) -> &str {
        &self.id
    }

    fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    fn guardian_public_key(&self) -> &Element {
        &self.guardian_public_key
    }

    #[instrument(level = "info", skip(self, pads), fields(trustee = %self.id, count = pads.len()))]
    fn decrypt(&self, pads: &[Element]) -> Result<PartialDecryptions, TrusteeError> {
        self.metrics.add_trustee_calls(1);
        if pads.is_empty() {
            return Ok(PartialDecryptions {
                batch_id: BatchId::NONE,
                partial_decryptions: Vec::new(),
                invalid_pads: Vec::new(),
            });
        }

        let seed = random_exponent(&mut rand::thread_rng());
        let nonces = Nonces::new(&seed, &self.id);

        let partial_decryptions: Vec<PartialDecryption> = pads
            .par_iter()
            .enumerate()
            .map(|(i, pad)| {
                let u = nonces.get(i as u32);
                PartialDecryption {
                    mi: pad.pow(&self.key_share),
                    a: gen_pow(&u),
                    b: pad.pow(&u),
                }
            })
            .collect();
        self.metrics.add_exponentiations(3 * pads.len() as u64);

        let invalid_pads: Vec<usize> = pads
            .iter()
            .enumerate()
            .filter(|(_, pad)| !pad.is_valid_residue())
            .map(|(i, _)| i)
            .collect();
        if !invalid_pads.is_empty() {
            warn!(?invalid_pads, "pads outside the prime-order subgroup");
        }

        let batch_id = self.sessions.insert(seed, pads.len());
        info!(%batch_id, "opened decryption session");
        Ok(PartialDecryptions {
            batch_id,
            partial_decryptions,
            invalid_pads,
        })
    }

    #[instrument(level = "info", skip(self, challenges), fields(trustee = %self.id))]
    fn challenge(
        &self,
        batch_id: BatchId,
        challenges: &[Exponent],
    ) -> Result<ChallengeResponses, TrusteeError> {
        self.metrics.add_trustee_calls(1);
        let seed = self.sessions.take(batch_id, challenges.len()).map_err(|e| {
            warn!(error = %e, "rejected challenge");
            e
        })?;
        let nonces = Nonces::new(&seed, &self.id);

        let responses = challenges
            .par_iter()
            .enumerate()
            .map(|(i, c)| &nonces.get(i as u32) - &(c * &self.key_share))
            .collect();
        Ok(ChallengeResponses {
            batch_id,
            responses,
        })
    }
}
