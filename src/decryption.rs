//! The threshold decryption orchestrator.
//!
//! A session decrypts a batch of ciphertexts with every available trustee in two rounds:
//!
//! 1. Each trustee returns partial decryptions `M_ij = A_i^{s_j}` and commitments
//!    `(a_ij, b_ij)`. The orchestrator interpolates `M_i = Π_j M_ij^{w_j}` with the Lagrange
//!    weights `w_j` of the responders, multiplies the commitments into `(a_i, b_i)` and hashes
//!    them into the collective challenge `c_i`.
//! 2. Each trustee answers its weighted challenges `w_j·c_i` with `v_ij = u_ij - w_j·c_i·s_j`.
//!    Summing over trustees gives `v_i = u_i - c_i·s`, so `(c_i, v_i)` is an ordinary
//!    Chaum-Pedersen proof that `M_i = A_i^s` under the joint key `K = g^s`.
//!
//! No trustee ever sees `s`, and no proof is returned unless every responder of round one also
//! answered round two correctly.

use num::traits::{One, Pow, Zero};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::DecryptionConfig;
use crate::crypto::chaum_pedersen::ChaumPedersenProof;
use crate::crypto::dlog::DLogarithm;
use crate::crypto::elgamal::Ciphertext;
use crate::crypto::group::{Element, Exponent};
use crate::crypto::hash::UInt256;
use crate::crypto::hashed_elgamal::HashedCiphertext;
use crate::election::ElectionContext;
use crate::errors::{Error, ErrorMessages, TrusteeError};
use crate::guardian::Guardians;
use crate::hash_elems;
use crate::lagrange::{compute_lagrange_coordinates, LagrangeCoordinate};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::trustee::{BatchId, PartialDecryptions, Trustee};

pub mod ballot;
pub mod tally;

/// A ciphertext whose pad can be threshold-decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Cipher {
    #[serde(rename = "elgamal")]
    ElGamal(Ciphertext),
    #[serde(rename = "hashed")]
    Hashed(HashedCiphertext),
}

impl Cipher {
    pub fn pad(&self) -> &Element {
        match self {
            Cipher::ElGamal(c) => &c.pad,
            Cipher::Hashed(c) => &c.c0,
        }
    }

    /// The Fiat-Shamir challenge for decrypting this ciphertext to `mask` with commitments
    /// `(a, b)`.
    pub fn collective_challenge(
        &self,
        extended_base_hash: &UInt256,
        public_key: &Element,
        a: &Element,
        b: &Element,
        mask: &Element,
    ) -> Exponent {
        let digest = match self {
            Cipher::ElGamal(c) => {
                hash_elems!(extended_base_hash; 0x30_u8, public_key, c.pad, c.data, a, b, mask)
            }
            Cipher::Hashed(c) => {
                hash_elems!(extended_base_hash; 0x31_u8, public_key, c.c0, c.c1, c.c2, a, b, mask)
            }
        };
        digest.to_exponent()
    }
}

impl From<Ciphertext> for Cipher {
    fn from(c: Ciphertext) -> Cipher {
        Cipher::ElGamal(c)
    }
}

impl From<HashedCiphertext> for Cipher {
    fn from(c: HashedCiphertext) -> Cipher {
        Cipher::Hashed(c)
    }
}

/// The reconstructed mask `M = A^s` of one ciphertext and the proof that it is correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherDecryptionAndProof {
    pub beta: Element,
    pub proof: ChaumPedersenProof,
}

impl CipherDecryptionAndProof {
    pub fn verify(&self, cipher: &Cipher, context: &ElectionContext) -> bool {
        let k = &context.joint_public_key;
        self.proof.verify_decryption(k, cipher.pad(), &self.beta, |a, b| {
            cipher.collective_challenge(&context.extended_base_hash, k, a, b, &self.beta)
        })
    }
}

/// Output of one session, one item per input ciphertext.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decryptions {
    /// `None` exactly at the flagged indices.
    pub items: Vec<Option<CipherDecryptionAndProof>>,

    /// Items whose pad some trustee reported outside the prime-order subgroup, with the reasons.
    pub flagged: BTreeMap<usize, Vec<String>>,

    /// The trustees that contributed, in roster order.
    pub guardian_ids: Vec<String>,
}

impl Decryptions {
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged.contains_key(&index)
    }

    /// The decryption of the `index`-th ciphertext, unless it was flagged.
    pub fn get(&self, index: usize) -> Option<&CipherDecryptionAndProof> {
        self.items.get(index).and_then(Option::as_ref)
    }

    /// Every unflagged item carries a valid proof and every flagged item carries none.
    pub fn verify(&self, texts: &[Cipher], context: &ElectionContext) -> bool {
        self.items.len() == texts.len()
            && self
                .items
                .par_iter()
                .zip(texts)
                .enumerate()
                .all(|(i, (item, text))| match item {
                    Some(item) => !self.is_flagged(i) && item.verify(text, context),
                    None => self.is_flagged(i),
                })
    }
}

type RoundResults<T> = Vec<Option<Result<T, TrusteeError>>>;

/// Runs decryption sessions for one fixed set of trustees.
pub struct ThresholdDecryptor {
    context: ElectionContext,
    guardians: Arc<Guardians>,
    trustees: Vec<Arc<dyn Trustee>>,
    lagrange: Vec<LagrangeCoordinate>,
    config: DecryptionConfig,
    pool: ThreadPool,
    dlog: DLogarithm,
    metrics: Metrics,
}

impl ThresholdDecryptor {
    /// Check the trustees against the published guardians. Every mismatch is reported in one
    /// [`Error::Configuration`].
    pub fn new(
        context: ElectionContext,
        guardians: Arc<Guardians>,
        trustees: Vec<Arc<dyn Trustee>>,
        config: DecryptionConfig,
    ) -> Result<ThresholdDecryptor, Error> {
        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        ctx.check(
            context.number_of_guardians as usize == guardians.len(),
            format!(
                "the election has {} guardians but the roster lists {}",
                context.number_of_guardians,
                guardians.len()
            ),
        );
        ctx.check(
            context.joint_public_key == guardians.joint_public_key(),
            "the joint public key does not match the guardian roster",
        );
        ctx.check(
            trustees.len() >= context.quorum as usize,
            format!(
                "{} trustees available but the quorum is {}",
                trustees.len(),
                context.quorum
            ),
        );

        let mut seen = HashSet::new();
        for t in &trustees {
            let mut ctx = ctx.scope(format!("trustee {}", t.id()));
            ctx.check(seen.insert(t.id().to_owned()), "appears more than once");
            match guardians.get(t.id()) {
                None => ctx.add("unknown guardian id"),
                Some(g) => {
                    ctx.check(
                        g.public_key() == Some(t.guardian_public_key()),
                        "public key does not match the guardian's published key",
                    );
                    ctx.check(
                        g.x_coordinate == t.x_coordinate(),
                        format!(
                            "x coordinate {} does not match the guardian's {}",
                            t.x_coordinate(),
                            g.x_coordinate
                        ),
                    );
                }
            }
        }

        let workers = if config.workers == 0 {
            trustees.len().max(1)
        } else {
            config.workers
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("trustee-call-{}", i))
            .build()
            .map_err(|e| ctx.add(format!("cannot start the trustee worker pool: {}", e)))
            .ok();

        let pool = match (errs.is_empty(), pool) {
            (true, Some(pool)) => pool,
            _ => {
                error!(errors = errs.len(), "rejected decryption configuration");
                return Err(Error::Configuration(errs));
            }
        };

        let lagrange =
            compute_lagrange_coordinates(trustees.iter().map(|t| (t.id(), t.x_coordinate())));
        let dlog = DLogarithm::new(context.joint_public_key.clone(), config.max_dlog);
        info!(
            trustees = trustees.len(),
            quorum = context.quorum,
            workers,
            "threshold decryptor ready"
        );
        Ok(ThresholdDecryptor {
            context,
            guardians,
            trustees,
            lagrange,
            config,
            pool,
            dlog,
            metrics: Metrics::new(),
        })
    }

    pub fn context(&self) -> &ElectionContext {
        &self.context
    }

    pub fn config(&self) -> &DecryptionConfig {
        &self.config
    }

    /// Coefficients for the full trustee set, in trustee order.
    pub fn lagrange_coordinates(&self) -> &[LagrangeCoordinate] {
        &self.lagrange
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// `t` such that `data / beta = K^t`, if `t <= max_dlog`.
    pub fn recover_plaintext(&self, ciphertext: &Ciphertext, beta: &Element) -> Option<u32> {
        self.dlog.dlog(&ciphertext.unmask(beta))
    }

    /// Decrypt `texts` in one session. Round-two responses are matched to ciphertexts by
    /// position, so the order of `texts` is the order of the output.
    #[instrument(level = "info", skip_all, fields(ciphertexts = texts.len()), err(Display))]
    pub fn decrypt(&self, texts: &[Cipher]) -> Result<Decryptions, Error> {
        if texts.is_empty() {
            return Ok(Decryptions::default());
        }
        self.metrics.add_session();
        let n = texts.len();
        let pads: Arc<Vec<Element>> = Arc::new(texts.iter().map(|t| t.pad().clone()).collect());

        // Round one

        let everyone: Vec<usize> = (0..self.trustees.len()).collect();
        info!(trustees = everyone.len(), "round one: partial decryptions");
        let round_one = {
            let pads = Arc::clone(&pads);
            self.run_round(&everyone, move |t, _| t.decrypt(&pads))
        };

        let mut errs = ErrorMessages::new();
        let mut flagged: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut responders: Vec<(usize, PartialDecryptions)> = Vec::new();
        let mut missing = Vec::new();
        {
            let mut ctx = errs.context();
            for (t, outcome) in round_one.into_iter().enumerate() {
                let id = self.trustees[t].id();
                let mut ctx = ctx.scope(format!("trustee {}", id));
                let partials = match outcome {
                    None => {
                        missing.push(id);
                        continue;
                    }
                    Some(Err(e)) => {
                        ctx.add(format!("decrypt failed: {}", e));
                        continue;
                    }
                    Some(Ok(partials)) => partials,
                };
                if !ctx.check(
                    partials.partial_decryptions.len() == n,
                    format!(
                        "returned {} partial decryptions for {} ciphertexts",
                        partials.partial_decryptions.len(),
                        n
                    ),
                ) {
                    continue;
                }
                for &i in &partials.invalid_pads {
                    if ctx.check(i < n, format!("flagged pad {} is out of range", i)) {
                        flagged
                            .entry(i)
                            .or_default()
                            .push(format!("trustee {}: pad is not a valid residue", id));
                    }
                }
                responders.push((t, partials));
            }
        }
        if !missing.is_empty() {
            warn!(?missing, "trustees did not answer round one in time");
        }
        if responders.len() < self.context.quorum as usize {
            errs.context().add(format!(
                "only {} trustees answered round one but the quorum is {}",
                responders.len(),
                self.context.quorum
            ));
        }
        if !errs.is_empty() {
            error!(errors = errs.len(), "round one failed");
            return Err(Error::Session(errs));
        }
        if !flagged.is_empty() {
            warn!(flagged = flagged.len(), "ciphertexts with invalid pads");
        }

        let lagrange: Vec<LagrangeCoordinate> = if missing.is_empty() {
            responders
                .iter()
                .map(|(t, _)| self.lagrange[*t].clone())
                .collect()
        } else {
            compute_lagrange_coordinates(responders.iter().map(|(t, _)| {
                let t = &self.trustees[*t];
                (t.id(), t.x_coordinate())
            }))
        };

        // Combine and derive the collective challenges

        let k = &self.context.joint_public_key;
        let ext = &self.context.extended_base_hash;
        let combined: Vec<(Element, Exponent)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut mask = Element::one();
                let mut a = Element::one();
                let mut b = Element::one();
                for ((_, partials), w) in responders.iter().zip(&lagrange) {
                    let p = &partials.partial_decryptions[i];
                    mask = &mask * &p.mi.pow(&w.coefficient);
                    a = &a * &p.a;
                    b = &b * &p.b;
                }
                let c = texts[i].collective_challenge(ext, k, &a, &b, &mask);
                (mask, c)
            })
            .collect();
        self.metrics.add_exponentiations((n * responders.len()) as u64);

        // Round two

        let participants: Vec<usize> = responders.iter().map(|(t, _)| *t).collect();
        let batch_ids: Arc<Vec<BatchId>> =
            Arc::new(responders.iter().map(|(_, p)| p.batch_id).collect());
        let challenges: Arc<Vec<Vec<Exponent>>> = Arc::new(
            lagrange
                .iter()
                .map(|w| combined.iter().map(|(_, c)| c * &w.coefficient).collect())
                .collect(),
        );
        info!(trustees = participants.len(), "round two: challenge responses");
        let round_two = {
            let batch_ids = Arc::clone(&batch_ids);
            let challenges = Arc::clone(&challenges);
            self.run_round(&participants, move |t, slot| {
                t.challenge(batch_ids[slot], &challenges[slot])
            })
        };

        let mut responses: Vec<Vec<Exponent>> = Vec::with_capacity(participants.len());
        {
            let mut ctx = errs.context();
            for (slot, outcome) in round_two.into_iter().enumerate() {
                let id = self.trustees[participants[slot]].id();
                let mut ctx = ctx.scope(format!("trustee {}", id));
                match outcome {
                    None => ctx.add("did not answer the challenge in time"),
                    Some(Err(e)) => ctx.add(format!("challenge failed: {}", e)),
                    Some(Ok(r)) => {
                        let batch_ok = ctx.check(
                            r.batch_id == batch_ids[slot],
                            format!(
                                "answered for batch {} instead of {}",
                                r.batch_id, batch_ids[slot]
                            ),
                        );
                        let len_ok = ctx.check(
                            r.responses.len() == n,
                            format!(
                                "returned {} responses for {} ciphertexts",
                                r.responses.len(),
                                n
                            ),
                        );
                        if batch_ok && len_ok {
                            responses.push(r.responses);
                        }
                    }
                }
            }
        }
        if !errs.is_empty() {
            error!(errors = errs.len(), "round two failed");
            return Err(Error::Session(errs));
        }

        if self.config.check_individual_responses {
            self.check_responses(
                texts,
                &participants,
                &responders,
                &challenges,
                &responses,
                &flagged,
                &mut errs,
            );
            if !errs.is_empty() {
                error!(errors = errs.len(), "trustee responses do not verify");
                return Err(Error::Session(errs));
            }
        }

        let items = combined
            .into_iter()
            .enumerate()
            .map(|(i, (beta, challenge))| {
                if flagged.contains_key(&i) {
                    return None;
                }
                let response = responses
                    .iter()
                    .fold(Exponent::zero(), |acc, r| &acc + &r[i]);
                Some(CipherDecryptionAndProof {
                    beta,
                    proof: ChaumPedersenProof::new(challenge, response),
                })
            })
            .collect();
        let guardian_ids = participants
            .iter()
            .map(|&t| self.trustees[t].id().to_owned())
            .collect();
        info!(flagged = flagged.len(), "decryption session complete");
        Ok(Decryptions {
            items,
            flagged,
            guardian_ids,
        })
    }

    /// Check each trustee's responses against its own commitments, using `g^{P(x_j)}` as its
    /// public key: `a_ij = g^{v_ij}·(g^{P(x_j)})^{c_ij}` and `b_ij = A_i^{v_ij}·M_ij^{c_ij}`.
    #[allow(clippy::too_many_arguments)]
    fn check_responses(
        &self,
        texts: &[Cipher],
        participants: &[usize],
        responders: &[(usize, PartialDecryptions)],
        challenges: &[Vec<Exponent>],
        responses: &[Vec<Exponent>],
        flagged: &BTreeMap<usize, Vec<String>>,
        errs: &mut ErrorMessages,
    ) {
        let mut ctx = errs.context();
        for (slot, &t) in participants.iter().enumerate() {
            let id = self.trustees[t].id();
            let mut ctx = ctx.scope(format!("trustee {}", id));
            let gexp = match self.guardians.gexp(id) {
                Some(gexp) => gexp,
                None => {
                    ctx.add("no published commitments");
                    continue;
                }
            };
            let partials = &responders[slot].1.partial_decryptions;
            let mut bad: Vec<usize> = (0..texts.len())
                .into_par_iter()
                .filter(|i| !flagged.contains_key(i))
                .filter(|&i| {
                    let p = &partials[i];
                    let proof = ChaumPedersenProof::new(
                        challenges[slot][i].clone(),
                        responses[slot][i].clone(),
                    );
                    !proof.transcript_ok(gexp, texts[i].pad(), &p.mi, &p.a, &p.b)
                })
                .collect();
            bad.sort_unstable();
            self.metrics.add_exponentiations(4 * texts.len() as u64);
            for i in bad {
                ctx.scope(format!("ciphertext {}", i))
                    .add("response does not match the trustee's commitments");
            }
        }
    }

    /// Call `call` for each of `participants` on the worker pool and wait for the answers until
    /// the round deadline. Slot `i` of the result belongs to `participants[i]`; `None` means
    /// the trustee did not answer in time.
    fn run_round<T, F>(&self, participants: &[usize], call: F) -> RoundResults<T>
    where
        T: Send + 'static,
        F: Fn(&dyn Trustee, usize) -> Result<T, TrusteeError> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let (tx, rx) = mpsc::channel();
        for (slot, &t) in participants.iter().enumerate() {
            let trustee = Arc::clone(&self.trustees[t]);
            let call = Arc::clone(&call);
            let tx = tx.clone();
            self.pool.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| call(&*trustee, slot)))
                    .unwrap_or_else(|_| {
                        Err(TrusteeError::Unavailable(format!(
                            "trustee {} panicked",
                            trustee.id()
                        )))
                    });
                // The receiver is gone once the round has timed out.
                let _ = tx.send((slot, result));
            });
        }
        drop(tx);
        self.metrics.add_trustee_calls(participants.len() as u64);

        let deadline = Instant::now() + self.config.trustee_timeout();
        let mut results: RoundResults<T> = participants.iter().map(|_| None).collect();
        let mut pending = participants.len();
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((slot, result)) => {
                    results[slot] = Some(result);
                    pending -= 1;
                }
                Err(_) => break,
            }
        }
        results
    }
}
