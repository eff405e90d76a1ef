use num::traits::Pow;
use num::BigUint;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::crypto::elgamal::Ciphertext;
use crate::crypto::group::Element;
use crate::election::ElectionContext;
use crate::errors::{Error, ErrorContext, ErrorMessages};

use super::ballot::EncryptedBallot;
use super::{Cipher, CipherDecryptionAndProof, Decryptions, ThresholdDecryptor};

/// The homomorphic sum of all cast ballots, per contest and selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTally {
    pub contests: Vec<EncryptedContestTally>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContestTally {
    pub contest_id: String,
    pub selections: Vec<EncryptedSelectionTally>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSelectionTally {
    pub selection_id: String,
    pub ciphertext: Ciphertext,
}

impl EncryptedTally {
    /// Add up `ballots` selection by selection. All ballots must list the same contests and
    /// selections in the same order.
    pub fn accumulate(ballots: &[EncryptedBallot]) -> Result<EncryptedTally, Error> {
        let mut tally = EncryptedTally {
            contests: Vec::new(),
        };
        let first = match ballots.first() {
            Some(first) => first,
            None => return Ok(tally),
        };
        tally.contests = first
            .contests
            .iter()
            .map(|c| EncryptedContestTally {
                contest_id: c.contest_id.clone(),
                selections: c
                    .selections
                    .iter()
                    .map(|s| EncryptedSelectionTally {
                        selection_id: s.selection_id.clone(),
                        ciphertext: Ciphertext::zero(),
                    })
                    .collect(),
            })
            .collect();

        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        for ballot in ballots {
            let mut ctx = ctx.scope(format!("ballot {}", ballot.ballot_id));
            if !ctx.check(
                ballot.contests.len() == tally.contests.len(),
                format!("{} contests, expected {}", ballot.contests.len(), tally.contests.len()),
            ) {
                continue;
            }
            for (contest, total) in ballot.contests.iter().zip(&mut tally.contests) {
                let layout_ok = contest.contest_id == total.contest_id
                    && contest.selections.len() == total.selections.len()
                    && contest
                        .selections
                        .iter()
                        .zip(&total.selections)
                        .all(|(s, t)| s.selection_id == t.selection_id);
                if !ctx.check(
                    layout_ok,
                    format!(
                        "contest {} does not match contest {}",
                        contest.contest_id, total.contest_id
                    ),
                ) {
                    continue;
                }
                for (selection, sum) in contest.selections.iter().zip(&mut total.selections) {
                    sum.ciphertext = sum.ciphertext.h_add(&selection.ciphertext);
                }
            }
        }
        errs.into_result(tally, Error::Structure)
    }

    pub fn num_selections(&self) -> usize {
        self.contests.iter().map(|c| c.selections.len()).sum()
    }
}

/// A decrypted selection: the count, `K^t`, and the proof that it decrypts the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedSelection {
    pub selection_id: String,
    pub tally: u32,
    /// `K^t = B / M`.
    pub value: Element,
    pub ciphertext: Ciphertext,
    pub decryption: CipherDecryptionAndProof,
}

impl DecryptedSelection {
    /// Turn the decryption of one selection into a count. Problems go to `ctx`.
    pub(crate) fn recover(
        decryptor: &ThresholdDecryptor,
        selection_id: &str,
        ciphertext: &Ciphertext,
        decryption: Option<CipherDecryptionAndProof>,
        flags: Option<&Vec<String>>,
        ctx: &mut ErrorContext,
    ) -> Option<DecryptedSelection> {
        let mut ctx = ctx.scope(format!("selection {}", selection_id));
        let decryption = match decryption {
            Some(decryption) => decryption,
            None => {
                for f in flags.into_iter().flatten() {
                    ctx.add(f);
                }
                return None;
            }
        };
        let value = ciphertext.unmask(&decryption.beta);
        match decryptor.recover_plaintext(ciphertext, &decryption.beta) {
            Some(tally) => Some(DecryptedSelection {
                selection_id: selection_id.to_owned(),
                tally,
                value,
                ciphertext: ciphertext.clone(),
                decryption,
            }),
            None => {
                ctx.add(format!("no plaintext up to {}", decryptor.config().max_dlog));
                None
            }
        }
    }

    pub fn verify(&self, context: &ElectionContext, ctx: &mut ErrorContext) {
        let mut ctx = ctx.scope(format!("selection {}", self.selection_id));
        let k = &context.joint_public_key;
        ctx.check(
            self.decryption
                .verify(&Cipher::ElGamal(self.ciphertext.clone()), context),
            "decryption proof does not verify",
        );
        ctx.check(
            self.value == self.ciphertext.unmask(&self.decryption.beta),
            "value does not match the decryption",
        );
        ctx.check(
            self.value == k.pow(&BigUint::from(self.tally)),
            format!("value does not encode {}", self.tally),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedTally {
    pub contests: Vec<DecryptedContestTally>,
    /// The trustees whose shares produced this tally.
    pub guardian_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedContestTally {
    pub contest_id: String,
    pub selections: Vec<DecryptedSelection>,
}

impl DecryptedTally {
    /// Re-check every proof and every count against the election context.
    pub fn verify(&self, context: &ElectionContext) -> Result<(), Error> {
        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        for contest in &self.contests {
            let mut ctx = ctx.scope(format!("contest {}", contest.contest_id));
            for selection in &contest.selections {
                selection.verify(context, &mut ctx);
            }
        }
        errs.into_result((), Error::Verification)
    }

    /// The count of one selection, if present.
    pub fn count(&self, contest_id: &str, selection_id: &str) -> Option<u32> {
        self.contests
            .iter()
            .find(|c| c.contest_id == contest_id)?
            .selections
            .iter()
            .find(|s| s.selection_id == selection_id)
            .map(|s| s.tally)
    }
}

/// Decrypts an [`EncryptedTally`] in a single threshold session.
pub struct TallyDecryptor<'a> {
    decryptor: &'a ThresholdDecryptor,
}

impl<'a> TallyDecryptor<'a> {
    pub fn new(decryptor: &'a ThresholdDecryptor) -> TallyDecryptor<'a> {
        TallyDecryptor { decryptor }
    }

    /// Fails as a whole if any selection is flagged or its count cannot be recovered.
    #[instrument(level = "info", skip_all, fields(selections = tally.num_selections()))]
    pub fn decrypt(&self, tally: &EncryptedTally) -> Result<DecryptedTally, Error> {
        let texts: Vec<Cipher> = tally
            .contests
            .iter()
            .flat_map(|c| c.selections.iter())
            .map(|s| Cipher::ElGamal(s.ciphertext.clone()))
            .collect();
        let Decryptions {
            items,
            flagged,
            guardian_ids,
        } = self.decryptor.decrypt(&texts)?;

        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        let mut items = items.into_iter().enumerate();
        let mut contests = Vec::with_capacity(tally.contests.len());
        for contest in &tally.contests {
            let mut ctx = ctx.scope(format!("contest {}", contest.contest_id));
            let mut selections = Vec::with_capacity(contest.selections.len());
            for selection in &contest.selections {
                let (i, decryption) = match items.next() {
                    Some(item) => item,
                    None => {
                        ctx.add("session returned too few decryptions");
                        break;
                    }
                };
                if let Some(s) = DecryptedSelection::recover(
                    self.decryptor,
                    &selection.selection_id,
                    &selection.ciphertext,
                    decryption,
                    flagged.get(&i),
                    &mut ctx,
                ) {
                    selections.push(s);
                }
            }
            contests.push(DecryptedContestTally {
                contest_id: contest.contest_id.clone(),
                selections,
            });
        }
        let decrypted = errs.into_result(
            DecryptedTally {
                contests,
                guardian_ids,
            },
            Error::Plaintext,
        )?;
        info!(contests = decrypted.contests.len(), "tally decrypted");
        Ok(decrypted)
    }
}
