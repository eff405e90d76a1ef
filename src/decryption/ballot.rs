use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::crypto::elgamal::Ciphertext;
use crate::crypto::hashed_elgamal::HashedCiphertext;
use crate::election::ElectionContext;
use crate::errors::{Error, ErrorMessages};

use super::tally::DecryptedSelection;
use super::{Cipher, CipherDecryptionAndProof, Decryptions, ThresholdDecryptor};

/// KDF label of the per-contest hashed-ElGamal payload (write-ins, over-vote markers).
pub const CONTEST_DATA_LABEL: &str = "contest_data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBallot {
    pub ballot_id: String,
    pub contests: Vec<EncryptedContest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContest {
    pub contest_id: String,
    pub selections: Vec<EncryptedSelection>,
    /// Encrypted with [`CONTEST_DATA_LABEL`] and the contest id as KDF context.
    #[serde(default)]
    pub contest_data: Option<HashedCiphertext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSelection {
    pub selection_id: String,
    pub ciphertext: Ciphertext,
}

/// A challenged or spoiled ballot, opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedBallot {
    pub ballot_id: String,
    pub contests: Vec<DecryptedContest>,
    pub guardian_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedContest {
    pub contest_id: String,
    pub selections: Vec<DecryptedSelection>,
    pub contest_data: Option<DecryptedContestData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedContestData {
    #[serde(with = "crate::serialize::bytes")]
    pub data: Vec<u8>,
    pub ciphertext: HashedCiphertext,
    pub decryption: CipherDecryptionAndProof,
}

impl DecryptedBallot {
    pub fn verify(&self, context: &ElectionContext) -> Result<(), Error> {
        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        for contest in &self.contests {
            let mut ctx = ctx.scope(format!("contest {}", contest.contest_id));
            for selection in &contest.selections {
                selection.verify(context, &mut ctx);
            }
            if let Some(cd) = &contest.contest_data {
                ctx.check(
                    cd.decryption
                        .verify(&Cipher::Hashed(cd.ciphertext.clone()), context),
                    "contest data proof does not verify",
                );
                let reopened = cd.ciphertext.decrypt_with_beta(
                    &context.joint_public_key,
                    &context.extended_base_hash,
                    CONTEST_DATA_LABEL,
                    &contest.contest_id,
                    &cd.decryption.beta,
                );
                ctx.check(
                    reopened.as_ref() == Some(&cd.data),
                    "contest data does not match its ciphertext",
                );
            }
        }
        errs.into_result((), Error::Verification)
    }
}

/// Opens single ballots, including their contest data, in one threshold session each.
pub struct BallotDecryptor<'a> {
    decryptor: &'a ThresholdDecryptor,
}

impl<'a> BallotDecryptor<'a> {
    pub fn new(decryptor: &'a ThresholdDecryptor) -> BallotDecryptor<'a> {
        BallotDecryptor { decryptor }
    }

    #[instrument(level = "info", skip_all, fields(ballot = %ballot.ballot_id))]
    pub fn decrypt(&self, ballot: &EncryptedBallot) -> Result<DecryptedBallot, Error> {
        let mut texts = Vec::new();
        for contest in &ballot.contests {
            texts.extend(
                contest
                    .selections
                    .iter()
                    .map(|s| Cipher::ElGamal(s.ciphertext.clone())),
            );
            if let Some(cd) = &contest.contest_data {
                texts.push(Cipher::Hashed(cd.clone()));
            }
        }
        let Decryptions {
            items,
            flagged,
            guardian_ids,
        } = self.decryptor.decrypt(&texts)?;

        let context = self.decryptor.context();
        let mut errs = ErrorMessages::new();
        let mut ctx = errs.context();
        let mut items = items.into_iter().enumerate();
        let mut contests = Vec::with_capacity(ballot.contests.len());
        for contest in &ballot.contests {
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

            let mut contest_data = None;
            if let Some(cd) = &contest.contest_data {
                match items.next() {
                    None => ctx.add("session returned too few decryptions"),
                    Some((i, None)) => {
                        for f in flagged.get(&i).into_iter().flatten() {
                            ctx.scope("contest data").add(f);
                        }
                    }
                    Some((_, Some(decryption))) => {
                        match cd.decrypt_with_beta(
                            &context.joint_public_key,
                            &context.extended_base_hash,
                            CONTEST_DATA_LABEL,
                            &contest.contest_id,
                            &decryption.beta,
                        ) {
                            Some(data) => {
                                contest_data = Some(DecryptedContestData {
                                    data,
                                    ciphertext: cd.clone(),
                                    decryption,
                                })
                            }
                            None => ctx.add("contest data does not authenticate"),
                        }
                    }
                }
            }

            contests.push(DecryptedContest {
                contest_id: contest.contest_id.clone(),
                selections,
                contest_data,
            });
        }
        let decrypted = errs.into_result(
            DecryptedBallot {
                ballot_id: ballot.ballot_id.clone(),
                contests,
                guardian_ids,
            },
            Error::Plaintext,
        )?;
        info!("ballot decrypted");
        Ok(decrypted)
    }
}
