//! Decryption through trustees that only talk JSON, in the production group.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use electionguard_decrypt::crypto::group::{Element, Exponent};
use electionguard_decrypt::decryption::ballot::BallotDecryptor;
use electionguard_decrypt::decryption::tally::{DecryptedTally, EncryptedTally, TallyDecryptor};
use electionguard_decrypt::generate::{self, encrypt_ballot, GeneratedElection};
use electionguard_decrypt::trustee::{BatchId, ChallengeResponses, PartialDecryptions};
use electionguard_decrypt::{
    DecryptingTrustee, DecryptionConfig, ThresholdDecryptor, Trustee, TrusteeError,
};

#[derive(Serialize, Deserialize)]
enum Request {
    Decrypt {
        pads: Vec<Element>,
    },
    Challenge {
        batch_id: BatchId,
        challenges: Vec<Exponent>,
    },
}

#[derive(Serialize, Deserialize)]
enum Response {
    Decrypt(Result<PartialDecryptions, TrusteeError>),
    Challenge(Result<ChallengeResponses, TrusteeError>),
}

/// The trustee's side of the wire.
fn serve(trustee: &DecryptingTrustee, request: &str) -> String {
    let response = match serde_json::from_str(request) {
        Ok(Request::Decrypt { pads }) => Response::Decrypt(trustee.decrypt(&pads)),
        Ok(Request::Challenge {
            batch_id,
            challenges,
        }) => Response::Challenge(trustee.challenge(batch_id, &challenges)),
        Err(e) => Response::Decrypt(Err(TrusteeError::Unavailable(e.to_string()))),
    };
    serde_json::to_string(&response).unwrap()
}

/// The orchestrator's side: every call crosses a JSON encoding in both directions.
struct LoopbackTrustee {
    id: String,
    x_coordinate: u32,
    guardian_public_key: Element,
    server: Arc<DecryptingTrustee>,
}

impl LoopbackTrustee {
    fn connect(server: &Arc<DecryptingTrustee>) -> Arc<dyn Trustee> {
        Arc::new(LoopbackTrustee {
            id: server.id().to_owned(),
            x_coordinate: server.x_coordinate(),
            guardian_public_key: server.guardian_public_key().clone(),
            server: Arc::clone(server),
        })
    }

    fn call(&self, request: &Request) -> Result<Response, TrusteeError> {
        let unavailable = |e: serde_json::Error| TrusteeError::Unavailable(e.to_string());
        let request = serde_json::to_string(request).map_err(unavailable)?;
        serde_json::from_str(&serve(&self.server, &request)).map_err(unavailable)
    }
}

impl Trustee for LoopbackTrustee {
    fn id(&self) -> &str {
        &self.id
    }

    fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    fn guardian_public_key(&self) -> &Element {
        &self.guardian_public_key
    }

    fn decrypt(&self, pads: &[Element]) -> Result<PartialDecryptions, TrusteeError> {
        match self.call(&Request::Decrypt {
            pads: pads.to_vec(),
        })? {
            Response::Decrypt(result) => result,
            Response::Challenge(_) => Err(TrusteeError::Unavailable("unexpected reply".to_owned())),
        }
    }

    fn challenge(
        &self,
        batch_id: BatchId,
        challenges: &[Exponent],
    ) -> Result<ChallengeResponses, TrusteeError> {
        match self.call(&Request::Challenge {
            batch_id,
            challenges: challenges.to_vec(),
        })? {
            Response::Challenge(result) => result,
            Response::Decrypt(_) => Err(TrusteeError::Unavailable("unexpected reply".to_owned())),
        }
    }
}

fn election() -> Result<GeneratedElection, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(2024);
    Ok(generate::generate(&mut rng, "integration manifest", 3, 2, Duration::from_secs(60))?)
}

#[test]
fn remote_trustees_decrypt_a_tally() -> Result<(), Box<dyn Error>> {
    let e = election()?;
    let mut rng = StdRng::seed_from_u64(1);
    let ballots: Vec<_> = [[1, 0], [1, 0], [0, 1]]
        .iter()
        .enumerate()
        .map(|(b, votes)| {
            encrypt_ballot(&mut rng, &e.context, &format!("ballot-{}", b), &[votes.to_vec()], &[])
        })
        .collect();

    let trustees = vec![
        LoopbackTrustee::connect(&e.trustees[0]),
        LoopbackTrustee::connect(&e.trustees[2]),
    ];
    let config = DecryptionConfig::default();
    let d = ThresholdDecryptor::new(e.context.clone(), e.guardians.clone(), trustees, config)?;
    let tally = TallyDecryptor::new(&d).decrypt(&EncryptedTally::accumulate(&ballots)?)?;
    tally.verify(&e.context)?;
    assert_eq!(tally.count("contest-0", "selection-0"), Some(2));
    assert_eq!(tally.count("contest-0", "selection-1"), Some(1));
    assert_eq!(tally.guardian_ids, vec!["guardian-1", "guardian-3"]);
    for t in &e.trustees {
        assert_eq!(t.open_sessions(), 0);
    }
    Ok(())
}

#[test]
fn published_tally_verifies_after_json() -> Result<(), Box<dyn Error>> {
    let e = election()?;
    let mut rng = StdRng::seed_from_u64(2);
    let ballots = vec![encrypt_ballot(&mut rng, &e.context, "only", &[vec![1, 0, 1]], &[])];

    let trustees = vec![
        LoopbackTrustee::connect(&e.trustees[1]),
        Arc::clone(&e.trustees[0]) as Arc<dyn Trustee>,
    ];
    let config = DecryptionConfig::default();
    let d = ThresholdDecryptor::new(e.context.clone(), e.guardians.clone(), trustees, config)?;
    let tally = TallyDecryptor::new(&d).decrypt(&EncryptedTally::accumulate(&ballots)?)?;

    let published = serde_json::to_string_pretty(&tally)?;
    let reloaded: DecryptedTally = serde_json::from_str(&published)?;
    reloaded.verify(&e.context)?;
    assert_eq!(reloaded, tally);
    Ok(())
}

#[test]
fn spoiled_ballot_with_contest_data_through_json_config() -> Result<(), Box<dyn Error>> {
    let e = election()?;
    let json = br#"{
        "workers": 2,
        "trustee_timeout_ms": 60000,
        "check_individual_responses": true
    }"#;
    let config = DecryptionConfig::from_reader(&json[..])?;
    let mut rng = StdRng::seed_from_u64(3);
    let ballot = encrypt_ballot(
        &mut rng,
        &e.context,
        "spoiled",
        &[vec![0, 1]],
        &[Some(b"overvote".to_vec())],
    );

    let trustees = e.trustees.iter().map(LoopbackTrustee::connect).collect();
    let d = ThresholdDecryptor::new(e.context.clone(), e.guardians.clone(), trustees, config)?;
    let opened = BallotDecryptor::new(&d).decrypt(&ballot)?;
    opened.verify(&e.context)?;

    let contest = &opened.contests[0];
    assert_eq!(contest.selections.iter().map(|s| s.tally).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(contest.contest_data.as_ref().map(|cd| cd.data.as_slice()), Some(&b"overvote"[..]));
    Ok(())
}

#[test]
fn unknown_batch_survives_the_wire() {
    let e = election().unwrap();
    let remote = LoopbackTrustee::connect(&e.trustees[0]);
    let result = remote.challenge(BatchId(42), &[Exponent::from(1_u32)]);
    assert_eq!(result, Err(TrusteeError::UnknownBatch(BatchId(42))));
}
