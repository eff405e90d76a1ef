use num::traits::{One, Pow};
use num::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::DecryptionConfig;
use crate::crypto::elgamal::Ciphertext;
use crate::crypto::group::{prime_minus_one, random_exponent, Element, Exponent};
use crate::decryption::ballot::BallotDecryptor;
use crate::decryption::tally::{EncryptedTally, TallyDecryptor};
use crate::decryption::{Cipher, Decryptions, ThresholdDecryptor};
use crate::errors::{Error, TrusteeError};
use crate::generate::{self, encrypt_ballot, GeneratedElection};
use crate::trustee::{BatchId, ChallengeResponses, DecryptingTrustee, PartialDecryptions, Trustee};

fn election(n: u32, k: u32) -> GeneratedElection {
    let mut rng = StdRng::seed_from_u64(u64::from(n * 100 + k));
    generate::generate(&mut rng, "test manifest", n, k, Duration::from_secs(60)).unwrap()
}

fn decryptor(e: &GeneratedElection, trustees: Vec<Arc<dyn Trustee>>) -> ThresholdDecryptor {
    decryptor_with(e, trustees, DecryptionConfig::default())
}

fn decryptor_with(
    e: &GeneratedElection,
    trustees: Vec<Arc<dyn Trustee>>,
    config: DecryptionConfig,
) -> ThresholdDecryptor {
    ThresholdDecryptor::new(e.context.clone(), e.guardians.clone(), trustees, config).unwrap()
}

fn encrypt(e: &GeneratedElection, rng: &mut StdRng, plaintext: u32) -> Cipher {
    Cipher::ElGamal(Ciphertext::encrypt(
        &e.context.joint_public_key,
        plaintext,
        &random_exponent(rng),
    ))
}

fn plaintext(
    d: &ThresholdDecryptor,
    cipher: &Cipher,
    decryptions: &Decryptions,
    i: usize,
) -> Option<u32> {
    match cipher {
        Cipher::ElGamal(c) => d.recover_plaintext(c, &decryptions.get(i)?.beta),
        Cipher::Hashed(_) => None,
    }
}

/// A trustee that misbehaves in one specific way.
struct Faulty {
    inner: Arc<DecryptingTrustee>,
    fault: Fault,
}

enum Fault {
    CorruptResponse,
    SlowDecrypt(Duration),
    FailDecrypt,
    PanicOnChallenge,
}

impl Faulty {
    fn new(inner: &Arc<DecryptingTrustee>, fault: Fault) -> Arc<dyn Trustee> {
        Arc::new(Faulty {
            inner: Arc::clone(inner),
            fault,
        })
    }
}

impl Trustee for Faulty {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn x_coordinate(&self) -> u32 {
        self.inner.x_coordinate()
    }

    fn guardian_public_key(&self) -> &Element {
        self.inner.guardian_public_key()
    }

    fn decrypt(&self, pads: &[Element]) -> Result<PartialDecryptions, TrusteeError> {
        match self.fault {
            Fault::SlowDecrypt(delay) => thread::sleep(delay),
            Fault::FailDecrypt => {
                return Err(TrusteeError::Unavailable("key share locked".to_owned()))
            }
            _ => {}
        }
        self.inner.decrypt(pads)
    }

    fn challenge(
        &self,
        batch_id: BatchId,
        challenges: &[Exponent],
    ) -> Result<ChallengeResponses, TrusteeError> {
        let mut responses = self.inner.challenge(batch_id, challenges)?;
        match self.fault {
            Fault::CorruptResponse => {
                let r = &responses.responses[0];
                responses.responses[0] = Exponent::new(r.as_uint() ^ &BigUint::one());
            }
            Fault::PanicOnChallenge => panic!("trustee crashed"),
            _ => {}
        }
        Ok(responses)
    }
}

#[test]
fn three_of_three_recovers_seven() {
    let e = election(3, 3);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(1);
    let texts = vec![encrypt(&e, &mut rng, 7)];

    let result = d.decrypt(&texts).unwrap();
    assert!(result.flagged.is_empty());
    assert!(result.verify(&texts, &e.context));
    assert_eq!(plaintext(&d, &texts[0], &result, 0), Some(7));
    assert_eq!(result.guardian_ids, vec!["guardian-1", "guardian-2", "guardian-3"]);
}

#[test]
fn every_quorum_subset_recovers_the_same_plaintext() {
    let e = election(5, 3);
    let mut rng = StdRng::seed_from_u64(2);
    let texts = vec![encrypt(&e, &mut rng, 42)];

    let mut betas = Vec::new();
    for present in &[vec![2, 3, 4], vec![1, 2, 3, 4], vec![1, 3, 5], vec![1, 2, 3, 4, 5]] {
        let d = decryptor(&e, e.present(present));
        let result = d.decrypt(&texts).unwrap();
        assert!(result.verify(&texts, &e.context), "present {:?}", present);
        assert_eq!(plaintext(&d, &texts[0], &result, 0), Some(42), "present {:?}", present);
        betas.push(result.get(0).unwrap().beta.clone());
    }
    assert!(betas.windows(2).all(|w| w[0] == w[1]));

    // The same mask a single holder of the joint secret would compute.
    assert_eq!(betas[0], texts[0].pad().pow(&e.secret_key));
}

#[test]
fn small_plaintexts_round_trip_in_one_batch() {
    let e = election(4, 2);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(3);
    let texts: Vec<Cipher> = (0..50).map(|v| encrypt(&e, &mut rng, v)).collect();

    let result = d.decrypt(&texts).unwrap();
    assert_eq!(result.items.len(), 50);
    assert!(result.verify(&texts, &e.context));
    for (i, text) in texts.iter().enumerate() {
        assert_eq!(plaintext(&d, text, &result, i), Some(i as u32));
    }
    for t in &e.trustees {
        assert_eq!(t.open_sessions(), 0);
    }
}

#[test]
fn single_guardian_election_needs_no_interpolation() {
    let e = election(1, 1);
    let d = decryptor(&e, e.all_present());
    assert!(d.lagrange_coordinates()[0].coefficient.is_one());

    let mut rng = StdRng::seed_from_u64(4);
    let texts = vec![encrypt(&e, &mut rng, 9)];
    let result = d.decrypt(&texts).unwrap();
    assert!(result.verify(&texts, &e.context));
    assert_eq!(plaintext(&d, &texts[0], &result, 0), Some(9));
}

#[test]
fn concurrent_sessions_share_trustees() {
    let e = election(4, 3);
    let d = Arc::new(decryptor(&e, e.present(&[1, 2, 4])));

    let sessions: Vec<_> = (0..8_u32)
        .map(|s| {
            let mut rng = StdRng::seed_from_u64(100 + u64::from(s));
            let texts: Vec<Cipher> = (0..5).map(|v| encrypt(&e, &mut rng, s * 5 + v)).collect();
            let d = Arc::clone(&d);
            thread::spawn(move || {
                let result = d.decrypt(&texts);
                (texts, result)
            })
        })
        .collect();

    for (s, session) in sessions.into_iter().enumerate() {
        let (texts, result) = session.join().unwrap();
        let result = result.unwrap();
        assert!(result.verify(&texts, &e.context), "session {}", s);
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(plaintext(&d, text, &result, i), Some((s * 5 + i) as u32));
        }
    }
    for t in &e.trustees {
        assert_eq!(t.open_sessions(), 0);
    }
    assert_eq!(d.metrics().sessions, 8);
}

#[test]
fn flipped_response_bit_breaks_the_proof() {
    let e = election(3, 2);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(5);
    let texts = vec![encrypt(&e, &mut rng, 1)];

    let mut result = d.decrypt(&texts).unwrap();
    let item = result.items[0].as_mut().unwrap();
    assert!(item.verify(&texts[0], &e.context));
    item.proof.response = Exponent::new(item.proof.response.as_uint() ^ &BigUint::one());
    assert!(!item.verify(&texts[0], &e.context));
    assert!(!result.verify(&texts, &e.context));
}

#[test]
fn corrupted_trustee_response_is_caught() {
    let e = election(3, 2);
    let mut rng = StdRng::seed_from_u64(6);
    let texts = vec![encrypt(&e, &mut rng, 2), encrypt(&e, &mut rng, 3)];
    let trustees = || {
        vec![
            Arc::clone(&e.trustees[0]) as Arc<dyn Trustee>,
            Faulty::new(&e.trustees[1], Fault::CorruptResponse),
        ]
    };

    match decryptor(&e, trustees()).decrypt(&texts) {
        Err(Error::Session(errs)) => {
            assert_eq!(errs.len(), 1, "{}", errs);
            assert!(errs.messages()[0].starts_with("in trustee guardian-2: in ciphertext 0:"));
        }
        other => panic!("expected a session error, got {:?}", other),
    }

    // Without the per-trustee check, the combined proof still exposes it.
    let config = DecryptionConfig {
        check_individual_responses: false,
        ..DecryptionConfig::default()
    };
    let result = decryptor_with(&e, trustees(), config).decrypt(&texts).unwrap();
    assert!(!result.get(0).unwrap().verify(&texts[0], &e.context));
    assert!(result.get(1).unwrap().verify(&texts[1], &e.context));
}

#[test]
fn invalid_pad_is_flagged_and_others_decrypt() {
    let e = election(3, 3);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(7);
    let bogus = Cipher::ElGamal(Ciphertext {
        pad: Element::new(prime_minus_one().clone()),
        data: Element::one(),
    });
    let texts = vec![encrypt(&e, &mut rng, 4), bogus, encrypt(&e, &mut rng, 5)];

    let result = d.decrypt(&texts).unwrap();
    assert_eq!(result.flagged.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(result.flagged[&1].len(), 3);
    assert!(result.is_flagged(1));
    assert!(result.items[1].is_none());
    assert!(result.verify(&texts, &e.context));
    for &i in &[0, 2] {
        assert!(result.get(i).unwrap().verify(&texts[i], &e.context));
    }
    assert_eq!(plaintext(&d, &texts[0], &result, 0), Some(4));
    assert_eq!(plaintext(&d, &texts[2], &result, 2), Some(5));
}

#[test]
fn flagged_item_never_carries_a_proof() {
    let e = election(3, 3);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(15);
    let bogus = Cipher::ElGamal(Ciphertext {
        pad: Element::new(prime_minus_one().clone()),
        data: Element::one(),
    });

    for _ in 0..20 {
        let texts = vec![encrypt(&e, &mut rng, 4), bogus.clone()];
        let mut result = d.decrypt(&texts).unwrap();
        assert!(result.get(1).is_none());
        assert!(result.verify(&texts, &e.context));

        // A proof smuggled into the flagged slot is rejected.
        result.items[1] = result.items[0].clone();
        assert!(!result.verify(&texts, &e.context));
    }
}

#[test]
fn slow_trustee_is_excluded_when_quorum_holds() {
    let e = election(4, 3);
    let config = DecryptionConfig {
        trustee_timeout_ms: 200,
        ..DecryptionConfig::default()
    };
    let mut trustees = e.present(&[1, 2, 3]);
    trustees.push(Faulty::new(&e.trustees[3], Fault::SlowDecrypt(Duration::from_secs(2))));
    let d = decryptor_with(&e, trustees, config);

    let mut rng = StdRng::seed_from_u64(8);
    let texts = vec![encrypt(&e, &mut rng, 11)];
    let result = d.decrypt(&texts).unwrap();
    assert!(result.verify(&texts, &e.context));
    assert_eq!(plaintext(&d, &texts[0], &result, 0), Some(11));
    assert_eq!(result.guardian_ids, vec!["guardian-1", "guardian-2", "guardian-3"]);
}

#[test]
fn slow_trustee_below_quorum_fails_the_session() {
    let e = election(3, 3);
    let config = DecryptionConfig {
        trustee_timeout_ms: 200,
        ..DecryptionConfig::default()
    };
    let mut trustees = e.present(&[1, 2]);
    trustees.push(Faulty::new(&e.trustees[2], Fault::SlowDecrypt(Duration::from_secs(2))));
    let d = decryptor_with(&e, trustees, config);

    let mut rng = StdRng::seed_from_u64(9);
    let result = d.decrypt(&[encrypt(&e, &mut rng, 1)]);
    assert!(matches!(result, Err(Error::Session(_))));
}

#[test]
fn failing_or_crashing_trustee_yields_no_proofs() {
    let e = election(3, 2);
    let mut rng = StdRng::seed_from_u64(10);
    let texts = vec![encrypt(&e, &mut rng, 1)];

    let failing = vec![
        Arc::clone(&e.trustees[0]) as Arc<dyn Trustee>,
        Faulty::new(&e.trustees[1], Fault::FailDecrypt),
    ];
    match decryptor(&e, failing).decrypt(&texts) {
        Err(Error::Session(errs)) => assert!(errs.messages()[0].contains("key share locked")),
        other => panic!("expected a session error, got {:?}", other),
    }

    let crashing = vec![
        Arc::clone(&e.trustees[0]) as Arc<dyn Trustee>,
        Faulty::new(&e.trustees[1], Fault::PanicOnChallenge),
    ];
    match decryptor(&e, crashing).decrypt(&texts) {
        Err(Error::Session(errs)) => assert!(errs.messages()[0].contains("panicked")),
        other => panic!("expected a session error, got {:?}", other),
    }
}

#[test]
fn configuration_problems_are_reported_together() {
    let e = election(3, 3);
    let stranger = DecryptingTrustee::new(
        "guardian-9",
        9,
        Element::one(),
        Exponent::one(),
        Duration::from_secs(60),
    );
    let impostor = DecryptingTrustee::new(
        "guardian-1",
        7,
        Element::one(),
        Exponent::one(),
        Duration::from_secs(60),
    );
    let trustees: Vec<Arc<dyn Trustee>> = vec![Arc::new(stranger), Arc::new(impostor)];

    let config = DecryptionConfig::default();
    match ThresholdDecryptor::new(e.context.clone(), e.guardians.clone(), trustees, config) {
        Err(Error::Configuration(errs)) => {
            // too few trustees, unknown id, key mismatch, coordinate mismatch
            assert_eq!(errs.len(), 4, "{}", errs);
            assert!(errs
                .messages()
                .iter()
                .any(|m| m == "in trustee guardian-9: unknown guardian id"));
        }
        Err(other) => panic!("expected a configuration error, got {:?}", other),
        Ok(_) => panic!("accepted a bad configuration"),
    }
}

#[test]
fn empty_batch_is_an_empty_success() {
    let e = election(2, 2);
    let d = decryptor(&e, e.all_present());
    let result = d.decrypt(&[]).unwrap();
    assert!(result.items.is_empty());
    assert_eq!(d.metrics().trustee_calls, 0);
}

#[test]
fn tally_and_spoiled_ballot_decrypt_and_verify() {
    let e = election(5, 3);
    let mut rng = StdRng::seed_from_u64(11);
    let ballots: Vec<_> = [[1, 0, 0], [0, 1, 0], [1, 0, 0], [0, 0, 1], [1, 0, 0]]
        .iter()
        .enumerate()
        .map(|(b, votes)| {
            encrypt_ballot(
                &mut rng,
                &e.context,
                &format!("ballot-{}", b),
                &[votes.to_vec(), vec![1, 1]],
                &[None, Some(b"write-in: Ada Lovelace".to_vec())],
            )
        })
        .collect();

    let d = decryptor(&e, e.present(&[1, 3, 5]));
    let tally = TallyDecryptor::new(&d)
        .decrypt(&EncryptedTally::accumulate(&ballots).unwrap())
        .unwrap();
    tally.verify(&e.context).unwrap();
    assert_eq!(tally.count("contest-0", "selection-0"), Some(3));
    assert_eq!(tally.count("contest-0", "selection-2"), Some(1));
    assert_eq!(tally.count("contest-1", "selection-1"), Some(5));

    let spoiled = BallotDecryptor::new(&d).decrypt(&ballots[3]).unwrap();
    spoiled.verify(&e.context).unwrap();
    let selections: Vec<u32> = spoiled.contests[0].selections.iter().map(|s| s.tally).collect();
    assert_eq!(selections, vec![0, 0, 1]);
    assert!(spoiled.contests[0].contest_data.is_none());
    let data = spoiled.contests[1].contest_data.as_ref().unwrap();
    assert_eq!(data.data, b"write-in: Ada Lovelace".to_vec());
}

#[test]
fn count_beyond_the_search_bound_is_a_plaintext_error() {
    let e = election(2, 2);
    let config = DecryptionConfig {
        max_dlog: 5,
        ..DecryptionConfig::default()
    };
    let d = decryptor_with(&e, e.all_present(), config);
    let mut rng = StdRng::seed_from_u64(12);
    let ballots: Vec<_> = (0..6)
        .map(|b| encrypt_ballot(&mut rng, &e.context, &format!("b{}", b), &[vec![1]], &[]))
        .collect();

    match TallyDecryptor::new(&d).decrypt(&EncryptedTally::accumulate(&ballots).unwrap()) {
        Err(Error::Plaintext(errs)) => assert_eq!(
            errs.messages(),
            &["in contest contest-0: in selection selection-0: no plaintext up to 5".to_owned()]
        ),
        other => panic!("expected a plaintext error, got {:?}", other),
    }
}

#[test]
fn mismatched_ballots_do_not_accumulate() {
    let e = election(2, 2);
    let mut rng = StdRng::seed_from_u64(13);
    let a = encrypt_ballot(&mut rng, &e.context, "a", &[vec![1, 0]], &[]);
    let b = encrypt_ballot(&mut rng, &e.context, "b", &[vec![1, 0, 0]], &[]);
    assert!(matches!(EncryptedTally::accumulate(&[a, b]), Err(Error::Structure(_))));
}

#[test]
fn metrics_count_work_per_session() {
    let e = election(3, 2);
    let d = decryptor(&e, e.all_present());
    let mut rng = StdRng::seed_from_u64(14);
    let texts: Vec<Cipher> = (0..4).map(|v| encrypt(&e, &mut rng, v)).collect();
    d.decrypt(&texts).unwrap();

    let m = d.metrics();
    assert_eq!(m.sessions, 1);
    assert_eq!(m.trustee_calls, 6);
    // 4 ciphertexts x 3 trustees for interpolation, 4 x 4 x 3 for the response checks
    assert_eq!(m.exponentiations, 12 + 48);
    assert_eq!(e.trustees[0].metrics().exponentiations, 12);

    d.decrypt(&texts[..1]).unwrap();
    let second = d.metrics() - m;
    assert_eq!(second.sessions, 1);
    assert_eq!(second.trustee_calls, 6);
    assert_eq!(second.exponentiations, 3 + 12);
}
