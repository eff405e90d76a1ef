use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::io;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use electionguard_decrypt::decryption::tally::{DecryptedTally, EncryptedTally, TallyDecryptor};
use electionguard_decrypt::generate::{self, encrypt_ballot};
use electionguard_decrypt::metrics::MetricsSnapshot;
use electionguard_decrypt::{DecryptionConfig, Error, ThresholdDecryptor};

#[derive(StructOpt)]
#[structopt(
    name = "electionguard-decrypt",
    about = "Simulate an election and decrypt its tally with a quorum of guardians."
)]
struct Options {
    /// JSON file with decryption settings. Defaults apply if absent.
    #[structopt(parse(from_os_str))]
    #[structopt(short = "c", long = "config")]
    config: Option<std::path::PathBuf>,

    /// Number of guardians.
    #[structopt(short = "n", long = "guardians", default_value = "5")]
    guardians: u32,

    /// Number of guardians needed to decrypt.
    #[structopt(short = "k", long = "quorum", default_value = "3")]
    quorum: u32,

    /// x coordinates of the guardians taking part, e.g. `2,3,4`. Everyone if absent.
    #[structopt(short = "p", long = "present", use_delimiter = true)]
    present: Vec<u32>,

    /// Number of ballots to cast.
    #[structopt(short = "b", long = "ballots", default_value = "20")]
    ballots: usize,

    /// Number of selections in the single contest.
    #[structopt(long = "selections", default_value = "3")]
    selections: usize,

    /// Seed for the simulation's randomness.
    #[structopt(long = "seed", default_value = "0")]
    seed: u64,
}

#[derive(Serialize)]
struct Report {
    tally: DecryptedTally,
    decryptor: MetricsSnapshot,
    guardians: MetricsSnapshot,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opt = Options::from_args();
    let config = match &opt.config {
        Some(path) => DecryptionConfig::from_path(path)?,
        None => DecryptionConfig::default(),
    };

    let mut rng = StdRng::seed_from_u64(opt.seed);
    let election = generate::generate(
        &mut rng,
        "simulated election",
        opt.guardians,
        opt.quorum,
        config.session_ttl(),
    )?;

    let ballots: Vec<_> = (0..opt.ballots)
        .map(|b| {
            let choice = rng.gen_range(0..opt.selections.max(1));
            let votes: Vec<u32> = (0..opt.selections).map(|s| (s == choice) as u32).collect();
            encrypt_ballot(
                &mut rng,
                &election.context,
                &format!("ballot-{}", b),
                &[votes],
                &[],
            )
        })
        .collect();
    let encrypted = EncryptedTally::accumulate(&ballots)?;
    info!(ballots = ballots.len(), "ballots cast");

    let trustees = if opt.present.is_empty() {
        election.all_present()
    } else {
        election.present(&opt.present)
    };
    let decryptor = ThresholdDecryptor::new(
        election.context.clone(),
        election.guardians.clone(),
        trustees,
        config,
    )?;
    let tally = TallyDecryptor::new(&decryptor).decrypt(&encrypted)?;
    tally.verify(decryptor.context())?;

    let report = Report {
        tally,
        decryptor: decryptor.metrics(),
        guardians: election.guardians.metrics(),
    };
    serde_json::to_writer_pretty(io::stdout(), &report)?;
    println!();
    Ok(())
}
