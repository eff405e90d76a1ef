use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use crate::errors::Error;

/// Tunables for a decryption session and for the trustees it talks to.
///
/// Every field has a default, so a config file only needs to name what it changes:
///
/// ```json
/// { "workers": 4, "trustee_timeout_ms": 5000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptionConfig {
    /// Size of the pool that runs trustee calls. Zero means one thread per trustee.
    pub workers: usize,

    /// How long a round waits for all trustees before treating the rest as missing.
    pub trustee_timeout_ms: u64,

    /// How long a trustee keeps round-one state for a batch that is never challenged.
    pub session_ttl_secs: u64,

    /// Largest plaintext the discrete-log search will look for.
    pub max_dlog: u32,

    /// Check each trustee's response against its own commitments, not just the combined proof.
    pub check_individual_responses: bool,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        DecryptionConfig {
            workers: 0,
            trustee_timeout_ms: 30_000,
            session_ttl_secs: 600,
            max_dlog: 1_000,
            check_individual_responses: true,
        }
    }
}

impl DecryptionConfig {
    pub fn from_reader(reader: impl Read) -> Result<DecryptionConfig, Error> {
        Ok(serde_json::from_reader(BufReader::new(reader))?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<DecryptionConfig, Error> {
        DecryptionConfig::from_reader(File::open(path)?)
    }

    pub fn trustee_timeout(&self) -> Duration {
        Duration::from_millis(self.trustee_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}
