//! Error types and the diagnostic accumulator.
//!
//! Configuration and session checks do not stop at the first problem. They push
//! human-readable messages into an [`ErrorMessages`] through a scoped [`ErrorContext`], and
//! the caller turns a non-empty collection into an [`Error`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::trustee::BatchId;

#[derive(Debug, Error)]
pub enum Error {
    /// The trustees and guardians handed to a decryptor do not fit together.
    #[error("invalid decryption configuration:\n{0}")]
    Configuration(ErrorMessages),

    /// A decryption session failed; no proofs were produced.
    #[error("decryption session failed:\n{0}")]
    Session(ErrorMessages),

    /// Decryption succeeded but some plaintexts could not be recovered.
    #[error("plaintext recovery failed:\n{0}")]
    Plaintext(ErrorMessages),

    /// Encrypted ballots do not share one contest and selection layout.
    #[error("inconsistent ballot structure:\n{0}")]
    Structure(ErrorMessages),

    /// A decrypted tally or ballot failed re-verification.
    #[error("verification failed:\n{0}")]
    Verification(ErrorMessages),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Soft failures reported by a trustee. These cross the trustee boundary, so they serialize.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TrusteeError {
    #[error("unknown batch id {0} (never issued, already used, or expired)")]
    UnknownBatch(BatchId),

    #[error("batch {batch_id} has {expected} ciphertexts but {actual} challenges were sent")]
    LengthMismatch {
        batch_id: BatchId,
        expected: usize,
        actual: usize,
    },

    #[error("trustee unavailable: {0}")]
    Unavailable(String),
}

/// An ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMessages {
    errs: Vec<String>,
}

impl ErrorMessages {
    pub fn new() -> ErrorMessages {
        ErrorMessages::default()
    }

    pub fn context(&mut self) -> ErrorContext<'_> {
        ErrorContext::new(&mut self.errs)
    }

    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errs.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.errs
    }

    /// `Ok(value)` if nothing was reported, otherwise `Err(wrap(self))`.
    pub fn into_result<T>(
        self,
        value: T,
        wrap: impl FnOnce(ErrorMessages) -> Error,
    ) -> Result<T, Error> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(wrap(self))
        }
    }
}

impl fmt::Display for ErrorMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errs {
            writeln!(f, "  {}", e)?;
        }
        Ok(())
    }
}

pub struct ErrorContext<'a> {
    errs: &'a mut Vec<String>,
    prefix: String,
}

impl<'a> ErrorContext<'a> {
    pub fn new(errs: &'a mut Vec<String>) -> ErrorContext<'a> {
        ErrorContext {
            errs,
            prefix: String::new(),
        }
    }

    pub fn add(&mut self, msg: impl fmt::Display) {
        self.errs.push(format!("{}{}", self.prefix, msg));
    }

    /// Record `msg` unless `cond` holds. Returns `cond`.
    pub fn check(&mut self, cond: bool, msg: impl fmt::Display) -> bool {
        if !cond {
            self.add(msg);
        }
        cond
    }

    pub fn scope<'b>(&'b mut self, desc: impl fmt::Display) -> ErrorContext<'b> {
        ErrorContext {
            errs: &mut *self.errs,
            prefix: format!("{}in {}: ", self.prefix, desc),
        }
    }
}
