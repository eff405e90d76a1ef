use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::crypto::group::Exponent;
use crate::errors::TrusteeError;
use crate::trustee::BatchId;

#[derive(Debug)]
struct Session {
    seed: Exponent,
    size: usize,
    created: Instant,
}

/// Round-one state of a trustee, keyed by batch id.
///
/// Each entry is a single-use ticket: [`SessionStore::take`] removes it, and entries older than
/// the TTL are dropped on every access.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<BatchId, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> SessionStore {
        SessionStore {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Store `seed` for a batch of `size` ciphertexts under a fresh random id.
    pub fn insert(&self, seed: Exponent, size: usize) -> BatchId {
        let mut sessions = self.lock();
        self.sweep(&mut sessions);
        let mut rng = rand::thread_rng();
        let batch_id = loop {
            let candidate = BatchId(rng.gen());
            if candidate != BatchId::NONE && !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(
            batch_id,
            Session {
                seed,
                size,
                created: Instant::now(),
            },
        );
        batch_id
    }

    /// Remove and return the seed of `batch_id`. A request for the wrong number of
    /// challenges is rejected and leaves the ticket in place.
    pub fn take(&self, batch_id: BatchId, size: usize) -> Result<Exponent, TrusteeError> {
        let mut sessions = self.lock();
        self.sweep(&mut sessions);
        match sessions.get(&batch_id) {
            None => Err(TrusteeError::UnknownBatch(batch_id)),
            Some(session) if session.size != size => Err(TrusteeError::LengthMismatch {
                batch_id,
                expected: session.size,
                actual: size,
            }),
            Some(_) => sessions
                .remove(&batch_id)
                .map(|session| session.seed)
                .ok_or(TrusteeError::UnknownBatch(batch_id)),
        }
    }

    /// Drop every entry older than the TTL. Returns how many were dropped.
    pub fn expire_stale(&self) -> usize {
        let mut sessions = self.lock();
        self.sweep(&mut sessions)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BatchId, Session>> {
        // The map is left consistent by every critical section, so a poisoned lock is usable.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self, sessions: &mut HashMap<BatchId, Session>) -> usize {
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, s| s.created.elapsed() < ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "dropped abandoned decryption sessions");
        }
        expired
    }
}
