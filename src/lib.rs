//! Threshold decryption for ElectionGuard: a quorum of guardian trustees jointly decrypts
//! ElGamal ciphertexts and produces Chaum-Pedersen proofs of correct decryption, without any
//! party holding the election secret key.

pub mod config;
pub mod crypto;
pub mod decryption;
pub mod election;
pub mod errors;
pub mod generate;
pub mod guardian;
pub mod lagrange;
pub mod metrics;
pub mod serialize;
pub mod trustee;

pub use config::DecryptionConfig;
pub use decryption::{Cipher, CipherDecryptionAndProof, Decryptions, ThresholdDecryptor};
pub use errors::{Error, TrusteeError};
pub use trustee::{DecryptingTrustee, Trustee};

#[cfg(test)]
mod test_threshold;
