//! Group arithmetic, hashing, ciphertexts and proofs.

pub mod chaum_pedersen;
pub mod dlog;
pub mod elgamal;
pub mod group;
pub mod hash;
pub mod hashed_elgamal;
pub mod nonces;
pub mod schnorr;
