//! Hashed ElGamal: arbitrary-length payloads encrypted under the joint key.
//!
//! With nonce `ξ`, `c0 = g^ξ` and the shared value `β = K^ξ` seeds a key
//! `k = H(H_E; 0x22, K, c0, β)`. A counter-mode HMAC KDF stretches `k` into `k_0` (MAC key)
//! and one 32-byte block key per payload block; `c1` is the XOR of the zero-padded payload with
//! the block keys and `c2 = HMAC(k_0, c0 || c1)` authenticates both.
//!
//! A threshold decryption reconstructs `β = c0^s` exactly like the mask of an ordinary
//! ElGamal ciphertext, which is why both kinds share one decryption protocol.

use hmac::{Hmac, Mac};
use num::traits::Pow;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::group::{gen_pow, Element, Exponent};
use crate::crypto::hash::{AsBytes, UInt256};
use crate::hash_elems;

type HmacSha256 = Hmac<Sha256>;

const BLOCK_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedCiphertext {
    /// `g^ξ`; plays the role of the pad.
    pub c0: Element,
    /// The encrypted, block-padded payload.
    #[serde(with = "crate::serialize::bytes")]
    pub c1: Vec<u8>,
    /// Authentication tag over `c0 || c1`.
    pub c2: UInt256,
    /// Length of the original payload.
    pub num_bytes: u32,
}

impl HashedCiphertext {
    pub fn encrypt(
        message: &[u8],
        public_key: &Element,
        extended_base_hash: &UInt256,
        label: &str,
        context: &str,
        nonce: &Exponent,
    ) -> HashedCiphertext {
        let c0 = gen_pow(nonce);
        let beta = public_key.pow(nonce);
        let kdf = Kdf::new(
            extended_base_hash,
            public_key,
            &c0,
            &beta,
            label,
            context,
            message.len(),
        );

        let mut c1 = pad_to_blocks(message);
        kdf.apply(&mut c1);
        let c2 = kdf.tag(&c0, &c1);

        HashedCiphertext {
            c0,
            c1,
            c2,
            num_bytes: message.len() as u32,
        }
    }

    /// Recover the payload given `β = c0^s`. Returns `None` if the tag does not verify, which
    /// means either a wrong `β` or a tampered ciphertext.
    pub fn decrypt_with_beta(
        &self,
        public_key: &Element,
        extended_base_hash: &UInt256,
        label: &str,
        context: &str,
        beta: &Element,
    ) -> Option<Vec<u8>> {
        let num_bytes = self.num_bytes as usize;
        if self.c1.len() != block_count(num_bytes) * BLOCK_BYTES {
            return None;
        }
        let kdf = Kdf::new(
            extended_base_hash,
            public_key,
            &self.c0,
            beta,
            label,
            context,
            num_bytes,
        );
        if !kdf.verify(&self.c0, &self.c1, &self.c2) {
            return None;
        }

        let mut plaintext = self.c1.clone();
        kdf.apply(&mut plaintext);
        plaintext.truncate(num_bytes);
        Some(plaintext)
    }
}

fn block_count(num_bytes: usize) -> usize {
    std::cmp::max(1, (num_bytes + BLOCK_BYTES - 1) / BLOCK_BYTES)
}

fn pad_to_blocks(message: &[u8]) -> Vec<u8> {
    let mut padded = message.to_vec();
    padded.resize(block_count(message.len()) * BLOCK_BYTES, 0);
    padded
}

struct Kdf<'a> {
    key: UInt256,
    label: &'a str,
    context: &'a str,
    bit_length: u32,
}

impl<'a> Kdf<'a> {
    fn new(
        extended_base_hash: &UInt256,
        public_key: &Element,
        c0: &Element,
        beta: &Element,
        label: &'a str,
        context: &'a str,
        num_bytes: usize,
    ) -> Kdf<'a> {
        Kdf {
            key: hash_elems!(extended_base_hash; 0x22_u8, public_key, c0, beta),
            label,
            context,
            bit_length: (num_bytes * 8) as u32,
        }
    }

    /// `k_i = HMAC(k, i || label || 0x00 || context || bit_length)`.
    fn block_key(&self, i: u32) -> UInt256 {
        hash_elems!(&self.key; i, self.label, 0x00_u8, self.context, self.bit_length)
    }

    fn mac(&self, c0: &Element, c1: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.block_key(0).bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(&c0.as_bytes());
        mac.update(c1);
        mac
    }

    fn tag(&self, c0: &Element, c1: &[u8]) -> UInt256 {
        let mut out = [0_u8; 32];
        out.copy_from_slice(&self.mac(c0, c1).finalize().into_bytes());
        UInt256(out)
    }

    fn verify(&self, c0: &Element, c1: &[u8], tag: &UInt256) -> bool {
        self.mac(c0, c1).verify_slice(tag.bytes()).is_ok()
    }

    /// XOR each block with its key; applying twice is the identity.
    fn apply(&self, blocks: &mut [u8]) {
        for (i, block) in blocks.chunks_mut(BLOCK_BYTES).enumerate() {
            let key = self.block_key(i as u32 + 1);
            for (b, k) in block.iter_mut().zip(key.bytes().iter()) {
                *b ^= k;
            }
        }
    }
}
