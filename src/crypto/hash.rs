//! The domain-separated hash `H(key; x_1, ..., x_n)`.
//!
//! Every protocol hash is HMAC-SHA-256 keyed with a 32-byte election value (usually the
//! extended base hash), over the concatenated encodings of its inputs. Numbers are fixed
//! width and strings are length-prefixed. The byte layout is part of the protocol: a verifier
//! in another language has to reproduce the exact same input bytes.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::borrow::Cow;
use std::fmt;

use super::group::{Element, Exponent};

type HmacSha256 = Hmac<Sha256>;

/// A 256-bit hash output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UInt256(#[serde(with = "crate::serialize::hash")] pub [u8; 32]);

impl UInt256 {
    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interpret the hash as a big-endian integer reduced mod `q`.
    pub fn to_exponent(&self) -> Exponent {
        Exponent::from_bytes_be(&self.0)
    }

}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Anything that can be fed to the hash function.
pub trait AsBytes {
    fn as_bytes(&self) -> Cow<'_, [u8]>;
}

impl AsBytes for UInt256 {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.0)
    }
}

impl AsBytes for Element {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.to_bytes())
    }
}

impl AsBytes for Exponent {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.to_bytes())
    }
}

impl AsBytes for [u8] {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl AsBytes for Vec<u8> {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

/// Strings carry their byte length as a 4-byte big-endian prefix, so adjacent strings cannot
/// run into each other.
impl AsBytes for str {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        let bytes = str::as_bytes(self);
        let mut out = Vec::with_capacity(4 + bytes.len());
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
        Cow::Owned(out)
    }
}

impl AsBytes for String {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        AsBytes::as_bytes(self.as_str())
    }
}

impl<T: AsBytes + ?Sized> AsBytes for &T {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        (**self).as_bytes()
    }
}

/// Domain separators are single bytes.
impl AsBytes for u8 {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(vec![*self])
    }
}

/// Indices and coordinates are 4 bytes, big-endian.
impl AsBytes for u32 {
    fn as_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.to_be_bytes().to_vec())
    }
}

/// HMAC-SHA-256 keyed with `key` over the concatenated encodings of `elements`.
pub fn hash_function(key: &[u8], elements: &[&dyn AsBytes]) -> UInt256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for e in elements {
        mac.update(&e.as_bytes());
    }
    let mut out = [0_u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    UInt256(out)
}

/// `hash_elems!(key; a, b, c)` hashes `a`, `b`, `c` keyed by `key` (anything with `AsBytes`).
#[macro_export]
macro_rules! hash_elems {
    ( $key:expr; $( $x:expr ),* $(,)? ) => {
        $crate::crypto::hash::hash_function(
            &$crate::crypto::hash::AsBytes::as_bytes($key),
            &[ $( &$x as &dyn $crate::crypto::hash::AsBytes ),* ],
        )
    };
}
