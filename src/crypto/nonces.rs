use crate::crypto::group::Exponent;
use crate::hash_elems;

/// A deterministic sequence of exponents `u_i = H(seed; header, i) mod q`.
///
/// Anyone holding the seed and header regenerates exactly the same sequence, which is how a
/// trustee recovers its round-one nonces when the challenge arrives.
#[derive(Debug, Clone)]
pub struct Nonces {
    seed: Exponent,
    header: String,
}

impl Nonces {
    pub fn new(seed: &Exponent, header: &str) -> Nonces {
        Nonces {
            seed: seed.clone(),
            header: header.to_owned(),
        }
    }

    pub fn get(&self, index: u32) -> Exponent {
        hash_elems!(&self.seed; self.header, index).to_exponent()
    }

    /// The first `count` nonces.
    pub fn take(&self, count: usize) -> Vec<Exponent> {
        (0..count as u32).map(|i| self.get(i)).collect()
    }
}
