use lazy_static::*;
use num::bigint::RandBigInt;
use num::traits::{Num, One, Pow, Zero};
use num::BigUint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// An element of the multiplicative group of integers modulo `p` (`ElementModP`).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element {
    #[serde(with = "crate::serialize::big_uint")]
    element: BigUint,
}

/// An exponent in the additive group of integers modulo the subgroup order `q`
/// (`ElementModQ`).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exponent {
    #[serde(with = "crate::serialize::big_uint")]
    exponent: BigUint,
}

impl Element {
    /// Return the generator element of the group `G`.
    pub fn gen() -> Element {
        Element::unchecked(GENERATOR.clone())
    }

    /// Inject an integer into the group: this wraps modulo the prime modulus if
    /// the number is greater than or equal to the modulus.
    pub fn new(element: BigUint) -> Element {
        Element::unchecked(element % &*PRIME_MODULUS)
    }

    fn unchecked(element: BigUint) -> Element {
        Element { element }
    }

    pub fn as_uint(&self) -> &BigUint {
        &self.element
    }

    /// Whether this element lies in the order-`q` subgroup generated by `g`, i.e. it is a
    /// quadratic residue mod `p`. Only such elements can be safely raised to secret shares.
    pub fn is_valid_residue(&self) -> bool {
        !self.element.is_zero()
            && self.element < *PRIME_MODULUS
            && self
                .element
                .modpow(&PRIME_SUBGROUP_MODULUS, &PRIME_MODULUS)
                .is_one()
    }

    /// Big-endian encoding, left-padded to the byte length of `p`.
    pub fn to_bytes(&self) -> Vec<u8> {
        pad_be(&self.element, *PRIME_BYTES)
    }
}

impl Exponent {
    /// Inject an integer into the exponential group: this wraps modulo the
    /// subgroup order if the number is greater than or equal to it.
    pub fn new(exponent: BigUint) -> Exponent {
        Exponent::unchecked(exponent % &*PRIME_SUBGROUP_MODULUS)
    }

    fn unchecked(exponent: BigUint) -> Exponent {
        Exponent { exponent }
    }

    pub fn as_uint(&self) -> &BigUint {
        &self.exponent
    }

    /// Reduce a big-endian byte string (typically a hash output) modulo `q`.
    pub fn from_bytes_be(bytes: &[u8]) -> Exponent {
        Exponent::new(BigUint::from_bytes_be(bytes))
    }

    /// Big-endian encoding, left-padded to the byte length of `q`.
    pub fn to_bytes(&self) -> Vec<u8> {
        pad_be(&self.exponent, *SUBGROUP_BYTES)
    }

    /// Multiplicative inverse mod `q`. The inverse of zero is zero.
    pub fn inverse(&self) -> Exponent {
        // q is prime, so a^-1 = a^(q-2) (mod q).
        Exponent::unchecked(
            self.exponent
                .modpow(&(&*PRIME_SUBGROUP_MODULUS - 2_u8), &*PRIME_SUBGROUP_MODULUS),
        )
    }
}

lazy_static! {
    static ref GENERATOR_ELEMENT: Element = Element::gen();
    static ref PRIME_BYTES: usize = ((PRIME_MODULUS.bits() + 7) / 8) as usize;
    static ref SUBGROUP_BYTES: usize = ((PRIME_SUBGROUP_MODULUS.bits() + 7) / 8) as usize;
}

pub fn generator() -> &'static Element {
    &*GENERATOR_ELEMENT
}

pub fn prime() -> &'static BigUint {
    &*PRIME_MODULUS
}

pub fn prime_minus_one() -> &'static BigUint {
    &*PRIME_MODULUS_MINUS_ONE
}

pub fn subgroup_prime() -> &'static BigUint {
    &*PRIME_SUBGROUP_MODULUS
}

/// `g^exp mod p`.
pub fn gen_pow(exp: &Exponent) -> Element {
    generator().pow(exp)
}

/// A uniformly random exponent in `[0, q)`.
pub fn random_exponent(rng: &mut impl Rng) -> Exponent {
    Exponent::unchecked(rng.gen_biguint_below(&PRIME_SUBGROUP_MODULUS))
}

fn pad_be(n: &BigUint, len: usize) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    if bytes.len() >= len {
        return bytes;
    }
    let mut padded = vec![0_u8; len - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}

// Multiplicative group operations

impl One for Element {
    fn one() -> Element {
        Element::unchecked(BigUint::one())
    }
}

impl Element {
    /// Take the multiplicative inverse of the element.
    pub fn inverse(&self) -> Element {
        Element::unchecked(
            self.element
                .modpow(&(&*PRIME_MODULUS - 2_u8), &*PRIME_MODULUS),
        )
    }
}

impl Mul for Element {
    type Output = Element;
    fn mul(self, other: Element) -> Element {
        Element::unchecked(self.element * other.element % &*PRIME_MODULUS)
    }
}

impl Mul for &Element {
    type Output = Element;
    fn mul(self, other: &Element) -> Element {
        Element::unchecked(&self.element * &other.element % &*PRIME_MODULUS)
    }
}

impl Div for Element {
    type Output = Element;
    fn div(self, other: Element) -> Element {
        self * other.inverse()
    }
}

impl Div for &Element {
    type Output = Element;
    fn div(self, other: &Element) -> Element {
        self * &other.inverse()
    }
}

impl Pow<&Exponent> for &Element {
    type Output = Element;
    fn pow(self, other: &Exponent) -> Element {
        Element::unchecked(self.element.modpow(&other.exponent, &*PRIME_MODULUS))
    }
}

impl Pow<&BigUint> for &Element {
    type Output = Element;
    /// Raise a group element to an arbitrary exponent.
    fn pow(self, other: &BigUint) -> Element {
        Element::unchecked(self.element.modpow(other, &*PRIME_MODULUS))
    }
}

// Additive exponential group operations

impl Zero for Exponent {
    fn zero() -> Exponent {
        Exponent::unchecked(BigUint::zero())
    }
    fn is_zero(&self) -> bool {
        self.exponent.is_zero()
    }
}

impl One for Exponent {
    fn one() -> Exponent {
        Exponent::unchecked(BigUint::one())
    }
    fn is_one(&self) -> bool {
        self.exponent.is_one()
    }
}

impl Add for Exponent {
    type Output = Exponent;
    fn add(self, other: Exponent) -> Exponent {
        Exponent::unchecked((self.exponent + other.exponent) % &*PRIME_SUBGROUP_MODULUS)
    }
}

impl Add for &Exponent {
    type Output = Exponent;
    fn add(self, other: &Exponent) -> Exponent {
        Exponent::unchecked((&self.exponent + &other.exponent) % &*PRIME_SUBGROUP_MODULUS)
    }
}

impl Sub for Exponent {
    type Output = Exponent;
    fn sub(self, other: Exponent) -> Exponent {
        &self - &other
    }
}

impl Sub for &Exponent {
    type Output = Exponent;
    fn sub(self, other: &Exponent) -> Exponent {
        let a = &self.exponent;
        let b = &other.exponent;
        Exponent::unchecked((a + &*PRIME_SUBGROUP_MODULUS - b) % &*PRIME_SUBGROUP_MODULUS)
    }
}

impl Mul for Exponent {
    type Output = Exponent;
    fn mul(self, other: Exponent) -> Exponent {
        &self * &other
    }
}

impl Mul for &Exponent {
    type Output = Exponent;
    fn mul(self, other: &Exponent) -> Exponent {
        Exponent::unchecked(&self.exponent * &other.exponent % &*PRIME_SUBGROUP_MODULUS)
    }
}

impl Div for &Exponent {
    type Output = Exponent;
    fn div(self, other: &Exponent) -> Exponent {
        self * &other.inverse()
    }
}

impl Neg for &Exponent {
    type Output = Exponent;
    fn neg(self) -> Exponent {
        if self.exponent.is_zero() {
            self.clone()
        } else {
            Exponent::unchecked(&*PRIME_SUBGROUP_MODULUS - &self.exponent)
        }
    }
}

// BigUint -> Element/Exponent conversion

impl From<BigUint> for Element {
    /// Panics unless `0 < number < p`; meant for constants and tests.
    fn from(number: BigUint) -> Self {
        if !number.is_zero() && number < *PRIME_MODULUS {
            Element { element: number }
        } else {
            panic!("argument out of range for conversion to group element")
        }
    }
}

impl From<BigUint> for Exponent {
    /// Panics unless `number < q`; meant for constants and tests.
    fn from(number: BigUint) -> Self {
        if number < *PRIME_SUBGROUP_MODULUS {
            Exponent { exponent: number }
        } else {
            panic!("argument out of range for conversion to group exponent")
        }
    }
}

impl From<u32> for Element {
    fn from(number: u32) -> Self {
        BigUint::from(number).into()
    }
}

impl From<u32> for Exponent {
    fn from(number: u32) -> Self {
        BigUint::from(number).into()
    }
}

// The 1536-bit MODP group of [IETF RFC 3526](https://tools.ietf.org/html/rfc3526): `p` is a
// safe prime, so `q = (p - 1) / 2` is prime and 4 generates the order-`q` subgroup.

#[cfg(not(test))]
lazy_static! {
    pub static ref PRIME_MODULUS: BigUint = PRIME_1536.clone();
    pub static ref GENERATOR: BigUint = BigUint::from(4_u32);
}

// Toy safe-prime group: 200087 = 2 * 100043 + 1, and 25 = 5^2 generates the order-100043
// subgroup.
#[cfg(test)]
lazy_static! {
    pub static ref PRIME_MODULUS: BigUint = BigUint::from(200087_u32);
    pub static ref GENERATOR: BigUint = BigUint::from(25_u32);
}

lazy_static! {
    static ref PRIME_1536: BigUint = parse_biguint_hex_or_panic(PRIME_HEX_1536);

    pub static ref PRIME_MODULUS_MINUS_ONE: BigUint = &*PRIME_MODULUS - BigUint::one();

    pub static ref PRIME_SUBGROUP_MODULUS: BigUint =
        (&*PRIME_MODULUS - BigUint::one()) / BigUint::from(2_u8);
}

/// Parse a hex string (which might contain spaces, tabs, or newlines) into a
/// BigUint or panic if it can't be done (this is meant to be used for
/// hard-coded constants)
fn parse_biguint_hex_or_panic(hex: &str) -> BigUint {
    BigUint::from_str_radix(
        &hex.replace(" ", "").replace("\n", "").replace("\t", ""),
        16,
    )
    .expect("Invalid hex input for parse_biguint_hex_or_panic")
}

const PRIME_HEX_1536: &str = "FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
     29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
     EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
     E485B576 625E7EC6 F44C42E9 A637ED6B 0BFF5CB6 F406B7ED
     EE386BFB 5A899FA5 AE9F2411 7C4B1FE6 49286651 ECE45B3D
     C2007CB8 A163BF05 98DA4836 1C55D39A 69163FA8 FD24CF5F
     83655D23 DCA3AD96 1C62F356 208552BB 9ED52907 7096966D
     670C354E 4ABC9804 F1746C08 CA237327 FFFFFFFF FFFFFFFF";
