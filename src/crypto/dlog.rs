use num::traits::One;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::crypto::group::Element;

/// Bounded discrete logarithm by table lookup: `dlog(base^t) = t` for `0 <= t <= max_exponent`.
///
/// The table of powers is extended lazily and shared between callers, so decrypting many
/// small tallies costs at most `max_exponent` multiplications in total.
#[derive(Debug)]
pub struct DLogarithm {
    base: Element,
    max_exponent: u32,
    table: Mutex<PowerTable>,
}

#[derive(Debug)]
struct PowerTable {
    exponents: HashMap<Element, u32>,
    /// `base^exponent`, the largest power computed so far.
    last: Element,
    exponent: u32,
}

impl DLogarithm {
    pub fn new(base: Element, max_exponent: u32) -> DLogarithm {
        let mut exponents = HashMap::new();
        exponents.insert(Element::one(), 0);
        DLogarithm {
            base,
            max_exponent,
            table: Mutex::new(PowerTable {
                exponents,
                last: Element::one(),
                exponent: 0,
            }),
        }
    }

    /// Returns `None` if `value` is not a power of the base within the bound.
    pub fn dlog(&self, value: &Element) -> Option<u32> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&t) = table.exponents.get(value) {
            return Some(t);
        }
        while table.exponent < self.max_exponent {
            let next = &table.last * &self.base;
            table.exponent += 1;
            let t = table.exponent;
            table.exponents.entry(next.clone()).or_insert(t);
            table.last = next;
            if &table.last == value {
                return Some(t);
            }
        }
        None
    }
}
