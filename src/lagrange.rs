use num::traits::One;
use num::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::group::Exponent;

/// A present guardian's weight for one decryption session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagrangeCoordinate {
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub coefficient: Exponent,
}

/// `w = Π_{j≠c} j / Π_{j≠c} (j - c)`, the Lagrange basis polynomial for `c` over `present`,
/// evaluated at zero. A singleton present set gives 1.
pub fn lagrange_coefficient(coordinate: u32, present: &[u32]) -> Exponent {
    let c = Exponent::new(BigUint::from(coordinate));
    let mut numerator = Exponent::one();
    let mut denominator = Exponent::one();
    for &j in present.iter().filter(|&&j| j != coordinate) {
        let j = Exponent::new(BigUint::from(j));
        denominator = &denominator * &(&j - &c);
        numerator = &numerator * &j;
    }
    &numerator / &denominator
}

/// Coefficients for exactly the given `(guardian id, x coordinate)` set, in the same order.
pub fn compute_lagrange_coordinates<'a>(
    present: impl IntoIterator<Item = (&'a str, u32)>,
) -> Vec<LagrangeCoordinate> {
    let present: Vec<(&str, u32)> = present.into_iter().collect();
    let coordinates: Vec<u32> = present.iter().map(|&(_, x)| x).collect();
    present
        .iter()
        .map(|&(id, x)| LagrangeCoordinate {
            guardian_id: id.to_owned(),
            x_coordinate: x,
            coefficient: lagrange_coefficient(x, &coordinates),
        })
        .collect()
}
