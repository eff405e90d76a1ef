use num::{BigUint, Num};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_str_radix(16).to_uppercase().serialize(serializer)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrUint {
    String(String),
    Uint(u64),
}

/// Accepts a hex string, or a plain JSON number for small values.
pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    let su: StringOrUint = Deserialize::deserialize(deserializer)?;
    match su {
        StringOrUint::String(s) => BigUint::from_str_radix(&s, 16).map_err(de::Error::custom),
        StringOrUint::Uint(u) => Ok(BigUint::from(u)),
    }
}
