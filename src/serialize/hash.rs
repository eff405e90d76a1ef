use serde::{de, Deserializer, Serializer};

use super::bytes;

pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    bytes::serialize(value, serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    let v = bytes::deserialize(deserializer)?;
    if v.len() != 32 {
        return Err(de::Error::invalid_length(v.len(), &"32 bytes"));
    }
    let mut out = [0_u8; 32];
    out.copy_from_slice(&v);
    Ok(out)
}
