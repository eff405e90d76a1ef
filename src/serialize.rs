//! Serde adapters for the wire formats: big integers and byte strings as upper-case hex.

pub mod big_uint;
pub mod bytes;
pub mod hash;
