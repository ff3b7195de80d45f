use serde::{Serialize, de::DeserializeOwned};
use bincode::Options;

use std::io;

pub type WireError = bincode::Error;

/// Public facade object, provides the serde interface with the proper
/// configuration applied: big endian, fixed width integers. Everything
/// that goes on the wire or into the store passes through here so that
/// the byte layout is decided in exactly one place.
pub struct BinarySD;

impl BinarySD {
    fn config() -> impl Options {
        bincode::options()
            .with_big_endian()
            .with_fixint_encoding()
            .allow_trailing_bytes()
    }

    pub fn serialize<T: Serialize, W: io::Write>(w: W, value: &T) -> Result<(), WireError> {
        Self::config().serialize_into(w, value)
    }

    pub fn deserialize<T: DeserializeOwned, R: io::Read>(r: R) -> Result<T, WireError> {
        Self::config().deserialize_from(r)
    }
}

#[cfg(test)]
mod tests {
    use super::BinarySD;

    #[test]
    fn fixed_width_big_endian() {
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &0x0102_0304u32).unwrap();
        assert_eq!(v, vec![1, 2, 3, 4]);

        let restored: u32 = BinarySD::deserialize(&v[..]).unwrap();
        assert_eq!(restored, 0x0102_0304);
    }

    #[test]
    fn arrays_have_no_length_prefix() {
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &[7u8; 32]).unwrap();
        assert_eq!(v.len(), 32);
    }

    #[test]
    fn tuple_of_mixed_width() {
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &(1u8, 2u16, 3u64)).unwrap();
        assert_eq!(hex::encode(&v), "0100020000000000000003");
    }
}
