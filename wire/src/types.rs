use serde::{Serialize, Serializer, Deserialize, Deserializer};
use serde::ser::SerializeTuple;
use serde::de::{Visitor, SeqAccess, Error as DeError};

use std::fmt;

pub const PUBLIC_KEY_SIZE: usize = 33;
pub const SIGNATURE_SIZE: usize = 64;

/// 32 byte hash value (txid, elkrem hash, derivation material).
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

/// 20 byte script hash.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash160(pub [u8; 20]);

/// Compressed public key as raw bytes. Parsing into a curve point is the
/// caller's business; the wire layer only fixes the width.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct RawPublicKey(pub [u8; PUBLIC_KEY_SIZE]);

/// Compact (r || s) signature as raw bytes.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct RawSignature(pub [u8; SIGNATURE_SIZE]);

/// Funding outpoint, the channel identifier on the wire: 36 bytes.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireOutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl Hash256 {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut data = [0u8; 32];
        hex::decode_to_slice(s, &mut data)?;
        Ok(Hash256(data))
    }
}

impl RawPublicKey {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut data = [0u8; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(s, &mut data)?;
        Ok(RawPublicKey(data))
    }
}

impl RawSignature {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut data = [0u8; SIGNATURE_SIZE];
        hex::decode_to_slice(s, &mut data)?;
        Ok(RawSignature(data))
    }
}

impl Default for RawPublicKey {
    fn default() -> Self {
        RawPublicKey([0; PUBLIC_KEY_SIZE])
    }
}

impl Default for RawSignature {
    fn default() -> Self {
        RawSignature([0; SIGNATURE_SIZE])
    }
}

// serde ships array impls only up to 32 elements, so the two wide
// wrappers write themselves element wise as fixed length tuples.
macro_rules! wide_array_serde {
    ($name:ident, $size:expr) => {
        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
                let mut tuple = serializer.serialize_tuple($size)?;
                for i in 0..$size {
                    tuple.serialize_element(&self.0[i])?;
                }
                tuple.end()
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
                struct V;

                impl<'de> Visitor<'de> for V {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        write!(formatter, "{} bytes", $size)
                    }

                    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error> where A: SeqAccess<'de> {
                        let mut data = [0u8; $size];
                        for i in 0..$size {
                            data[i] = seq
                                .next_element()?
                                .ok_or(<A::Error as DeError>::custom("unexpected end"))?;
                        }
                        Ok($name(data))
                    }
                }

                deserializer.deserialize_tuple($size, V)
            }
        }
    };
}

wide_array_serde!(RawPublicKey, PUBLIC_KEY_SIZE);
wide_array_serde!(RawSignature, SIGNATURE_SIZE);

mod debug {
    use super::*;

    impl fmt::Debug for Hash256 {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Hash256 [ {} ]", hex::encode(&self.0[..]))
        }
    }

    impl fmt::Debug for Hash160 {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Hash160 [ {} ]", hex::encode(&self.0[..]))
        }
    }

    impl fmt::Debug for RawPublicKey {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "PublicKey [ {} ]", hex::encode(&self.0[..]))
        }
    }

    impl fmt::Debug for RawSignature {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Signature [ {} ]", hex::encode(&self.0[..]))
        }
    }

    impl fmt::Display for Hash256 {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}", hex::encode(&self.0[..]))
        }
    }

    impl fmt::Debug for WireOutPoint {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}:{}", self.txid, self.index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binformat::BinarySD;

    #[test]
    fn signature_width() {
        let sig = RawSignature([0xab; 64]);
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &sig).unwrap();
        assert_eq!(v.len(), 64);
        let restored: RawSignature = BinarySD::deserialize(&v[..]).unwrap();
        assert_eq!(restored, sig);
    }

    #[test]
    fn outpoint_is_36_bytes() {
        let op = WireOutPoint { txid: Hash256([1; 32]), index: 7 };
        let mut v = Vec::new();
        BinarySD::serialize(&mut v, &op).unwrap();
        assert_eq!(v.len(), 36);
        assert_eq!(&v[32..], &[0, 0, 0, 7]);
    }
}
