use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Sighash computation failed (bad input index or script).
    Sighash(String),
    /// A signature did not verify against the expected key.
    BadSignature,
    /// Malformed key or signature bytes.
    Crypto(bitcoin::secp256k1::Error),
    /// The supposed commitment carries none of the expected outputs.
    NoMatchingOutputs,
    /// The spent value does not cover the fee.
    ValueBelowFee,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Sighash(s) => write!(f, "sighash computation failed: {}", s),
            Error::BadSignature => write!(f, "signature does not verify"),
            Error::Crypto(e) => write!(f, "crypto error: {}", e),
            Error::NoMatchingOutputs => write!(f, "no expected outputs in transaction"),
            Error::ValueBelowFee => write!(f, "spent value does not cover the fee"),
        }
    }
}

impl error::Error for Error {}

impl From<bitcoin::secp256k1::Error> for Error {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        Error::Crypto(e)
    }
}
