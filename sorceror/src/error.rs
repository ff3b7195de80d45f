use std::error;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// No channel registered under that destination PKH.
    NoSuchChannel([u8; 20]),
    /// The destination PKH is already being watched.
    AlreadyWatched([u8; 20]),
    /// A state message arrived out of order.
    WrongState { expected: u64, got: u64 },
    /// A stored record or static descriptor is malformed.
    BadRecord,
    Elkrem(elkrem::Error),
    Storage(db::Error),
    Grab(channel::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoSuchChannel(pkh) => {
                write!(f, "no watched channel {}", hex::encode(&pkh[..]))
            }
            Error::AlreadyWatched(pkh) => {
                write!(f, "channel {} is already watched", hex::encode(&pkh[..]))
            }
            Error::WrongState { expected, got } => {
                write!(f, "state message out of order: expected {}, got {}", expected, got)
            }
            Error::BadRecord => write!(f, "malformed watchtower record"),
            Error::Elkrem(e) => write!(f, "elkrem: {}", e),
            Error::Storage(e) => write!(f, "storage: {}", e),
            Error::Grab(e) => write!(f, "grab construction: {}", e),
        }
    }
}

impl error::Error for Error {}

impl From<elkrem::Error> for Error {
    fn from(e: elkrem::Error) -> Self {
        Error::Elkrem(e)
    }
}

impl From<db::Error> for Error {
    fn from(e: db::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Error::Grab(e)
    }
}
