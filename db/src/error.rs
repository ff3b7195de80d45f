use std::error;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Rocks(rocksdb::Error),
    MissingColumnFamily(&'static str),
    Serde(String),
}

impl Error {
    pub(crate) fn serde<E: fmt::Display>(e: E) -> Self {
        Error::Serde(e.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Rocks(e) => write!(f, "storage error: {}", e),
            Error::MissingColumnFamily(name) => {
                write!(f, "column family `{}` was not registered", name)
            }
            Error::Serde(e) => write!(f, "stored value is malformed: {}", e),
        }
    }
}

impl error::Error for Error {}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Rocks(e)
    }
}
