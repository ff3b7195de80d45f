mod serde_facade;

pub use self::serde_facade::{BinarySD, WireError};
