use std::error;
use std::fmt;

use bitcoin::Txid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Not enough spendable value to cover the requested outputs.
    InsufficientFunds { required: u64, available: u64 },
    /// No pending provisional send under that txid.
    UnknownTransaction(Txid),
    /// The network (or the wallet's policy) refused the transaction.
    BroadcastRejected(String),
    /// Key derivation failed for the given path.
    Derivation(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::InsufficientFunds { required, available } => {
                write!(f, "insufficient funds: need {} sat, have {} sat", required, available)
            }
            WalletError::UnknownTransaction(txid) => {
                write!(f, "no provisional transaction {}", txid)
            }
            WalletError::BroadcastRejected(reason) => {
                write!(f, "broadcast rejected: {}", reason)
            }
            WalletError::Derivation(reason) => {
                write!(f, "key derivation failed: {}", reason)
            }
        }
    }
}

impl error::Error for WalletError {}
