use std::error;
use std::fmt;

use wallet::WalletError;

/// Every failure the engine can surface, one tag per failure kind so
/// callers branch on the variant and never on a message string.
#[derive(Debug)]
pub enum LnError {
    // preconditions: nothing changed
    NoSuchChannel { peer_idx: u32, chan_idx: u32 },
    NoSuchOutPoint,
    WrongPeer,
    ChannelClosed,
    ChannelBroken,
    NotOpen,
    UpdateInFlight,
    FundingInProgress,
    NoFundingInProgress,
    NothingToResume,
    NotWatchable(u64),

    // validation: channel stays in its prior state
    CapacityOutOfRange(u64),
    AmountOutOfRange(u64),
    InsufficientBalance { available: u64 },
    BadSignature,
    BadRevocation,
    BadKey,
    UnexpectedMessage,

    // protocol-fatal: the channel has been transitioned to Broken
    ProtocolViolation(&'static str),

    // failures of the collaborators, surfaced with context
    Storage(db::Error),
    Wallet(WalletError),
    Tx(channel::Error),
    Elkrem(elkrem::Error),
    Wire(String),
}

impl fmt::Display for LnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::LnError::*;

        match self {
            NoSuchChannel { peer_idx, chan_idx } => {
                write!(f, "no channel ({}, {})", peer_idx, chan_idx)
            }
            NoSuchOutPoint => write!(f, "no channel under that outpoint"),
            WrongPeer => write!(f, "channel belongs to a different peer"),
            ChannelClosed => write!(f, "channel is closed"),
            ChannelBroken => write!(f, "channel is broken"),
            NotOpen => write!(f, "channel is not open"),
            UpdateInFlight => write!(f, "an update is already in flight"),
            FundingInProgress => write!(f, "funding with this peer is not done yet"),
            NoFundingInProgress => write!(f, "no funding in progress with this peer"),
            NothingToResume => write!(f, "channel has no message to resume"),
            NotWatchable(state) => write!(f, "state {} has no watch material yet", state),
            CapacityOutOfRange(v) => write!(f, "capacity {} out of range", v),
            AmountOutOfRange(v) => write!(f, "push amount {} out of range", v),
            InsufficientBalance { available } => {
                write!(f, "insufficient channel balance, {} sat available", available)
            }
            BadSignature => write!(f, "signature does not verify"),
            BadRevocation => write!(f, "revocation secret is inconsistent"),
            BadKey => write!(f, "peer delivered a malformed key"),
            UnexpectedMessage => write!(f, "message does not fit the channel state"),
            ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
            Storage(e) => write!(f, "storage: {}", e),
            Wallet(e) => write!(f, "wallet: {}", e),
            Tx(e) => write!(f, "transaction: {}", e),
            Elkrem(e) => write!(f, "elkrem: {}", e),
            Wire(e) => write!(f, "wire: {}", e),
        }
    }
}

impl error::Error for LnError {}

impl From<db::Error> for LnError {
    fn from(e: db::Error) -> Self {
        LnError::Storage(e)
    }
}

impl From<WalletError> for LnError {
    fn from(e: WalletError) -> Self {
        LnError::Wallet(e)
    }
}

impl From<channel::Error> for LnError {
    fn from(e: channel::Error) -> Self {
        LnError::Tx(e)
    }
}

impl From<elkrem::Error> for LnError {
    fn from(e: elkrem::Error) -> Self {
        LnError::Elkrem(e)
    }
}

impl From<binformat::WireError> for LnError {
    fn from(e: binformat::WireError) -> Self {
        LnError::Wire(e.to_string())
    }
}
