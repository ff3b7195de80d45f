#![forbid(unsafe_code)]

//! The wallet capability set. This trait is the channel engine's only
//! window onto chain state: key derivation, broadcast, and the
//! three-step provisional send used for funding. The engine is forbidden
//! any other chain or storage access, so everything an implementation
//! must provide is spelled out here and nothing else is assumed.

mod path;
mod error;
pub mod mock;

pub use self::path::{KeyPath, KeyUse, CHANNEL_KEY_ROOT};
pub use self::error::WalletError;

use bitcoin::{Network, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use bitcoin::secp256k1::{PublicKey, SecretKey};

/// A spendable output handed over to the wallet for safekeeping,
/// together with the derivation path that can sign for it and the CSV
/// wait (in blocks) before it matures, zero for none.
#[derive(Clone, Debug)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script_pubkey: ScriptBuf,
    pub key_path: KeyPath,
    pub seq: u32,
}

/// The functions needed from the underlying wallet. Verbs are from the
/// perspective of the channel engine, not the wallet.
pub trait Wallet {
    /// Ask for a pubkey based on a derivation path.
    fn get_pub(&self, path: KeyPath) -> Result<PublicKey, WalletError>;

    /// Ask for the private scalar at a path. Used only for revocation
    /// base delegation and refund pre-signing; goes away if the wallet
    /// ever grows a sign-hash operation.
    fn get_priv(&self, path: KeyPath) -> Result<SecretKey, WalletError>;

    /// Send a fully signed tx out to the network. Needed for channel
    /// break and cooperative close.
    fn push_tx(&self, tx: &Transaction) -> Result<(), WalletError>;

    /// Hand a utxo to the wallet; the wallet saves it and can spend it
    /// later.
    fn export_utxo(&self, utxo: Utxo) -> Result<(), WalletError>;

    /// Build an unsigned tx containing the given outputs, freezing the
    /// selected inputs. Nothing is broadcast and only segwit inputs are
    /// selected, so the txid is final. Returns the txid and the output
    /// indexes of the requested outputs. The inputs stay frozen until
    /// `really_send` or `nah_dont_send`.
    fn maybe_send(&self, outputs: &[TxOut]) -> Result<(Txid, Vec<u32>), WalletError>;

    /// Sign and broadcast the tx built by a previous `maybe_send`.
    fn really_send(&self, txid: Txid) -> Result<(), WalletError>;

    /// Cancel a previous `maybe_send` and unfreeze its inputs.
    fn nah_dont_send(&self, txid: Txid) -> Result<(), WalletError>;

    /// Network the wallet lives on (magic bytes, address prefixes).
    fn params(&self) -> Network;
}
