use serde::{Serialize, Deserialize};

use crate::types::{Hash160, Hash256, RawPublicKey, RawSignature};

/// Registers a channel with the watchtower. The first six fields are the
/// 128 byte static channel identity; `elk_zero` seeds the tower's elkrem
/// receiver with the counterparty's revealed secret for state 0.
///
/// Handing over `revocation_base_secret` delegates the ability to sign
/// the revocation branch of any state that later gets revealed to the
/// tower. The basepoint is used for nothing else, and the pre-signed
/// refund signatures pin every grab payout to `dest_pkh`.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct WatchDesc {
    pub dest_pkh: Hash160,
    pub revocation_base_secret: Hash256,
    pub delay_pk: RawPublicKey,
    pub refund_pk: RawPublicKey,
    pub csv_delay: u16,
    pub capacity: u64,
    pub elk_zero: Hash256,
}

/// One revoked state: the txid the tower must watch for, the revealed
/// elkrem secret, and the owner's pre-signed refund-input signature for
/// the grab transaction.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct WatchState {
    pub dest_pkh: Hash160,
    pub commit_txid: Hash256,
    pub state_num: u64,
    pub elk: Hash256,
    pub sig: RawSignature,
}
