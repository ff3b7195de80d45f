use serde::{Serialize, Deserialize};

use crate::types::{RawPublicKey, RawSignature, WireOutPoint};

/// The key block each side contributes to a channel: four static keys
/// plus its elkrem points for states 0 and 1. Both points go over up
/// front because signing the counterparty's state n+1 commitment needs
/// their point for n+1; the update exchange keeps the one state
/// lookahead topped up from there. 198 bytes.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChannelKeys {
    /// Key for the 2-of-2 funding output.
    pub funding_pk: RawPublicKey,
    /// Key every cooperative or unilateral settlement pays this side at.
    pub refund_pk: RawPublicKey,
    /// Key behind the CSV branch of this side's commitment output.
    pub delay_pk: RawPublicKey,
    /// Basepoint the other side's revocation keys are derived from.
    pub revocation_base_pk: RawPublicKey,
    /// This side's elkrem point for state 0.
    pub elk0_point: RawPublicKey,
    /// This side's elkrem point for state 1.
    pub elk1_point: RawPublicKey,
}

/// Channel open request. Carries nothing: the peer answers with its key
/// material and the requester proceeds from there.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct PointReq;

#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct PointResp {
    pub keys: ChannelKeys,
}

/// The funding descriptor from the initiator: the outpoint its wallet
/// reserved, the agreed amounts, its own key block, and its signature
/// over the acceptor's state 0 commitment.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChanDesc {
    pub outpoint: WireOutPoint,
    pub capacity: u64,
    pub init_send: u64,
    pub csv_delay: u16,
    pub keys: ChannelKeys,
    pub sig: RawSignature,
}

/// The acceptor's signature over the initiator's state 0 commitment.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChanAck {
    pub outpoint: WireOutPoint,
    pub sig: RawSignature,
}
