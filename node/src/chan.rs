use serde::{Serialize, Deserialize};

use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::{OutPoint, Txid};
use bitcoin::hashes::Hash;

use channel::derivation::derive_revocation_pubkey;
use channel::tools::{new_2x2_multisig, v0_p2wpkh};
use channel::CommitTx;
use elkrem::{ElkremReceiver, ElkremSender};
use wallet::KeyPath;
use wire::{ChannelKeys, Hash256, RawPublicKey, RawSignature, WireOutPoint};

use crate::error::LnError;

pub fn to_bitcoin_outpoint(op: &WireOutPoint) -> OutPoint {
    OutPoint { txid: Txid::from_byte_array(op.txid.0), vout: op.index }
}

pub fn to_wire_outpoint(op: &OutPoint) -> WireOutPoint {
    WireOutPoint { txid: Hash256(op.txid.to_byte_array()), index: op.vout }
}

pub fn parse_pk(raw: &RawPublicKey) -> Result<PublicKey, LnError> {
    PublicKey::from_slice(&raw.0[..]).map_err(|_| LnError::BadKey)
}

/// Immutable channel facts, fixed once funding is underway.
#[derive(Serialize, Deserialize, Clone)]
pub struct ChanDescriptor {
    pub peer_pub: RawPublicKey,
    pub peer_idx: u32,
    pub chan_idx: u32,
    pub funding: WireOutPoint,
    pub capacity: u64,
    pub key_path: KeyPath,
    pub csv_delay: u16,
    /// We funded this channel.
    pub initiator: bool,
    pub my_keys: ChannelKeys,
    pub their_keys: ChannelKeys,
}

/// Where the channel is in its lifecycle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingFundingConfirm,
    Open,
    /// An update exchange is in flight. `pusher` tells which side we
    /// are; `started_at` feeds the update deadline.
    UpdatePending { pusher: bool, started_at: i64 },
    ClosePending,
    Closed,
    Broken,
}

/// Everything about a channel that moves.
#[derive(Serialize, Deserialize, Clone)]
pub struct ChanState {
    pub idx: u64,
    pub my_amt: u64,
    pub their_amt: u64,
    /// Pending shift. Negative while we push, positive while they do,
    /// zero exactly when the channel is clean.
    pub delta: i64,
    pub phase: Phase,
    pub close_txid: Option<Hash256>,
    /// Balances before the latest completed update; what the watch
    /// message for the just revoked state is built from.
    pub prev_amts: Option<(u64, u64)>,

    /// Counterparty's elkrem point for the current state.
    pub their_point: RawPublicKey,
    /// Their point for the next state (the lookahead).
    pub their_next_point: RawPublicKey,
    /// Lookahead refill delivered mid update, shifted in on commit.
    pub their_pending_point: Option<RawPublicKey>,

    /// Their funding signature over our current commitment; what a
    /// break broadcast spends with.
    pub their_sig: Option<RawSignature>,
    /// Their signature for our next commitment, not yet committed.
    pub pending_their_sig: Option<RawSignature>,

    /// Consecutive validation failures from this peer.
    pub failures: u32,
}

/// The full per-channel record as persisted: descriptor, state, both
/// elkrem chains, and the last message we sent (for resume).
#[derive(Serialize, Deserialize, Clone)]
pub struct Chan {
    pub desc: ChanDescriptor,
    pub state: ChanState,
    pub elk_snd: ElkremSender,
    pub elk_rcv: ElkremReceiver,
    pub last_msg: Option<Vec<u8>>,
}

impl Chan {
    pub fn outpoint(&self) -> OutPoint {
        to_bitcoin_outpoint(&self.desc.funding)
    }

    pub fn funding_script(&self) -> Result<bitcoin::ScriptBuf, LnError> {
        let mine = parse_pk(&self.desc.my_keys.funding_pk)?;
        let theirs = parse_pk(&self.desc.their_keys.funding_pk)?;
        Ok(new_2x2_multisig(&mine, &theirs))
    }

    /// Our own elkrem point for a state, from our sender chain.
    pub fn my_point(&self, secp: &Secp256k1<All>, idx: u64) -> Result<PublicKey, LnError> {
        let secret = self.elk_snd.at_index(idx)?;
        Ok(channel::derivation::elk_point(secp, &secret)?)
    }

    /// Our commitment at the given split: our balance delayed behind the
    /// CSV, revocation key derived from their basepoint and our point.
    pub fn my_commit(
        &self,
        secp: &Secp256k1<All>,
        my_amt: u64,
        their_amt: u64,
        my_point: &PublicKey,
    ) -> Result<CommitTx, LnError> {
        let revocation_pk = derive_revocation_pubkey(
            secp,
            &parse_pk(&self.desc.their_keys.revocation_base_pk)?,
            my_point,
        )?;
        Ok(CommitTx {
            funding_outpoint: self.outpoint(),
            funding_script: self.funding_script()?,
            capacity: self.desc.capacity,
            to_local_sat: my_amt,
            to_remote_sat: their_amt,
            delay_pk: parse_pk(&self.desc.my_keys.delay_pk)?,
            csv_delay: self.desc.csv_delay,
            revocation_pk,
            remote_refund_pk: parse_pk(&self.desc.their_keys.refund_pk)?,
        })
    }

    /// The counterparty's commitment at the given split. `their_point`
    /// is their elkrem point for that state.
    pub fn their_commit(
        &self,
        secp: &Secp256k1<All>,
        my_amt: u64,
        their_amt: u64,
        their_point: &PublicKey,
    ) -> Result<CommitTx, LnError> {
        let revocation_pk = derive_revocation_pubkey(
            secp,
            &parse_pk(&self.desc.my_keys.revocation_base_pk)?,
            their_point,
        )?;
        Ok(CommitTx {
            funding_outpoint: self.outpoint(),
            funding_script: self.funding_script()?,
            capacity: self.desc.capacity,
            to_local_sat: their_amt,
            to_remote_sat: my_amt,
            delay_pk: parse_pk(&self.desc.their_keys.delay_pk)?,
            csv_delay: self.desc.csv_delay,
            revocation_pk,
            remote_refund_pk: parse_pk(&self.desc.my_keys.refund_pk)?,
        })
    }

    pub fn my_refund_script(&self) -> Result<bitcoin::ScriptBuf, LnError> {
        Ok(v0_p2wpkh(&parse_pk(&self.desc.my_keys.refund_pk)?))
    }

    pub fn their_refund_script(&self) -> Result<bitcoin::ScriptBuf, LnError> {
        Ok(v0_p2wpkh(&parse_pk(&self.desc.their_keys.refund_pk)?))
    }
}
