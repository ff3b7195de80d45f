#![forbid(unsafe_code)]

//! The channel engine: funding, bilateral updates ("push"), cooperative
//! close, unilateral break, and watchtower feed production. The engine
//! owns the channel store and is driven from two sides: user operations
//! (`fund_channel`, `push_channel`, `close_channel`, `break_channel`)
//! and peer messages (`handle_message`). It never touches the chain or
//! the network itself; broadcasts go through the injected wallet and
//! replies are returned to the caller's transport.
//!
//! Every operation that reads, modifies and writes a channel does so
//! under that channel's lock, and persists the new state before the
//! reply message leaves the engine.

pub mod chan;
pub mod store;

mod config;
mod error;
mod funding;
mod push;
mod close;
mod watch;

pub use self::chan::{Chan, ChanDescriptor, ChanState, Phase};
pub use self::config::Config;
pub use self::error::LnError;
pub use self::store::{ChanStore, FundingIntent};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bitcoin::secp256k1::{All, Secp256k1};
use log::warn;

use wallet::Wallet;
use wire::{BinarySD, Hash256, Message, RawPublicKey};

/// Signals the embedder acts on: the explicit "state clean" notification
/// after an update, and lifecycle edges worth surfacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FundingBroadcast { peer_idx: u32, chan_idx: u32, txid: Hash256 },
    ChannelOpen { peer_idx: u32, chan_idx: u32 },
    /// The update exchange finished and the channel is clean at `idx`.
    UpdateComplete { peer_idx: u32, chan_idx: u32, idx: u64 },
    ChannelClosed { peer_idx: u32, chan_idx: u32, txid: Hash256 },
    ChannelBroken { peer_idx: u32, chan_idx: u32, txid: Hash256 },
}

/// What a message handler hands back: at most one reply for the wire
/// and at most one event for the embedder.
#[derive(Debug)]
pub struct Outcome {
    pub reply: Option<Message>,
    pub event: Option<Event>,
}

impl Outcome {
    pub fn none() -> Self {
        Outcome { reply: None, event: None }
    }

    pub fn reply(msg: Message) -> Self {
        Outcome { reply: Some(msg), event: None }
    }

    pub fn event(event: Event) -> Self {
        Outcome { reply: None, event: Some(event) }
    }

    pub fn reply_with_event(msg: Message, event: Event) -> Self {
        Outcome { reply: Some(msg), event: Some(event) }
    }
}

/// The node context: store, wallet, policy. Cheap to share behind an
/// `Arc`; all methods take `&self`.
pub struct Node<W: Wallet> {
    pub(crate) store: ChanStore,
    pub(crate) wallet: W,
    pub(crate) config: Config,
    pub(crate) secp: Secp256k1<All>,
    locks: Mutex<HashMap<(u32, u32), Arc<Mutex<()>>>>,
}

impl<W: Wallet> Node<W> {
    pub fn new(store: ChanStore, wallet: W, config: Config) -> Self {
        Node {
            store,
            wallet,
            config,
            secp: Secp256k1::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ChanStore {
        &self.store
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// The per-channel mutex. Whoever holds it is the only writer of
    /// that channel's record.
    pub(crate) fn chan_lock(&self, key: (u32, u32)) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub(crate) fn encode_msg(msg: &Message) -> Result<Vec<u8>, LnError> {
        let mut bytes = Vec::new();
        BinarySD::serialize(&mut bytes, msg)?;
        Ok(bytes)
    }

    /// Peer message entry point. The transport tells us who the bytes
    /// came from; the engine checks the sender owns the channel it
    /// names.
    pub fn handle_message(&self, peer: &RawPublicKey, msg: Message) -> Result<Outcome, LnError> {
        match msg {
            Message::PointReq(m) => self.handle_point_req(peer, m),
            Message::PointResp(m) => self.handle_point_resp(peer, m),
            Message::ChanDesc(m) => self.handle_chan_desc(peer, m),
            Message::ChanAck(m) => self.handle_chan_ack(peer, m),
            Message::DeltaSig(m) => self.handle_delta_sig(peer, m),
            Message::SigRev(m) => self.handle_sig_rev(peer, m),
            Message::Rev(m) => self.handle_rev(peer, m),
            Message::CloseReq(m) => self.handle_close_req(peer, m),
            Message::CloseResp(m) => self.handle_close_resp(peer, m),
            // tower feeds have no business arriving at a channel node
            Message::WatchDesc(_) | Message::WatchState(_) => Err(LnError::UnexpectedMessage),
        }
    }

    /// Replays the last outbound message of a channel stuck in a
    /// non-open state, for redelivery after a disconnect. Replaying is
    /// idempotent: the peer answers a duplicate with its own last
    /// message and state advances at most once.
    pub fn resume(&self, peer_idx: u32, chan_idx: u32) -> Result<Message, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();

        let chan = self.store.get_chan(peer_idx, chan_idx)?;
        if chan.state.phase == Phase::Open {
            return Err(LnError::NothingToResume);
        }
        let bytes = chan.last_msg.as_ref().ok_or(LnError::NothingToResume)?;
        Ok(BinarySD::deserialize(&bytes[..])?)
    }

    /// Breaks every channel whose update exchange has been hanging for
    /// longer than the configured deadline. Meant to be driven from a
    /// timer.
    pub fn expire_stale_updates(&self, now: i64) -> Result<Vec<Event>, LnError> {
        let mut events = Vec::new();
        for chan in self.store.channels()? {
            let started_at = match chan.state.phase {
                Phase::UpdatePending { started_at, .. } => started_at,
                _ => continue,
            };
            if now - started_at < self.config.update_deadline_secs {
                continue;
            }
            let key = (chan.desc.peer_idx, chan.desc.chan_idx);
            let lock = self.chan_lock(key);
            let _guard = lock.lock().unwrap();
            // re-read under the lock, the exchange may just have finished
            let mut chan = self.store.get_chan(key.0, key.1)?;
            match chan.state.phase {
                Phase::UpdatePending { started_at, .. }
                    if now - started_at >= self.config.update_deadline_secs =>
                {
                    warn!(
                        "update on channel ({}, {}) timed out, breaking",
                        key.0, key.1
                    );
                    match self.break_inner(&mut chan) {
                        Ok(event) => events.push(event),
                        Err(e) => warn!("failed to break channel ({}, {}): {}", key.0, key.1, e),
                    }
                }
                _ => {}
            }
        }
        Ok(events)
    }
}
