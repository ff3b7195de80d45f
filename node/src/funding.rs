use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, TxOut};
use log::{debug, info};

use channel::derivation::elk_point;
use channel::tools::new_2x2_wsh_lock_script;
use elkrem::{ElkremReceiver, ElkremSender};
use wallet::{KeyPath, KeyUse, Wallet};
use wire::{
    ChanAck, ChanDesc, ChannelKeys, Hash256, Message, PointReq, PointResp, RawPublicKey,
    RawSignature,
};

use crate::chan::{parse_pk, to_wire_outpoint, Chan, ChanDescriptor, ChanState, Phase};
use crate::store::FundingIntent;
use crate::{Event, LnError, Node, Outcome};

fn raw(pk: &PublicKey) -> RawPublicKey {
    RawPublicKey(pk.serialize())
}

impl<W: Wallet> Node<W> {
    /// The elkrem root for a channel: the hash of the elkrem use-pub.
    /// A little weird since it is a "pub" key that must never be shown,
    /// but it keeps the root recoverable from the wallet seed alone.
    fn elkrem_sender(&self, base: KeyPath) -> Result<ElkremSender, LnError> {
        let pk = self.wallet.get_pub(base.with_use(KeyUse::Elkrem))?;
        let root = sha256d::Hash::hash(&pk.serialize()).to_byte_array();
        Ok(ElkremSender::new(root))
    }

    /// Derives our whole key block for a channel slot.
    fn my_channel_keys(
        &self,
        peer_idx: u32,
        chan_idx: u32,
    ) -> Result<(ChannelKeys, ElkremSender), LnError> {
        let base = KeyPath::channel(peer_idx, chan_idx);
        let snd = self.elkrem_sender(base)?;
        let keys = ChannelKeys {
            funding_pk: raw(&self.wallet.get_pub(base.with_use(KeyUse::Fund))?),
            refund_pk: raw(&self.wallet.get_pub(base.with_use(KeyUse::Refund))?),
            delay_pk: raw(&self.wallet.get_pub(base.with_use(KeyUse::Delay))?),
            revocation_base_pk: raw(&self.wallet.get_pub(base.with_use(KeyUse::RevocationBase))?),
            elk0_point: raw(&elk_point(&self.secp, &snd.at_index(0)?)?),
            elk1_point: raw(&elk_point(&self.secp, &snd.at_index(1)?)?),
        };
        Ok((keys, snd))
    }

    fn my_funding_priv(&self, chan: &Chan) -> Result<bitcoin::secp256k1::SecretKey, LnError> {
        Ok(self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?)
    }

    /// Starts funding a channel with `peer`: reserves the slot, records
    /// the intent, and hands back the open request for the wire. The
    /// wallet commits nothing yet; inputs freeze only once the peer's
    /// keys arrive.
    pub fn fund_channel(
        &self,
        peer: &RawPublicKey,
        capacity: u64,
        init_send: u64,
    ) -> Result<Message, LnError> {
        if capacity < self.config.min_capacity {
            return Err(LnError::CapacityOutOfRange(capacity));
        }
        if init_send > capacity {
            return Err(LnError::AmountOutOfRange(init_send));
        }
        if self.store.get_intent(peer)?.is_some() {
            return Err(LnError::FundingInProgress);
        }

        let (peer_idx, chan_idx) = self.store.next_indices_for_peer(peer)?;
        self.store.set_intent(
            peer,
            &FundingIntent { peer_idx, chan_idx, capacity, init_send, initiator: true },
        )?;
        info!(
            "funding channel ({}, {}): capacity {}, initial send {}",
            peer_idx, chan_idx, capacity, init_send
        );
        Ok(Message::PointReq(PointReq))
    }

    /// Acceptor side of the open request: allocate a slot, derive our
    /// key block, reply with it. A duplicate request (redelivery after
    /// a disconnect) gets the same slot and the same keys back.
    pub(crate) fn handle_point_req(
        &self,
        peer: &RawPublicKey,
        _msg: PointReq,
    ) -> Result<Outcome, LnError> {
        let (peer_idx, chan_idx) = match self.store.get_intent(peer)? {
            Some(intent) if !intent.initiator => (intent.peer_idx, intent.chan_idx),
            Some(_) => return Err(LnError::FundingInProgress),
            None => {
                let (peer_idx, chan_idx) = self.store.next_indices_for_peer(peer)?;
                self.store.set_intent(
                    peer,
                    &FundingIntent {
                        peer_idx,
                        chan_idx,
                        capacity: 0,
                        init_send: 0,
                        initiator: false,
                    },
                )?;
                (peer_idx, chan_idx)
            }
        };
        let (keys, _) = self.my_channel_keys(peer_idx, chan_idx)?;
        debug!("answering point request on slot ({}, {})", peer_idx, chan_idx);
        Ok(Outcome::reply(Message::PointResp(PointResp { keys })))
    }

    /// Initiator side, step 3: the peer's keys are in, so build the
    /// 2-of-2 funding output via the wallet's provisional send, persist
    /// descriptor and state 0, and send the funding descriptor with our
    /// signature over the peer's first commitment.
    pub(crate) fn handle_point_resp(
        &self,
        peer: &RawPublicKey,
        msg: PointResp,
    ) -> Result<Outcome, LnError> {
        let intent = match self.store.get_intent(peer)? {
            Some(intent) if intent.initiator => intent,
            _ => return Err(LnError::UnexpectedMessage),
        };
        let (peer_idx, chan_idx) = (intent.peer_idx, intent.chan_idx);

        let (my_keys, elk_snd) = self.my_channel_keys(peer_idx, chan_idx)?;
        let my_funding_pk = parse_pk(&my_keys.funding_pk)?;
        let their_funding_pk = parse_pk(&msg.keys.funding_pk)?;

        let lock_script = new_2x2_wsh_lock_script(&my_funding_pk, &their_funding_pk);
        let (txid, vouts) = match self.wallet.maybe_send(&[TxOut {
            value: Amount::from_sat(intent.capacity),
            script_pubkey: lock_script,
        }]) {
            Ok(reserved) => reserved,
            Err(e) => {
                // nothing frozen, just release the slot
                let _ = self.store.clear_intent(peer);
                return Err(e.into());
            }
        };
        let funding = bitcoin::OutPoint { txid, vout: vouts[0] };

        // from here on any failure must release the frozen inputs
        let result = (|| -> Result<Outcome, LnError> {
            let chan_desc = ChanDescriptor {
                peer_pub: *peer,
                peer_idx,
                chan_idx,
                funding: to_wire_outpoint(&funding),
                capacity: intent.capacity,
                key_path: KeyPath::channel(peer_idx, chan_idx),
                csv_delay: self.config.csv_delay,
                initiator: true,
                my_keys,
                their_keys: msg.keys,
            };
            let mut chan = Chan {
                desc: chan_desc,
                state: ChanState {
                    idx: 0,
                    my_amt: intent.capacity - intent.init_send,
                    their_amt: intent.init_send,
                    delta: 0,
                    phase: Phase::AwaitingFundingConfirm,
                    close_txid: None,
                    prev_amts: None,
                    their_point: msg.keys.elk0_point,
                    their_next_point: msg.keys.elk1_point,
                    their_pending_point: None,
                    their_sig: None,
                    pending_their_sig: None,
                    failures: 0,
                },
                elk_snd,
                elk_rcv: ElkremReceiver::new(),
                last_msg: None,
            };

            // sign the peer's state 0 commitment
            let their_point0 = parse_pk(&msg.keys.elk0_point)?;
            let their_commit = chan.their_commit(
                &self.secp,
                chan.state.my_amt,
                chan.state.their_amt,
                &their_point0,
            )?;
            let sig = their_commit.sign(&self.secp, &self.my_funding_priv(&chan)?)?;

            let reply = Message::ChanDesc(ChanDesc {
                outpoint: chan.desc.funding,
                capacity: chan.desc.capacity,
                init_send: intent.init_send,
                csv_delay: chan.desc.csv_delay,
                keys: chan.desc.my_keys,
                sig: RawSignature(sig),
            });
            chan.last_msg = Some(Self::encode_msg(&reply)?);
            self.store.save_chan(&chan)?;
            info!("funding output reserved for channel ({}, {}): {}", peer_idx, chan_idx, funding);
            Ok(Outcome::reply(reply))
        })();

        if result.is_err() {
            let _ = self.wallet.nah_dont_send(txid);
            let _ = self.store.clear_intent(peer);
        }
        result
    }

    /// Acceptor side, step 4: check the descriptor, verify the
    /// initiator's signature over our first commitment, persist the
    /// mirrored channel and answer with our own signature.
    pub(crate) fn handle_chan_desc(
        &self,
        peer: &RawPublicKey,
        msg: ChanDesc,
    ) -> Result<Outcome, LnError> {
        let intent = match self.store.get_intent(peer)? {
            Some(intent) if !intent.initiator => intent,
            _ => return Err(LnError::UnexpectedMessage),
        };
        let (peer_idx, chan_idx) = (intent.peer_idx, intent.chan_idx);

        if msg.capacity < self.config.min_capacity {
            return Err(LnError::CapacityOutOfRange(msg.capacity));
        }
        if msg.init_send > msg.capacity {
            return Err(LnError::AmountOutOfRange(msg.init_send));
        }

        let (my_keys, elk_snd) = self.my_channel_keys(peer_idx, chan_idx)?;
        let mut chan = Chan {
            desc: ChanDescriptor {
                peer_pub: *peer,
                peer_idx,
                chan_idx,
                funding: msg.outpoint,
                capacity: msg.capacity,
                key_path: KeyPath::channel(peer_idx, chan_idx),
                csv_delay: msg.csv_delay,
                initiator: false,
                my_keys,
                their_keys: msg.keys,
            },
            state: ChanState {
                idx: 0,
                my_amt: msg.init_send,
                their_amt: msg.capacity - msg.init_send,
                delta: 0,
                phase: Phase::AwaitingFundingConfirm,
                close_txid: None,
                prev_amts: None,
                their_point: msg.keys.elk0_point,
                their_next_point: msg.keys.elk1_point,
                their_pending_point: None,
                their_sig: Some(msg.sig),
                pending_their_sig: None,
                failures: 0,
            },
            elk_snd,
            elk_rcv: ElkremReceiver::new(),
            last_msg: None,
        };

        // the initiator signed our state 0 commitment; check before we
        // store anything
        let my_point0 = chan.my_point(&self.secp, 0)?;
        let my_commit =
            chan.my_commit(&self.secp, chan.state.my_amt, chan.state.their_amt, &my_point0)?;
        my_commit
            .verify(&self.secp, &msg.sig.0, &parse_pk(&msg.keys.funding_pk)?)
            .map_err(|_| LnError::BadSignature)?;

        // and sign theirs in return
        let their_point0 = parse_pk(&msg.keys.elk0_point)?;
        let their_commit = chan.their_commit(
            &self.secp,
            chan.state.my_amt,
            chan.state.their_amt,
            &their_point0,
        )?;
        let sig = their_commit.sign(&self.secp, &self.my_funding_priv(&chan)?)?;

        let reply = Message::ChanAck(ChanAck { outpoint: msg.outpoint, sig: RawSignature(sig) });
        chan.last_msg = Some(Self::encode_msg(&reply)?);
        self.store.save_chan(&chan)?;
        self.store.clear_intent(peer)?;
        info!("accepted channel ({}, {}), capacity {}", peer_idx, chan_idx, msg.capacity);
        Ok(Outcome::reply(reply))
    }

    /// Initiator side, step 5: the acceptor's signature checks out, so
    /// really send the funding transaction. Any failure here aborts the
    /// whole opening and releases the frozen inputs.
    pub(crate) fn handle_chan_ack(
        &self,
        peer: &RawPublicKey,
        msg: ChanAck,
    ) -> Result<Outcome, LnError> {
        let mut chan = self.store.by_outpoint(&msg.outpoint)?;
        if chan.desc.peer_pub != *peer {
            return Err(LnError::WrongPeer);
        }
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let lock = self.chan_lock(key);
        let _guard = lock.lock().unwrap();

        if !chan.desc.initiator
            || chan.state.phase != Phase::AwaitingFundingConfirm
            || chan.state.their_sig.is_some()
        {
            return Err(LnError::UnexpectedMessage);
        }

        let funding_txid = chan.outpoint().txid;
        let result = (|| -> Result<Outcome, LnError> {
            let my_point0 = chan.my_point(&self.secp, 0)?;
            let my_commit =
                chan.my_commit(&self.secp, chan.state.my_amt, chan.state.their_amt, &my_point0)?;
            my_commit
                .verify(&self.secp, &msg.sig.0, &parse_pk(&chan.desc.their_keys.funding_pk)?)
                .map_err(|_| LnError::BadSignature)?;

            self.wallet.really_send(funding_txid)?;

            chan.state.their_sig = Some(msg.sig);
            chan.last_msg = None;
            self.store.save_chan(&chan)?;
            self.store.clear_intent(peer)?;
            info!("funding broadcast for channel ({}, {})", key.0, key.1);
            Ok(Outcome::event(Event::FundingBroadcast {
                peer_idx: key.0,
                chan_idx: key.1,
                txid: Hash256(funding_txid.to_byte_array()),
            }))
        })();

        if result.is_err() {
            // nothing went out, clean abort
            let _ = self.wallet.nah_dont_send(funding_txid);
            let _ = self.store.remove_chan(key.0, key.1);
            let _ = self.store.clear_intent(peer);
        }
        result
    }

    /// Abandons an opening that has not been broadcast: unfreezes the
    /// wallet inputs if the provisional send happened and releases the
    /// per-peer slot.
    pub fn cancel_funding(&self, peer: &RawPublicKey) -> Result<(), LnError> {
        let intent = match self.store.get_intent(peer)? {
            Some(intent) => intent,
            None => return Err(LnError::NoFundingInProgress),
        };
        if let Ok(chan) = self.store.get_chan(intent.peer_idx, intent.chan_idx) {
            if chan.state.phase != Phase::AwaitingFundingConfirm
                || (chan.desc.initiator && chan.state.their_sig.is_some())
            {
                // broadcast already happened, recovery is the chain
                // observer's business now
                return Err(LnError::UnexpectedMessage);
            }
            if chan.desc.initiator {
                let _ = self.wallet.nah_dont_send(chan.outpoint().txid);
            }
            self.store.remove_chan(intent.peer_idx, intent.chan_idx)?;
        }
        self.store.clear_intent(peer)?;
        info!("funding with peer cancelled, slot ({}, {}) abandoned", intent.peer_idx, intent.chan_idx);
        Ok(())
    }

    /// Driven by the external chain observer once the funding output is
    /// buried deep enough.
    pub fn funding_confirmed(&self, peer_idx: u32, chan_idx: u32) -> Result<Event, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();

        let mut chan = self.store.get_chan(peer_idx, chan_idx)?;
        if chan.state.phase != Phase::AwaitingFundingConfirm {
            return Err(LnError::UnexpectedMessage);
        }
        chan.state.phase = Phase::Open;
        chan.last_msg = None;
        self.store.save_chan(&chan)?;
        info!("channel ({}, {}) is open", peer_idx, chan_idx);
        Ok(Event::ChannelOpen { peer_idx, chan_idx })
    }
}
