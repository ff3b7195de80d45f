use bitcoin::hashes::Hash;
use bitcoin::OutPoint;
use log::{info, warn};

use channel::CloseTx;
use wallet::{KeyUse, Utxo, Wallet};
use wire::{CloseReq, CloseResp, Hash256, Message, RawPublicKey, RawSignature};

use crate::chan::{parse_pk, Chan, Phase};
use crate::{Event, LnError, Node, Outcome};

impl<W: Wallet> Node<W> {
    /// The shared close template. `we_initiated` decides whose output
    /// carries the fee; both sides pass their own view and end up with
    /// the identical transaction.
    fn close_tx(&self, chan: &Chan, we_initiated: bool) -> Result<CloseTx, LnError> {
        let (initiator_sat, responder_sat, initiator_script, responder_script) = if we_initiated {
            (
                chan.state.my_amt,
                chan.state.their_amt,
                chan.my_refund_script()?,
                chan.their_refund_script()?,
            )
        } else {
            (
                chan.state.their_amt,
                chan.state.my_amt,
                chan.their_refund_script()?,
                chan.my_refund_script()?,
            )
        };
        Ok(CloseTx {
            funding_outpoint: chan.outpoint(),
            funding_script: chan.funding_script()?,
            capacity: chan.desc.capacity,
            initiator_sat,
            responder_sat,
            initiator_script,
            responder_script,
        })
    }

    /// Hands the wallet our own output of a settlement transaction.
    fn export_own_output(
        &self,
        chan: &Chan,
        tx: &bitcoin::Transaction,
        script: &bitcoin::ScriptBuf,
        key_use: KeyUse,
        seq: u32,
    ) -> Result<(), LnError> {
        let txid = tx.compute_txid();
        for (vout, out) in tx.output.iter().enumerate() {
            if out.script_pubkey == *script {
                self.wallet.export_utxo(Utxo {
                    outpoint: OutPoint { txid, vout: vout as u32 },
                    value: out.value.to_sat(),
                    script_pubkey: out.script_pubkey.clone(),
                    key_path: chan.desc.key_path.with_use(key_use),
                    seq,
                })?;
            }
        }
        Ok(())
    }

    /// Opens a cooperative close: sign the shared close transaction and
    /// ask the peer to counter-sign and broadcast.
    pub fn close_channel(&self, peer_idx: u32, chan_idx: u32) -> Result<Message, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();

        let mut chan = self.store.get_chan(peer_idx, chan_idx)?;
        match chan.state.phase {
            Phase::Open => {}
            Phase::Closed => return Err(LnError::ChannelClosed),
            Phase::Broken => return Err(LnError::ChannelBroken),
            Phase::UpdatePending { .. } => return Err(LnError::UpdateInFlight),
            _ => return Err(LnError::NotOpen),
        }

        let close = self.close_tx(&chan, true)?;
        let sig = close
            .sign(&self.secp, &self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?)?;

        let msg = Message::CloseReq(CloseReq {
            outpoint: chan.desc.funding,
            sig: RawSignature(sig),
        });
        chan.state.phase = Phase::ClosePending;
        chan.last_msg = Some(Self::encode_msg(&msg)?);
        self.store.save_chan(&chan)?;
        info!("close requested on channel ({}, {})", peer_idx, chan_idx);
        Ok(msg)
    }

    /// Peer asked to close: verify its signature over the shared
    /// template, counter-sign, broadcast, and mark the channel closed.
    pub(crate) fn handle_close_req(
        &self,
        peer: &RawPublicKey,
        msg: CloseReq,
    ) -> Result<Outcome, LnError> {
        let chan = self.store.by_outpoint(&msg.outpoint)?;
        if chan.desc.peer_pub != *peer {
            return Err(LnError::WrongPeer);
        }
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let lock = self.chan_lock(key);
        let _guard = lock.lock().unwrap();
        let mut chan = self.store.get_chan(key.0, key.1)?;

        match chan.state.phase {
            Phase::Open => {}
            Phase::Closed => return Err(LnError::ChannelClosed),
            _ => return Err(LnError::UnexpectedMessage),
        }

        let close = self.close_tx(&chan, false)?;
        let their_funding_pk = parse_pk(&chan.desc.their_keys.funding_pk)?;
        close
            .verify(&self.secp, &msg.sig.0, &their_funding_pk)
            .map_err(|_| LnError::BadSignature)?;

        let my_priv = self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?;
        let my_sig = close.sign(&self.secp, &my_priv)?;
        let my_funding_pk = parse_pk(&chan.desc.my_keys.funding_pk)?;
        let tx = close.finalize(&my_sig, &my_funding_pk, &msg.sig.0, &their_funding_pk)?;

        self.wallet.push_tx(&tx)?;
        self.export_own_output(&chan, &tx, &chan.my_refund_script()?, KeyUse::Refund, 0)?;

        let txid = Hash256(tx.compute_txid().to_byte_array());
        let reply = Message::CloseResp(CloseResp {
            outpoint: chan.desc.funding,
            sig: RawSignature(my_sig),
        });
        chan.state.phase = Phase::Closed;
        chan.state.close_txid = Some(txid);
        chan.last_msg = Some(Self::encode_msg(&reply)?);
        self.store.save_chan(&chan)?;

        info!("channel ({}, {}) closed cooperatively", key.0, key.1);
        Ok(Outcome::reply_with_event(
            reply,
            Event::ChannelClosed { peer_idx: key.0, chan_idx: key.1, txid },
        ))
    }

    /// Our close request came back counter-signed; the peer has
    /// broadcast. Record the settlement.
    pub(crate) fn handle_close_resp(
        &self,
        peer: &RawPublicKey,
        msg: CloseResp,
    ) -> Result<Outcome, LnError> {
        let chan = self.store.by_outpoint(&msg.outpoint)?;
        if chan.desc.peer_pub != *peer {
            return Err(LnError::WrongPeer);
        }
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let lock = self.chan_lock(key);
        let _guard = lock.lock().unwrap();
        let mut chan = self.store.get_chan(key.0, key.1)?;

        match chan.state.phase {
            Phase::ClosePending => {}
            Phase::Closed => return Err(LnError::ChannelClosed),
            _ => return Err(LnError::UnexpectedMessage),
        }

        let close = self.close_tx(&chan, true)?;
        let their_funding_pk = parse_pk(&chan.desc.their_keys.funding_pk)?;
        close
            .verify(&self.secp, &msg.sig.0, &their_funding_pk)
            .map_err(|_| LnError::BadSignature)?;

        // rebuild the broadcast transaction to learn its txid and our
        // output in it
        let my_priv = self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?;
        let my_sig = close.sign(&self.secp, &my_priv)?;
        let my_funding_pk = parse_pk(&chan.desc.my_keys.funding_pk)?;
        let tx = close.finalize(&my_sig, &my_funding_pk, &msg.sig.0, &their_funding_pk)?;
        self.export_own_output(&chan, &tx, &chan.my_refund_script()?, KeyUse::Refund, 0)?;

        let txid = Hash256(tx.compute_txid().to_byte_array());
        chan.state.phase = Phase::Closed;
        chan.state.close_txid = Some(txid);
        chan.last_msg = None;
        self.store.save_chan(&chan)?;

        info!("channel ({}, {}) closed cooperatively", key.0, key.1);
        Ok(Outcome::event(Event::ChannelClosed { peer_idx: key.0, chan_idx: key.1, txid }))
    }

    /// Unilateral exit: discard any in-flight update, broadcast our
    /// latest commitment, wait out the CSV delay on our own output.
    pub fn break_channel(&self, peer_idx: u32, chan_idx: u32) -> Result<Event, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();

        let mut chan = self.store.get_chan(peer_idx, chan_idx)?;
        self.break_inner(&mut chan)
    }

    /// Break with the channel lock already held.
    pub(crate) fn break_inner(&self, chan: &mut Chan) -> Result<Event, LnError> {
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        match chan.state.phase {
            Phase::Closed => return Err(LnError::ChannelClosed),
            Phase::Broken => return Err(LnError::ChannelBroken),
            _ => {}
        }

        if chan.state.delta != 0 {
            warn!("discarding in-flight update of {} on break", chan.state.delta);
            chan.state.delta = 0;
        }

        let their_sig = chan
            .state
            .their_sig
            .ok_or(LnError::ProtocolViolation("no counterparty signature to break with"))?;

        let my_point = chan.my_point(&self.secp, chan.state.idx)?;
        let commit =
            chan.my_commit(&self.secp, chan.state.my_amt, chan.state.their_amt, &my_point)?;
        let my_priv = self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?;
        let my_sig = commit.sign(&self.secp, &my_priv)?;

        let tx = commit.finalize(
            &my_sig,
            &parse_pk(&chan.desc.my_keys.funding_pk)?,
            &their_sig.0,
            &parse_pk(&chan.desc.their_keys.funding_pk)?,
        )?;
        self.wallet.push_tx(&tx)?;

        if chan.state.my_amt > 0 {
            let delayed_script = commit.to_local_script().to_p2wsh();
            self.export_own_output(
                chan,
                &tx,
                &delayed_script,
                KeyUse::Delay,
                chan.desc.csv_delay as u32,
            )?;
        }

        let txid = Hash256(tx.compute_txid().to_byte_array());
        chan.state.phase = Phase::Broken;
        chan.last_msg = None;
        self.store.save_chan(chan)?;

        warn!("channel ({}, {}) broken, commitment {} broadcast", key.0, key.1, txid);
        Ok(Event::ChannelBroken { peer_idx: key.0, chan_idx: key.1, txid })
    }
}
