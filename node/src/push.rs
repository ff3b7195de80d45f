use log::{debug, info, warn};

use channel::derivation::elk_point;
use wallet::{KeyUse, Wallet};
use wire::{DeltaSig, Hash256, Message, RawPublicKey, RawSignature, Rev, SigRev};

use crate::chan::{parse_pk, Chan, Phase};
use crate::{Event, LnError, Node, Outcome};

impl<W: Wallet> Node<W> {
    fn ensure_open(&self, chan: &Chan) -> Result<(), LnError> {
        match chan.state.phase {
            Phase::Open => Ok(()),
            Phase::Closed => Err(LnError::ChannelClosed),
            Phase::Broken => Err(LnError::ChannelBroken),
            Phase::UpdatePending { .. } => Err(LnError::UpdateInFlight),
            _ => Err(LnError::NotOpen),
        }
    }

    /// Records a validation failure from the peer. Three in a row and
    /// the channel is not worth keeping: break it.
    fn strike(&self, chan: &mut Chan, err: LnError) -> Result<Outcome, LnError> {
        chan.state.failures += 1;
        if chan.state.failures >= 3 {
            warn!(
                "channel ({}, {}): {} consecutive validation failures, breaking",
                chan.desc.peer_idx, chan.desc.chan_idx, chan.state.failures
            );
            self.break_inner(chan)?;
            return Err(LnError::ProtocolViolation("repeated validation failures"));
        }
        self.store.save_chan(chan)?;
        Err(err)
    }

    /// The peer stepped outside the protocol order. Break immediately,
    /// keep the descriptor for later recovery.
    fn protocol_fatal(&self, chan: &mut Chan, what: &'static str) -> Result<Outcome, LnError> {
        warn!(
            "channel ({}, {}): protocol violation ({}), breaking",
            chan.desc.peer_idx, chan.desc.chan_idx, what
        );
        self.break_inner(chan)?;
        Err(LnError::ProtocolViolation(what))
    }

    fn check_push_amount(&self, amt: u64, balance: u64, capacity: u64) -> Result<(), LnError> {
        if amt == 0 || amt > self.config.max_push {
            return Err(LnError::AmountOutOfRange(amt));
        }
        let reserve = capacity / self.config.reserve_divisor;
        let available = balance.saturating_sub(reserve);
        if amt > available {
            return Err(LnError::InsufficientBalance { available });
        }
        Ok(())
    }

    /// Shifts `amt` from us to the peer: signs their next commitment
    /// and opens the update exchange. The channel stays `UpdatePending`
    /// until their `SigRev` comes back; the `UpdateComplete` event from
    /// that handler is the signal the state is clean again.
    pub fn push_channel(&self, peer_idx: u32, chan_idx: u32, amt: u64) -> Result<Message, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();

        let mut chan = self.store.get_chan(peer_idx, chan_idx)?;
        self.ensure_open(&chan)?;
        if chan.state.delta != 0 {
            return Err(LnError::UpdateInFlight);
        }
        self.check_push_amount(amt, chan.state.my_amt, chan.desc.capacity)?;

        let next_idx = chan.state.idx + 1;
        let their_next_point = parse_pk(&chan.state.their_next_point)?;
        let their_commit = chan.their_commit(
            &self.secp,
            chan.state.my_amt - amt,
            chan.state.their_amt + amt,
            &their_next_point,
        )?;
        let sig = their_commit
            .sign(&self.secp, &self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?)?;

        // refill their lookahead with our point one past the new state
        let my_refill = chan.my_point(&self.secp, next_idx + 1)?;

        let msg = Message::DeltaSig(DeltaSig {
            outpoint: chan.desc.funding,
            delta: amt as u32,
            sig: RawSignature(sig),
            next_elk_point: RawPublicKey(my_refill.serialize()),
        });

        chan.state.delta = -(amt as i64);
        chan.state.phase = Phase::UpdatePending { pusher: true, started_at: Self::now() };
        chan.last_msg = Some(Self::encode_msg(&msg)?);
        self.store.save_chan(&chan)?;

        debug!("push {} on channel ({}, {}), state {} -> {}", amt, peer_idx, chan_idx, chan.state.idx, next_idx);
        Ok(msg)
    }

    /// Recipient side of a push: verify, persist the pending delta,
    /// answer with our signature and the revocation of the state we are
    /// leaving.
    pub(crate) fn handle_delta_sig(
        &self,
        peer: &RawPublicKey,
        msg: DeltaSig,
    ) -> Result<Outcome, LnError> {
        let chan = self.store.by_outpoint(&msg.outpoint)?;
        if chan.desc.peer_pub != *peer {
            return Err(LnError::WrongPeer);
        }
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let lock = self.chan_lock(key);
        let _guard = lock.lock().unwrap();
        let mut chan = self.store.get_chan(key.0, key.1)?;

        let amt = msg.delta as u64;

        // redelivery of a push we already answered: repeat the answer
        if let Phase::UpdatePending { pusher: false, .. } = chan.state.phase {
            if chan.state.delta == amt as i64 {
                if let Some(bytes) = &chan.last_msg {
                    debug!("duplicate DeltaSig on ({}, {}), repeating answer", key.0, key.1);
                    return Ok(Outcome::reply(wire::BinarySD::deserialize(&bytes[..])?));
                }
            }
            return Err(LnError::UpdateInFlight);
        }

        self.ensure_open(&chan)?;
        if let Err(e) = self.check_push_amount(amt, chan.state.their_amt, chan.desc.capacity) {
            return self.strike(&mut chan, e);
        }

        let next_idx = chan.state.idx + 1;
        let (new_my, new_their) = (chan.state.my_amt + amt, chan.state.their_amt - amt);

        // their signature must open our new commitment
        let my_next_point = chan.my_point(&self.secp, next_idx)?;
        let my_commit = chan.my_commit(&self.secp, new_my, new_their, &my_next_point)?;
        if my_commit
            .verify(&self.secp, &msg.sig.0, &parse_pk(&chan.desc.their_keys.funding_pk)?)
            .is_err()
        {
            return self.strike(&mut chan, LnError::BadSignature);
        }

        // sign their new commitment; their point for it came from the
        // lookahead
        let their_next_point = parse_pk(&chan.state.their_next_point)?;
        let their_commit = chan.their_commit(&self.secp, new_my, new_their, &their_next_point)?;
        let sig = their_commit
            .sign(&self.secp, &self.wallet.get_priv(chan.desc.key_path.with_use(KeyUse::Fund))?)?;

        // reveal the secret of the state we are leaving and top up our
        // own lookahead point
        let leaving_secret = chan.elk_snd.at_index(chan.state.idx)?;
        let my_refill = chan.my_point(&self.secp, next_idx + 1)?;

        let reply = Message::SigRev(SigRev {
            outpoint: chan.desc.funding,
            sig: RawSignature(sig),
            elk: Hash256(leaving_secret),
            next_elk_point: RawPublicKey(my_refill.serialize()),
        });

        chan.state.delta = amt as i64;
        chan.state.phase = Phase::UpdatePending { pusher: false, started_at: Self::now() };
        chan.state.pending_their_sig = Some(msg.sig);
        chan.state.their_pending_point = Some(msg.next_elk_point);
        chan.state.failures = 0;
        chan.last_msg = Some(Self::encode_msg(&reply)?);
        self.store.save_chan(&chan)?;

        Ok(Outcome::reply(reply))
    }

    /// Pusher side completion: their signature and revocation are in,
    /// commit the new state and close the exchange with our own
    /// revocation.
    pub(crate) fn handle_sig_rev(
        &self,
        peer: &RawPublicKey,
        msg: SigRev,
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
            Phase::UpdatePending { pusher: true, .. } => {}
            // the exchange already completed and our Rev got lost:
            // repeat it
            Phase::Open => {
                if let Some(bytes) = &chan.last_msg {
                    let last: Message = wire::BinarySD::deserialize(&bytes[..])?;
                    if let Message::Rev(_) = last {
                        debug!("duplicate SigRev on ({}, {}), repeating Rev", key.0, key.1);
                        return Ok(Outcome::reply(last));
                    }
                }
                return Err(LnError::UnexpectedMessage);
            }
            Phase::Closed => return Err(LnError::ChannelClosed),
            _ => return self.protocol_fatal(&mut chan, "SigRev outside an update we opened"),
        }

        let amt = (-chan.state.delta) as u64;
        let next_idx = chan.state.idx + 1;
        let (new_my, new_their) = (chan.state.my_amt - amt, chan.state.their_amt + amt);

        let my_next_point = chan.my_point(&self.secp, next_idx)?;
        let my_commit = chan.my_commit(&self.secp, new_my, new_their, &my_next_point)?;
        if my_commit
            .verify(&self.secp, &msg.sig.0, &parse_pk(&chan.desc.their_keys.funding_pk)?)
            .is_err()
        {
            return self.strike(&mut chan, LnError::BadSignature);
        }

        // the revealed secret must match the point they committed to
        // and extend the received chain
        match elk_point(&self.secp, &msg.elk.0) {
            Ok(point) if RawPublicKey(point.serialize()) == chan.state.their_point => {}
            _ => return self.strike(&mut chan, LnError::BadRevocation),
        }
        if chan.elk_rcv.add_next(msg.elk.0).is_err() {
            return self.strike(&mut chan, LnError::BadRevocation);
        }

        // commit
        chan.state.prev_amts = Some((chan.state.my_amt, chan.state.their_amt));
        chan.state.idx = next_idx;
        chan.state.my_amt = new_my;
        chan.state.their_amt = new_their;
        chan.state.delta = 0;
        chan.state.phase = Phase::Open;
        chan.state.their_sig = Some(msg.sig);
        chan.state.their_point = chan.state.their_next_point;
        chan.state.their_next_point = msg.next_elk_point;
        chan.state.failures = 0;

        // close the exchange by revoking our own previous state
        let my_leaving_secret = chan.elk_snd.at_index(next_idx - 1)?;
        let reply = Message::Rev(Rev {
            outpoint: chan.desc.funding,
            elk: Hash256(my_leaving_secret),
        });
        chan.last_msg = Some(Self::encode_msg(&reply)?);
        self.store.save_chan(&chan)?;

        info!("channel ({}, {}) advanced to state {}", key.0, key.1, next_idx);
        Ok(Outcome::reply_with_event(
            reply,
            Event::UpdateComplete { peer_idx: key.0, chan_idx: key.1, idx: next_idx },
        ))
    }

    /// Recipient side completion.
    pub(crate) fn handle_rev(&self, peer: &RawPublicKey, msg: Rev) -> Result<Outcome, LnError> {
        let chan = self.store.by_outpoint(&msg.outpoint)?;
        if chan.desc.peer_pub != *peer {
            return Err(LnError::WrongPeer);
        }
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let lock = self.chan_lock(key);
        let _guard = lock.lock().unwrap();
        let mut chan = self.store.get_chan(key.0, key.1)?;

        match chan.state.phase {
            Phase::UpdatePending { pusher: false, .. } => {}
            // a Rev we have already processed; nothing to do
            Phase::Open => return Ok(Outcome::none()),
            Phase::Closed => return Err(LnError::ChannelClosed),
            _ => return self.protocol_fatal(&mut chan, "Rev outside an update they opened"),
        }

        match elk_point(&self.secp, &msg.elk.0) {
            Ok(point) if RawPublicKey(point.serialize()) == chan.state.their_point => {}
            _ => return self.strike(&mut chan, LnError::BadRevocation),
        }
        if chan.elk_rcv.add_next(msg.elk.0).is_err() {
            return self.strike(&mut chan, LnError::BadRevocation);
        }

        let amt = chan.state.delta as u64;
        let next_idx = chan.state.idx + 1;
        let their_sig = match chan.state.pending_their_sig.take() {
            Some(sig) => sig,
            None => return self.protocol_fatal(&mut chan, "no pending signature to commit"),
        };
        let refill = match chan.state.their_pending_point.take() {
            Some(point) => point,
            None => return self.protocol_fatal(&mut chan, "no pending lookahead point"),
        };

        chan.state.prev_amts = Some((chan.state.my_amt, chan.state.their_amt));
        chan.state.idx = next_idx;
        chan.state.my_amt += amt;
        chan.state.their_amt -= amt;
        chan.state.delta = 0;
        chan.state.phase = Phase::Open;
        chan.state.their_sig = Some(their_sig);
        chan.state.their_point = chan.state.their_next_point;
        chan.state.their_next_point = refill;
        chan.state.failures = 0;
        chan.last_msg = None;
        self.store.save_chan(&chan)?;

        info!("channel ({}, {}) advanced to state {}", key.0, key.1, next_idx);
        Ok(Outcome::event(Event::UpdateComplete {
            peer_idx: key.0,
            chan_idx: key.1,
            idx: next_idx,
        }))
    }
}
