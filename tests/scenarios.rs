//! End to end scenarios: two engines wired back to back through their
//! returned messages, with mock wallets and a real watchtower store.

use bitcoin::secp256k1::Secp256k1;

use channel::derivation::elk_point;
use node::{ChanStore, Config, Event, LnError, Node, Phase};
use sorceror::Sorceror;
use wallet::mock::MockWallet;
use wire::{Hash256, Message, RawPublicKey, WatchState};

struct Party {
    node: Node<MockWallet>,
    pub_key: RawPublicKey,
    _dir: tempfile::TempDir,
}

fn party(seed: u8, balance: u64) -> Party {
    let dir = tempfile::tempdir().unwrap();
    let wallet = MockWallet::new(&[seed; 32], balance);
    let store = ChanStore::open(dir.path()).unwrap();
    Party {
        node: Node::new(store, wallet, Config::default()),
        pub_key: RawPublicKey([seed; 33]),
        _dir: dir,
    }
}

/// Runs the whole funding handshake and confirms the funding output.
/// Both sides end up with channel (1, 1) open.
fn open_channel(a: &Party, b: &Party, capacity: u64, init_send: u64) {
    let point_req = a.node.fund_channel(&b.pub_key, capacity, init_send).unwrap();
    let point_resp = b.node.handle_message(&a.pub_key, point_req).unwrap().reply.unwrap();
    let chan_desc = a.node.handle_message(&b.pub_key, point_resp).unwrap().reply.unwrap();
    let chan_ack = b.node.handle_message(&a.pub_key, chan_desc).unwrap().reply.unwrap();
    let outcome = a.node.handle_message(&b.pub_key, chan_ack).unwrap();
    assert!(matches!(outcome.event, Some(Event::FundingBroadcast { .. })));

    // the funding transaction went out exactly once, from the initiator
    assert_eq!(a.node.wallet().broadcasts().len(), 1);
    assert!(b.node.wallet().broadcasts().is_empty());

    a.node.funding_confirmed(1, 1).unwrap();
    b.node.funding_confirmed(1, 1).unwrap();
}

/// One full push exchange from `a` to `b`, asserting both sides signal
/// completion and conserve the capacity.
fn push(a: &Party, b: &Party, amt: u64) {
    let delta_sig = a.node.push_channel(1, 1, amt).unwrap();
    let sig_rev = b.node.handle_message(&a.pub_key, delta_sig).unwrap().reply.unwrap();
    let outcome_a = a.node.handle_message(&b.pub_key, sig_rev).unwrap();
    assert!(matches!(outcome_a.event, Some(Event::UpdateComplete { .. })));
    let rev = outcome_a.reply.unwrap();
    let outcome_b = b.node.handle_message(&a.pub_key, rev).unwrap();
    assert!(matches!(outcome_b.event, Some(Event::UpdateComplete { .. })));

    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.my_amt + chan_a.state.their_amt, chan_a.desc.capacity);
    assert_eq!(chan_a.state.my_amt, chan_b.state.their_amt);
    assert_eq!(chan_a.state.idx, chan_b.state.idx);
    // after the nth update each side holds exactly n revealed secrets
    assert_eq!(chan_a.elk_rcv.up_to(), chan_a.state.idx);
    assert_eq!(chan_b.elk_rcv.up_to(), chan_b.state.idx);
}

#[test]
fn open_push_close() {
    let a = party(1, 1_500_000);
    let b = party(2, 0);
    open_channel(&a, &b, 1_000_000, 0);

    for _ in 0..3 {
        push(&a, &b, 100);
    }

    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.my_amt, 999_700);
    assert_eq!(chan_a.state.their_amt, 300);
    assert_eq!(chan_a.state.idx, 3);

    // cooperative close, initiated by A, broadcast by B
    let close_req = a.node.close_channel(1, 1).unwrap();
    let outcome_b = b.node.handle_message(&a.pub_key, close_req).unwrap();
    assert!(matches!(outcome_b.event, Some(Event::ChannelClosed { .. })));
    let close_resp = outcome_b.reply.unwrap();
    let outcome_a = a.node.handle_message(&b.pub_key, close_resp).unwrap();
    assert!(matches!(outcome_a.event, Some(Event::ChannelClosed { .. })));

    let broadcasts = b.node.wallet().broadcasts();
    assert_eq!(broadcasts.len(), 1, "close broadcast exactly once");
    let close_tx = &broadcasts[0];
    assert_eq!(close_tx.output.len(), 2);
    let total: u64 = close_tx.output.iter().map(|o| o.value.to_sat()).sum();
    assert_eq!(total, 999_999, "one unit fee");
    let values: Vec<u64> = close_tx.output.iter().map(|o| o.value.to_sat()).collect();
    assert!(values.contains(&999_699) && values.contains(&300));

    // closed on both sides, same settlement txid
    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.phase, Phase::Closed);
    assert_eq!(chan_b.state.phase, Phase::Closed);
    assert_eq!(chan_a.state.close_txid, chan_b.state.close_txid);
    assert!(matches!(
        a.node.push_channel(1, 1, 100),
        Err(LnError::ChannelClosed)
    ));
}

#[test]
fn revoked_broadcast_is_punishable() {
    let secp = Secp256k1::new();
    let a = party(3, 2_000_000);
    let b = party(4, 0);
    open_channel(&a, &b, 1_000_000, 0);

    let dir = tempfile::tempdir().unwrap();
    let sorc = Sorceror::open(dir.path()).unwrap();

    // five pushes; B feeds the tower as secrets come in: the descriptor
    // covers state 0, one message per revoked state after that
    let mut watch_msgs: Vec<WatchState> = Vec::new();
    for i in 0..5u64 {
        push(&a, &b, 1_000);
        if i == 0 {
            let desc = b.node.watch_descriptor(1, 1).unwrap();
            sorc.add_descriptor(&desc).unwrap();
        } else {
            let msg = b.node.watch_message(1, 1, i).unwrap();
            sorc.add_message(&msg).unwrap();
            watch_msgs.push(msg);
        }
    }

    // A broadcasts its revoked state 3 commitment. The txid is witness
    // independent, so the unsigned reconstruction observes the same tx.
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    let secret_3 = chan_b.elk_rcv.at_index(3).unwrap();
    let observed = chan_b
        .their_commit(&secp, 3_000, 997_000, &elk_point(&secp, &secret_3).unwrap())
        .unwrap()
        .get_tx();
    let observed_txid = Hash256({
        use bitcoin::hashes::Hash;
        observed.compute_txid().to_byte_array()
    });
    assert_eq!(observed_txid, watch_msgs[2].commit_txid);

    let hits = sorc.check_txids(&[observed_txid]).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].state_num, 3);

    let grab = hits[0].grab_tx(&secp, &observed).unwrap();
    assert_eq!(grab.input.len(), 2, "both outputs swept");
    for input in &grab.input {
        assert_eq!(input.previous_output.txid, observed.compute_txid());
        assert!(!input.witness.is_empty());
    }
    assert_ne!(grab.compute_txid(), observed.compute_txid());

    // a different commitment does not fool the candidate check
    let secret_4 = chan_b.elk_rcv.at_index(4).unwrap();
    let wrong = chan_b
        .their_commit(&secp, 4_000, 996_000, &elk_point(&secp, &secret_4).unwrap())
        .unwrap()
        .get_tx();
    assert!(hits[0].grab_tx(&secp, &wrong).is_err());
}

#[test]
fn resume_after_disconnect() {
    let a = party(5, 1_500_000);
    let b = party(6, 0);
    open_channel(&a, &b, 1_000_000, 0);
    push(&a, &b, 100);

    // A sends its DeltaSig into the void
    let delta_sig = a.node.push_channel(1, 1, 250).unwrap();
    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.delta, -250);
    assert!(matches!(chan_a.state.phase, Phase::UpdatePending { pusher: true, .. }));

    // reconnect: resume replays the identical message
    let resumed = a.node.resume(1, 1).unwrap();
    assert_eq!(resumed, delta_sig);

    // the peer answers the replay; the exchange completes normally
    let sig_rev = b.node.handle_message(&a.pub_key, resumed).unwrap().reply.unwrap();
    let outcome_a = a.node.handle_message(&b.pub_key, sig_rev).unwrap();
    assert!(matches!(
        outcome_a.event,
        Some(Event::UpdateComplete { idx: 2, .. })
    ));
    let rev = outcome_a.reply.unwrap();
    b.node.handle_message(&a.pub_key, rev).unwrap();

    // advanced by exactly one state
    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.idx, 2);
    assert_eq!(chan_b.state.idx, 2);
    assert_eq!(chan_a.state.my_amt, 999_650);

    // a duplicate delivery is answered with the same SigRev and does
    // not advance anything further
    let delta_sig = a.node.push_channel(1, 1, 10).unwrap();
    let first = b.node.handle_message(&a.pub_key, delta_sig.clone()).unwrap().reply.unwrap();
    let second = b.node.handle_message(&a.pub_key, delta_sig).unwrap().reply.unwrap();
    assert_eq!(first, second);
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    assert!(matches!(chan_b.state.phase, Phase::UpdatePending { .. }));
}

#[test]
fn tower_rejects_skipped_state() {
    let a = party(7, 1_500_000);
    let b = party(8, 0);
    open_channel(&a, &b, 1_000_000, 0);

    let dir = tempfile::tempdir().unwrap();
    let sorc = Sorceror::open(dir.path()).unwrap();

    let mut msgs = Vec::new();
    for i in 0..3u64 {
        push(&a, &b, 500);
        if i == 0 {
            sorc.add_descriptor(&b.node.watch_descriptor(1, 1).unwrap()).unwrap();
        } else {
            msgs.push(b.node.watch_message(1, 1, i).unwrap());
        }
    }

    // skipping state 1 must fail and leave the receiver where it was
    assert!(matches!(
        sorc.add_message(&msgs[1]),
        Err(sorceror::Error::WrongState { expected: 1, got: 2 })
    ));
    // in-order delivery still works afterwards
    sorc.add_message(&msgs[0]).unwrap();
    sorc.add_message(&msgs[1]).unwrap();
}

#[test]
fn break_carries_the_timelock() {
    let a = party(9, 1_500_000);
    let b = party(10, 0);
    open_channel(&a, &b, 1_000_000, 0);
    push(&a, &b, 400);
    push(&a, &b, 600);

    let event = a.node.break_channel(1, 1).unwrap();
    assert!(matches!(event, Event::ChannelBroken { .. }));

    let broadcasts = a.node.wallet().broadcasts();
    // funding first, then the break
    assert_eq!(broadcasts.len(), 2);
    let break_tx = &broadcasts[1];
    assert_eq!(break_tx.output.len(), 2);
    // our delayed output is a script hash, theirs pays out directly
    assert!(break_tx.output[0].script_pubkey.is_p2wsh());
    assert!(break_tx.output[1].script_pubkey.is_p2wpkh());
    assert_eq!(break_tx.output[0].value.to_sat(), 999_000);
    assert_eq!(break_tx.output[1].value.to_sat(), 1_000);

    // the wallet got our output back with the CSV wait attached
    let exported = a.node.wallet().exported();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].seq, 5);
    assert_eq!(exported[0].value, 999_000);

    // no pushing a broken channel
    assert!(matches!(a.node.push_channel(1, 1, 1), Err(LnError::ChannelBroken)));
}

#[test]
fn break_after_close_is_rejected() {
    let a = party(11, 1_500_000);
    let b = party(12, 0);
    open_channel(&a, &b, 1_000_000, 0);

    let close_req = a.node.close_channel(1, 1).unwrap();
    let close_resp = b.node.handle_message(&a.pub_key, close_req).unwrap().reply.unwrap();
    a.node.handle_message(&b.pub_key, close_resp).unwrap();

    assert!(matches!(a.node.break_channel(1, 1), Err(LnError::ChannelClosed)));
    assert!(matches!(b.node.break_channel(1, 1), Err(LnError::ChannelClosed)));
}

#[test]
fn push_boundaries() {
    let a = party(13, 1_500_000);
    let b = party(14, 0);
    open_channel(&a, &b, 1_000_000, 0);

    // zero and the one-coin cap
    assert!(matches!(a.node.push_channel(1, 1, 0), Err(LnError::AmountOutOfRange(0))));
    assert!(matches!(
        a.node.push_channel(1, 1, 100_000_001),
        Err(LnError::AmountOutOfRange(_))
    ));

    // the whole capacity runs into the reserve
    assert!(matches!(
        a.node.push_channel(1, 1, 1_000_000),
        Err(LnError::InsufficientBalance { .. })
    ));

    // a second push while one is in flight
    let _delta_sig = a.node.push_channel(1, 1, 100).unwrap();
    assert!(matches!(a.node.push_channel(1, 1, 100), Err(LnError::UpdateInFlight)));

    // the empty side has nothing to push with at all
    let err = b.node.push_channel(1, 1, 1).unwrap_err();
    assert!(matches!(err, LnError::InsufficientBalance { available: 0 }));
}

#[test]
fn funding_aborts_cleanly_on_bad_ack() {
    let a = party(17, 1_500_000);
    let b = party(18, 0);

    let point_req = a.node.fund_channel(&b.pub_key, 1_000_000, 0).unwrap();
    let point_resp = b.node.handle_message(&a.pub_key, point_req).unwrap().reply.unwrap();
    let chan_desc = a.node.handle_message(&b.pub_key, point_resp).unwrap().reply.unwrap();
    let chan_ack = b.node.handle_message(&a.pub_key, chan_desc).unwrap().reply.unwrap();

    let bad = match chan_ack {
        Message::ChanAck(mut m) => {
            m.sig.0[10] ^= 0xff;
            Message::ChanAck(m)
        }
        _ => unreachable!(),
    };
    assert!(matches!(a.node.handle_message(&b.pub_key, bad), Err(LnError::BadSignature)));

    // nothing went out, the frozen inputs are back, the slot is free
    assert!(a.node.wallet().broadcasts().is_empty());
    assert_eq!(a.node.wallet().pending_count(), 0);
    assert_eq!(a.node.wallet().available(), 1_500_000);
    assert!(matches!(
        a.node.store().get_chan(1, 1),
        Err(LnError::NoSuchChannel { .. })
    ));
    assert!(a.node.fund_channel(&b.pub_key, 1_000_000, 0).is_ok());
}

#[test]
fn cancel_funding_releases_the_frozen_inputs() {
    let a = party(21, 1_500_000);
    let b = party(22, 0);

    let point_req = a.node.fund_channel(&b.pub_key, 1_000_000, 0).unwrap();
    let point_resp = b.node.handle_message(&a.pub_key, point_req).unwrap().reply.unwrap();
    let _chan_desc = a.node.handle_message(&b.pub_key, point_resp).unwrap().reply.unwrap();
    assert_eq!(a.node.wallet().available(), 500_000, "funding inputs frozen");

    a.node.cancel_funding(&b.pub_key).unwrap();
    assert_eq!(a.node.wallet().available(), 1_500_000);
    assert!(matches!(
        a.node.cancel_funding(&b.pub_key),
        Err(LnError::NoFundingInProgress)
    ));
    assert!(a.node.fund_channel(&b.pub_key, 1_000_000, 0).is_ok());
}

#[test]
fn initial_send_splits_the_capacity() {
    let a = party(19, 1_500_000);
    let b = party(20, 0);
    open_channel(&a, &b, 1_000_000, 200_000);

    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    let chan_b = b.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.my_amt, 800_000);
    assert_eq!(chan_a.state.their_amt, 200_000);
    assert_eq!(chan_b.state.my_amt, 200_000);

    // the receiving side can push back over the same channel
    push(&b, &a, 50_000);
    let chan_a = a.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan_a.state.my_amt, 850_000);
    assert_eq!(chan_a.state.idx, 1);
}

#[test]
fn stale_update_breaks_after_deadline() {
    let a = party(15, 1_500_000);
    let b = party(16, 0);
    open_channel(&a, &b, 1_000_000, 0);
    push(&a, &b, 100);

    let _lost = a.node.push_channel(1, 1, 50).unwrap();

    // nothing expires before the deadline
    let now = chrono::Utc::now().timestamp();
    assert!(a.node.expire_stale_updates(now).unwrap().is_empty());

    // well past the deadline the channel breaks on its own
    let events = a.node.expire_stale_updates(now + 3_600).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::ChannelBroken { .. }));
    let chan = a.node.store().get_chan(1, 1).unwrap();
    assert_eq!(chan.state.phase, Phase::Broken);
    assert_eq!(chan.state.delta, 0, "in-flight delta discarded");
}
