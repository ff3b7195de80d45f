use std::path::Path;

use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::Transaction;
use log::{debug, info};

use channel::tools::v0_p2wpkh_from_hash;
use channel::GrabTx;
use db::{Bucket, DBBuilder, DB};
use elkrem::ElkremReceiver;
use wire::{Hash256, WatchDesc, WatchState};

use crate::descriptor::{ChanStatic, IdxSig, IDX_SIG_SIZE};
use crate::error::Error;

/// How much of a txid the big index keys on. Eight bytes are plenty:
/// a collision only costs the CPU to rebuild a second grab script and
/// notice it does not match, never funds.
const TXID_KEY_LEN: usize = 8;

struct PkhMap;

impl Bucket for PkhMap {
    const NAME: &'static str = "pkm";
    type Key = u32;
    type Value = [u8; 20];
}

struct Statics;

impl Bucket for Statics {
    const NAME: &'static str = "sta";
    type Key = [u8; 20];
    type Value = Vec<u8>;
}

struct Receivers;

impl Bucket for Receivers {
    const NAME: &'static str = "elk";
    type Key = [u8; 20];
    type Value = Vec<u8>;
}

struct Indexes;

impl Bucket for Indexes {
    const NAME: &'static str = "idx";
    type Key = [u8; 20];
    type Value = u32;
}

struct TxidIndex;

impl Bucket for TxidIndex {
    const NAME: &'static str = "txi";
    type Key = [u8; TXID_KEY_LEN];
    type Value = Vec<u8>;
}

/// Everything `check_txids` can say about a hit. The caller rebuilds
/// the grab transaction and checks it against the actual broadcast;
/// with a truncated-key collision some candidates simply won't match.
#[derive(Clone, Debug)]
pub struct PunishCandidate {
    pub channel_index: u32,
    pub state_num: u64,
    pub signature: [u8; 64],
    pub spent_txid: Hash256,
    pub statik: ChanStatic,
    pub secret: [u8; 32],
}

impl PunishCandidate {
    /// Rebuilds and fully signs the grab transaction against the
    /// observed broadcast. The state-bound revocation script is the
    /// discriminator: if the transaction does not carry it, this record
    /// does not belong to it (the truncated-key collision case) and the
    /// call fails with `NoMatchingOutputs`.
    pub fn grab_tx(&self, secp: &Secp256k1<All>, observed: &Transaction) -> Result<Transaction, Error> {
        let (revocation_sk, _) = self.statik.revocation_keys(secp, &self.secret)?;
        let to_local = self.statik.to_local_script(secp, &self.secret)?;
        let to_local_wsh = to_local.to_p2wsh();
        if !observed.output.iter().any(|o| o.script_pubkey == to_local_wsh) {
            return Err(Error::Grab(channel::Error::NoMatchingOutputs));
        }
        let refund_pk =
            PublicKey::from_slice(&self.statik.refund_pk).map_err(|_| Error::BadRecord)?;
        let refund_script = channel::tools::v0_p2wpkh(&refund_pk);

        let grab = GrabTx::from_commitment(
            observed,
            &to_local,
            &refund_script,
            v0_p2wpkh_from_hash(self.statik.dest_pkh),
        )?;
        Ok(grab.complete(secp, &revocation_sk, Some((&self.signature, &refund_pk)))?)
    }
}

/// The watchtower store itself.
pub struct Sorceror {
    db: DB,
}

impl Sorceror {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let db = DBBuilder::default()
            .register::<PkhMap>()
            .register::<Statics>()
            .register::<Receivers>()
            .register::<Indexes>()
            .register::<TxidIndex>()
            .build(path)?;
        Ok(Sorceror { db })
    }

    fn truncate_txid(txid: &Hash256) -> [u8; TXID_KEY_LEN] {
        let mut key = [0u8; TXID_KEY_LEN];
        key.copy_from_slice(&txid.0[..TXID_KEY_LEN]);
        key
    }

    /// Registers a channel: assigns it the next local index, seeds its
    /// elkrem receiver with the state 0 secret, and writes all three
    /// namespaces in one atomic batch.
    pub fn add_descriptor(&self, desc: &WatchDesc) -> Result<u32, Error> {
        let pkh = desc.dest_pkh.0;
        if self.db.get::<Statics>(&pkh)?.is_some() {
            return Err(Error::AlreadyWatched(pkh));
        }
        let chan_idx = self.db.count::<PkhMap>()? as u32;

        let mut receiver = ElkremReceiver::new();
        receiver.add_next(desc.elk_zero.0)?; // first add, nothing to clash with

        let statik = ChanStatic::from_watch_desc(desc);
        let mut batch = self.db.batch();
        batch.put::<PkhMap>(&chan_idx, &pkh)?;
        batch.put::<Statics>(&pkh, &statik.to_bytes().to_vec())?;
        batch.put::<Receivers>(&pkh, &receiver.to_bytes())?;
        batch.put::<Indexes>(&pkh, &chan_idx)?;
        self.db.write(batch)?;

        info!("watching channel {} as index {}", hex::encode(&pkh[..]), chan_idx);
        Ok(chan_idx)
    }

    /// Takes one revoked state: extends the channel's elkrem receiver
    /// (rejecting skipped or inconsistent states with the stored
    /// receiver untouched) and files the 74 byte record under the
    /// truncated txid. The whole update is a single atomic batch.
    pub fn add_message(&self, msg: &WatchState) -> Result<(), Error> {
        let pkh = msg.dest_pkh.0;
        let chan_idx =
            self.db.get::<Indexes>(&pkh)?.ok_or(Error::NoSuchChannel(pkh))?;
        let receiver_bytes =
            self.db.get::<Receivers>(&pkh)?.ok_or(Error::NoSuchChannel(pkh))?;
        let mut receiver = ElkremReceiver::from_bytes(&receiver_bytes)?;

        let key = Self::truncate_txid(&msg.commit_txid);
        let mut records = self.db.get::<TxidIndex>(&key)?.unwrap_or_default();

        let expected = receiver.up_to();
        if msg.state_num != expected {
            // an exact replay of an already-filed state is harmless
            if msg.state_num < expected
                && records
                    .chunks(IDX_SIG_SIZE)
                    .filter_map(|c| IdxSig::from_bytes(c).ok())
                    .any(|r| r.chan_idx == chan_idx && r.state_num == msg.state_num)
            {
                debug!("replayed state {} for channel {}", msg.state_num, chan_idx);
                return Ok(());
            }
            return Err(Error::WrongState { expected, got: msg.state_num });
        }

        // a corrupted hash aborts here, before anything is written
        receiver.add_next(msg.elk.0)?;

        let record = IdxSig { chan_idx, state_num: msg.state_num, sig: msg.sig.0 };
        records.extend_from_slice(&record.to_bytes());

        let mut batch = self.db.batch();
        batch.put::<Receivers>(&pkh, &receiver.to_bytes())?;
        batch.put::<TxidIndex>(&key, &records)?;
        self.db.write(batch)?;

        debug!(
            "filed state {} of channel {} under txid key {}",
            msg.state_num,
            chan_idx,
            hex::encode(key)
        );
        Ok(())
    }

    /// Read-only scan over a block's worth of txids. Every record under
    /// a matching truncated key becomes a candidate; the caller turns
    /// candidates into grab transactions and keeps whichever verifies
    /// against the actual broadcast.
    pub fn check_txids(&self, txids: &[Hash256]) -> Result<Vec<PunishCandidate>, Error> {
        let mut hits = Vec::new();
        for txid in txids {
            let key = Self::truncate_txid(txid);
            let records = match self.db.get::<TxidIndex>(&key)? {
                Some(records) => records,
                None => continue,
            };
            for chunk in records.chunks(IDX_SIG_SIZE) {
                let record = IdxSig::from_bytes(chunk)?;
                let pkh = self
                    .db
                    .get::<PkhMap>(&record.chan_idx)?
                    .ok_or(Error::BadRecord)?;
                let statik_bytes =
                    self.db.get::<Statics>(&pkh)?.ok_or(Error::NoSuchChannel(pkh))?;
                let receiver_bytes =
                    self.db.get::<Receivers>(&pkh)?.ok_or(Error::NoSuchChannel(pkh))?;
                let receiver = ElkremReceiver::from_bytes(&receiver_bytes)?;

                hits.push(PunishCandidate {
                    channel_index: record.chan_idx,
                    state_num: record.state_num,
                    signature: record.sig,
                    spent_txid: *txid,
                    statik: ChanStatic::from_bytes(&statik_bytes)?,
                    secret: receiver.at_index(record.state_num)?,
                });
            }
        }
        Ok(hits)
    }

    /// The channels currently being watched, for enumeration.
    pub fn channels(&self) -> Result<Vec<(u32, [u8; 20])>, Error> {
        Ok(self.db.get_all::<PkhMap>()?)
    }

    pub fn channel_count(&self) -> Result<usize, Error> {
        Ok(self.db.count::<PkhMap>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elkrem::ElkremSender;
    use wire::{Hash160, RawPublicKey, RawSignature};

    fn desc(pkh: [u8; 20], elk_zero: [u8; 32]) -> WatchDesc {
        WatchDesc {
            dest_pkh: Hash160(pkh),
            revocation_base_secret: Hash256([0x20; 32]),
            delay_pk: RawPublicKey([2; 33]),
            refund_pk: RawPublicKey([3; 33]),
            csv_delay: 5,
            capacity: 1_000_000,
            elk_zero: Hash256(elk_zero),
        }
    }

    fn state_msg(pkh: [u8; 20], txid_first_byte: u8, state_num: u64, elk: [u8; 32]) -> WatchState {
        WatchState {
            dest_pkh: Hash160(pkh),
            commit_txid: Hash256([txid_first_byte; 32]),
            state_num,
            elk: Hash256(elk),
            sig: RawSignature([0x55; 64]),
        }
    }

    fn open() -> (tempfile::TempDir, Sorceror) {
        let dir = tempfile::tempdir().unwrap();
        let sorc = Sorceror::open(dir.path()).unwrap();
        (dir, sorc)
    }

    #[test]
    fn descriptors_get_sequential_indices() {
        let (_dir, sorc) = open();
        let snd = ElkremSender::new([1; 32]);
        assert_eq!(sorc.add_descriptor(&desc([1; 20], snd.at_index(0).unwrap())).unwrap(), 0);
        assert_eq!(sorc.add_descriptor(&desc([2; 20], snd.at_index(0).unwrap())).unwrap(), 1);
        assert_eq!(sorc.channel_count().unwrap(), 2);

        let err = sorc.add_descriptor(&desc([1; 20], snd.at_index(0).unwrap())).unwrap_err();
        assert!(matches!(err, Error::AlreadyWatched(_)));
    }

    #[test]
    fn states_accumulate_in_order() {
        let (_dir, sorc) = open();
        let snd = ElkremSender::new([7; 32]);
        let pkh = [9; 20];
        sorc.add_descriptor(&desc(pkh, snd.at_index(0).unwrap())).unwrap();

        for state in 1..=4u64 {
            sorc.add_message(&state_msg(pkh, state as u8, state, snd.at_index(state).unwrap()))
                .unwrap();
        }

        let hits = sorc.check_txids(&[Hash256([3; 32])]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].state_num, 3);
        assert_eq!(hits[0].secret, snd.at_index(3).unwrap());
        assert_eq!(hits[0].signature, [0x55; 64]);

        // unknown txid: clean miss
        assert!(sorc.check_txids(&[Hash256([0xaa; 32])]).unwrap().is_empty());
    }

    #[test]
    fn skipped_state_is_rejected_and_receiver_unchanged() {
        let (_dir, sorc) = open();
        let snd = ElkremSender::new([7; 32]);
        let pkh = [9; 20];
        // h0 seeds the receiver
        sorc.add_descriptor(&desc(pkh, snd.at_index(0).unwrap())).unwrap();

        // h2 next, skipping h1: must fail
        let err = sorc
            .add_message(&state_msg(pkh, 2, 2, snd.at_index(2).unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::WrongState { expected: 1, got: 2 }));

        // the stored receiver still expects state 1 and accepts it
        sorc.add_message(&state_msg(pkh, 1, 1, snd.at_index(1).unwrap())).unwrap();
        // and nothing was filed for the rejected message
        assert!(sorc.check_txids(&[Hash256([2; 32])]).unwrap().is_empty());
    }

    #[test]
    fn replayed_state_is_idempotent() {
        let (_dir, sorc) = open();
        let snd = ElkremSender::new([7; 32]);
        let pkh = [9; 20];
        sorc.add_descriptor(&desc(pkh, snd.at_index(0).unwrap())).unwrap();

        let msg = state_msg(pkh, 1, 1, snd.at_index(1).unwrap());
        sorc.add_message(&msg).unwrap();
        sorc.add_message(&msg).unwrap(); // replay, no error, no duplicate

        let hits = sorc.check_txids(&[Hash256([1; 32])]).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn colliding_truncated_txids_keep_both_records() {
        let (_dir, sorc) = open();
        let snd = ElkremSender::new([7; 32]);
        let pkh = [9; 20];
        sorc.add_descriptor(&desc(pkh, snd.at_index(0).unwrap())).unwrap();

        // two txids sharing the leading 8 bytes
        let mut txid_a = [0x11u8; 32];
        let mut txid_b = [0x11u8; 32];
        txid_a[31] = 0xaa;
        txid_b[31] = 0xbb;

        let mut msg_a = state_msg(pkh, 0, 1, snd.at_index(1).unwrap());
        msg_a.commit_txid = Hash256(txid_a);
        sorc.add_message(&msg_a).unwrap();

        let mut msg_b = state_msg(pkh, 0, 2, snd.at_index(2).unwrap());
        msg_b.commit_txid = Hash256(txid_b);
        sorc.add_message(&msg_b).unwrap();

        // either full txid surfaces both candidates
        let hits = sorc.check_txids(&[Hash256(txid_a)]).unwrap();
        assert_eq!(hits.len(), 2);
        let states: Vec<u64> = hits.iter().map(|h| h.state_num).collect();
        assert!(states.contains(&1) && states.contains(&2));
    }
}
