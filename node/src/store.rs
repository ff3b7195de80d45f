use serde::{Serialize, Deserialize};

use std::path::Path;

use db::{Bucket, DBBuilder, DB};
use wire::{RawPublicKey, WireOutPoint};

use crate::chan::Chan;
use crate::error::LnError;

/// Funding in progress with one peer. One slot per peer, so openings
/// with different peers can run concurrently while a second opening
/// with the same peer is refused until the first completes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FundingIntent {
    pub peer_idx: u32,
    pub chan_idx: u32,
    pub capacity: u64,
    pub init_send: u64,
    pub initiator: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerRecord {
    pub peer_idx: u32,
    pub chan_count: u32,
}

struct Channels;

impl Bucket for Channels {
    const NAME: &'static str = "chn";
    type Key = (u32, u32);
    type Value = Chan;
}

struct Peers;

impl Bucket for Peers {
    const NAME: &'static str = "per";
    type Key = RawPublicKey;
    type Value = PeerRecord;
}

struct OutPoints;

impl Bucket for OutPoints {
    const NAME: &'static str = "opx";
    type Key = WireOutPoint;
    type Value = (u32, u32);
}

struct Intents;

impl Bucket for Intents {
    const NAME: &'static str = "int";
    type Key = RawPublicKey;
    type Value = FundingIntent;
}

/// Persistence for channel descriptors and state, keyed by
/// (peer index, channel index), with an outpoint index for wire lookups.
/// Every mutation is a single atomic batch; a state transition is on
/// disk before its reply message exists.
pub struct ChanStore {
    db: DB,
}

impl ChanStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LnError> {
        let db = DBBuilder::default()
            .register::<Channels>()
            .register::<Peers>()
            .register::<OutPoints>()
            .register::<Intents>()
            .build(path)?;
        Ok(ChanStore { db })
    }

    /// Allocates the next (peer index, channel index) pair for a peer,
    /// creating the peer record on first contact. Indices start at 1
    /// and only ever grow.
    pub fn next_indices_for_peer(&self, pk: &RawPublicKey) -> Result<(u32, u32), LnError> {
        match self.db.get::<Peers>(pk)? {
            Some(mut record) => {
                record.chan_count += 1;
                self.db.put::<Peers>(pk, &record)?;
                Ok((record.peer_idx, record.chan_count))
            }
            None => {
                let peer_idx = self.db.count::<Peers>()? as u32 + 1;
                self.db.put::<Peers>(pk, &PeerRecord { peer_idx, chan_count: 1 })?;
                Ok((peer_idx, 1))
            }
        }
    }

    pub fn peer_idx(&self, pk: &RawPublicKey) -> Result<Option<u32>, LnError> {
        Ok(self.db.get::<Peers>(pk)?.map(|r| r.peer_idx))
    }

    pub fn get_chan(&self, peer_idx: u32, chan_idx: u32) -> Result<Chan, LnError> {
        self.db
            .get::<Channels>(&(peer_idx, chan_idx))?
            .ok_or(LnError::NoSuchChannel { peer_idx, chan_idx })
    }

    /// Atomic replace of the channel record plus its outpoint index.
    pub fn save_chan(&self, chan: &Chan) -> Result<(), LnError> {
        let key = (chan.desc.peer_idx, chan.desc.chan_idx);
        let mut batch = self.db.batch();
        batch.put::<Channels>(&key, chan)?;
        batch.put::<OutPoints>(&chan.desc.funding, &key)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Re-read from disk, dropping whatever in-memory edits the caller
    /// made since the last save.
    pub fn reload_chan(&self, chan: &Chan) -> Result<Chan, LnError> {
        self.get_chan(chan.desc.peer_idx, chan.desc.chan_idx)
    }

    /// Removes a channel that never made it to broadcast.
    pub fn remove_chan(&self, peer_idx: u32, chan_idx: u32) -> Result<(), LnError> {
        let chan = self.get_chan(peer_idx, chan_idx)?;
        let mut batch = self.db.batch();
        batch.delete::<Channels>(&(peer_idx, chan_idx))?;
        batch.delete::<OutPoints>(&chan.desc.funding)?;
        self.db.write(batch)?;
        Ok(())
    }

    pub fn by_outpoint(&self, outpoint: &WireOutPoint) -> Result<Chan, LnError> {
        let (peer_idx, chan_idx) =
            self.db.get::<OutPoints>(outpoint)?.ok_or(LnError::NoSuchOutPoint)?;
        self.get_chan(peer_idx, chan_idx)
    }

    pub fn set_intent(&self, pk: &RawPublicKey, intent: &FundingIntent) -> Result<(), LnError> {
        self.db.put::<Intents>(pk, intent)?;
        Ok(())
    }

    pub fn get_intent(&self, pk: &RawPublicKey) -> Result<Option<FundingIntent>, LnError> {
        Ok(self.db.get::<Intents>(pk)?)
    }

    pub fn clear_intent(&self, pk: &RawPublicKey) -> Result<(), LnError> {
        self.db.delete::<Intents>(pk)?;
        Ok(())
    }

    pub fn channels(&self) -> Result<Vec<Chan>, LnError> {
        Ok(self.db.get_all::<Channels>()?.into_iter().map(|(_, chan)| chan).collect())
    }
}
