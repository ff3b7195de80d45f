#![forbid(unsafe_code)]

//! Typed rocksdb plumbing shared by the channel store and the
//! watchtower store. Each logical bucket is a column family; keys and
//! values pass through `binformat::BinarySD`, so the on-disk layout is
//! the same fixed-width big-endian encoding as the wire. Multi-bucket
//! writes go through `Batch`, which rocksdb applies atomically.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB as RocksDB};
use serde::Serialize;
use serde::de::DeserializeOwned;

use binformat::BinarySD;

mod error;
pub use self::error::Error;

/// A bucket ties a column family name to its key and value types.
pub trait Bucket {
    const NAME: &'static str;
    type Key: Serialize + DeserializeOwned;
    type Value: Serialize + DeserializeOwned;
}

#[derive(Default)]
pub struct DBBuilder {
    cfs: Vec<ColumnFamilyDescriptor>,
}

impl DBBuilder {
    pub fn register<B: Bucket>(mut self) -> Self {
        self.cfs.push(ColumnFamilyDescriptor::new(B::NAME, Options::default()));
        self
    }

    pub fn build<P: AsRef<Path>>(self, path: P) -> Result<DB, Error> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        Ok(DB(RocksDB::open_cf_descriptors(&options, path, self.cfs)?))
    }
}

pub struct DB(RocksDB);

fn key_bytes<K: Serialize>(key: &K) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    BinarySD::serialize(&mut bytes, key).map_err(Error::serde)?;
    Ok(bytes)
}

impl DB {
    fn cf<B: Bucket>(&self) -> Result<&ColumnFamily, Error> {
        self.0.cf_handle(B::NAME).ok_or(Error::MissingColumnFamily(B::NAME))
    }

    pub fn get<B: Bucket>(&self, key: &B::Key) -> Result<Option<B::Value>, Error> {
        let cf = self.cf::<B>()?;
        match self.0.get_cf(cf, key_bytes(key)?)? {
            Some(bytes) => {
                let value = BinarySD::deserialize(bytes.as_slice()).map_err(Error::serde)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put<B: Bucket>(&self, key: &B::Key, value: &B::Value) -> Result<(), Error> {
        let cf = self.cf::<B>()?;
        let mut value_bytes = Vec::new();
        BinarySD::serialize(&mut value_bytes, value).map_err(Error::serde)?;
        self.0.put_cf(cf, key_bytes(key)?, value_bytes)?;
        Ok(())
    }

    pub fn delete<B: Bucket>(&self, key: &B::Key) -> Result<(), Error> {
        let cf = self.cf::<B>()?;
        self.0.delete_cf(cf, key_bytes(key)?)?;
        Ok(())
    }

    /// Number of keys in the bucket. Walks the column family; the
    /// buckets counted this way stay small.
    pub fn count<B: Bucket>(&self) -> Result<usize, Error> {
        let cf = self.cf::<B>()?;
        let mut n = 0;
        for item in self.0.iterator_cf(cf, IteratorMode::Start) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    pub fn get_all<B: Bucket>(&self) -> Result<Vec<(B::Key, B::Value)>, Error> {
        let cf = self.cf::<B>()?;
        let mut out = Vec::new();
        for item in self.0.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            out.push((
                BinarySD::deserialize(key.as_ref()).map_err(Error::serde)?,
                BinarySD::deserialize(value.as_ref()).map_err(Error::serde)?,
            ));
        }
        Ok(out)
    }

    pub fn batch(&self) -> Batch {
        Batch { db: self, inner: WriteBatch::default() }
    }

    pub fn write(&self, batch: Batch) -> Result<(), Error> {
        self.0.write(batch.inner)?;
        Ok(())
    }
}

/// A set of writes applied in one atomic rocksdb batch.
pub struct Batch<'a> {
    db: &'a DB,
    inner: WriteBatch,
}

impl<'a> Batch<'a> {
    pub fn put<B: Bucket>(&mut self, key: &B::Key, value: &B::Value) -> Result<(), Error> {
        let cf = self.db.cf::<B>()?;
        let mut value_bytes = Vec::new();
        BinarySD::serialize(&mut value_bytes, value).map_err(Error::serde)?;
        self.inner.put_cf(cf, key_bytes(key)?, value_bytes);
        Ok(())
    }

    pub fn delete<B: Bucket>(&mut self, key: &B::Key) -> Result<(), Error> {
        let cf = self.db.cf::<B>()?;
        self.inner.delete_cf(cf, key_bytes(key)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Serialize, Deserialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Record {
        index: u64,
        tag: Vec<u8>,
    }

    struct Records;

    impl Bucket for Records {
        const NAME: &'static str = "rec";
        type Key = u32;
        type Value = Record;
    }

    struct Names;

    impl Bucket for Names {
        const NAME: &'static str = "nam";
        type Key = [u8; 4];
        type Value = String;
    }

    fn open() -> (tempfile::TempDir, DB) {
        let dir = tempfile::tempdir().unwrap();
        let db = DBBuilder::default()
            .register::<Records>()
            .register::<Names>()
            .build(dir.path())
            .unwrap();
        (dir, db)
    }

    #[test]
    fn put_get_round_trip() {
        let (_dir, db) = open();
        let record = Record { index: 5, tag: vec![1, 2, 3] };
        db.put::<Records>(&7, &record).unwrap();
        assert_eq!(db.get::<Records>(&7).unwrap(), Some(record));
        assert_eq!(db.get::<Records>(&8).unwrap(), None);
    }

    #[test]
    fn batch_writes_several_buckets() {
        let (_dir, db) = open();
        let mut batch = db.batch();
        batch.put::<Records>(&1, &Record { index: 1, tag: vec![] }).unwrap();
        batch.put::<Names>(&[0, 0, 0, 1], &"one".to_owned()).unwrap();
        db.write(batch).unwrap();

        assert_eq!(db.count::<Records>().unwrap(), 1);
        assert_eq!(db.get::<Names>(&[0, 0, 0, 1]).unwrap(), Some("one".to_owned()));
    }

    #[test]
    fn count_and_get_all() {
        let (_dir, db) = open();
        for i in 0..4u32 {
            db.put::<Records>(&i, &Record { index: i as u64, tag: vec![] }).unwrap();
        }
        assert_eq!(db.count::<Records>().unwrap(), 4);
        let all = db.get_all::<Records>().unwrap();
        assert_eq!(all.len(), 4);
    }
}
