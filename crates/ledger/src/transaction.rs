//! Buffered single-writer transactions over the ledger keyspace.
//!
//! A transaction buffers writes in memory and applies them in one LMDB
//! write transaction on commit. Reads see buffered writes first, then a
//! fresh snapshot-isolated read transaction. Per-ID locks acquired through
//! `get_object_index(.., true)` are held for the transaction's lifetime and
//! released on every exit path, including panics, via `Drop`.

use lmdb::Transaction as LmdbTxn;
use std::collections::HashMap;
use thiserror::Error;

use pulsenet_core::pulse::Pulse;
use pulsenet_core::types::{PulseNumber, RecordID};
use pulsenet_core::CoreError;

use crate::db::Db;
use crate::index::ObjectLifeline;
use crate::keys;
use crate::record::{blob_id, record_id, Record};

#[derive(Debug, Error)]
pub enum StorageError {
    /// Key absent. Recoverable.
    #[error("not found")]
    NotFound,

    /// Content already exists under this ID. Informational: the carried ID
    /// is valid and callers treat this as idempotent success.
    #[error("record already exists: {id}")]
    Override { id: RecordID },

    #[error("lmdb error: {0}")]
    Lmdb(#[from] lmdb::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Domain error surfaced inside a storage transaction, e.g. a lifeline
    /// contract violation detected under the per-ID lock.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Collapse an `Override` result into its carried ID.
    pub fn override_id(res: Result<RecordID, StorageError>) -> Result<RecordID, StorageError> {
        match res {
            Err(StorageError::Override { id }) => Ok(id),
            other => other,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => CoreError::NotFound,
            StorageError::Override { id } => CoreError::Override { id },
            StorageError::Serialization(s) => CoreError::Serialization(s),
            StorageError::Core(e) => e,
            other => CoreError::Storage(other.to_string()),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// One ledger transaction. Obtained through [`Db::update`] or [`Db::view`].
pub struct TransactionManager<'a> {
    db: &'a Db,
    update: bool,
    locks: Vec<RecordID>,
    txupdates: HashMap<Vec<u8>, Vec<u8>>,
}

impl<'a> TransactionManager<'a> {
    pub(crate) fn new(db: &'a Db, update: bool) -> Self {
        TransactionManager {
            db,
            update,
            locks: Vec::new(),
            txupdates: HashMap::new(),
        }
    }

    fn lock_on_id(&mut self, id: &RecordID) {
        self.db.idlocker().lock(id);
        self.locks.push(*id);
    }

    /// Buffer a write. Nothing reaches disk before commit.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError> {
        if !self.update {
            return Err(StorageError::Lmdb(lmdb::Error::Invalid));
        }
        tracing::trace!(key = %hex::encode(&key), "tx set");
        self.txupdates.insert(key, value);
        Ok(())
    }

    /// Read a value: buffered writes first, then a snapshot read.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StorageError> {
        tracing::trace!(key = %hex::encode(key), "tx get");
        if let Some(v) = self.txupdates.get(key) {
            return Ok(v.clone());
        }
        let txn = self.db.env().begin_ro_txn()?;
        match txn.get(self.db.database(), &key) {
            Ok(v) => Ok(v.to_vec()),
            Err(lmdb::Error::NotFound) => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Store a record, addressed by its content hash scoped to `pulse`.
    ///
    /// If identical content already exists the existing ID is returned
    /// inside `StorageError::Override` — callers treat that as success.
    /// Existing content is never overwritten.
    pub fn set_record(
        &mut self,
        pulse: PulseNumber,
        record: &Record,
    ) -> Result<RecordID, StorageError> {
        let id = record_id(pulse, record)?;
        let key = keys::record_key(&id);
        if self.exists(&key)? {
            return Err(StorageError::Override { id });
        }
        self.set(key, record.to_bytes()?)?;
        Ok(id)
    }

    pub fn get_record(&self, id: &RecordID) -> Result<Record, StorageError> {
        let buf = self.get(&keys::record_key(id))?;
        Ok(Record::from_bytes(&buf)?)
    }

    /// Store an opaque blob with the same dedup contract as `set_record`.
    pub fn set_blob(
        &mut self,
        pulse: PulseNumber,
        blob: &[u8],
    ) -> Result<RecordID, StorageError> {
        let id = blob_id(pulse, blob);
        let key = keys::blob_key(&id);
        if self.exists(&key)? {
            return Err(StorageError::Override { id });
        }
        self.set(key, blob.to_vec())?;
        Ok(id)
    }

    pub fn get_blob(&self, id: &RecordID) -> Result<Vec<u8>, StorageError> {
        self.get(&keys::blob_key(id))
    }

    /// Fetch an object lifeline index.
    ///
    /// With `for_update` an exclusive per-ID lock is acquired before the
    /// read and held until this transaction commits or discards. Without it
    /// the read is lock-free and sees the last committed value.
    pub fn get_object_index(
        &mut self,
        id: &RecordID,
        for_update: bool,
    ) -> Result<ObjectLifeline, StorageError> {
        if for_update {
            self.lock_on_id(id);
        }
        let buf = self.get(&keys::lifeline_key(id))?;
        Ok(ObjectLifeline::decode(&buf)?)
    }

    pub fn set_object_index(
        &mut self,
        id: &RecordID,
        idx: &ObjectLifeline,
    ) -> Result<(), StorageError> {
        self.set(keys::lifeline_key(id), idx.encode()?)
    }

    /// Persist a pulse and advance the latest-pulse marker.
    pub fn add_pulse(&mut self, pulse: &Pulse) -> Result<(), StorageError> {
        self.set(keys::pulse_key(pulse.pulse_number), bincode::serialize(pulse)?)?;
        self.set(
            keys::system_key(keys::SYS_KEY_LATEST_PULSE),
            pulse.pulse_number.to_bytes().to_vec(),
        )
    }

    pub fn get_pulse(&self, number: PulseNumber) -> Result<Pulse, StorageError> {
        let buf = self.get(&keys::pulse_key(number))?;
        Ok(bincode::deserialize(&buf)?)
    }

    pub fn latest_pulse_number(&self) -> Result<PulseNumber, StorageError> {
        let buf = self.get(&keys::system_key(keys::SYS_KEY_LATEST_PULSE))?;
        if buf.len() != 4 {
            return Err(StorageError::Serialization(
                "malformed latest pulse marker".into(),
            ));
        }
        let mut b = [0u8; 4];
        b.copy_from_slice(&buf);
        Ok(PulseNumber::from_bytes(b))
    }

    pub(crate) fn set_raw(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub(crate) fn get_raw(&self, key: &[u8]) -> Result<Vec<u8>, StorageError> {
        self.get(key)
    }

    /// Apply all buffered writes in one atomic LMDB write transaction.
    /// On any failure nothing is applied.
    pub(crate) fn commit(&mut self) -> Result<(), StorageError> {
        if self.txupdates.is_empty() {
            return Ok(());
        }
        let mut txn = self.db.env().begin_rw_txn()?;
        for (k, v) in &self.txupdates {
            txn.put(self.db.database(), k, v, lmdb::WriteFlags::empty())?;
        }
        txn.commit()?;
        self.txupdates.clear();
        Ok(())
    }
}

impl Drop for TransactionManager<'_> {
    /// Unconditional discard: drops any uncommitted buffer and releases all
    /// locks this transaction acquired. Runs on every exit path.
    fn drop(&mut self) {
        self.txupdates.clear();
        for id in self.locks.drain(..) {
            self.db.idlocker().unlock(&id);
        }
    }
}
