//! LMDB-backed ledger store.
//!
//! All scopes (records, blobs, lifelines, pulses, jet drops, system keys)
//! share one named LMDB database; the first key byte selects the scope.
//! Writes go through [`TransactionManager`] so every mutation is atomic and
//! buffered until commit.

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction};
use std::path::Path;
use std::sync::Arc;

use pulsenet_core::node::Node;
use pulsenet_core::pulse::Pulse;
use pulsenet_core::types::{PulseNumber, RecordID, RecordRef};

use crate::idlock::IdLocker;
use crate::index::ObjectLifeline;
use crate::keys;
use crate::record::{Record, SideEffectRecord};
use crate::transaction::{StorageError, TransactionManager};

const MAX_DBS: u32 = 4;
const MAP_SIZE: usize = 1 << 32; // 4 GiB

/// Handle to the ledger store. Cheap to clone, safe to share across threads.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

struct DbInner {
    env: Environment,
    db: Database,
    idlocker: IdLocker,
    genesis_ref: RecordRef,
}

impl Db {
    /// Open (or create) the store at `path` and bootstrap genesis state on
    /// first open: the genesis pulse, the genesis record and its lifeline.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Db, StorageError> {
        std::fs::create_dir_all(path.as_ref())?;
        let env = Environment::new()
            .set_max_dbs(MAX_DBS)
            .set_map_size(MAP_SIZE)
            .open(path.as_ref())?;
        let db = env.create_db(Some("ledger"), DatabaseFlags::empty())?;

        let existing = {
            let txn = env.begin_ro_txn()?;
            match txn.get(db, &keys::system_key(keys::SYS_KEY_GENESIS)) {
                Ok(buf) => Some(RecordRef::from_bytes(buf).map_err(StorageError::from)?),
                Err(lmdb::Error::NotFound) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let store = Db {
            inner: Arc::new(DbInner {
                env,
                db,
                idlocker: IdLocker::new(),
                genesis_ref: existing.unwrap_or_default(),
            }),
        };

        match existing {
            Some(genesis) => {
                tracing::debug!(%genesis, "ledger opened");
                Ok(store)
            }
            None => store.bootstrap(),
        }
    }

    fn bootstrap(self) -> Result<Db, StorageError> {
        let genesis_pulse = Pulse::genesis();
        let genesis_record = Record::CallRequest {
            payload: b"genesis".to_vec(),
        };

        let genesis_id = self.update(|tx| {
            tx.add_pulse(&genesis_pulse)?;
            let id = tx.set_record(genesis_pulse.pulse_number, &genesis_record)?;
            let genesis = RecordRef::new(id, id);
            tx.set_object_index(&id, &ObjectLifeline::activated(id, genesis))?;
            tx.set_raw(
                keys::system_key(keys::SYS_KEY_GENESIS),
                genesis.to_bytes().to_vec(),
            )?;
            Ok(id)
        })?;

        tracing::info!(genesis = %genesis_id, "ledger bootstrapped");

        // Re-wrap with the freshly written genesis ref; the Arc is still
        // uniquely held here since no transaction outlives `update`.
        let mut inner = Arc::try_unwrap(self.inner).map_err(|_| lmdb::Error::Panic)?;
        inner.genesis_ref = RecordRef::new(genesis_id, genesis_id);
        Ok(Db {
            inner: Arc::new(inner),
        })
    }

    /// Reference to the genesis record, the root of every lifeline tree.
    pub fn genesis_ref(&self) -> RecordRef {
        self.inner.genesis_ref
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.inner.env
    }

    pub(crate) fn database(&self) -> Database {
        self.inner.db
    }

    pub(crate) fn idlocker(&self) -> &IdLocker {
        &self.inner.idlocker
    }

    /// Run `f` inside a read-write transaction. Buffered writes are applied
    /// atomically when `f` returns `Ok`; on `Err` everything is discarded.
    pub fn update<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut TransactionManager<'_>) -> Result<T, StorageError>,
    {
        let mut tx = TransactionManager::new(self, true);
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside a read-only transaction.
    pub fn view<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut TransactionManager<'_>) -> Result<T, StorageError>,
    {
        let mut tx = TransactionManager::new(self, false);
        f(&mut tx)
    }

    // ════════════════════════════════════════════════════════════════
    // Single-operation conveniences. Each runs in its own transaction.
    // ════════════════════════════════════════════════════════════════

    pub fn set_record(
        &self,
        pulse: PulseNumber,
        record: &Record,
    ) -> Result<RecordID, StorageError> {
        self.update(|tx| tx.set_record(pulse, record))
    }

    pub fn get_record(&self, id: &RecordID) -> Result<Record, StorageError> {
        self.view(|tx| tx.get_record(id))
    }

    pub fn set_blob(&self, pulse: PulseNumber, blob: &[u8]) -> Result<RecordID, StorageError> {
        self.update(|tx| tx.set_blob(pulse, blob))
    }

    pub fn get_blob(&self, id: &RecordID) -> Result<Vec<u8>, StorageError> {
        self.view(|tx| tx.get_blob(id))
    }

    pub fn get_object_index(&self, id: &RecordID) -> Result<ObjectLifeline, StorageError> {
        self.view(|tx| tx.get_object_index(id, false))
    }

    pub fn set_object_index(
        &self,
        id: &RecordID,
        idx: &ObjectLifeline,
    ) -> Result<(), StorageError> {
        self.update(|tx| tx.set_object_index(id, idx))
    }

    pub fn add_pulse(&self, pulse: &Pulse) -> Result<(), StorageError> {
        self.update(|tx| tx.add_pulse(pulse))
    }

    pub fn get_pulse(&self, number: PulseNumber) -> Result<Pulse, StorageError> {
        self.view(|tx| tx.get_pulse(number))
    }

    pub fn latest_pulse_number(&self) -> Result<PulseNumber, StorageError> {
        self.view(|tx| tx.latest_pulse_number())
    }

    /// Snapshot the active node list for `pulse`. Written once per pulse by
    /// the pulse manager; later reads serve deterministic routing.
    pub fn set_active_nodes(
        &self,
        pulse: PulseNumber,
        nodes: &[Node],
    ) -> Result<(), StorageError> {
        let buf = bincode::serialize(nodes)?;
        self.update(|tx| tx.set_raw(keys::active_nodes_key(pulse), buf))
    }

    pub fn get_active_nodes(&self, pulse: PulseNumber) -> Result<Vec<Node>, StorageError> {
        let buf = self.view(|tx| tx.get_raw(&keys::active_nodes_key(pulse)))?;
        Ok(bincode::deserialize(&buf)?)
    }

    /// Collect the raw bytes of every record written during `pulse`, in key
    /// order. Record IDs start with the big-endian pulse number, so one
    /// range scan over the record scope covers exactly this pulse.
    pub fn records_for_pulse(&self, pulse: PulseNumber) -> Result<Vec<Vec<u8>>, StorageError> {
        let prefix = keys::record_pulse_prefix(pulse);
        let txn = self.env().begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.database())?;
        let mut out = Vec::new();
        for (key, val) in cursor.iter_from(&prefix[..]) {
            if !key.starts_with(&prefix) {
                break;
            }
            out.push(val.to_vec());
        }
        Ok(out)
    }

    /// Seal a record into the genesis-style request record namespace used by
    /// request registration: a bare side-effect request wrapper.
    pub fn request_record(&self, target: RecordRef) -> Record {
        Record::CallRequest {
            payload: target.to_bytes().to_vec(),
        }
    }

    /// Wrap `request` into the side-effect header shared by all material
    /// records, anchored on this store's genesis domain.
    pub fn side_effect(&self, request: RecordRef) -> SideEffectRecord {
        SideEffectRecord {
            domain: self.genesis_ref(),
            request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn bootstrap_writes_genesis_once() {
        let dir = TempDir::new().unwrap();
        let first = Db::open(dir.path()).unwrap().genesis_ref();
        let second = Db::open(dir.path()).unwrap().genesis_ref();
        assert_eq!(first, second);
        assert_ne!(first, RecordRef::default());
    }

    #[test]
    fn record_roundtrip_and_dedup() {
        let (_dir, db) = open_tmp();
        let pulse = PulseNumber(10);
        let rec = Record::CallRequest {
            payload: vec![1, 2, 3],
        };

        let id = db.set_record(pulse, &rec).unwrap();
        assert_eq!(db.get_record(&id).unwrap(), rec);

        // Same content, same pulse: reports the existing ID, never rewrites.
        match db.set_record(pulse, &rec) {
            Err(StorageError::Override { id: existing }) => assert_eq!(existing, id),
            other => panic!("expected override, got {other:?}"),
        }

        // Same content in a different pulse is a distinct record.
        let other = db.set_record(PulseNumber(11), &rec).unwrap();
        assert_ne!(other, id);
    }

    #[test]
    fn blob_roundtrip() {
        let (_dir, db) = open_tmp();
        let id = db.set_blob(PulseNumber(3), b"memory").unwrap();
        assert_eq!(db.get_blob(&id).unwrap(), b"memory");
        assert!(matches!(
            db.set_blob(PulseNumber(3), b"memory"),
            Err(StorageError::Override { .. })
        ));
    }

    #[test]
    fn missing_keys_report_not_found() {
        let (_dir, db) = open_tmp();
        let id = RecordID::new(PulseNumber(9), [7u8; 32]);
        assert!(matches!(db.get_record(&id), Err(StorageError::NotFound)));
        assert!(matches!(db.get_blob(&id), Err(StorageError::NotFound)));
        assert!(matches!(
            db.get_object_index(&id),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn failed_update_discards_buffer() {
        let (_dir, db) = open_tmp();
        let pulse = PulseNumber(20);
        let rec = Record::CallRequest {
            payload: vec![9],
        };
        let mut seen = None;
        let res: Result<(), StorageError> = db.update(|tx| {
            seen = Some(tx.set_record(pulse, &rec)?);
            Err(StorageError::NotFound)
        });
        assert!(res.is_err());
        assert!(matches!(
            db.get_record(&seen.unwrap()),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn pulses_advance_latest_marker() {
        let (_dir, db) = open_tmp();
        let mut pulse = Pulse::genesis();
        pulse.pulse_number = PulseNumber(100);
        db.add_pulse(&pulse).unwrap();
        assert_eq!(db.latest_pulse_number().unwrap(), PulseNumber(100));
        assert_eq!(
            db.get_pulse(PulseNumber(100)).unwrap().pulse_number,
            PulseNumber(100)
        );
    }

    #[test]
    fn records_scan_is_pulse_scoped() {
        let (_dir, db) = open_tmp();
        for i in 0..3u8 {
            db.set_record(
                PulseNumber(50),
                &Record::CallRequest {
                    payload: vec![i],
                },
            )
            .unwrap();
        }
        db.set_record(
            PulseNumber(51),
            &Record::CallRequest {
                payload: vec![99],
            },
        )
        .unwrap();
        assert_eq!(db.records_for_pulse(PulseNumber(50)).unwrap().len(), 3);
        assert_eq!(db.records_for_pulse(PulseNumber(51)).unwrap().len(), 1);
    }
}
