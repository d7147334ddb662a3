//! Jet drops: per-pulse digests of the record stream.
//!
//! When a pulse closes, every record written during it is folded into one
//! hash chained to the previous drop. Heavy material nodes use the chain to
//! verify replicated history without replaying individual writes.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use pulsenet_core::types::PulseNumber;

use crate::db::Db;
use crate::keys;
use crate::transaction::StorageError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JetDrop {
    pub pulse: PulseNumber,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl Db {
    /// Build the drop closing `pulse`: chain the previous drop's hash with
    /// the canonical bytes of every record written during the pulse. Also
    /// returns those record bytes so the caller can ship them to heavy
    /// storage alongside the drop.
    pub fn create_drop(
        &self,
        pulse: PulseNumber,
        prev_pulse: PulseNumber,
    ) -> Result<(JetDrop, Vec<Vec<u8>>), StorageError> {
        let prev_hash = match self.get_drop(prev_pulse) {
            Ok(prev) => prev.hash,
            // First drop after genesis chains from zero.
            Err(StorageError::NotFound) => [0u8; 32],
            Err(e) => return Err(e),
        };

        let records = self.records_for_pulse(pulse)?;
        let mut hasher = Sha3_256::new();
        hasher.update(prev_hash);
        for rec in &records {
            hasher.update(rec);
        }
        let hash: [u8; 32] = hasher.finalize().into();

        Ok((
            JetDrop {
                pulse,
                prev_hash,
                hash,
            },
            records,
        ))
    }

    pub fn set_drop(&self, drop: &JetDrop) -> Result<(), StorageError> {
        let buf = bincode::serialize(drop)?;
        self.update(|tx| tx.set_raw(keys::jet_drop_key(drop.pulse), buf))
    }

    pub fn get_drop(&self, pulse: PulseNumber) -> Result<JetDrop, StorageError> {
        let buf = self.view(|tx| tx.get_raw(&keys::jet_drop_key(pulse)))?;
        Ok(bincode::deserialize(&buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    #[test]
    fn drops_chain_and_depend_on_records() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path()).unwrap();

        db.set_record(
            PulseNumber(5),
            &Record::CallRequest {
                payload: vec![1],
            },
        )
        .unwrap();
        let (first, records) = db.create_drop(PulseNumber(5), PulseNumber(4)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(first.prev_hash, [0u8; 32]);
        db.set_drop(&first).unwrap();

        db.set_record(
            PulseNumber(6),
            &Record::CallRequest {
                payload: vec![2],
            },
        )
        .unwrap();
        let (second, _) = db.create_drop(PulseNumber(6), PulseNumber(5)).unwrap();
        assert_eq!(second.prev_hash, first.hash);
        assert_ne!(second.hash, first.hash);

        // Empty pulse still produces a drop chained to the last one.
        let (empty, records) = db.create_drop(PulseNumber(7), PulseNumber(6)).unwrap();
        assert!(records.is_empty());
        assert_eq!(empty.prev_hash, [0u8; 32]); // drop 6 was never stored
    }

    #[test]
    fn drop_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path()).unwrap();
        let (drop, _) = db.create_drop(PulseNumber(9), PulseNumber(8)).unwrap();
        db.set_drop(&drop).unwrap();
        assert_eq!(db.get_drop(PulseNumber(9)).unwrap(), drop);
    }
}
