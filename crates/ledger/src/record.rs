//! Persisted record variants and content addressing.
//!
//! Records are immutable once written. Updates create new records linked via
//! `prev_state`/`prev_child` pointers, forming a backward-linked version
//! chain (a lifeline). The canonical serialization feeding the content hash
//! is the bincode encoding of the tagged enum — the tag is part of the
//! hashed bytes, so two variants with equal fields never collide.

use serde::{Deserialize, Serialize};

use pulsenet_core::crypto::hash_bytes;
use pulsenet_core::types::{PulseNumber, RecordID, RecordRef};
use pulsenet_core::CoreError;

/// Domain and request that caused a side effect. Embedded by every record
/// that mutates object state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectRecord {
    pub domain: RecordRef,
    pub request: RecordRef,
}

/// Shared payload of activate/amend records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStateData {
    /// Content ID of the memory blob, stored separately in the blob scope.
    pub memory: RecordID,
    /// Prototype ref for instances, code ref for prototypes.
    pub image: RecordRef,
    pub is_prototype: bool,
}

/// Execution environment a code record targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineType(pub u32);

/// Closed set of everything the ledger persists. Variant order is part of
/// the canonical encoding; append only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// Registered incoming request (also used as the genesis record).
    CallRequest { payload: Vec<u8> },
    /// Contract interface declaration.
    Type {
        side_effect: SideEffectRecord,
        declaration: Vec<u8>,
    },
    /// Deployed code. `code` is the blob ID of the code bytes.
    Code {
        side_effect: SideEffectRecord,
        code: RecordID,
        machine_type: MachineType,
    },
    /// Starts an object lifeline.
    ObjectActivate {
        side_effect: SideEffectRecord,
        state: ObjectStateData,
        parent: RecordRef,
        is_delegate: bool,
    },
    /// Extends a lifeline with a new state.
    ObjectAmend {
        side_effect: SideEffectRecord,
        state: ObjectStateData,
        prev_state: RecordID,
    },
    /// Terminates a lifeline. Deactivated objects cannot change.
    Deactivation {
        side_effect: SideEffectRecord,
        prev_state: RecordID,
    },
    /// Child registration under a parent; `prev_child` forms a singly
    /// linked, most-recent-first list.
    Child {
        reference: RecordRef,
        prev_child: Option<RecordID>,
    },
    /// Saved call result.
    Result {
        request: RecordRef,
        payload: Vec<u8>,
    },
}

impl Record {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        Ok(bincode::deserialize(b)?)
    }

    /// State payload for activate/amend records. Deactivation carries none.
    pub fn state_data(&self) -> Option<&ObjectStateData> {
        match self {
            Record::ObjectActivate { state, .. } => Some(state),
            Record::ObjectAmend { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Previous state pointer for lifeline-extending records.
    pub fn prev_state(&self) -> Option<RecordID> {
        match self {
            Record::ObjectAmend { prev_state, .. } => Some(*prev_state),
            Record::Deactivation { prev_state, .. } => Some(*prev_state),
            _ => None,
        }
    }

    /// Whether this record is part of an object lifeline chain.
    pub fn is_state_record(&self) -> bool {
        matches!(
            self,
            Record::ObjectActivate { .. } | Record::ObjectAmend { .. } | Record::Deactivation { .. }
        )
    }

    pub fn is_deactivation(&self) -> bool {
        matches!(self, Record::Deactivation { .. })
    }
}

/// Content ID of a record for the given pulse.
pub fn record_id(pulse: PulseNumber, record: &Record) -> Result<RecordID, CoreError> {
    let bytes = record.to_bytes()?;
    Ok(RecordID::new(pulse, hash_bytes(&bytes)))
}

/// Content ID of a blob for the given pulse.
pub fn blob_id(pulse: PulseNumber, data: &[u8]) -> RecordID {
    RecordID::new(pulse, hash_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_effect() -> SideEffectRecord {
        SideEffectRecord {
            domain: RecordRef::random(),
            request: RecordRef::random(),
        }
    }

    #[test]
    fn record_serde_roundtrip() {
        let rec = Record::ObjectAmend {
            side_effect: side_effect(),
            state: ObjectStateData {
                memory: RecordID::random(PulseNumber(1)),
                image: RecordRef::random(),
                is_prototype: false,
            },
            prev_state: RecordID::random(PulseNumber(1)),
        };
        let restored = Record::from_bytes(&rec.to_bytes().unwrap()).unwrap();
        assert_eq!(rec, restored);
    }

    #[test]
    fn identical_content_same_pulse_same_id() {
        let rec = Record::CallRequest {
            payload: vec![1, 2, 3],
        };
        let a = record_id(PulseNumber(5), &rec).unwrap();
        let b = record_id(PulseNumber(5), &rec).unwrap();
        assert_eq!(a, b);

        let c = record_id(PulseNumber(6), &rec).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn different_variants_different_ids() {
        let req = Record::CallRequest { payload: vec![] };
        let child = Record::Child {
            reference: RecordRef::default(),
            prev_child: None,
        };
        assert_ne!(
            record_id(PulseNumber(1), &req).unwrap(),
            record_id(PulseNumber(1), &child).unwrap()
        );
    }

    #[test]
    fn state_helpers() {
        let deact = Record::Deactivation {
            side_effect: side_effect(),
            prev_state: RecordID::random(PulseNumber(2)),
        };
        assert!(deact.is_deactivation());
        assert!(deact.is_state_record());
        assert!(deact.state_data().is_none());
        assert!(deact.prev_state().is_some());

        let req = Record::CallRequest { payload: vec![] };
        assert!(!req.is_state_record());
    }
}
