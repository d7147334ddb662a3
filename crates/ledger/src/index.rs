//! Object lifeline index: the mutable head pointer structure for one object.
//!
//! The chain of activate/amend records the index points into is immutable;
//! the index itself is rewritten under a per-ID lock on every amend,
//! activate, deactivate or child registration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use pulsenet_core::types::{RecordID, RecordRef};
use pulsenet_core::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifelineState {
    Activated,
    Deactivated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectLifeline {
    /// Latest state record appended to the chain.
    pub latest_state: RecordID,
    /// Last state explicitly validated. Tracked independently of
    /// `latest_state`, which keeps advancing.
    pub latest_state_approved: Option<RecordID>,
    pub state: LifelineState,
    /// Most recent child registration, head of the prev-child chain.
    pub child_pointer: Option<RecordID>,
    pub parent: RecordRef,
    /// Delegates registered under this object, keyed by prototype type.
    /// Persisted indices always carry a map, possibly empty.
    #[serde(default)]
    pub delegates: HashMap<RecordRef, RecordRef>,
}

impl ObjectLifeline {
    pub fn activated(latest_state: RecordID, parent: RecordRef) -> Self {
        ObjectLifeline {
            latest_state,
            latest_state_approved: None,
            state: LifelineState::Activated,
            child_pointer: None,
            parent,
            delegates: HashMap::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(b: &[u8]) -> Result<Self, CoreError> {
        Ok(bincode::deserialize(b)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsenet_core::types::PulseNumber;

    #[test]
    fn lifeline_roundtrip() {
        let mut idx = ObjectLifeline::activated(RecordID::random(PulseNumber(1)), RecordRef::random());
        idx.delegates.insert(RecordRef::random(), RecordRef::random());
        idx.child_pointer = Some(RecordID::random(PulseNumber(2)));
        let restored = ObjectLifeline::decode(&idx.encode().unwrap()).unwrap();
        assert_eq!(idx, restored);
    }

    #[test]
    fn decoded_lifeline_always_has_map() {
        let idx = ObjectLifeline::activated(RecordID::random(PulseNumber(1)), RecordRef::random());
        let restored = ObjectLifeline::decode(&idx.encode().unwrap()).unwrap();
        assert!(restored.delegates.is_empty());
    }
}
