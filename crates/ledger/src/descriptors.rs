//! Descriptors handed to artifact manager callers.
//!
//! A descriptor is a read snapshot: it never updates itself when the
//! lifeline advances. Callers re-fetch to observe newer states.

use pulsenet_core::reply::ObjectReply;
use pulsenet_core::types::{RecordID, RecordRef};
use pulsenet_core::CoreError;

use crate::record::MachineType;

/// Snapshot of one object state plus the lifeline metadata needed to amend
/// or traverse it.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDescriptor {
    pub head: RecordRef,
    pub state: RecordID,
    pub prototype: Option<RecordRef>,
    pub is_prototype: bool,
    pub child_pointer: Option<RecordID>,
    pub memory: Vec<u8>,
    pub parent: RecordRef,
}

impl ObjectDescriptor {
    pub fn head(&self) -> RecordRef {
        self.head
    }

    pub fn state_id(&self) -> RecordID {
        self.state
    }

    pub fn is_prototype(&self) -> bool {
        self.is_prototype
    }

    /// Image this object is an instance of. Errors on prototype objects,
    /// which have no image of their own.
    pub fn prototype(&self) -> Result<RecordRef, CoreError> {
        self.prototype.ok_or(CoreError::StateNotAvailable)
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn parent(&self) -> RecordRef {
        self.parent
    }
}

impl From<ObjectReply> for ObjectDescriptor {
    fn from(r: ObjectReply) -> Self {
        ObjectDescriptor {
            head: r.head,
            state: r.state,
            prototype: r.prototype,
            is_prototype: r.is_prototype,
            child_pointer: r.child_pointer,
            memory: r.memory,
            parent: r.parent,
        }
    }
}

/// Deployed code blob plus the runtime it targets.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeDescriptor {
    pub reference: RecordRef,
    pub machine_type: MachineType,
    pub code: Vec<u8>,
}

impl CodeDescriptor {
    pub fn reference(&self) -> RecordRef {
        self.reference
    }

    pub fn machine_type(&self) -> MachineType {
        self.machine_type
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}
