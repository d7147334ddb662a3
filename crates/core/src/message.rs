//! Application messages and the signed parcel envelope.
//!
//! The message set is a closed enum with an explicit discriminant table —
//! handlers and wire dispatch key off `MessageType`, so adding a variant
//! means extending both in one place.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::node::NodeRole;
use crate::reply::Reply;
use crate::types::{PulseNumber, RecordID, RecordRef};

/// Discriminant table for `Message`. Stable values: persisted inside tapes
/// and parcels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    SetRecord = 1,
    SetBlob = 2,
    GetObject = 3,
    GetDelegate = 4,
    GetChildren = 5,
    UpdateObject = 6,
    RegisterChild = 7,
    ValidateRecord = 8,
    GetCode = 9,
    Call = 10,
    JetDrop = 11,
    HeavyPayload = 12,
}

/// Routable application message. Field sets mirror what the ledger handlers
/// need; `record` payloads are canonical record bytes so the envelope never
/// depends on the ledger crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Persist a record addressed by its content.
    SetRecord {
        record: Vec<u8>,
        target: RecordRef,
    },
    /// Persist an opaque blob (object memory) addressed by its content.
    SetBlob {
        memory: Vec<u8>,
        target: RecordRef,
    },
    /// Fetch an object descriptor for its head, an explicit state, or the
    /// approved checkpoint.
    GetObject {
        head: RecordRef,
        state: Option<RecordID>,
        approved: bool,
    },
    /// Fetch the delegate reference registered under `as_type`.
    GetDelegate {
        head: RecordRef,
        as_type: RecordRef,
    },
    /// Fetch one chunk of a parent's child refs, newest first.
    GetChildren {
        parent: RecordRef,
        from_pulse: Option<PulseNumber>,
        from_child: Option<RecordID>,
        amount: usize,
    },
    /// Append an amend/activate/deactivate record to an object lifeline.
    UpdateObject {
        record: Vec<u8>,
        object: RecordRef,
    },
    /// Register a child (and optionally a delegate) under a parent.
    RegisterChild {
        record: Vec<u8>,
        parent: RecordRef,
        child: RecordRef,
        as_type: Option<RecordRef>,
    },
    /// Mark an object state as the approved checkpoint.
    ValidateRecord {
        object: RecordRef,
        state: RecordID,
        is_valid: bool,
    },
    /// Fetch code for execution.
    GetCode { code: RecordRef },
    /// Contract call routed to the executor of the target object.
    Call {
        payload: Vec<u8>,
        target: RecordRef,
        caller: RecordRef,
    },
    /// Closed jet drop handed to the heavy material replica.
    JetDrop {
        drop: Vec<u8>,
        pulse_number: PulseNumber,
    },
    /// Bulk replication payload for heavy sync.
    HeavyPayload {
        records: Vec<Vec<u8>>,
        pulse_number: PulseNumber,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::SetRecord { .. } => MessageType::SetRecord,
            Message::SetBlob { .. } => MessageType::SetBlob,
            Message::GetObject { .. } => MessageType::GetObject,
            Message::GetDelegate { .. } => MessageType::GetDelegate,
            Message::GetChildren { .. } => MessageType::GetChildren,
            Message::UpdateObject { .. } => MessageType::UpdateObject,
            Message::RegisterChild { .. } => MessageType::RegisterChild,
            Message::ValidateRecord { .. } => MessageType::ValidateRecord,
            Message::GetCode { .. } => MessageType::GetCode,
            Message::Call { .. } => MessageType::Call,
            Message::JetDrop { .. } => MessageType::JetDrop,
            Message::HeavyPayload { .. } => MessageType::HeavyPayload,
        }
    }

    /// Object the message should be routed towards. `None` means the message
    /// goes to all actors of its target role.
    pub fn target(&self) -> Option<RecordRef> {
        match self {
            Message::SetRecord { target, .. } => Some(*target),
            Message::SetBlob { target, .. } => Some(*target),
            Message::GetObject { head, .. } => Some(*head),
            Message::GetDelegate { head, .. } => Some(*head),
            Message::GetChildren { parent, .. } => Some(*parent),
            Message::UpdateObject { object, .. } => Some(*object),
            Message::RegisterChild { parent, .. } => Some(*parent),
            Message::ValidateRecord { object, .. } => Some(*object),
            Message::GetCode { code } => Some(*code),
            Message::Call { target, .. } => Some(*target),
            Message::JetDrop { .. } => None,
            Message::HeavyPayload { .. } => None,
        }
    }

    /// Role whose actors should receive the message.
    pub fn target_role(&self) -> NodeRole {
        match self {
            Message::Call { .. } => NodeRole::Virtual,
            Message::JetDrop { .. } | Message::HeavyPayload { .. } => NodeRole::HeavyMaterial,
            _ => NodeRole::LightMaterial,
        }
    }

    /// Sender legitimacy check input: for messages issued on behalf of an
    /// object, the object and the role the sender must hold for it.
    pub fn allowed_sender(&self) -> Option<(RecordRef, NodeRole)> {
        match self {
            Message::Call { caller, .. } => Some((*caller, NodeRole::Virtual)),
            Message::ValidateRecord { object, .. } => Some((*object, NodeRole::Virtual)),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        Ok(bincode::deserialize(b)?)
    }
}

/// Routing/delegation token. Signed by the node that granted delegation;
/// validated by the receiving bus before dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingToken {
    pub to: RecordRef,
    pub from: RecordRef,
    pub pulse: PulseNumber,
    pub sign: Vec<u8>,
}

/// Signed wrapper delivered between nodes. The signature covers the
/// serialized message only; routing fields travel in the clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub sender: RecordRef,
    pub message: Message,
    pub signature: Vec<u8>,
    pub token: Option<RoutingToken>,
    pub trace_id: String,
    pub pulse: PulseNumber,
}

impl Parcel {
    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Bytes covered by the parcel signature.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.message.to_bytes()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        Ok(bincode::deserialize(b)?)
    }
}

/// Per-send options: an explicit receiver bypasses jet routing, a token
/// carries delegated authority.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub receiver: Option<RecordRef>,
    pub token: Option<RoutingToken>,
}

/// Handler registered on the bus for one message type.
pub type MessageHandler = Box<dyn Fn(&Parcel) -> Result<Reply, CoreError> + Send + Sync>;

/// Seam the artifact manager (and other producers) use to reach the bus.
pub trait MessageSender: Send + Sync {
    fn send(&self, message: Message, options: Option<SendOptions>) -> Result<Reply, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serde_roundtrip() {
        let msg = Message::GetObject {
            head: RecordRef::random(),
            state: Some(RecordID::random(PulseNumber(3))),
            approved: true,
        };
        let restored = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn target_roles() {
        let call = Message::Call {
            payload: vec![1],
            target: RecordRef::random(),
            caller: RecordRef::random(),
        };
        assert_eq!(call.target_role(), NodeRole::Virtual);

        let set = Message::SetRecord {
            record: vec![1],
            target: RecordRef::random(),
        };
        assert_eq!(set.target_role(), NodeRole::LightMaterial);

        let drop = Message::JetDrop {
            drop: vec![],
            pulse_number: PulseNumber(1),
        };
        assert_eq!(drop.target_role(), NodeRole::HeavyMaterial);
        assert!(drop.target().is_none());
    }

    #[test]
    fn parcel_roundtrip() {
        let parcel = Parcel {
            sender: RecordRef::random(),
            message: Message::GetCode {
                code: RecordRef::random(),
            },
            signature: vec![0; 64],
            token: None,
            trace_id: "t-1".into(),
            pulse: PulseNumber(12),
        };
        let restored = Parcel::from_bytes(&parcel.to_bytes().unwrap()).unwrap();
        assert_eq!(parcel, restored);
    }
}
