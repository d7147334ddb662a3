//! Replies returned by message handlers.
//!
//! Delivery errors travel back to the remote caller as `Reply::Error`,
//! never as a raw fault.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{RecordID, RecordRef};

/// Object descriptor payload inside `Reply::Object`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectReply {
    pub head: RecordRef,
    pub state: RecordID,
    pub prototype: Option<RecordRef>,
    pub is_prototype: bool,
    pub child_pointer: Option<RecordID>,
    pub parent: RecordRef,
    pub memory: Vec<u8>,
}

/// One chunk of child references plus the cursor for the next fetch.
/// `next_from == None` means the chain is exhausted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildrenReply {
    pub refs: Vec<RecordRef>,
    pub next_from: Option<RecordID>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// ID of a stored record or blob.
    Id(RecordID),
    Object(ObjectReply),
    Delegate(RecordRef),
    Children(ChildrenReply),
    Code { code: Vec<u8>, machine_type: u32 },
    /// Generic acknowledgement.
    Ok,
    /// Serialized handler error.
    Error(String),
}

impl Reply {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        Ok(bincode::deserialize(b)?)
    }

    /// Unwrap an error reply back into a `CoreError` on the caller side,
    /// recovering the taxonomy variant from its wire form.
    pub fn into_result(self) -> Result<Reply, CoreError> {
        match self {
            Reply::Error(s) => Err(CoreError::from_wire(&s)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PulseNumber;

    #[test]
    fn reply_serde_roundtrip() {
        let reply = Reply::Children(ChildrenReply {
            refs: vec![RecordRef::random(), RecordRef::random()],
            next_from: Some(RecordID::random(PulseNumber(9))),
        });
        let restored = Reply::from_bytes(&reply.to_bytes().unwrap()).unwrap();
        assert_eq!(reply, restored);
    }

    #[test]
    fn error_reply_unwraps() {
        let r = Reply::Error("boom".into()).into_result();
        assert!(r.is_err());
        assert!(Reply::Ok.into_result().is_ok());
    }
}
