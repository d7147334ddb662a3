//! Node membership types and the active-node-set seam.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{PulseNumber, RecordRef};

/// State of a node within consensus membership. Nodes transition states only
/// at pulse boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Announced itself via a join claim, not yet voted in.
    Joined,
    /// Accepted by consensus, waiting for its activation pulse.
    Prepared,
    /// Full member of the active set.
    Active,
    /// Left via a leave claim; removed at the next pulse.
    Leaved,
    /// Temporarily excluded (timed out or blamed).
    Suspended,
}

/// Operational role a node fulfills. Role decides which slice of replicated
/// state a node holds and which requests it may answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Executes contract logic; holds no material state.
    Virtual,
    /// Holds recent material state (current + previous pulses).
    LightMaterial,
    /// Holds the durable archival replica.
    HeavyMaterial,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Virtual => "virtual",
            NodeRole::LightMaterial => "light-material",
            NodeRole::HeavyMaterial => "heavy-material",
        }
    }

    /// Bitmask representation for compact wire encoding.
    pub fn to_bitmask(&self) -> u8 {
        match self {
            NodeRole::Virtual => 0x01,
            NodeRole::LightMaterial => 0x02,
            NodeRole::HeavyMaterial => 0x04,
        }
    }

    pub fn from_bitmask(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(NodeRole::Virtual),
            0x02 => Some(NodeRole::LightMaterial),
            0x04 => Some(NodeRole::HeavyMaterial),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consensus member. The active-node set is a point-in-time snapshot of
/// these, versioned by pulse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: RecordRef,
    pub state: NodeState,
    /// Pulse after which the current state was assigned.
    pub pulse: PulseNumber,
    /// Candidate roles for this node.
    pub roles: Vec<NodeRole>,
    /// Raw Ed25519 public key (32 bytes).
    pub public_key: Vec<u8>,
    pub physical_address: String,
    pub version: String,
}

impl Node {
    /// Primary role: the first candidate role.
    pub fn role(&self) -> NodeRole {
        self.roles.first().copied().unwrap_or(NodeRole::Virtual)
    }

    pub fn has_role(&self, role: NodeRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Read access to the active-node set. Refreshed wholesale at pulse
/// boundaries, never partially mutated concurrently with reads.
pub trait NodeNetwork: Send + Sync {
    /// The node this process runs as.
    fn origin(&self) -> Node;
    /// Active node by reference, if present in the current snapshot.
    fn active_node(&self, id: &RecordRef) -> Option<Node>;
    /// The full current snapshot.
    fn active_nodes(&self) -> Vec<Node>;
    /// References of active nodes holding `role`.
    fn active_nodes_by_role(&self, role: NodeRole) -> Vec<RecordRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_bitmask_roundtrip() {
        for role in [
            NodeRole::Virtual,
            NodeRole::LightMaterial,
            NodeRole::HeavyMaterial,
        ] {
            assert_eq!(NodeRole::from_bitmask(role.to_bitmask()), Some(role));
        }
        assert_eq!(NodeRole::from_bitmask(0x40), None);
    }

    #[test]
    fn primary_role_defaults_to_virtual() {
        let node = Node {
            id: RecordRef::random(),
            state: NodeState::Active,
            pulse: PulseNumber(0),
            roles: vec![],
            public_key: vec![],
            physical_address: "127.0.0.1:0".into(),
            version: "dev".into(),
        };
        assert_eq!(node.role(), NodeRole::Virtual);
    }
}
