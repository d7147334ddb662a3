//! Active-node set: snapshots, claim queue, and the bit-set mapping.
//!
//! The set is refreshed wholesale at pulse boundaries from the queued
//! join/leave claims; readers between boundaries always see one consistent
//! snapshot. The sorted ref order is the canonical bit-set mapping for the
//! pulse, identical on every node that agreed on the same membership.

use parking_lot::RwLock;
use sha3::{Digest, Sha3_256};
use std::collections::{HashMap, VecDeque};

use pulsenet_core::node::{Node, NodeNetwork, NodeRole, NodeState};
use pulsenet_core::types::{PulseNumber, RecordRef};
use pulsenet_core::CoreError;

use crate::packets::{BitSetMapper, ReferendumClaim};

pub struct NodeKeeper {
    origin: Node,
    state: RwLock<KeeperState>,
}

struct KeeperState {
    pulse: PulseNumber,
    active: HashMap<RecordRef, Node>,
    /// Sorted refs. Position here is the node's bit-set index.
    ordered: Vec<RecordRef>,
    cloud_hash: [u8; 32],
    claim_queue: VecDeque<ReferendumClaim>,
}

impl KeeperState {
    fn rebuild(&mut self, pulse: PulseNumber) {
        let mut ordered: Vec<RecordRef> = self.active.keys().copied().collect();
        ordered.sort();

        let mut hasher = Sha3_256::new();
        hasher.update(pulse.to_bytes());
        for id in &ordered {
            hasher.update(id.to_bytes());
        }
        self.cloud_hash = hasher.finalize().into();
        self.ordered = ordered;
        self.pulse = pulse;
    }
}

impl NodeKeeper {
    pub fn new(origin: Node, initial: Vec<Node>) -> Self {
        let mut active: HashMap<RecordRef, Node> =
            initial.into_iter().map(|n| (n.id, n)).collect();
        active.insert(origin.id, origin.clone());

        let mut state = KeeperState {
            pulse: PulseNumber(0),
            active,
            ordered: Vec::new(),
            cloud_hash: [0u8; 32],
            claim_queue: VecDeque::new(),
        };
        state.rebuild(PulseNumber(0));

        NodeKeeper {
            origin,
            state: RwLock::new(state),
        }
    }

    /// Queue a claim for the next pulse boundary. Both locally originated
    /// claims and claims collected from peers in phase one land here.
    pub fn queue_claim(&self, claim: ReferendumClaim) {
        self.state.write().claim_queue.push_back(claim);
    }

    /// Claims to carry in this node's next phase-1 packet. The queue stays
    /// intact: claims are consumed only by `set_pulse`.
    pub fn pending_claims(&self) -> Vec<ReferendumClaim> {
        self.state.read().claim_queue.iter().cloned().collect()
    }

    /// Apply all queued membership claims and refresh the snapshot for
    /// `pulse`. Non-membership claims are logged and dropped.
    pub fn set_pulse(&self, pulse: PulseNumber) {
        let mut state = self.state.write();
        let queued: Vec<ReferendumClaim> = state.claim_queue.drain(..).collect();
        for claim in queued {
            match claim {
                ReferendumClaim::NodeJoin {
                    node_id,
                    role_mask,
                    ip,
                    port,
                    public_key,
                    ..
                } => {
                    let roles = roles_from_mask(role_mask);
                    tracing::debug!(node = %node_id, ?roles, "join claim applied");
                    state.active.insert(
                        node_id,
                        Node {
                            id: node_id,
                            state: NodeState::Active,
                            pulse,
                            roles,
                            public_key: public_key.to_vec(),
                            physical_address: format!(
                                "{}.{}.{}.{}:{}",
                                ip[0], ip[1], ip[2], ip[3], port
                            ),
                            version: String::new(),
                        },
                    );
                }
                ReferendumClaim::NodeLeave { node_id, eta } => {
                    if eta <= pulse {
                        tracing::debug!(node = %node_id, "leave claim applied");
                        state.active.remove(&node_id);
                    } else {
                        // not due yet, carry over to the next boundary
                        state
                            .claim_queue
                            .push_back(ReferendumClaim::NodeLeave { node_id, eta });
                    }
                }
                other => {
                    tracing::debug!(claim = ?other.claim_type(), "non-membership claim dropped");
                }
            }
        }
        state.rebuild(pulse);
    }

    pub fn pulse(&self) -> PulseNumber {
        self.state.read().pulse
    }

    /// Hash of the membership snapshot, versioned by pulse.
    pub fn cloud_hash(&self) -> [u8; 32] {
        self.state.read().cloud_hash
    }

    /// Point-in-time bit-set mapping for the current snapshot.
    pub fn mapper(&self) -> ActiveListMapper {
        let state = self.state.read();
        ActiveListMapper {
            index: state
                .ordered
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, i))
                .collect(),
            refs: state.ordered.clone(),
        }
    }
}

impl NodeNetwork for NodeKeeper {
    fn origin(&self) -> Node {
        self.origin.clone()
    }

    fn active_node(&self, id: &RecordRef) -> Option<Node> {
        self.state.read().active.get(id).cloned()
    }

    fn active_nodes(&self) -> Vec<Node> {
        let state = self.state.read();
        state
            .ordered
            .iter()
            .filter_map(|id| state.active.get(id).cloned())
            .collect()
    }

    fn active_nodes_by_role(&self, role: NodeRole) -> Vec<RecordRef> {
        let state = self.state.read();
        state
            .ordered
            .iter()
            .filter(|id| state.active.get(id).is_some_and(|n| n.has_role(role)))
            .copied()
            .collect()
    }
}

fn roles_from_mask(mask: u8) -> Vec<NodeRole> {
    [0x01u8, 0x02, 0x04]
        .iter()
        .filter(|bit| mask & **bit != 0)
        .filter_map(|bit| NodeRole::from_bitmask(*bit))
        .collect()
}

/// Frozen mapping from a snapshot's sorted active list.
pub struct ActiveListMapper {
    refs: Vec<RecordRef>,
    index: HashMap<RecordRef, usize>,
}

impl BitSetMapper for ActiveListMapper {
    fn ref_to_index(&self, id: &RecordRef) -> Result<usize, CoreError> {
        self.index.get(id).copied().ok_or(CoreError::NodeMissing)
    }

    fn index_to_ref(&self, index: usize) -> Result<RecordRef, CoreError> {
        self.refs.get(index).copied().ok_or(CoreError::OutOfRange)
    }

    fn length(&self) -> usize {
        self.refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(role: NodeRole) -> Node {
        Node {
            id: RecordRef::random(),
            state: NodeState::Active,
            pulse: PulseNumber(0),
            roles: vec![role],
            public_key: vec![0; 32],
            physical_address: "127.0.0.1:0".into(),
            version: "dev".into(),
        }
    }

    #[test]
    fn join_and_leave_apply_at_pulse_boundary() {
        let origin = node(NodeRole::Virtual);
        let keeper = NodeKeeper::new(origin.clone(), vec![]);
        assert_eq!(keeper.active_nodes().len(), 1);

        let joiner = RecordRef::random();
        keeper.queue_claim(ReferendumClaim::NodeJoin {
            node_id: joiner,
            role_mask: NodeRole::LightMaterial.to_bitmask(),
            protocol_version: 1,
            ip: [10, 0, 0, 1],
            port: 9000,
            public_key: [1u8; 32],
        });
        // nothing changes before the boundary
        assert!(keeper.active_node(&joiner).is_none());

        keeper.set_pulse(PulseNumber(1));
        let joined = keeper.active_node(&joiner).unwrap();
        assert_eq!(joined.roles, vec![NodeRole::LightMaterial]);
        assert_eq!(joined.physical_address, "10.0.0.1:9000");

        keeper.queue_claim(ReferendumClaim::NodeLeave {
            node_id: joiner,
            eta: PulseNumber(2),
        });
        keeper.set_pulse(PulseNumber(2));
        assert!(keeper.active_node(&joiner).is_none());
    }

    #[test]
    fn cloud_hash_versions_with_membership() {
        let keeper = NodeKeeper::new(node(NodeRole::Virtual), vec![]);
        keeper.set_pulse(PulseNumber(1));
        let before = keeper.cloud_hash();

        keeper.queue_claim(ReferendumClaim::NodeJoin {
            node_id: RecordRef::random(),
            role_mask: 0x01,
            protocol_version: 1,
            ip: [10, 0, 0, 2],
            port: 9001,
            public_key: [2u8; 32],
        });
        keeper.set_pulse(PulseNumber(2));
        assert_ne!(keeper.cloud_hash(), before);
    }

    #[test]
    fn mapper_is_total_over_the_snapshot() {
        let nodes: Vec<Node> = (0..4).map(|_| node(NodeRole::Virtual)).collect();
        let keeper = NodeKeeper::new(node(NodeRole::Virtual), nodes);
        keeper.set_pulse(PulseNumber(1));

        let mapper = keeper.mapper();
        assert_eq!(mapper.length(), 5);
        for i in 0..mapper.length() {
            let id = mapper.index_to_ref(i).unwrap();
            assert_eq!(mapper.ref_to_index(&id).unwrap(), i);
        }
        assert!(matches!(
            mapper.ref_to_index(&RecordRef::random()),
            Err(CoreError::NodeMissing)
        ));
        assert!(matches!(
            mapper.index_to_ref(5),
            Err(CoreError::OutOfRange)
        ));
    }

    #[test]
    fn pending_claims_survive_until_the_boundary() {
        let keeper = NodeKeeper::new(node(NodeRole::Virtual), vec![]);
        keeper.queue_claim(ReferendumClaim::NodeBroadcast { emergency_level: 1 });
        assert_eq!(keeper.pending_claims().len(), 1);
        assert_eq!(keeper.pending_claims().len(), 1);
        keeper.set_pulse(PulseNumber(1));
        assert!(keeper.pending_claims().is_empty());
    }
}
