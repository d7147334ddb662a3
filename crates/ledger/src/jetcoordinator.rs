//! Deterministic entropy-seeded routing.
//!
//! Ownership of an object under a role is decided by sorting the role's
//! active nodes by `sha3(entropy ‖ target ‖ node_id)` and taking the first
//! N. Every node computes the same answer from the pulse's snapshot, so the
//! network agrees on ownership without coordination.

use pulsenet_core::crypto::hash_bytes;
use pulsenet_core::node::NodeRole;
use pulsenet_core::types::{PulseNumber, RecordRef};
use pulsenet_core::{CoreError, JetCoordinator};

use crate::db::Db;

pub struct LedgerJetCoordinator {
    db: Db,
    /// Heavy replicas selected per target. Virtual and light roles always
    /// resolve to a single owner.
    replication_factor: usize,
}

impl LedgerJetCoordinator {
    pub fn new(db: Db, replication_factor: usize) -> Self {
        LedgerJetCoordinator {
            db,
            replication_factor: replication_factor.max(1),
        }
    }

    fn selection_count(&self, role: NodeRole) -> usize {
        match role {
            NodeRole::Virtual | NodeRole::LightMaterial => 1,
            NodeRole::HeavyMaterial => self.replication_factor,
        }
    }
}

impl JetCoordinator for LedgerJetCoordinator {
    fn query_role(
        &self,
        role: NodeRole,
        target: &RecordRef,
        pulse: PulseNumber,
    ) -> Result<Vec<RecordRef>, CoreError> {
        let entropy = self.db.get_pulse(pulse).map_err(CoreError::from)?.entropy;
        let nodes = self.db.get_active_nodes(pulse).map_err(CoreError::from)?;

        let mut candidates: Vec<(RecordRef, [u8; 32])> = nodes
            .iter()
            .filter(|n| n.has_role(role))
            .map(|n| {
                let mut seed = Vec::with_capacity(64 + 72 + 72);
                seed.extend_from_slice(entropy.as_bytes());
                seed.extend_from_slice(&target.to_bytes());
                seed.extend_from_slice(&n.id.to_bytes());
                (n.id, hash_bytes(&seed))
            })
            .collect();
        if candidates.is_empty() {
            return Err(CoreError::NodeMissing);
        }
        // Hash then ref as tie breaker keeps the order total and stable.
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(self.selection_count(role));
        Ok(candidates.into_iter().map(|(id, _)| id).collect())
    }

    fn is_authorized(
        &self,
        role: NodeRole,
        target: &RecordRef,
        pulse: PulseNumber,
        candidate: &RecordRef,
    ) -> Result<bool, CoreError> {
        Ok(self.query_role(role, target, pulse)?.contains(candidate))
    }
}
