//! Tree-shaped multicast fan-out.
//!
//! Every node derives the same shuffled order from the pulse entropy, so
//! the whole tree is agreed upon without coordination: the sender delivers
//! to the first `replication_factor` nodes, and each receiver forwards to
//! its own children until the list is exhausted.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use pulsenet_core::types::{Entropy, RecordRef};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cascade {
    pub node_ids: Vec<RecordRef>,
    pub entropy: Entropy,
    pub replication_factor: usize,
}

impl Cascade {
    fn factor(&self) -> usize {
        self.replication_factor.max(1)
    }

    /// Canonical delivery order: sorted refs shuffled by the entropy seed.
    /// Identical on every node holding the same cascade.
    pub fn shuffled(&self) -> Vec<RecordRef> {
        let mut nodes = self.node_ids.clone();
        nodes.sort();

        let mut hasher = Sha3_256::new();
        hasher.update(self.entropy.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();

        let mut rng = rand::rngs::StdRng::from_seed(seed);
        nodes.shuffle(&mut rng);
        nodes
    }

    /// Nodes the original sender delivers to: the tree's first layer.
    pub fn initial_layer(&self) -> Vec<RecordRef> {
        let shuffled = self.shuffled();
        let take = self.factor().min(shuffled.len());
        shuffled[..take].to_vec()
    }

    /// Children of `current` in the fan-out tree; empty when `current` is a
    /// leaf or not part of the cascade at all.
    pub fn next_layer(&self, current: &RecordRef) -> Vec<RecordRef> {
        let shuffled = self.shuffled();
        let Some(index) = shuffled.iter().position(|id| id == current) else {
            return Vec::new();
        };
        let r = self.factor();
        let start = r * (index + 1);
        if start >= shuffled.len() {
            return Vec::new();
        }
        let end = (start + r).min(shuffled.len());
        shuffled[start..end].to_vec()
    }
}
