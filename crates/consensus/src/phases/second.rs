//! Phase two: exchange tri-state verdicts and reconcile them by majority.

use std::sync::Arc;

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::types::PulseNumber;
use pulsenet_core::{CoreError, NodeNetwork};

use crate::communicator::Communicator;
use crate::nodekeeper::NodeKeeper;
use crate::packets::{
    BitSetMapper, PacketHeader, PacketType, Phase2Packet, TriState, TriStateBitSet,
    SIGNATURE_SIZE,
};

use super::first::FirstPhaseState;

/// Outcome of a phase-2 round over one membership snapshot.
pub struct SecondPhaseState {
    pub pulse: PulseNumber,
    /// Majority verdict per bit-set index of the snapshot.
    pub bitset: TriStateBitSet,
    pub legit_count: usize,
    pub total_count: usize,
    /// BFT majority: more than two thirds of the snapshot voted legit.
    pub quorum_reached: bool,
}

pub struct SecondPhase {
    keeper: Arc<NodeKeeper>,
    communicator: Arc<dyn Communicator>,
    crypto: Arc<dyn CryptographyService>,
}

impl SecondPhase {
    pub fn new(
        keeper: Arc<NodeKeeper>,
        communicator: Arc<dyn Communicator>,
        crypto: Arc<dyn CryptographyService>,
    ) -> Self {
        SecondPhase {
            keeper,
            communicator,
            crypto,
        }
    }

    /// Build this node's verdict from the phase-1 proofs, exchange it, and
    /// fold every valid peer verdict into a per-index majority.
    pub async fn execute(&self, first: &FirstPhaseState) -> Result<SecondPhaseState, CoreError> {
        let origin = self.keeper.origin();
        let mapper = self.keeper.mapper();
        let total = mapper.length();

        let mut own = TriStateBitSet::new(&[], &mapper)?;
        for index in 0..total {
            let id = mapper.index_to_ref(index)?;
            if !first.proofs.contains_key(&id) {
                own.set_state(index, TriState::TimedOut)?;
            }
        }

        let mut packet = Phase2Packet {
            header: PacketHeader {
                packet_type: PacketType::Phase2,
                has_routing: false,
                f00: false,
                f01: false,
                pulse: first.pulse.pulse_number,
                origin_node_id: origin.id,
                target_node_id: Default::default(),
            },
            bitset: own.clone(),
            signature: [0u8; SIGNATURE_SIZE],
        };
        packet.sign(self.crypto.as_ref())?;

        let responses = self
            .communicator
            .exchange_phase2(&self.keeper.active_nodes(), packet)
            .await?;

        // votes[index][state] over every accepted verdict, ours included
        let mut votes = vec![[0usize; 3]; total];
        let mut tally = |bitset: &TriStateBitSet| -> Result<(), CoreError> {
            for index in 0..total {
                votes[index][bitset.state_at(index)? as usize] += 1;
            }
            Ok(())
        };
        tally(&own)?;

        for (id, response) in responses {
            let Some(peer) = self.keeper.active_node(&id) else {
                tracing::warn!(node = %id, "phase 2 response from unknown node, dropped");
                continue;
            };
            if !response.verify(self.crypto.as_ref(), &peer.public_key) {
                tracing::warn!(node = %id, "phase 2 packet signature invalid, dropped");
                continue;
            }
            if response.bitset.len() != total {
                tracing::warn!(node = %id, len = response.bitset.len(),
                    "phase 2 bit set length mismatch, dropped");
                continue;
            }
            tally(&response.bitset)?;
        }

        let mut verdict = TriStateBitSet::new(&[], &mapper)?;
        for (index, counts) in votes.iter().enumerate() {
            verdict.set_state(index, majority(counts))?;
        }

        let legit_count = verdict.count(TriState::Legit);
        Ok(SecondPhaseState {
            pulse: first.pulse.pulse_number,
            bitset: verdict,
            legit_count,
            total_count: total,
            quorum_reached: legit_count * 3 > total * 2,
        })
    }
}

/// Plurality wins; any tie degrades to the worse verdict.
fn majority(counts: &[usize; 3]) -> TriState {
    let legit = counts[TriState::Legit as usize];
    let timed_out = counts[TriState::TimedOut as usize];
    let fraud = counts[TriState::Fraud as usize];
    if fraud >= legit && fraud >= timed_out {
        TriState::Fraud
    } else if timed_out >= legit {
        TriState::TimedOut
    } else {
        TriState::Legit
    }
}
