//! Phase one: pulse propagation, proof collection, claim gossip.

use std::collections::HashMap;
use std::sync::Arc;

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::pulse::Pulse;
use pulsenet_core::types::RecordRef;
use pulsenet_core::{CoreError, NodeNetwork};

use crate::communicator::Communicator;
use crate::nodekeeper::NodeKeeper;
use crate::packets::{
    NodePulseProof, PacketHeader, PacketType, Phase1Packet, PulseDataExt, SIGNATURE_SIZE,
};

/// Everything phase two needs from phase one: the pulse under agreement and
/// the set of peers that answered with a valid proof.
pub struct FirstPhaseState {
    pub pulse: Pulse,
    pub proofs: HashMap<RecordRef, NodePulseProof>,
}

pub struct FirstPhase {
    keeper: Arc<NodeKeeper>,
    communicator: Arc<dyn Communicator>,
    crypto: Arc<dyn CryptographyService>,
}

impl FirstPhase {
    pub fn new(
        keeper: Arc<NodeKeeper>,
        communicator: Arc<dyn Communicator>,
        crypto: Arc<dyn CryptographyService>,
    ) -> Self {
        FirstPhase {
            keeper,
            communicator,
            crypto,
        }
    }

    /// Exchange the pulse with the active list. The membership snapshot is
    /// advanced to `pulse` once the exchange returns; peer claims collected
    /// from the responses are queued afterwards, so they activate at the
    /// following boundary and every node maps the same list in phase two.
    pub async fn execute(&self, pulse: &Pulse) -> Result<FirstPhaseState, CoreError> {
        let origin = self.keeper.origin();
        let participants = self.keeper.active_nodes();

        let proof = self.make_proof(pulse)?;
        let mut packet = Phase1Packet {
            header: PacketHeader {
                packet_type: PacketType::Phase1,
                has_routing: false,
                f00: false,
                f01: false,
                pulse: pulse.pulse_number,
                origin_node_id: origin.id,
                target_node_id: RecordRef::default(),
            },
            pulse_data: Some(PulseDataExt {
                prev_pulse_number: pulse.prev_pulse_number,
                next_pulse_number: pulse.next_pulse_number,
                timestamp: pulse.timestamp,
                entropy: pulse.entropy,
            }),
            proof: proof.clone(),
            claims: self.keeper.pending_claims(),
            signature: [0u8; SIGNATURE_SIZE],
        };
        packet.sign(self.crypto.as_ref())?;

        let responses = self
            .communicator
            .exchange_phase1(&participants, packet)
            .await?;

        self.keeper.set_pulse(pulse.pulse_number);

        let mut proofs = HashMap::new();
        proofs.insert(origin.id, proof);
        for (id, response) in responses {
            let Some(peer) = self.keeper.active_node(&id) else {
                tracing::warn!(node = %id, "phase 1 response from unknown node, dropped");
                continue;
            };
            if response.header.pulse != pulse.pulse_number {
                tracing::warn!(node = %id, pulse = %response.header.pulse,
                    "phase 1 response for a different pulse, dropped");
                continue;
            }
            if !response.verify(self.crypto.as_ref(), &peer.public_key) {
                tracing::warn!(node = %id, "phase 1 packet signature invalid, dropped");
                continue;
            }
            if !self.verify_proof(pulse, &response.proof, &peer.public_key) {
                tracing::warn!(node = %id, "phase 1 pulse proof invalid, dropped");
                continue;
            }
            for claim in response.claims {
                self.keeper.queue_claim(claim);
            }
            proofs.insert(id, response.proof);
        }

        tracing::debug!(
            pulse = %pulse.pulse_number,
            proofs = proofs.len(),
            active = self.keeper.active_nodes().len(),
            "phase 1 complete"
        );

        Ok(FirstPhaseState {
            pulse: *pulse,
            proofs,
        })
    }

    fn make_proof(&self, pulse: &Pulse) -> Result<NodePulseProof, CoreError> {
        let state_hash = self.keeper.cloud_hash();
        let sig = self.crypto.sign(&proof_payload(pulse, &state_hash))?;
        Ok(NodePulseProof {
            node_state_hash: state_hash,
            node_signature: sig.try_into().map_err(|_| CoreError::InvalidSignature)?,
        })
    }

    fn verify_proof(&self, pulse: &Pulse, proof: &NodePulseProof, public_key: &[u8]) -> bool {
        self.crypto.verify(
            public_key,
            &proof.node_signature,
            &proof_payload(pulse, &proof.node_state_hash),
        )
    }
}

fn proof_payload(pulse: &Pulse, state_hash: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&pulse.pulse_number.to_bytes());
    data.extend_from_slice(state_hash);
    data
}
