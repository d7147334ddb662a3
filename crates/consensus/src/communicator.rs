//! Packet exchange with the rest of the active list.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use pulsenet_core::node::Node;
use pulsenet_core::types::RecordRef;
use pulsenet_core::CoreError;

use crate::packets::{Phase1Packet, Phase2Packet};

/// Byte-level request/response seam the communicator runs over. The node
/// glue provides the real socket implementation; tests provide loopbacks.
#[async_trait]
pub trait ConsensusTransport: Send + Sync {
    async fn request(&self, address: &str, data: Vec<u8>) -> Result<Vec<u8>, CoreError>;
}

/// Phase packet exchange: send ours to every participant, collect theirs.
/// Peers that fail or answer garbage are simply absent from the result —
/// the phases treat absence as a timed-out vote.
#[async_trait]
pub trait Communicator: Send + Sync {
    async fn exchange_phase1(
        &self,
        participants: &[Node],
        packet: Phase1Packet,
    ) -> Result<HashMap<RecordRef, Phase1Packet>, CoreError>;

    async fn exchange_phase2(
        &self,
        participants: &[Node],
        packet: Phase2Packet,
    ) -> Result<HashMap<RecordRef, Phase2Packet>, CoreError>;
}

/// Plain fan-out: one concurrent request per participant, no retries.
pub struct NaiveCommunicator {
    transport: Arc<dyn ConsensusTransport>,
    origin: RecordRef,
}

impl NaiveCommunicator {
    pub fn new(transport: Arc<dyn ConsensusTransport>, origin: RecordRef) -> Self {
        NaiveCommunicator { transport, origin }
    }

    /// Fan the serialized packet out and parse each peer's answer with
    /// `parse`. Failures are logged per peer and skipped.
    async fn exchange<P, F>(
        &self,
        participants: &[Node],
        make_bytes: impl Fn(RecordRef) -> Vec<u8>,
        parse: F,
    ) -> HashMap<RecordRef, P>
    where
        P: Send + 'static,
        F: Fn(&[u8]) -> Result<P, CoreError> + Send + Sync + 'static + Copy,
    {
        let mut tasks = tokio::task::JoinSet::new();
        for node in participants {
            if node.id == self.origin {
                continue;
            }
            let transport = self.transport.clone();
            let address = node.physical_address.clone();
            let id = node.id;
            let bytes = make_bytes(id);
            tasks.spawn(async move {
                let reply = transport.request(&address, bytes).await?;
                Ok::<(RecordRef, P), CoreError>((id, parse(&reply)?))
            });
        }

        let mut out = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((id, packet))) => {
                    out.insert(id, packet);
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "phase exchange peer failed"),
                Err(e) => tracing::warn!(error = %e, "phase exchange task failed"),
            }
        }
        out
    }
}

#[async_trait]
impl Communicator for NaiveCommunicator {
    async fn exchange_phase1(
        &self,
        participants: &[Node],
        packet: Phase1Packet,
    ) -> Result<HashMap<RecordRef, Phase1Packet>, CoreError> {
        let origin = self.origin;
        Ok(self
            .exchange(
                participants,
                |target| {
                    let mut p = packet.clone();
                    p.set_packet_header(origin, target);
                    p.serialize()
                },
                |bytes| Phase1Packet::deserialize(bytes).map_err(CoreError::from),
            )
            .await)
    }

    async fn exchange_phase2(
        &self,
        participants: &[Node],
        packet: Phase2Packet,
    ) -> Result<HashMap<RecordRef, Phase2Packet>, CoreError> {
        let origin = self.origin;
        Ok(self
            .exchange(
                participants,
                |target| {
                    let mut p = packet.clone();
                    p.header.origin_node_id = origin;
                    p.header.target_node_id = target;
                    p.header.has_routing = true;
                    p.serialize()
                },
                |bytes| Phase2Packet::deserialize(bytes).map_err(CoreError::from),
            )
            .await)
    }
}
