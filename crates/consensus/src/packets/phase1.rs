//! Phase-1 packet: pulse exchange, proof and queued claims.

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::types::RecordRef;
use pulsenet_core::CoreError;

use super::claims::{parse_claims, serialize_claims, ReferendumClaim};
use super::types::{NodePulseProof, PacketHeader, PulseDataExt, SIGNATURE_SIZE};
use super::{PacketError, Reader};

/// Header + optional pulse data + proof + optional claims + trailing
/// signature over everything before it.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase1Packet {
    pub header: PacketHeader,
    pub pulse_data: Option<PulseDataExt>,
    pub proof: NodePulseProof,
    pub claims: Vec<ReferendumClaim>,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl Phase1Packet {
    fn body_bytes(&self, canonical: bool) -> Vec<u8> {
        let mut header = self.header;
        header.f00 = self.pulse_data.is_some();
        header.f01 = !self.claims.is_empty();
        if canonical {
            header.has_routing = false;
            header.target_node_id = RecordRef::default();
        }

        let mut out = Vec::with_capacity(PacketHeader::SIZE + 256);
        header.serialize_into(&mut out);
        if let Some(ext) = &self.pulse_data {
            ext.serialize_into(&mut out);
        }
        self.proof.serialize_into(&mut out);
        let claims = serialize_claims(&self.claims);
        out.extend_from_slice(&(claims.len() as u16).to_be_bytes());
        out.extend_from_slice(&claims);
        out
    }

    /// Bytes covered by the signature. Section flags are canonicalized from
    /// the sections actually present, and the routing fields are zeroed:
    /// the communicator re-targets the same signed packet per peer.
    pub fn signed_bytes(&self) -> Vec<u8> {
        self.body_bytes(true)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.body_bytes(false);
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(buf);
        let header = PacketHeader::deserialize(&mut r)?;
        let pulse_data = if header.f00 {
            Some(PulseDataExt::deserialize(&mut r)?)
        } else {
            None
        };
        let proof = NodePulseProof::deserialize(&mut r)?;
        let claims_len = r.u16()? as usize;
        let claims = parse_claims(r.bytes(claims_len)?)?;
        let signature = r.array()?;
        if !r.is_empty() {
            return Err(PacketError::TrailingBytes(r.remaining()));
        }
        Ok(Phase1Packet {
            header,
            pulse_data,
            proof,
            claims,
            signature,
        })
    }

    pub fn sign(&mut self, crypto: &dyn CryptographyService) -> Result<(), CoreError> {
        let sig = crypto.sign(&self.signed_bytes())?;
        self.signature = sig
            .try_into()
            .map_err(|_| CoreError::InvalidSignature)?;
        Ok(())
    }

    pub fn verify(&self, crypto: &dyn CryptographyService, public_key: &[u8]) -> bool {
        crypto.verify(public_key, &self.signature, &self.signed_bytes())
    }

    /// Routing accessors used by the communicator.
    pub fn packet_header(&self) -> PacketHeader {
        self.header
    }

    pub fn set_packet_header(&mut self, origin: RecordRef, target: RecordRef) {
        self.header.origin_node_id = origin;
        self.header.target_node_id = target;
        self.header.has_routing = true;
    }
}
