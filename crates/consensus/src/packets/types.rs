//! Shared packet structures: header, pulse extension, proof, and the
//! phase-3 vote structures (data model only, not exchanged).

use pulsenet_core::types::{Entropy, PulseNumber, RecordRef};

use super::{PacketError, Reader};

pub const SIGNATURE_SIZE: usize = 64;
pub const STATE_HASH_SIZE: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Phase1 = 1,
    Phase2 = 2,
}

impl PacketType {
    pub fn from_u8(b: u8) -> Result<Self, PacketError> {
        match b {
            1 => Ok(PacketType::Phase1),
            2 => Ok(PacketType::Phase2),
            other => Err(PacketError::UnknownPacketType(other)),
        }
    }
}

/// Claim discriminant, shifted into the top of the 16-bit claim header.
/// The protocol budget for the type field is 3 bits: at most 8 distinct
/// claim type values are representable. Extending past that is a
/// wire-format-breaking change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ClaimType {
    NodeJoin = 1,
    CapabilityPoolingAndActivation = 2,
    NodeViolationBlame = 3,
    NodeBroadcast = 4,
    NodeLeave = 5,
}

impl ClaimType {
    pub fn from_u8(b: u8) -> Result<Self, PacketError> {
        match b {
            1 => Ok(ClaimType::NodeJoin),
            2 => Ok(ClaimType::CapabilityPoolingAndActivation),
            3 => Ok(ClaimType::NodeViolationBlame),
            4 => Ok(ClaimType::NodeBroadcast),
            5 => Ok(ClaimType::NodeLeave),
            other => Err(PacketError::UnknownClaimType(other)),
        }
    }
}

/// Routing header carried by every phase packet.
///
/// Wire layout (150 bytes):
/// `type:1  flags:1  pulse:4be  origin:72  target:72`
/// flag bits: 0 = has_routing, 1 = f00 (pulse data present),
/// 2 = f01 (claims present).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub has_routing: bool,
    pub f00: bool,
    pub f01: bool,
    pub pulse: PulseNumber,
    pub origin_node_id: RecordRef,
    pub target_node_id: RecordRef,
}

impl PacketHeader {
    pub const SIZE: usize = 1 + 1 + 4 + 72 + 72;

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.push(self.packet_type as u8);
        let mut flags = 0u8;
        if self.has_routing {
            flags |= 0x01;
        }
        if self.f00 {
            flags |= 0x02;
        }
        if self.f01 {
            flags |= 0x04;
        }
        out.push(flags);
        out.extend_from_slice(&self.pulse.to_bytes());
        out.extend_from_slice(&self.origin_node_id.to_bytes());
        out.extend_from_slice(&self.target_node_id.to_bytes());
    }

    pub fn deserialize(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let packet_type = PacketType::from_u8(r.u8()?)?;
        let flags = r.u8()?;
        let pulse = PulseNumber::from_bytes(r.array()?);
        let origin_node_id = RecordRef::from_bytes(r.bytes(72)?)
            .map_err(|_| PacketError::Malformed("origin node id"))?;
        let target_node_id = RecordRef::from_bytes(r.bytes(72)?)
            .map_err(|_| PacketError::Malformed("target node id"))?;
        Ok(PacketHeader {
            packet_type,
            has_routing: flags & 0x01 != 0,
            f00: flags & 0x02 != 0,
            f01: flags & 0x04 != 0,
            pulse,
            origin_node_id,
            target_node_id,
        })
    }
}

/// Full pulse data attached when the origin saw the pulsar directly.
///
/// Wire layout (80 bytes): `prev:4be next:4be timestamp:8be entropy:64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseDataExt {
    pub prev_pulse_number: PulseNumber,
    pub next_pulse_number: PulseNumber,
    pub timestamp: i64,
    pub entropy: Entropy,
}

impl PulseDataExt {
    pub const SIZE: usize = 4 + 4 + 8 + 64;

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.prev_pulse_number.to_bytes());
        out.extend_from_slice(&self.next_pulse_number.to_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(self.entropy.as_bytes());
    }

    pub fn deserialize(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(PulseDataExt {
            prev_pulse_number: PulseNumber::from_bytes(r.array()?),
            next_pulse_number: PulseNumber::from_bytes(r.array()?),
            timestamp: r.i64()?,
            entropy: Entropy::from_bytes(r.array()?),
        })
    }
}

/// Per-node proof that the node saw the pulse: hash of its state at the
/// pulse boundary plus its signature over that hash.
///
/// Wire layout (96 bytes): `state_hash:32 signature:64`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePulseProof {
    pub node_state_hash: [u8; STATE_HASH_SIZE],
    pub node_signature: [u8; SIGNATURE_SIZE],
}

impl NodePulseProof {
    pub const SIZE: usize = STATE_HASH_SIZE + SIGNATURE_SIZE;

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.node_state_hash);
        out.extend_from_slice(&self.node_signature);
    }

    pub fn deserialize(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(NodePulseProof {
            node_state_hash: r.array()?,
            node_signature: r.array()?,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════
// Phase-3 referendum structures. Present in the data model for wire
// compatibility; the active pipeline stops after phase two and never
// exchanges these.
// ════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferendumVote {
    pub vote_type: u8,
    pub length: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeListVote {
    pub node_list_count: u16,
    pub node_list_hash: [u8; STATE_HASH_SIZE],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviantBitSet {
    pub points: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            packet_type: PacketType::Phase1,
            has_routing: true,
            f00: true,
            f01: false,
            pulse: PulseNumber(77),
            origin_node_id: RecordRef::random(),
            target_node_id: RecordRef::random(),
        };
        let mut buf = Vec::new();
        header.serialize_into(&mut buf);
        assert_eq!(buf.len(), PacketHeader::SIZE);

        let mut r = Reader::new(&buf);
        let restored = PacketHeader::deserialize(&mut r).unwrap();
        assert_eq!(header, restored);
        assert!(r.is_empty());
    }

    #[test]
    fn pulse_ext_roundtrip() {
        let ext = PulseDataExt {
            prev_pulse_number: PulseNumber(9),
            next_pulse_number: PulseNumber(11),
            timestamp: 1_700_000_123,
            entropy: Entropy::random(),
        };
        let mut buf = Vec::new();
        ext.serialize_into(&mut buf);
        assert_eq!(buf.len(), PulseDataExt::SIZE);
        let restored = PulseDataExt::deserialize(&mut Reader::new(&buf)).unwrap();
        assert_eq!(ext, restored);
    }

    #[test]
    fn unknown_packet_type_rejected() {
        assert!(matches!(
            PacketType::from_u8(9),
            Err(PacketError::UnknownPacketType(9))
        ));
    }
}
