//! Referendum claims and their strict wire framing.
//!
//! Each claim starts with a 16-bit header packing `type << CLAIM_TYPE_SHIFT
//! | length`, where length covers the whole claim including the header.
//! Parsing dispatches on the extracted type tag and must consume the buffer
//! exactly: trailing bytes are a framing error, never silently dropped.

use pulsenet_core::types::{PulseNumber, RecordRef};

use super::types::ClaimType;
use super::{PacketError, Reader};

pub const CLAIM_TYPE_SHIFT: u16 = 10;
pub const CLAIM_LENGTH_MASK: u16 = (1 << CLAIM_TYPE_SHIFT) - 1;
/// 3-bit protocol budget for the type tag.
pub const MAX_CLAIM_TYPE: u8 = 7;

const HEADER_SIZE: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferendumClaim {
    /// A node announcing itself for membership.
    NodeJoin {
        node_id: RecordRef,
        role_mask: u8,
        protocol_version: u16,
        ip: [u8; 4],
        port: u16,
        public_key: [u8; 32],
    },
    CapabilityPoolingAndActivation {
        polling_flags: u16,
        capability_type: u16,
        capability_ref: [u8; 64],
    },
    NodeViolationBlame {
        blame_node_id: RecordRef,
        claim_type: u8,
    },
    NodeBroadcast { emergency_level: u8 },
    /// A node announcing departure effective at `eta`.
    NodeLeave {
        node_id: RecordRef,
        eta: PulseNumber,
    },
}

impl ReferendumClaim {
    pub fn claim_type(&self) -> ClaimType {
        match self {
            ReferendumClaim::NodeJoin { .. } => ClaimType::NodeJoin,
            ReferendumClaim::CapabilityPoolingAndActivation { .. } => {
                ClaimType::CapabilityPoolingAndActivation
            }
            ReferendumClaim::NodeViolationBlame { .. } => ClaimType::NodeViolationBlame,
            ReferendumClaim::NodeBroadcast { .. } => ClaimType::NodeBroadcast,
            ReferendumClaim::NodeLeave { .. } => ClaimType::NodeLeave,
        }
    }

    /// Payload size (claim minus its header). Fixed per variant.
    fn payload_size(&self) -> usize {
        match self {
            ReferendumClaim::NodeJoin { .. } => 72 + 1 + 2 + 4 + 2 + 32,
            ReferendumClaim::CapabilityPoolingAndActivation { .. } => 2 + 2 + 64,
            ReferendumClaim::NodeViolationBlame { .. } => 72 + 1,
            ReferendumClaim::NodeBroadcast { .. } => 1,
            ReferendumClaim::NodeLeave { .. } => 72 + 4,
        }
    }

    /// Append the claim to `out`.
    ///
    /// Panics if the claim cannot be framed (type above the 3-bit budget or
    /// payload above the 10-bit length field) — both are programmer errors:
    /// every variant constructed through this enum fits.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        let t = self.claim_type() as u8;
        assert!(t <= MAX_CLAIM_TYPE, "claim type {t} exceeds 3-bit budget");
        let length = HEADER_SIZE + self.payload_size();
        assert!(
            length <= CLAIM_LENGTH_MASK as usize,
            "claim length {length} exceeds 10-bit budget"
        );
        let header = ((t as u16) << CLAIM_TYPE_SHIFT) | length as u16;
        out.extend_from_slice(&header.to_be_bytes());

        match self {
            ReferendumClaim::NodeJoin {
                node_id,
                role_mask,
                protocol_version,
                ip,
                port,
                public_key,
            } => {
                out.extend_from_slice(&node_id.to_bytes());
                out.push(*role_mask);
                out.extend_from_slice(&protocol_version.to_be_bytes());
                out.extend_from_slice(ip);
                out.extend_from_slice(&port.to_be_bytes());
                out.extend_from_slice(public_key);
            }
            ReferendumClaim::CapabilityPoolingAndActivation {
                polling_flags,
                capability_type,
                capability_ref,
            } => {
                out.extend_from_slice(&polling_flags.to_be_bytes());
                out.extend_from_slice(&capability_type.to_be_bytes());
                out.extend_from_slice(capability_ref);
            }
            ReferendumClaim::NodeViolationBlame {
                blame_node_id,
                claim_type,
            } => {
                out.extend_from_slice(&blame_node_id.to_bytes());
                out.push(*claim_type);
            }
            ReferendumClaim::NodeBroadcast { emergency_level } => {
                out.push(*emergency_level);
            }
            ReferendumClaim::NodeLeave { node_id, eta } => {
                out.extend_from_slice(&node_id.to_bytes());
                out.extend_from_slice(&eta.to_bytes());
            }
        }
    }

    fn deserialize_payload(t: ClaimType, r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let read_ref = |r: &mut Reader<'_>, what| {
            RecordRef::from_bytes(r.bytes(72)?).map_err(|_| PacketError::Malformed(what))
        };
        match t {
            ClaimType::NodeJoin => Ok(ReferendumClaim::NodeJoin {
                node_id: read_ref(r, "join node id")?,
                role_mask: r.u8()?,
                protocol_version: r.u16()?,
                ip: r.array()?,
                port: r.u16()?,
                public_key: r.array()?,
            }),
            ClaimType::CapabilityPoolingAndActivation => {
                Ok(ReferendumClaim::CapabilityPoolingAndActivation {
                    polling_flags: r.u16()?,
                    capability_type: r.u16()?,
                    capability_ref: r.array()?,
                })
            }
            ClaimType::NodeViolationBlame => Ok(ReferendumClaim::NodeViolationBlame {
                blame_node_id: read_ref(r, "blame node id")?,
                claim_type: r.u8()?,
            }),
            ClaimType::NodeBroadcast => Ok(ReferendumClaim::NodeBroadcast {
                emergency_level: r.u8()?,
            }),
            ClaimType::NodeLeave => Ok(ReferendumClaim::NodeLeave {
                node_id: read_ref(r, "leave node id")?,
                eta: PulseNumber::from_bytes(r.array()?),
            }),
        }
    }
}

/// Serialize a claim list into one contiguous section.
pub fn serialize_claims(claims: &[ReferendumClaim]) -> Vec<u8> {
    let mut out = Vec::new();
    for claim in claims {
        claim.serialize_into(&mut out);
    }
    out
}

/// Parse a claims section. The buffer must contain whole claims and nothing
/// else; a short tail or a length pointing past the buffer is an error.
pub fn parse_claims(buf: &[u8]) -> Result<Vec<ReferendumClaim>, PacketError> {
    let mut r = Reader::new(buf);
    let mut claims = Vec::new();
    while !r.is_empty() {
        if r.remaining() < HEADER_SIZE {
            return Err(PacketError::TrailingBytes(r.remaining()));
        }
        let header = r.u16()?;
        let t = ClaimType::from_u8((header >> CLAIM_TYPE_SHIFT) as u8)?;
        let length = (header & CLAIM_LENGTH_MASK) as usize;
        if length < HEADER_SIZE || length - HEADER_SIZE > r.remaining() {
            return Err(PacketError::UnexpectedEof(r.position()));
        }

        let before = r.position();
        let claim = ReferendumClaim::deserialize_payload(t, &mut r)?;
        let consumed = r.position() - before;
        if consumed != length - HEADER_SIZE {
            return Err(PacketError::ClaimLengthMismatch {
                want: consumed + HEADER_SIZE,
                got: length,
            });
        }
        claims.push(claim);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Vec<ReferendumClaim> {
        vec![
            ReferendumClaim::NodeJoin {
                node_id: RecordRef::random(),
                role_mask: 0x03,
                protocol_version: 1,
                ip: [127, 0, 0, 1],
                port: 8080,
                public_key: [7u8; 32],
            },
            ReferendumClaim::CapabilityPoolingAndActivation {
                polling_flags: 0xBEEF,
                capability_type: 2,
                capability_ref: [9u8; 64],
            },
            ReferendumClaim::NodeViolationBlame {
                blame_node_id: RecordRef::random(),
                claim_type: 4,
            },
            ReferendumClaim::NodeBroadcast { emergency_level: 1 },
            ReferendumClaim::NodeLeave {
                node_id: RecordRef::random(),
                eta: PulseNumber(900),
            },
        ]
    }

    #[test]
    fn all_variants_roundtrip() {
        let claims = sample_claims();
        let buf = serialize_claims(&claims);
        let parsed = parse_claims(&buf).unwrap();
        assert_eq!(claims, parsed);
    }

    #[test]
    fn header_packs_type_and_length() {
        let claim = ReferendumClaim::NodeBroadcast { emergency_level: 9 };
        let mut buf = Vec::new();
        claim.serialize_into(&mut buf);
        let header = u16::from_be_bytes([buf[0], buf[1]]);
        assert_eq!(header >> CLAIM_TYPE_SHIFT, ClaimType::NodeBroadcast as u16);
        assert_eq!((header & CLAIM_LENGTH_MASK) as usize, buf.len());
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut buf = serialize_claims(&sample_claims()[..1]);
        buf.push(0xAA);
        assert!(matches!(
            parse_claims(&buf),
            Err(PacketError::TrailingBytes(1))
        ));
    }

    #[test]
    fn truncated_claim_is_an_error() {
        let buf = serialize_claims(&sample_claims()[..1]);
        assert!(parse_claims(&buf[..buf.len() - 3]).is_err());
    }

    #[test]
    fn unknown_type_tag_is_an_error() {
        // type tag 6 is inside the 3-bit budget but unassigned
        let header = (6u16 << CLAIM_TYPE_SHIFT) | 3;
        let buf = [header.to_be_bytes().as_slice(), &[0u8]].concat();
        assert!(matches!(
            parse_claims(&buf),
            Err(PacketError::UnknownClaimType(6))
        ));
    }

    #[test]
    fn assigned_types_fit_the_budget() {
        for claim in sample_claims() {
            assert!(claim.claim_type() as u8 <= MAX_CLAIM_TYPE);
        }
    }

    #[test]
    fn empty_section_parses_to_no_claims() {
        assert!(parse_claims(&[]).unwrap().is_empty());
    }
}
