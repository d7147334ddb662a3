//! Phase-2 packet: the sender's tri-state verdict over the active list.

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::CoreError;

use super::bitset::TriStateBitSet;
use super::types::{PacketHeader, SIGNATURE_SIZE};
use pulsenet_core::types::RecordRef;
use super::{PacketError, Reader};

/// Header + bitset payload + trailing signature.
///
/// Bitset wire form: `cell_count:2be packed:ceil(cell_count/4)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase2Packet {
    pub header: PacketHeader,
    pub bitset: TriStateBitSet,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl Phase2Packet {
    fn body_bytes(&self, canonical: bool) -> Vec<u8> {
        let mut header = self.header;
        if canonical {
            header.has_routing = false;
            header.target_node_id = RecordRef::default();
        }

        let mut out = Vec::with_capacity(PacketHeader::SIZE + 64);
        header.serialize_into(&mut out);
        out.extend_from_slice(&(self.bitset.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.bitset.serialize());
        out
    }

    /// Bytes covered by the signature. Routing fields are zeroed: the
    /// communicator re-targets the same signed packet per peer.
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
        let cell_count = r.u16()? as usize;
        let packed = r.bytes(cell_count.div_ceil(4))?;
        let bitset = TriStateBitSet::deserialize(packed, cell_count)
            .map_err(|_| PacketError::Malformed("bit set payload"))?;
        let signature = r.array()?;
        if !r.is_empty() {
            return Err(PacketError::TrailingBytes(r.remaining()));
        }
        Ok(Phase2Packet {
            header,
            bitset,
            signature,
        })
    }

    pub fn sign(&mut self, crypto: &dyn CryptographyService) -> Result<(), CoreError> {
        let sig = crypto.sign(&self.signed_bytes())?;
        self.signature = sig.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(())
    }

    pub fn verify(&self, crypto: &dyn CryptographyService, public_key: &[u8]) -> bool {
        crypto.verify(public_key, &self.signature, &self.signed_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::super::bitset::{BitSetCell, BitSetMapper, TriState};
    use super::super::types::PacketType;
    use super::*;
    use pulsenet_core::crypto::NodeCryptography;
    use pulsenet_core::types::{PulseNumber, RecordRef};

    struct ListMapper {
        refs: Vec<RecordRef>,
    }

    impl BitSetMapper for ListMapper {
        fn ref_to_index(&self, id: &RecordRef) -> Result<usize, CoreError> {
            self.refs
                .iter()
                .position(|r| r == id)
                .ok_or(CoreError::NodeMissing)
        }

        fn index_to_ref(&self, index: usize) -> Result<RecordRef, CoreError> {
            self.refs.get(index).copied().ok_or(CoreError::OutOfRange)
        }

        fn length(&self) -> usize {
            self.refs.len()
        }
    }

    fn sample() -> Phase2Packet {
        let mapper = ListMapper {
            refs: (0..5).map(|_| RecordRef::random()).collect(),
        };
        let cells = vec![
            BitSetCell {
                node_id: mapper.refs[1],
                state: TriState::TimedOut,
            },
            BitSetCell {
                node_id: mapper.refs[4],
                state: TriState::Fraud,
            },
        ];
        Phase2Packet {
            header: PacketHeader {
                packet_type: PacketType::Phase2,
                has_routing: false,
                f00: false,
                f01: false,
                pulse: PulseNumber(42),
                origin_node_id: RecordRef::random(),
                target_node_id: RecordRef::random(),
            },
            bitset: TriStateBitSet::new(&cells, &mapper).unwrap(),
            signature: [0u8; SIGNATURE_SIZE],
        }
    }

    #[test]
    fn roundtrip() {
        let packet = sample();
        let restored = Phase2Packet::deserialize(&packet.serialize()).unwrap();
        assert_eq!(packet, restored);
    }

    #[test]
    fn sign_verify_and_tamper() {
        let crypto = NodeCryptography::generate();
        let mut packet = sample();
        packet.sign(&crypto).unwrap();
        assert!(packet.verify(&crypto, &crypto.public_key()));

        let mut tampered = packet.clone();
        tampered.bitset.set_state(0, TriState::Fraud).unwrap();
        assert!(!tampered.verify(&crypto, &crypto.public_key()));
    }
}
