//! Consensus wire protocol.
//!
//! Fixed binary layout, big-endian integers. Field order, widths and
//! signature placement are interop-critical: peers parse these bytes
//! positionally, so any change here is a protocol version change.

pub mod bitset;
pub mod claims;
pub mod phase1;
pub mod phase2;
pub mod types;

pub use bitset::{BitSetCell, BitSetMapper, TriState, TriStateBitSet};
pub use claims::{parse_claims, serialize_claims, ReferendumClaim};
pub use phase1::Phase1Packet;
pub use phase2::Phase2Packet;
pub use types::{
    ClaimType, NodePulseProof, PacketHeader, PacketType, PulseDataExt, SIGNATURE_SIZE,
    STATE_HASH_SIZE,
};

use thiserror::Error;

use pulsenet_core::CoreError;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("unexpected end of packet at offset {0}")]
    UnexpectedEof(usize),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unknown claim type {0}")]
    UnknownClaimType(u8),

    #[error("claim length {got} does not match type (want {want})")]
    ClaimLengthMismatch { want: usize, got: usize },

    #[error("{0} trailing bytes after last claim")]
    TrailingBytes(usize),

    #[error("malformed field: {0}")]
    Malformed(&'static str),
}

impl From<PacketError> for CoreError {
    fn from(e: PacketError) -> Self {
        CoreError::Parse(e.to_string())
    }
}

/// Positional reader over packet bytes. Every accessor checks bounds and
/// reports the offset of the failure.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        if self.remaining() < n {
            return Err(PacketError::UnexpectedEof(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, PacketError> {
        Ok(i64::from_be_bytes(self.array()?))
    }
}
