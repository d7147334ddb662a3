//! Identifier types shared across the platform.
//!
//! RecordID layout is consensus-critical: 4-byte big-endian pulse number
//! followed by a 32-byte SHA3-256 content hash. Do not modify without a
//! network-wide upgrade.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use hex::{decode as hex_decode, encode as hex_encode};
use rand::RngCore;

use crate::error::CoreError;

/// Size of the entropy blob carried by every pulse.
pub const ENTROPY_SIZE: usize = 64;
/// Size of a record content hash (SHA3-256).
pub const RECORD_HASH_SIZE: usize = 32;
/// Binary size of a RecordID: pulse number + content hash.
pub const RECORD_ID_SIZE: usize = 4 + RECORD_HASH_SIZE;
/// Binary size of a RecordRef: domain ID + record ID.
pub const RECORD_REF_SIZE: usize = RECORD_ID_SIZE * 2;

/// Current time slot number. Monotonically increasing, 32-bit.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
pub struct PulseNumber(pub u32);

impl PulseNumber {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        PulseNumber(u32::from_be_bytes(b))
    }

    pub fn next(self) -> PulseNumber {
        PulseNumber(self.0 + 1)
    }
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 64 random bytes used in every pseudo-random calculation on the platform.
/// Entropy is only trustworthy after it has been agreed upon by consensus.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entropy(pub [u8; ENTROPY_SIZE]);

impl Entropy {
    pub fn from_bytes(b: [u8; ENTROPY_SIZE]) -> Self {
        Entropy(b)
    }

    pub fn as_bytes(&self) -> &[u8; ENTROPY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(self.0)
    }

    /// Fresh random entropy. Used by the pulse ticker and in tests; a real
    /// pulsar mixes entropy from multiple parties before it is trusted.
    pub fn random() -> Self {
        let mut b = [0u8; ENTROPY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut b);
        Entropy(b)
    }
}

impl Default for Entropy {
    fn default() -> Self {
        Entropy([0u8; ENTROPY_SIZE])
    }
}

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entropy").field(&self.to_hex()).finish()
    }
}

impl FromStr for Entropy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = hex_decode(s).map_err(|e| CoreError::Parse(e.to_string()))?;
        if v.len() != ENTROPY_SIZE {
            return Err(CoreError::Parse(format!(
                "invalid entropy length: {}",
                v.len()
            )));
        }
        let mut arr = [0u8; ENTROPY_SIZE];
        arr.copy_from_slice(&v);
        Ok(Entropy(arr))
    }
}

/* serde impls for Entropy as hex string (serde has no array impls past 32) */
impl Serialize for Entropy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Entropy {
    fn deserialize<D>(deserializer: D) -> Result<Entropy, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Entropy::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Content-addressed record identifier: the pulse the record was created in
/// plus the SHA3-256 hash of its canonical serialization. Identical content
/// written in the same pulse always yields the identical ID.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RecordID {
    pub pulse: PulseNumber,
    pub hash: [u8; RECORD_HASH_SIZE],
}

impl RecordID {
    pub fn new(pulse: PulseNumber, hash: [u8; RECORD_HASH_SIZE]) -> Self {
        RecordID { pulse, hash }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_ID_SIZE] {
        let mut out = [0u8; RECORD_ID_SIZE];
        out[..4].copy_from_slice(&self.pulse.to_bytes());
        out[4..].copy_from_slice(&self.hash);
        out
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        if b.len() != RECORD_ID_SIZE {
            return Err(CoreError::Parse(format!(
                "invalid record id length: {}",
                b.len()
            )));
        }
        let mut pulse = [0u8; 4];
        pulse.copy_from_slice(&b[..4]);
        let mut hash = [0u8; RECORD_HASH_SIZE];
        hash.copy_from_slice(&b[4..]);
        Ok(RecordID {
            pulse: PulseNumber::from_bytes(pulse),
            hash,
        })
    }

    pub fn to_hex(&self) -> String {
        hex_encode(self.to_bytes())
    }

    /// Random ID for tests and placeholder domains.
    pub fn random(pulse: PulseNumber) -> Self {
        let mut hash = [0u8; RECORD_HASH_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut hash);
        RecordID { pulse, hash }
    }
}

impl fmt::Debug for RecordID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordID({}:{})", self.pulse, hex_encode(self.hash))
    }
}

impl fmt::Display for RecordID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Reference to a record inside a domain. Used as object heads and node
/// identities.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RecordRef {
    pub domain: RecordID,
    pub record: RecordID,
}

impl RecordRef {
    pub fn new(domain: RecordID, record: RecordID) -> Self {
        RecordRef { domain, record }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_REF_SIZE] {
        let mut out = [0u8; RECORD_REF_SIZE];
        out[..RECORD_ID_SIZE].copy_from_slice(&self.domain.to_bytes());
        out[RECORD_ID_SIZE..].copy_from_slice(&self.record.to_bytes());
        out
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, CoreError> {
        if b.len() != RECORD_REF_SIZE {
            return Err(CoreError::Parse(format!(
                "invalid record ref length: {}",
                b.len()
            )));
        }
        Ok(RecordRef {
            domain: RecordID::from_bytes(&b[..RECORD_ID_SIZE])?,
            record: RecordID::from_bytes(&b[RECORD_ID_SIZE..])?,
        })
    }

    pub fn to_hex(&self) -> String {
        hex_encode(self.to_bytes())
    }

    /// Random reference for tests.
    pub fn random() -> Self {
        RecordRef {
            domain: RecordID::random(PulseNumber(0)),
            record: RecordID::random(PulseNumber(0)),
        }
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordRef({})", self.to_hex())
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
