//! Byte-prefixed keyspace layout.
//!
//! Key formats are consensus-critical. The prefix byte selects the
//! namespace; the remainder is a fixed-width RecordID encoding (or a 4-byte
//! big-endian pulse number for pulse-scoped entries). Do not modify without
//! a network-wide upgrade.

use pulsenet_core::types::{PulseNumber, RecordID};

/// Immutable records, key = scope + RecordID (36 bytes).
pub const SCOPE_RECORD: u8 = 0x01;
/// Opaque blobs (object memory), key = scope + RecordID.
pub const SCOPE_BLOB: u8 = 0x02;
/// Object lifeline indices, key = scope + RecordID of the object head.
pub const SCOPE_LIFELINE: u8 = 0x03;
/// Pulse metadata, key = scope + pulse number (4 bytes BE).
pub const SCOPE_PULSE: u8 = 0x04;
/// System/meta entries (latest pulse, genesis ref, node snapshots).
pub const SCOPE_SYSTEM: u8 = 0x05;
/// Closed jet drops, key = scope + pulse number.
pub const SCOPE_JET_DROP: u8 = 0x06;

pub const SYS_KEY_LATEST_PULSE: &[u8] = b"latest_pulse";
pub const SYS_KEY_GENESIS: &[u8] = b"genesis";
pub const SYS_KEY_ACTIVE_NODES: &[u8] = b"active_nodes";

pub fn prefix_key(scope: u8, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(scope);
    out.extend_from_slice(key);
    out
}

pub fn record_key(id: &RecordID) -> Vec<u8> {
    prefix_key(SCOPE_RECORD, &id.to_bytes())
}

pub fn blob_key(id: &RecordID) -> Vec<u8> {
    prefix_key(SCOPE_BLOB, &id.to_bytes())
}

pub fn lifeline_key(id: &RecordID) -> Vec<u8> {
    prefix_key(SCOPE_LIFELINE, &id.to_bytes())
}

pub fn pulse_key(pulse: PulseNumber) -> Vec<u8> {
    prefix_key(SCOPE_PULSE, &pulse.to_bytes())
}

pub fn jet_drop_key(pulse: PulseNumber) -> Vec<u8> {
    prefix_key(SCOPE_JET_DROP, &pulse.to_bytes())
}

pub fn system_key(name: &[u8]) -> Vec<u8> {
    prefix_key(SCOPE_SYSTEM, name)
}

/// System key for the active-node snapshot of one pulse.
pub fn active_nodes_key(pulse: PulseNumber) -> Vec<u8> {
    let mut name = SYS_KEY_ACTIVE_NODES.to_vec();
    name.extend_from_slice(&pulse.to_bytes());
    prefix_key(SCOPE_SYSTEM, &name)
}

/// Range prefix covering all records written in one pulse. Works because a
/// RecordID starts with the big-endian pulse number.
pub fn record_pulse_prefix(pulse: PulseNumber) -> Vec<u8> {
    prefix_key(SCOPE_RECORD, &pulse.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_do_not_collide() {
        let id = RecordID::random(PulseNumber(3));
        assert_ne!(record_key(&id), blob_key(&id));
        assert_ne!(record_key(&id), lifeline_key(&id));
    }

    #[test]
    fn pulse_prefix_covers_record_keys() {
        let id = RecordID::random(PulseNumber(7));
        let key = record_key(&id);
        let prefix = record_pulse_prefix(PulseNumber(7));
        assert!(key.starts_with(&prefix));

        let other = record_pulse_prefix(PulseNumber(8));
        assert!(!key.starts_with(&other));
    }
}
