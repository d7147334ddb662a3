//! Pulse: a time-sliced epoch anchored by a number and shared entropy.

use serde::{Deserialize, Serialize};

use crate::types::{Entropy, PulseNumber};

/// Base data structure for a pulse. Produced by the pulsar, agreed upon in
/// phase one of consensus, then used to anchor routing and storage for the
/// whole slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pulse {
    pub pulse_number: PulseNumber,
    pub entropy: Entropy,
    /// Unix timestamp (seconds) when the pulsar emitted this pulse.
    pub timestamp: i64,
    pub next_pulse_number: PulseNumber,
    pub prev_pulse_number: PulseNumber,
}

impl Pulse {
    /// Genesis pulse written when a fresh ledger is bootstrapped. Entropy is
    /// all zero: nothing before the first real pulse may depend on it.
    pub fn genesis() -> Self {
        Pulse {
            pulse_number: PulseNumber(0),
            entropy: Entropy::default(),
            timestamp: 0,
            next_pulse_number: PulseNumber(1),
            prev_pulse_number: PulseNumber(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_pulse_is_zero() {
        let p = Pulse::genesis();
        assert_eq!(p.pulse_number, PulseNumber(0));
        assert_eq!(p.entropy, Entropy::default());
    }

    #[test]
    fn pulse_serde_roundtrip() {
        let p = Pulse {
            pulse_number: PulseNumber(7),
            entropy: Entropy::random(),
            timestamp: 1_700_000_000,
            next_pulse_number: PulseNumber(8),
            prev_pulse_number: PulseNumber(6),
        };
        let bytes = bincode::serialize(&p).unwrap();
        let restored: Pulse = bincode::deserialize(&bytes).unwrap();
        assert_eq!(p, restored);
    }
}
