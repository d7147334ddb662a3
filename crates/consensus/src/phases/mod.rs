//! The per-pulse consensus round.
//!
//! Two phases run back to back, each under a fixed slice of the pulse
//! duration. A failed or timed-out phase ends the round for this pulse;
//! the node carries on degraded and rejoins agreement at the next pulse.
//! Phase 3 referendum structures exist in the packet model but are not
//! exchanged.

mod first;
mod second;

pub use first::{FirstPhase, FirstPhaseState};
pub use second::{SecondPhase, SecondPhaseState};

use std::sync::Arc;
use std::time::Duration;

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::pulse::Pulse;

use crate::communicator::Communicator;
use crate::nodekeeper::NodeKeeper;

/// Fraction of the pulse duration each phase may spend: 20%.
const PHASE_BUDGET_DIVISOR: u32 = 5;

pub struct PhaseManager {
    first: FirstPhase,
    second: SecondPhase,
    pulse_duration: Duration,
}

impl PhaseManager {
    pub fn new(
        keeper: Arc<NodeKeeper>,
        communicator: Arc<dyn Communicator>,
        crypto: Arc<dyn CryptographyService>,
        pulse_duration: Duration,
    ) -> Self {
        PhaseManager {
            first: FirstPhase::new(keeper.clone(), communicator.clone(), crypto.clone()),
            second: SecondPhase::new(keeper, communicator, crypto),
            pulse_duration,
        }
    }

    /// Run one consensus round for `pulse`. Phase state lives only for the
    /// round; the phase-2 verdict is logged, not acted upon.
    pub async fn on_pulse(&self, pulse: &Pulse) {
        let budget = self.pulse_duration / PHASE_BUDGET_DIVISOR;

        let first_state = match tokio::time::timeout(budget, self.first.execute(pulse)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                tracing::warn!(pulse = %pulse.pulse_number, error = %e, "phase 1 failed");
                return;
            }
            Err(_) => {
                tracing::warn!(pulse = %pulse.pulse_number, ?budget, "phase 1 timed out");
                return;
            }
        };

        match tokio::time::timeout(budget, self.second.execute(&first_state)).await {
            Ok(Ok(state)) => {
                tracing::info!(
                    pulse = %state.pulse,
                    legit = state.legit_count,
                    total = state.total_count,
                    quorum = state.quorum_reached,
                    "consensus round complete"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(pulse = %pulse.pulse_number, error = %e, "phase 2 failed");
            }
            Err(_) => {
                tracing::warn!(pulse = %pulse.pulse_number, ?budget, "phase 2 timed out");
            }
        }
    }
}
