//! Daemon-local pulse source.
//!
//! A real deployment receives pulses from a pulsar quorum; a standalone
//! node generates them itself on a fixed interval with fresh OS entropy.
//! Each tick commits the pulse under the bus's transition lock, then runs
//! the consensus round for it.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pulsenet_core::types::{Entropy, PulseNumber};
use pulsenet_core::{CoreError, Pulse, PulseManager};
use pulsenet_ledger::pulsemanager::LedgerPulseManager;
use pulsenet_messagebus::MessageBus;

use pulsenet_consensus::PhaseManager;

pub struct PulseTicker {
    bus: Arc<MessageBus>,
    pulses: Arc<LedgerPulseManager>,
    phases: Arc<PhaseManager>,
    interval: Duration,
}

impl PulseTicker {
    pub fn new(
        bus: Arc<MessageBus>,
        pulses: Arc<LedgerPulseManager>,
        phases: Arc<PhaseManager>,
        interval: Duration,
    ) -> Self {
        PulseTicker {
            bus,
            pulses,
            phases,
            interval,
        }
    }

    /// Generate the pulse following the ledger's latest one.
    fn next_pulse(&self) -> Result<Pulse, CoreError> {
        let current = self.pulses.current()?.pulse_number;
        let number = PulseNumber(current.0 + 1);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Pulse {
            pulse_number: number,
            entropy: Entropy::random(),
            timestamp,
            next_pulse_number: PulseNumber(number.0 + 1),
            prev_pulse_number: current,
        })
    }

    /// One tick: commit the pulse, then run the consensus round.
    pub async fn tick(&self) -> Result<(), CoreError> {
        let pulse = self.next_pulse()?;
        {
            // delivery drains before the transition and resumes after it
            let _transition = self.bus.acquire();
            self.pulses.set(pulse)?;
        }
        self.phases.on_pulse(&pulse).await;
        Ok(())
    }

    /// Tick until `shutdown` fires. Tick errors are logged; the ticker
    /// keeps going and retries at the next interval.
    pub async fn run(&self, shutdown: Arc<tokio::sync::Notify>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "pulse tick failed");
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("pulse ticker stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Components;
    use pulsenet_core::config::Config;

    #[tokio::test]
    async fn ticks_advance_the_pulse_chain() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..Config::default()
        };
        let c = Components::build(&config).unwrap();
        let ticker = PulseTicker::new(
            c.bus.clone(),
            c.pulses.clone(),
            c.phases.clone(),
            c.pulse_duration,
        );

        ticker.tick().await.unwrap();
        ticker.tick().await.unwrap();

        let current = c.pulses.current().unwrap();
        assert_eq!(current.pulse_number, PulseNumber(2));
        assert_eq!(current.prev_pulse_number, PulseNumber(1));
    }
}
