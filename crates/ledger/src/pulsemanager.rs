//! Pulse commitment: closing the old slot and opening the new one.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use pulsenet_core::message::{Message, MessageSender};
use pulsenet_core::node::{NodeNetwork, NodeRole};
use pulsenet_core::pulse::Pulse;
use pulsenet_core::{CoreError, LogicRunner, PulseManager};

use crate::db::Db;

/// Ledger-backed [`PulseManager`]. `set` is serialized by an internal mutex:
/// only one pulse transition runs at a time on a node.
pub struct LedgerPulseManager {
    db: Db,
    /// Attached after construction: the bus itself needs a pulse manager,
    /// so the two are wired in two steps.
    bus: RwLock<Option<Arc<dyn MessageSender>>>,
    nodes: Arc<dyn NodeNetwork>,
    logic: Arc<dyn LogicRunner>,
    transition: Mutex<()>,
}

impl LedgerPulseManager {
    pub fn new(db: Db, nodes: Arc<dyn NodeNetwork>, logic: Arc<dyn LogicRunner>) -> Self {
        LedgerPulseManager {
            db,
            bus: RwLock::new(None),
            nodes,
            logic,
            transition: Mutex::new(()),
        }
    }

    pub fn attach_bus(&self, bus: Arc<dyn MessageSender>) {
        *self.bus.write() = Some(bus);
    }

    /// Close the slot that just ended: build its jet drop and hand it plus
    /// the raw records to the heavy replicas. The handoff runs on its own
    /// thread so a transition holding the bus's pulse lock never waits on
    /// bus delivery; failures are logged, the transition never stalls.
    fn close_slot(&self, closing: &Pulse) -> Result<(), CoreError> {
        let (drop, records) = self
            .db
            .create_drop(closing.pulse_number, closing.prev_pulse_number)?;
        self.db.set_drop(&drop)?;

        let Some(bus) = self.bus.read().clone() else {
            tracing::warn!(pulse = %closing.pulse_number, "no bus attached, slot handoff skipped");
            return Ok(());
        };

        let drop_bytes =
            bincode::serialize(&drop).map_err(|e| CoreError::Serialization(e.to_string()))?;
        let pulse_number = closing.pulse_number;
        std::thread::spawn(move || {
            if let Err(e) = bus.send(
                Message::JetDrop {
                    drop: drop_bytes,
                    pulse_number,
                },
                None,
            ) {
                tracing::warn!(pulse = %pulse_number, error = %e, "jet drop delivery failed");
            }
            if !records.is_empty() {
                if let Err(e) = bus.send(
                    Message::HeavyPayload {
                        records,
                        pulse_number,
                    },
                    None,
                ) {
                    tracing::warn!(pulse = %pulse_number, error = %e, "heavy replication failed");
                }
            }
        });
        Ok(())
    }
}

impl PulseManager for LedgerPulseManager {
    fn current(&self) -> Result<Pulse, CoreError> {
        let latest = self.db.latest_pulse_number()?;
        Ok(self.db.get_pulse(latest)?)
    }

    fn set(&self, pulse: Pulse) -> Result<(), CoreError> {
        let _guard = self.transition.lock();

        let closing = self.current()?;
        if pulse.pulse_number <= closing.pulse_number {
            return Err(CoreError::Other(format!(
                "pulse {} is not ahead of {}",
                pulse.pulse_number, closing.pulse_number
            )));
        }

        // Light material owners hand the closed slot off to heavy storage.
        if self.nodes.origin().has_role(NodeRole::LightMaterial) {
            self.close_slot(&closing)?;
        }

        self.db.add_pulse(&pulse)?;
        self.db
            .set_active_nodes(pulse.pulse_number, &self.nodes.active_nodes())?;
        tracing::info!(pulse = %pulse.pulse_number, "pulse committed");

        self.logic.on_pulse(&pulse)
    }
}
