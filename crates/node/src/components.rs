//! Component construction and wiring, in dependency order.
//!
//! The bus and the pulse manager reference each other, so the pulse manager
//! is built first and the bus is attached to it afterwards. Everything else
//! wires top-down: storage, membership, routing, consensus, ticker.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use pulsenet_core::config::Config;
use pulsenet_core::crypto::{CryptographyService, NodeCryptography};
use pulsenet_core::node::{Node, NodeNetwork, NodeRole, NodeState};
use pulsenet_core::types::{PulseNumber, RecordRef};
use pulsenet_core::{CoreError, LogicRunner, MessageType, Parcel, Pulse, Reply};

use pulsenet_consensus::{ConsensusTransport, NaiveCommunicator, NodeKeeper, PhaseManager};
use pulsenet_ledger::handlers::handler_table;
use pulsenet_ledger::jetcoordinator::LedgerJetCoordinator;
use pulsenet_ledger::pulsemanager::LedgerPulseManager;
use pulsenet_ledger::Db;
use pulsenet_messagebus::{BusConfig, LoopbackTransport, MessageBus, Transport};

/// Placeholder contract runner. Pulse advancement is acknowledged; actual
/// call execution is refused until a real runner is wired.
struct NoopLogicRunner;

impl LogicRunner for NoopLogicRunner {
    fn on_pulse(&self, pulse: &Pulse) -> Result<(), CoreError> {
        tracing::debug!(pulse = %pulse.pulse_number, "logic runner advanced");
        Ok(())
    }

    fn execute(&self, _parcel: &Parcel) -> Result<Reply, CoreError> {
        Err(CoreError::Other("no logic runner is available".into()))
    }
}

/// Bridges the consensus communicator onto the bus transport seam.
struct RpcConsensusTransport {
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl ConsensusTransport for RpcConsensusTransport {
    async fn request(&self, address: &str, data: Vec<u8>) -> Result<Vec<u8>, CoreError> {
        self.transport.send(address, &data)
    }
}

pub struct Components {
    pub origin: Node,
    pub db: Db,
    pub keeper: Arc<NodeKeeper>,
    pub bus: Arc<MessageBus>,
    pub pulses: Arc<LedgerPulseManager>,
    pub phases: Arc<PhaseManager>,
    pub pulse_duration: Duration,
}

impl Components {
    pub fn build(config: &Config) -> Result<Components, CoreError> {
        let host = config.host();
        let bind_addr = host
            .bind_addr
            .unwrap_or_else(|| "127.0.0.1:7900".to_string());
        let sign_messages = host.sign_messages.unwrap_or(true);
        let pulse_duration = Duration::from_millis(host.pulse_duration_ms.unwrap_or(10_000));
        let replication_factor = config.replication_factor.unwrap_or(2);
        let data_dir = config
            .data_dir
            .clone()
            .unwrap_or_else(|| "./data".to_string());

        let crypto: Arc<dyn CryptographyService> = Arc::new(NodeCryptography::generate());
        let origin = Node {
            id: node_id(config)?,
            state: NodeState::Active,
            pulse: PulseNumber(0),
            // single-process deployments carry every role themselves
            roles: vec![
                NodeRole::Virtual,
                NodeRole::LightMaterial,
                NodeRole::HeavyMaterial,
            ],
            public_key: crypto.public_key(),
            physical_address: bind_addr.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        tracing::info!(node = %origin.id, address = %bind_addr, "node identity created");

        let db = Db::open(&data_dir).map_err(CoreError::from)?;
        let keeper = Arc::new(NodeKeeper::new(origin.clone(), Vec::new()));
        let logic: Arc<dyn LogicRunner> = Arc::new(NoopLogicRunner);

        // seed the routing snapshot for the current pulse; later snapshots
        // are written by the pulse manager at each commit
        let latest = db.latest_pulse_number().map_err(CoreError::from)?;
        db.set_active_nodes(latest, &keeper.active_nodes())
            .map_err(CoreError::from)?;

        let pulses = Arc::new(LedgerPulseManager::new(
            db.clone(),
            keeper.clone(),
            logic.clone(),
        ));

        let transport = Arc::new(LoopbackTransport::new());
        let coordinator = Arc::new(LedgerJetCoordinator::new(db.clone(), replication_factor));
        let bus = Arc::new(MessageBus::new(
            BusConfig {
                sign_messages,
                replication_factor,
            },
            crypto.clone(),
            keeper.clone(),
            pulses.clone(),
            coordinator,
            transport.clone(),
        ));
        pulses.attach_bus(bus.clone());

        bus.register_table(handler_table(db.clone()))?;
        bus.register(MessageType::Call, {
            let logic = logic.clone();
            Box::new(move |parcel| logic.execute(parcel))
        })?;

        {
            let bus = bus.clone();
            transport.register(&bind_addr, Arc::new(move |data| bus.deliver(data)));
        }

        let consensus_transport = Arc::new(RpcConsensusTransport {
            transport: transport.clone(),
        });
        let communicator = Arc::new(NaiveCommunicator::new(consensus_transport, origin.id));
        let phases = Arc::new(PhaseManager::new(
            keeper.clone(),
            communicator,
            crypto,
            pulse_duration,
        ));

        Ok(Components {
            origin,
            db,
            keeper,
            bus,
            pulses,
            phases,
            pulse_duration,
        })
    }
}

fn node_id(config: &Config) -> Result<RecordRef, CoreError> {
    match &config.node_id {
        Some(hex_ref) => {
            let bytes = hex::decode(hex_ref)
                .map_err(|e| CoreError::Parse(format!("node_id is not hex: {e}")))?;
            RecordRef::from_bytes(&bytes)
        }
        None => Ok(RecordRef::random()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsenet_core::node::NodeNetwork;
    use pulsenet_core::types::Entropy;
    use pulsenet_core::{Message, MessageSender, PulseManager};

    fn build_in(dir: &std::path::Path) -> Components {
        let config = Config {
            data_dir: Some(dir.to_string_lossy().into_owned()),
            ..Config::default()
        };
        Components::build(&config).unwrap()
    }

    #[test]
    fn components_wire_a_working_local_node() {
        let dir = tempfile::tempdir().unwrap();
        let c = build_in(dir.path());
        assert_eq!(c.keeper.active_nodes().len(), 1);

        // a self-routed ledger message round-trips through the bus
        let record = pulsenet_ledger::Record::CallRequest {
            payload: b"hello".to_vec(),
        };
        let reply = c
            .bus
            .send(
                Message::SetRecord {
                    record: record.to_bytes().unwrap(),
                    target: RecordRef::random(),
                },
                None,
            )
            .unwrap();
        assert!(matches!(reply, Reply::Id(_)));
    }

    #[test]
    fn pulse_commit_advances_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let c = build_in(dir.path());

        let next = Pulse {
            pulse_number: PulseNumber(1),
            entropy: Entropy::random(),
            timestamp: 1_700_000_000,
            next_pulse_number: PulseNumber(2),
            prev_pulse_number: PulseNumber(0),
        };
        c.pulses.set(next).unwrap();
        assert_eq!(c.pulses.current().unwrap().pulse_number, PulseNumber(1));
    }
}
