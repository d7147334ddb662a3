//! Pulse-driven network consensus: active-list bookkeeping, phase packets,
//! and the two-phase round run at every pulse boundary.

pub mod communicator;
pub mod nodekeeper;
pub mod packets;
pub mod phases;

pub use communicator::{Communicator, ConsensusTransport, NaiveCommunicator};
pub use nodekeeper::{ActiveListMapper, NodeKeeper};
pub use phases::{FirstPhase, FirstPhaseState, PhaseManager, SecondPhase, SecondPhaseState};
