//! # Pulsenet Core Crate
//!
//! Fundamental types and trait seams shared by every other pulsenet crate.
//!
//! ## Modules
//! - `types`: PulseNumber, Entropy, RecordID, RecordRef
//! - `pulse`: Pulse (time slot + shared entropy)
//! - `node`: node membership types and the NodeNetwork seam
//! - `message`: application message enum and the signed Parcel envelope
//! - `reply`: reply enum returned by message handlers
//! - `crypto`: CryptographyService seam + Ed25519 implementation
//! - `config`: TOML configuration loader
//! - `error`: shared error taxonomy
//!
//! Everything here is deliberately free of storage, network and consensus
//! logic: those live in `pulsenet-ledger`, `pulsenet-messagebus` and
//! `pulsenet-consensus` and depend on the seams defined in this crate.

pub mod config;
pub mod crypto;
pub mod error;
pub mod message;
pub mod node;
pub mod pulse;
pub mod reply;
pub mod types;

pub use error::CoreError;
pub use message::{Message, MessageHandler, MessageSender, MessageType, Parcel, SendOptions};
pub use node::{Node, NodeNetwork, NodeRole, NodeState};
pub use pulse::Pulse;
pub use reply::Reply;
pub use types::{Entropy, PulseNumber, RecordID, RecordRef};

use std::sync::Arc;

/// Seam for the contract execution sandbox. The core only advances it on
/// pulse boundaries and forwards call parcels to it.
pub trait LogicRunner: Send + Sync {
    fn on_pulse(&self, pulse: &Pulse) -> Result<(), CoreError>;
    fn execute(&self, parcel: &Parcel) -> Result<Reply, CoreError>;
}

/// Seam over the component that tracks the authoritative pulse.
pub trait PulseManager: Send + Sync {
    /// Latest pulse this node has committed.
    fn current(&self) -> Result<Pulse, CoreError>;
    /// Commit a new pulse: close out the previous slot and advance.
    fn set(&self, pulse: Pulse) -> Result<(), CoreError>;
}

/// Seam over deterministic jet routing. Implemented by the ledger's jet
/// coordinator; consumed by the message bus.
pub trait JetCoordinator: Send + Sync {
    /// Nodes responsible for `target` under `role` at `pulse`. Deterministic:
    /// the whole network computes the same answer from the same inputs.
    fn query_role(
        &self,
        role: NodeRole,
        target: &RecordRef,
        pulse: PulseNumber,
    ) -> Result<Vec<RecordRef>, CoreError>;

    /// Whether `candidate` is entitled to act on `target`'s behalf for
    /// `role` at `pulse`.
    fn is_authorized(
        &self,
        role: NodeRole,
        target: &RecordRef,
        pulse: PulseNumber,
        candidate: &RecordRef,
    ) -> Result<bool, CoreError>;
}

pub type ArcLogicRunner = Arc<dyn LogicRunner>;
pub type ArcPulseManager = Arc<dyn PulseManager>;
pub type ArcJetCoordinator = Arc<dyn JetCoordinator>;
