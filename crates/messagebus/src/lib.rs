//! Routing and delivery of application messages between nodes: signed
//! parcels, jet-role destination resolution, cascade multicast, and the
//! record/replay tape.

pub mod bus;
pub mod cascade;
pub mod player;
pub mod recorder;
pub mod routing_token;
pub mod tape;
pub mod transport;

pub use bus::{message_hash, BusConfig, MessageBus};
pub use cascade::Cascade;
pub use player::Player;
pub use recorder::Recorder;
pub use routing_token::{create_token, validate_token};
pub use tape::Tape;
pub use transport::{InboundHandler, LoopbackTransport, Transport};
