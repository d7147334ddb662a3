//! Recorder: a bus wrapper that caches every reply on a tape.

use std::io::Write;
use std::sync::Arc;

use pulsenet_core::{CoreError, Message, MessageSender, Reply, SendOptions};

use crate::bus::{message_hash, MessageBus};
use crate::tape::Tape;

/// Wraps the bus so every reply lands on the tape. A repeated send of the
/// same message returns the taped reply without hitting the network, and
/// the finished tape can be written out for a player to replay.
pub struct Recorder {
    bus: Arc<MessageBus>,
    tape: Tape,
}

impl Recorder {
    pub fn new(bus: Arc<MessageBus>, pulse: pulsenet_core::types::PulseNumber) -> Self {
        Recorder {
            bus,
            tape: Tape::new(pulse),
        }
    }

    pub fn write_tape(&self, w: &mut dyn Write) -> Result<(), CoreError> {
        self.tape.write(w)
    }
}

impl MessageSender for Recorder {
    fn send(&self, message: Message, options: Option<SendOptions>) -> Result<Reply, CoreError> {
        let parcel = self.bus.create_parcel(message, options.as_ref())?;
        let hash = message_hash(&parcel)?;

        if let Ok(reply) = self.tape.get_reply(&hash) {
            return Ok(reply);
        }

        let reply = self.bus.send_parcel(parcel, options.as_ref())?;
        self.tape.set_reply(hash, reply.clone());
        Ok(reply)
    }
}
