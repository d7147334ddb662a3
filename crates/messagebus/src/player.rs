//! Player: replays taped replies instead of sending.

use std::io::Read;
use std::sync::Arc;

use pulsenet_core::{CoreError, Message, MessageSender, Reply, SendOptions};

use crate::bus::{message_hash, MessageBus};
use crate::tape::Tape;

/// Answers sends exclusively from a previously recorded tape. A message
/// with no taped reply fails with `NoReply`; the player never touches the
/// network.
pub struct Player {
    bus: Arc<MessageBus>,
    tape: Tape,
}

impl Player {
    pub fn from_reader(bus: Arc<MessageBus>, r: &mut dyn Read) -> Result<Self, CoreError> {
        Ok(Player {
            bus,
            tape: Tape::from_reader(r)?,
        })
    }
}

impl MessageSender for Player {
    fn send(&self, message: Message, options: Option<SendOptions>) -> Result<Reply, CoreError> {
        let parcel = self.bus.create_parcel(message, options.as_ref())?;
        let hash = message_hash(&parcel)?;
        self.tape.get_reply(&hash).map_err(|_| CoreError::NoReply)
    }
}
