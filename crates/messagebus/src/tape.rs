//! Reply tape: the record side of deterministic re-execution.
//!
//! Replies are keyed by the message hash, so replaying the same logical
//! sends against a player yields the same replies without touching the
//! network. The tape serializes to any writer and back via bincode.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

use pulsenet_core::types::PulseNumber;
use pulsenet_core::{CoreError, Reply};

#[derive(Serialize, Deserialize)]
struct TapeContents {
    pulse: PulseNumber,
    entries: Vec<([u8; 32], Reply)>,
}

pub struct Tape {
    pulse: PulseNumber,
    replies: Mutex<HashMap<[u8; 32], Reply>>,
}

impl Tape {
    pub fn new(pulse: PulseNumber) -> Self {
        Tape {
            pulse,
            replies: Mutex::new(HashMap::new()),
        }
    }

    /// Pulse the tape was recorded at.
    pub fn pulse(&self) -> PulseNumber {
        self.pulse
    }

    pub fn get_reply(&self, msg_hash: &[u8; 32]) -> Result<Reply, CoreError> {
        self.replies
            .lock()
            .get(msg_hash)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    pub fn set_reply(&self, msg_hash: [u8; 32], reply: Reply) {
        self.replies.lock().insert(msg_hash, reply);
    }

    pub fn write(&self, w: &mut dyn Write) -> Result<(), CoreError> {
        let replies = self.replies.lock();
        let contents = TapeContents {
            pulse: self.pulse,
            entries: replies.iter().map(|(k, v)| (*k, v.clone())).collect(),
        };
        bincode::serialize_into(w, &contents)?;
        Ok(())
    }

    pub fn from_reader(r: &mut dyn Read) -> Result<Self, CoreError> {
        let contents: TapeContents = bincode::deserialize_from(r)?;
        Ok(Tape {
            pulse: contents.pulse,
            replies: Mutex::new(contents.entries.into_iter().collect()),
        })
    }
}
