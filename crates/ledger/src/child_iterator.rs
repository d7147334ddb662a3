//! Chunked forward iterator over a parent's children.
//!
//! Children are stored as a backward-linked chain, newest first. The
//! iterator fetches chunks from the owning shard through the bus and walks
//! them in arrival order. It is finite and not restartable.

use std::collections::VecDeque;
use std::sync::Arc;

use pulsenet_core::message::{Message, MessageSender};
use pulsenet_core::reply::Reply;
use pulsenet_core::types::{PulseNumber, RecordID, RecordRef};
use pulsenet_core::CoreError;

pub const DEFAULT_CHILDREN_CHUNK: usize = 10_000;

pub struct ChildIterator {
    bus: Arc<dyn MessageSender>,
    parent: RecordRef,
    from_pulse: Option<PulseNumber>,
    chunk_size: usize,
    buffer: VecDeque<RecordRef>,
    from_child: Option<RecordID>,
    can_fetch: bool,
}

impl ChildIterator {
    /// Build the iterator and prefetch the first chunk, so `has_next` is
    /// accurate from the start. A zero chunk size falls back to
    /// [`DEFAULT_CHILDREN_CHUNK`]; it would otherwise fetch forever without
    /// yielding.
    pub fn new(
        bus: Arc<dyn MessageSender>,
        parent: RecordRef,
        from_pulse: Option<PulseNumber>,
        chunk_size: usize,
    ) -> Result<Self, CoreError> {
        let mut iter = ChildIterator {
            bus,
            parent,
            from_pulse,
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHILDREN_CHUNK
            } else {
                chunk_size
            },
            buffer: VecDeque::new(),
            from_child: None,
            can_fetch: true,
        };
        iter.fetch()?;
        Ok(iter)
    }

    fn fetch(&mut self) -> Result<(), CoreError> {
        let reply = self
            .bus
            .send(
                Message::GetChildren {
                    parent: self.parent,
                    from_pulse: self.from_pulse,
                    from_child: self.from_child,
                    amount: self.chunk_size,
                },
                None,
            )?
            .into_result()?;
        match reply {
            Reply::Children(chunk) => {
                self.buffer.extend(chunk.refs);
                self.can_fetch = chunk.next_from.is_some();
                self.from_child = chunk.next_from;
                Ok(())
            }
            other => Err(CoreError::Parse(format!(
                "unexpected children reply: {other:?}"
            ))),
        }
    }

    /// True while buffered or fetchable children remain.
    pub fn has_next(&self) -> bool {
        !self.buffer.is_empty() || self.can_fetch
    }

    /// Next child, most recent first. Calling past exhaustion is an error,
    /// not a sentinel.
    pub fn next(&mut self) -> Result<RecordRef, CoreError> {
        if self.buffer.is_empty() && self.can_fetch {
            self.fetch()?;
        }
        self.buffer
            .pop_front()
            .ok_or_else(|| CoreError::Other("child iterator exhausted".into()))
    }
}
