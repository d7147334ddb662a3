//! Artifact manager: the application-facing object ledger API.
//!
//! Every operation translates into record/blob writes and routed messages;
//! whether they land locally or on a remote shard owner is the bus's
//! concern. State and blob writes that belong together are sent
//! concurrently and the whole operation aborts if either fails, so no
//! partial lifeline is ever produced.

use std::sync::Arc;

use pulsenet_core::crypto::hash_bytes;
use pulsenet_core::message::{Message, MessageSender};
use pulsenet_core::reply::Reply;
use pulsenet_core::types::{PulseNumber, RecordID, RecordRef};
use pulsenet_core::{CoreError, PulseManager};

use crate::child_iterator::{ChildIterator, DEFAULT_CHILDREN_CHUNK};
use crate::db::Db;
use crate::descriptors::{CodeDescriptor, ObjectDescriptor};
use crate::record::{blob_id, MachineType, ObjectStateData, Record, SideEffectRecord};

pub struct ArtifactManager {
    db: Db,
    bus: Arc<dyn MessageSender>,
    pulses: Arc<dyn PulseManager>,
    children_chunk: usize,
}

impl ArtifactManager {
    pub fn new(db: Db, bus: Arc<dyn MessageSender>, pulses: Arc<dyn PulseManager>) -> Self {
        ArtifactManager {
            db,
            bus,
            pulses,
            children_chunk: DEFAULT_CHILDREN_CHUNK,
        }
    }

    pub fn with_children_chunk(mut self, chunk: usize) -> Self {
        self.children_chunk = chunk;
        self
    }

    /// Root of every lifeline tree on this node.
    pub fn genesis_ref(&self) -> RecordRef {
        self.db.genesis_ref()
    }

    /// Ledger state fingerprint: latest pulse chained to the genesis ref.
    pub fn state(&self) -> Result<Vec<u8>, CoreError> {
        let latest = self.db.latest_pulse_number()?;
        let mut buf = Vec::with_capacity(76);
        buf.extend_from_slice(&self.genesis_ref().to_bytes());
        buf.extend_from_slice(&latest.to_bytes());
        Ok(hash_bytes(&buf).to_vec())
    }

    fn current_pulse(&self) -> Result<PulseNumber, CoreError> {
        Ok(self.pulses.current()?.pulse_number)
    }

    fn send_for_id(&self, msg: Message) -> Result<RecordID, CoreError> {
        match self.bus.send(msg, None)?.into_result()? {
            Reply::Id(id) => Ok(id),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Send two messages concurrently; both must succeed.
    fn send_pair(&self, a: Message, b: Message) -> Result<(Reply, Reply), CoreError> {
        std::thread::scope(|s| {
            let second = s.spawn(move || self.bus.send(b, None).and_then(Reply::into_result));
            let first = self.bus.send(a, None).and_then(Reply::into_result);
            let second = second
                .join()
                .map_err(|_| CoreError::Other("send worker panicked".into()))?;
            Ok((first?, second?))
        })
    }

    /// Record an incoming request so results can reference it.
    pub fn register_request(&self, msg: &Message) -> Result<RecordID, CoreError> {
        let record = Record::CallRequest {
            payload: msg.to_bytes()?,
        };
        let target = msg.target().unwrap_or_else(|| self.genesis_ref());
        self.send_for_id(Message::SetRecord {
            record: record.to_bytes()?,
            target,
        })
    }

    /// Persist a contract interface declaration.
    pub fn declare_type(
        &self,
        domain: RecordRef,
        request: RecordRef,
        declaration: Vec<u8>,
    ) -> Result<RecordID, CoreError> {
        let record = Record::Type {
            side_effect: SideEffectRecord { domain, request },
            declaration,
        };
        self.send_for_id(Message::SetRecord {
            record: record.to_bytes()?,
            target: request,
        })
    }

    /// Store code bytes and the record referencing them. The blob and the
    /// record travel concurrently.
    pub fn deploy_code(
        &self,
        domain: RecordRef,
        request: RecordRef,
        code: Vec<u8>,
        machine_type: MachineType,
    ) -> Result<RecordID, CoreError> {
        let pulse = self.current_pulse()?;
        let record = Record::Code {
            side_effect: SideEffectRecord { domain, request },
            code: blob_id(pulse, &code),
            machine_type,
        };
        let (rec_reply, _) = self.send_pair(
            Message::SetRecord {
                record: record.to_bytes()?,
                target: request,
            },
            Message::SetBlob {
                memory: code,
                target: request,
            },
        )?;
        match rec_reply {
            Reply::Id(id) => Ok(id),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    pub fn get_code(&self, code: RecordRef) -> Result<CodeDescriptor, CoreError> {
        match self.bus.send(Message::GetCode { code }, None)?.into_result()? {
            Reply::Code {
                code: bytes,
                machine_type,
            } => Ok(CodeDescriptor {
                reference: code,
                machine_type: MachineType(machine_type),
                code: bytes,
            }),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Start an instance lifeline under `parent`. The activation record and
    /// the memory blob are written concurrently; child registration under
    /// the parent is a third, sequential step.
    pub fn activate_object(
        &self,
        domain: RecordRef,
        object: RecordRef,
        parent: RecordRef,
        prototype: RecordRef,
        as_delegate: bool,
        memory: Vec<u8>,
    ) -> Result<ObjectDescriptor, CoreError> {
        self.activate(domain, object, parent, prototype, as_delegate, memory, false)
    }

    /// Same as `activate_object` for prototype lifelines, whose image is a
    /// code reference.
    pub fn activate_prototype(
        &self,
        domain: RecordRef,
        object: RecordRef,
        parent: RecordRef,
        code: RecordRef,
        memory: Vec<u8>,
    ) -> Result<ObjectDescriptor, CoreError> {
        self.activate(domain, object, parent, code, false, memory, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn activate(
        &self,
        domain: RecordRef,
        object: RecordRef,
        parent: RecordRef,
        image: RecordRef,
        as_delegate: bool,
        memory: Vec<u8>,
        is_prototype: bool,
    ) -> Result<ObjectDescriptor, CoreError> {
        let pulse = self.current_pulse()?;
        let record = Record::ObjectActivate {
            side_effect: SideEffectRecord {
                domain,
                request: object,
            },
            state: ObjectStateData {
                memory: blob_id(pulse, &memory),
                image,
                is_prototype,
            },
            parent,
            is_delegate: as_delegate,
        };
        let (state_reply, _) = self.send_pair(
            Message::UpdateObject {
                record: record.to_bytes()?,
                object,
            },
            Message::SetBlob {
                memory: memory.clone(),
                target: object,
            },
        )?;
        let state = match state_reply {
            Reply::Id(id) => id,
            other => return Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        };

        let child = Record::Child {
            reference: object,
            // filled under the parent's lock by the owning shard
            prev_child: None,
        };
        self.send_for_id(Message::RegisterChild {
            record: child.to_bytes()?,
            parent,
            child: object,
            as_type: as_delegate.then_some(image),
        })?;

        Ok(ObjectDescriptor {
            head: object,
            state,
            prototype: Some(image),
            is_prototype,
            child_pointer: None,
            memory,
            parent,
        })
    }

    /// Amend an instance with a new memory snapshot. Rejects prototype
    /// descriptors: the flag mismatch is a contract violation, not coerced.
    pub fn update_object(
        &self,
        domain: RecordRef,
        request: RecordRef,
        obj: &ObjectDescriptor,
        memory: Vec<u8>,
    ) -> Result<RecordID, CoreError> {
        if obj.is_prototype() {
            return Err(CoreError::Other("object is not an instance".into()));
        }
        self.amend(domain, request, obj, obj.prototype()?, memory)
    }

    /// Amend a prototype, optionally re-pointing its code image.
    pub fn update_prototype(
        &self,
        domain: RecordRef,
        request: RecordRef,
        obj: &ObjectDescriptor,
        memory: Vec<u8>,
        code: Option<RecordRef>,
    ) -> Result<RecordID, CoreError> {
        if !obj.is_prototype() {
            return Err(CoreError::Other("object is not a prototype".into()));
        }
        let image = match code {
            Some(c) => c,
            None => obj.prototype()?,
        };
        self.amend(domain, request, obj, image, memory)
    }

    fn amend(
        &self,
        domain: RecordRef,
        request: RecordRef,
        obj: &ObjectDescriptor,
        image: RecordRef,
        memory: Vec<u8>,
    ) -> Result<RecordID, CoreError> {
        let pulse = self.current_pulse()?;
        let record = Record::ObjectAmend {
            side_effect: SideEffectRecord { domain, request },
            state: ObjectStateData {
                memory: blob_id(pulse, &memory),
                image,
                is_prototype: obj.is_prototype(),
            },
            prev_state: obj.state_id(),
        };
        let (state_reply, _) = self.send_pair(
            Message::UpdateObject {
                record: record.to_bytes()?,
                object: obj.head(),
            },
            Message::SetBlob {
                memory,
                target: obj.head(),
            },
        )?;
        match state_reply {
            Reply::Id(id) => Ok(id),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Terminate a lifeline. Deactivated objects are terminal.
    pub fn deactivate_object(
        &self,
        domain: RecordRef,
        request: RecordRef,
        obj: &ObjectDescriptor,
    ) -> Result<RecordID, CoreError> {
        let record = Record::Deactivation {
            side_effect: SideEffectRecord { domain, request },
            prev_state: obj.state_id(),
        };
        self.send_for_id(Message::UpdateObject {
            record: record.to_bytes()?,
            object: obj.head(),
        })
    }

    /// Fetch an object descriptor: its latest state, an explicit historical
    /// state, or the approved checkpoint.
    pub fn get_object(
        &self,
        head: RecordRef,
        state: Option<RecordID>,
        approved: bool,
    ) -> Result<ObjectDescriptor, CoreError> {
        match self
            .bus
            .send(
                Message::GetObject {
                    head,
                    state,
                    approved,
                },
                None,
            )?
            .into_result()?
        {
            Reply::Object(obj) => Ok(obj.into()),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    pub fn get_delegate(
        &self,
        head: RecordRef,
        as_type: RecordRef,
    ) -> Result<RecordRef, CoreError> {
        match self
            .bus
            .send(Message::GetDelegate { head, as_type }, None)?
            .into_result()?
        {
            Reply::Delegate(delegate) => Ok(delegate),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }

    /// Lazy forward iterator over `parent`'s children, newest first,
    /// optionally bounded at `from_pulse`.
    pub fn get_children(
        &self,
        parent: RecordRef,
        from_pulse: Option<PulseNumber>,
    ) -> Result<ChildIterator, CoreError> {
        ChildIterator::new(self.bus.clone(), parent, from_pulse, self.children_chunk)
    }

    /// Save a call result against its request.
    pub fn register_result(
        &self,
        object: RecordRef,
        request: RecordRef,
        payload: Vec<u8>,
    ) -> Result<RecordID, CoreError> {
        let record = Record::Result { request, payload };
        self.send_for_id(Message::SetRecord {
            record: record.to_bytes()?,
            target: object,
        })
    }

    /// Mark `state` as the approved checkpoint for `object`, independent of
    /// the latest state continuing to advance.
    pub fn register_validation(
        &self,
        object: RecordRef,
        state: RecordID,
        is_valid: bool,
    ) -> Result<(), CoreError> {
        match self
            .bus
            .send(
                Message::ValidateRecord {
                    object,
                    state,
                    is_valid,
                },
                None,
            )?
            .into_result()?
        {
            Reply::Ok => Ok(()),
            other => Err(CoreError::Parse(format!("unexpected reply: {other:?}"))),
        }
    }
}
