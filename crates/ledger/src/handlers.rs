//! Ledger-side message handlers.
//!
//! Each handler owns the authoritative state transition for one message
//! type. Lifeline mutations take the per-ID lock through
//! `get_object_index(.., true)`, so concurrent amendments to one object
//! serialize while everything else proceeds.

use pulsenet_core::message::{Message, MessageHandler, MessageType, Parcel};
use pulsenet_core::reply::{ChildrenReply, ObjectReply, Reply};
use pulsenet_core::CoreError;

use crate::db::Db;
use crate::index::{LifelineState, ObjectLifeline};
use crate::jetdrop::JetDrop;
use crate::record::Record;
use crate::transaction::StorageError;

/// Handler table for every message type the ledger serves. Feed the entries
/// to `MessageBus::register`.
pub fn handler_table(db: Db) -> Vec<(MessageType, MessageHandler)> {
    fn entry(
        db: &Db,
        t: MessageType,
        f: fn(&Db, &Parcel) -> Result<Reply, CoreError>,
    ) -> (MessageType, MessageHandler) {
        let db = db.clone();
        (t, Box::new(move |parcel| f(&db, parcel)))
    }

    vec![
        entry(&db, MessageType::SetRecord, handle_set_record),
        entry(&db, MessageType::SetBlob, handle_set_blob),
        entry(&db, MessageType::GetObject, handle_get_object),
        entry(&db, MessageType::GetDelegate, handle_get_delegate),
        entry(&db, MessageType::GetChildren, handle_get_children),
        entry(&db, MessageType::UpdateObject, handle_update_object),
        entry(&db, MessageType::RegisterChild, handle_register_child),
        entry(&db, MessageType::ValidateRecord, handle_validate_record),
        entry(&db, MessageType::GetCode, handle_get_code),
        entry(&db, MessageType::JetDrop, handle_jet_drop),
        entry(&db, MessageType::HeavyPayload, handle_heavy_payload),
    ]
}

fn handle_set_record(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::SetRecord { record, .. } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let rec = Record::from_bytes(record)?;
    let id = StorageError::override_id(db.set_record(parcel.pulse, &rec))?;
    Ok(Reply::Id(id))
}

fn handle_set_blob(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::SetBlob { memory, .. } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let id = StorageError::override_id(db.set_blob(parcel.pulse, memory))?;
    Ok(Reply::Id(id))
}

fn handle_get_object(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::GetObject {
        head,
        state,
        approved,
    } = &parcel.message
    else {
        return Err(unexpected(parcel));
    };

    let idx = db.get_object_index(&head.record)?;
    let state_id = match state {
        Some(explicit) => *explicit,
        None if *approved => idx.latest_state_approved.ok_or(CoreError::StateNotAvailable)?,
        None => idx.latest_state,
    };
    let rec = match db.get_record(&state_id) {
        Ok(rec) => rec,
        // An explicitly requested historical state that is absent is a
        // lifecycle violation, not a plain missing key.
        Err(StorageError::NotFound) if state.is_some() => {
            return Err(CoreError::StateNotAvailable)
        }
        Err(e) => return Err(e.into()),
    };

    // The latest record being a deactivation terminates reads; explicit
    // historical states stay reachable.
    if rec.is_deactivation() {
        return if state.is_some() {
            Err(CoreError::StateNotAvailable)
        } else {
            Err(CoreError::Deactivated)
        };
    }
    let data = rec.state_data().ok_or(CoreError::StateNotAvailable)?;
    let memory = db.get_blob(&data.memory)?;

    Ok(Reply::Object(ObjectReply {
        head: *head,
        state: state_id,
        prototype: Some(data.image),
        is_prototype: data.is_prototype,
        child_pointer: idx.child_pointer,
        parent: idx.parent,
        memory,
    }))
}

fn handle_get_delegate(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::GetDelegate { head, as_type } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let idx = db.get_object_index(&head.record)?;
    let delegate = idx.delegates.get(as_type).ok_or(CoreError::NotFound)?;
    Ok(Reply::Delegate(*delegate))
}

fn handle_get_children(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::GetChildren {
        parent,
        from_pulse,
        from_child,
        amount,
    } = &parcel.message
    else {
        return Err(unexpected(parcel));
    };

    let idx = db.get_object_index(&parent.record)?;
    let mut current = from_child.or(idx.child_pointer);
    let mut refs = Vec::new();

    // Walk the backward-linked chain newest-first. Stop at the chain's
    // origin, the pulse bound, or the chunk limit (returning a cursor).
    while let Some(id) = current {
        if refs.len() >= *amount {
            return Ok(Reply::Children(ChildrenReply {
                refs,
                next_from: Some(id),
            }));
        }
        if let Some(bound) = from_pulse {
            if id.pulse < *bound {
                break;
            }
        }
        let Record::Child {
            reference,
            prev_child,
        } = db.get_record(&id)?
        else {
            return Err(CoreError::Parse("child chain holds a non-child record".into()));
        };
        refs.push(reference);
        current = prev_child;
    }

    Ok(Reply::Children(ChildrenReply {
        refs,
        next_from: None,
    }))
}

fn handle_update_object(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::UpdateObject { record, object } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let rec = Record::from_bytes(record)?;
    if !rec.is_state_record() {
        return Err(CoreError::Parse("update payload is not a state record".into()));
    }

    let id = db.update(|tx| {
        let id = StorageError::override_id(tx.set_record(parcel.pulse, &rec))?;
        match &rec {
            Record::ObjectActivate { parent, .. } => {
                match tx.get_object_index(&object.record, true) {
                    // Re-activation is idempotent: the record write above
                    // already reported the existing ID.
                    Ok(_) => {}
                    Err(StorageError::NotFound) => {
                        tx.set_object_index(&object.record, &ObjectLifeline::activated(id, *parent))?;
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {
                let mut idx = tx.get_object_index(&object.record, true)?;
                if idx.state == LifelineState::Deactivated {
                    return Err(CoreError::Deactivated.into());
                }
                if rec.prev_state() != Some(idx.latest_state) {
                    return Err(CoreError::Other("conflicting object state".into()).into());
                }
                idx.latest_state = id;
                if rec.is_deactivation() {
                    idx.state = LifelineState::Deactivated;
                }
                tx.set_object_index(&object.record, &idx)?;
            }
        }
        Ok(id)
    })?;
    Ok(Reply::Id(id))
}

fn handle_register_child(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::RegisterChild {
        record,
        parent,
        as_type,
        ..
    } = &parcel.message
    else {
        return Err(unexpected(parcel));
    };
    let Record::Child { reference, .. } = Record::from_bytes(record)? else {
        return Err(CoreError::Parse("register payload is not a child record".into()));
    };

    let id = db.update(|tx| {
        let mut idx = tx.get_object_index(&parent.record, true)?;
        // PrevChild is decided here, under the parent's lock, so concurrent
        // registrations always chain instead of racing.
        let child_rec = Record::Child {
            reference,
            prev_child: idx.child_pointer,
        };
        let id = StorageError::override_id(tx.set_record(parcel.pulse, &child_rec))?;
        idx.child_pointer = Some(id);
        if let Some(as_type) = as_type {
            idx.delegates.insert(*as_type, reference);
        }
        tx.set_object_index(&parent.record, &idx)?;
        Ok(id)
    })?;
    Ok(Reply::Id(id))
}

fn handle_validate_record(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::ValidateRecord {
        object,
        state,
        is_valid,
    } = &parcel.message
    else {
        return Err(unexpected(parcel));
    };

    db.update(|tx| {
        let mut idx = tx.get_object_index(&object.record, true)?;
        let rec = match tx.get_record(state) {
            Ok(rec) => rec,
            Err(StorageError::NotFound) => return Err(CoreError::StateNotAvailable.into()),
            Err(e) => return Err(e),
        };
        if !rec.is_state_record() {
            return Err(CoreError::StateNotAvailable.into());
        }
        if *is_valid {
            idx.latest_state_approved = Some(*state);
        } else {
            // Failed validation rolls the lifeline back to the approved
            // checkpoint, or to the rejected state's predecessor.
            idx.latest_state = match idx.latest_state_approved {
                Some(approved) => approved,
                None => rec.prev_state().ok_or(CoreError::StateNotAvailable)?,
            };
        }
        tx.set_object_index(&object.record, &idx)
    })?;
    Ok(Reply::Ok)
}

fn handle_get_code(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::GetCode { code } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let Record::Code {
        code: blob,
        machine_type,
        ..
    } = db.get_record(&code.record)?
    else {
        return Err(CoreError::Parse("reference is not a code record".into()));
    };
    Ok(Reply::Code {
        code: db.get_blob(&blob)?,
        machine_type: machine_type.0,
    })
}

fn handle_jet_drop(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::JetDrop { drop, .. } = &parcel.message else {
        return Err(unexpected(parcel));
    };
    let drop: JetDrop =
        bincode::deserialize(drop).map_err(|e| CoreError::Serialization(e.to_string()))?;
    tracing::debug!(pulse = %drop.pulse, "jet drop received");
    db.set_drop(&drop)?;
    Ok(Reply::Ok)
}

fn handle_heavy_payload(db: &Db, parcel: &Parcel) -> Result<Reply, CoreError> {
    let Message::HeavyPayload {
        records,
        pulse_number,
    } = &parcel.message
    else {
        return Err(unexpected(parcel));
    };
    let stored = db.update(|tx| {
        let mut stored = 0usize;
        for raw in records {
            let rec = Record::from_bytes(raw)?;
            StorageError::override_id(tx.set_record(*pulse_number, &rec))?;
            stored += 1;
        }
        Ok(stored)
    })?;
    tracing::debug!(pulse = %pulse_number, stored, "heavy payload replicated");
    Ok(Reply::Ok)
}

fn unexpected(parcel: &Parcel) -> CoreError {
    CoreError::Parse(format!(
        "handler received mismatched message type {:?}",
        parcel.message_type()
    ))
}
