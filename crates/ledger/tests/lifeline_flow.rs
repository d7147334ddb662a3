//! End-to-end lifeline flows through the artifact manager and the ledger
//! handlers, dispatched over an in-process bus stand-in.

use std::collections::HashMap;
use std::sync::Arc;

use pulsenet_core::message::{
    Message, MessageHandler, MessageSender, MessageType, Parcel, SendOptions,
};
use pulsenet_core::pulse::Pulse;
use pulsenet_core::reply::Reply;
use pulsenet_core::types::{Entropy, PulseNumber, RecordRef};
use pulsenet_core::{CoreError, PulseManager};

use pulsenet_ledger::artifact::ArtifactManager;
use pulsenet_ledger::handlers::handler_table;
use pulsenet_ledger::record::MachineType;
use pulsenet_ledger::Db;

/// Dispatches every send straight into the ledger handler table, the way a
/// self-addressed send short-circuits on the real bus.
struct LocalBus {
    handlers: HashMap<MessageType, MessageHandler>,
    pulses: Arc<dyn PulseManager>,
    origin: RecordRef,
}

impl MessageSender for LocalBus {
    fn send(&self, message: Message, _options: Option<SendOptions>) -> Result<Reply, CoreError> {
        let parcel = Parcel {
            sender: self.origin,
            signature: vec![],
            token: None,
            trace_id: "test".into(),
            pulse: self.pulses.current()?.pulse_number,
            message,
        };
        let handler = self
            .handlers
            .get(&parcel.message_type())
            .ok_or(CoreError::Other("no handler".into()))?;
        match handler(&parcel) {
            Ok(reply) => Ok(reply),
            Err(e) => Ok(Reply::Error(e.to_string())),
        }
    }
}

struct DbPulses {
    db: Db,
}

impl PulseManager for DbPulses {
    fn current(&self) -> Result<Pulse, CoreError> {
        let latest = self.db.latest_pulse_number()?;
        Ok(self.db.get_pulse(latest)?)
    }

    fn set(&self, pulse: Pulse) -> Result<(), CoreError> {
        Ok(self.db.add_pulse(&pulse)?)
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Db,
    am: ArtifactManager,
    pulses: Arc<DbPulses>,
}

fn harness() -> Harness {
    harness_with_chunk(pulsenet_ledger::child_iterator::DEFAULT_CHILDREN_CHUNK)
}

fn harness_with_chunk(chunk: usize) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Db::open(dir.path()).unwrap();
    advance_pulse(&db, 1);
    let pulses = Arc::new(DbPulses { db: db.clone() });
    let bus = Arc::new(LocalBus {
        handlers: handler_table(db.clone()).into_iter().collect(),
        pulses: pulses.clone(),
        origin: db.genesis_ref(),
    });
    let am = ArtifactManager::new(db.clone(), bus, pulses.clone()).with_children_chunk(chunk);
    Harness {
        _dir: dir,
        db,
        am,
        pulses,
    }
}

fn advance_pulse(db: &Db, n: u32) {
    db.add_pulse(&Pulse {
        pulse_number: PulseNumber(n),
        entropy: Entropy::random(),
        timestamp: n as i64,
        next_pulse_number: PulseNumber(n + 1),
        prev_pulse_number: PulseNumber(n.saturating_sub(1)),
    })
    .unwrap();
}

fn new_head(h: &Harness, tag: &[u8]) -> RecordRef {
    let request = h
        .am
        .register_request(&Message::Call {
            payload: tag.to_vec(),
            target: h.am.genesis_ref(),
            caller: h.am.genesis_ref(),
        })
        .unwrap();
    RecordRef::new(h.am.genesis_ref().record, request)
}

#[test]
fn register_request_is_idempotent() {
    let h = harness();
    let msg = Message::Call {
        payload: vec![42],
        target: h.am.genesis_ref(),
        caller: h.am.genesis_ref(),
    };
    let first = h.am.register_request(&msg).unwrap();
    let second = h.am.register_request(&msg).unwrap();
    assert_eq!(first, second);
}

#[test]
fn activate_then_get_returns_memory_and_parent() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"obj");
    let prototype = RecordRef::random();

    let descr = h
        .am
        .activate_object(genesis, head, genesis, prototype, false, vec![1, 2, 3])
        .unwrap();
    assert_eq!(descr.memory(), &[1, 2, 3]);

    let fetched = h.am.get_object(head, None, false).unwrap();
    assert_eq!(fetched.memory(), &[1, 2, 3]);
    assert_eq!(fetched.parent(), genesis);
    assert_eq!(fetched.prototype().unwrap(), prototype);
    assert_eq!(fetched.state_id(), descr.state_id());
    assert!(!fetched.is_prototype());
}

#[test]
fn update_advances_latest_state() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"upd");
    let descr = h
        .am
        .activate_object(genesis, head, genesis, RecordRef::random(), false, vec![0])
        .unwrap();

    let s2 = h
        .am
        .update_object(genesis, head, &descr, vec![1])
        .unwrap();
    let fetched = h.am.get_object(head, None, false).unwrap();
    assert_eq!(fetched.state_id(), s2);
    assert_eq!(fetched.memory(), &[1]);

    // Amending from the stale descriptor conflicts with the advanced chain.
    let stale = h.am.update_object(genesis, head, &descr, vec![9]);
    assert!(stale.is_err());
}

#[test]
fn update_rejects_prototype_flag_mismatch() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"proto");
    let descr = h
        .am
        .activate_prototype(genesis, head, genesis, RecordRef::random(), vec![0])
        .unwrap();
    assert!(descr.is_prototype());

    assert!(h.am.update_object(genesis, head, &descr, vec![1]).is_err());
    assert!(h
        .am
        .update_prototype(genesis, head, &descr, vec![1], None)
        .is_ok());
}

#[test]
fn deactivate_is_terminal() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"deact");
    let descr = h
        .am
        .activate_object(genesis, head, genesis, RecordRef::random(), false, vec![7])
        .unwrap();

    h.am.deactivate_object(genesis, head, &descr).unwrap();

    assert!(matches!(
        h.am.get_object(head, None, false),
        Err(CoreError::Deactivated)
    ));
    assert!(h.am.update_object(genesis, head, &descr, vec![8]).is_err());

    // The historical state stays reachable by explicit ID.
    let old = h
        .am
        .get_object(head, Some(descr.state_id()), false)
        .unwrap();
    assert_eq!(old.memory(), &[7]);
}

#[test]
fn validation_checkpoint_tracks_separately_from_latest() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"val");
    let descr = h
        .am
        .activate_object(genesis, head, genesis, RecordRef::random(), false, vec![1])
        .unwrap();

    let s2 = h.am.update_object(genesis, head, &descr, vec![2]).unwrap();
    let mut d2 = descr.clone();
    d2.state = s2;
    let s3 = h.am.update_object(genesis, head, &d2, vec![3]).unwrap();

    h.am.register_validation(head, s2, true).unwrap();

    let approved = h.am.get_object(head, None, true).unwrap();
    assert_eq!(approved.state_id(), s2);
    assert_eq!(approved.memory(), &[2]);

    let latest = h.am.get_object(head, None, false).unwrap();
    assert_eq!(latest.state_id(), s3);
    assert_eq!(latest.memory(), &[3]);
}

#[test]
fn failed_validation_rolls_back_to_checkpoint() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let head = new_head(&h, b"rollback");
    let descr = h
        .am
        .activate_object(genesis, head, genesis, RecordRef::random(), false, vec![1])
        .unwrap();

    let s2 = h.am.update_object(genesis, head, &descr, vec![2]).unwrap();
    h.am.register_validation(head, s2, true).unwrap();

    let mut d2 = descr.clone();
    d2.state = s2;
    let s3 = h.am.update_object(genesis, head, &d2, vec![3]).unwrap();

    h.am.register_validation(head, s3, false).unwrap();
    let latest = h.am.get_object(head, None, false).unwrap();
    assert_eq!(latest.state_id(), s2);
}

#[test]
fn delegates_resolve_by_type() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let parent = new_head(&h, b"parent");
    h.am.activate_object(genesis, parent, genesis, RecordRef::random(), false, vec![])
        .unwrap();

    let delegate = new_head(&h, b"delegate");
    let as_type = RecordRef::random();
    h.am.activate_object(genesis, delegate, parent, as_type, true, vec![])
        .unwrap();

    assert_eq!(h.am.get_delegate(parent, as_type).unwrap(), delegate);
    assert!(matches!(
        h.am.get_delegate(parent, RecordRef::random()),
        Err(CoreError::NotFound)
    ));
}

#[test]
fn code_deploys_and_fetches() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let request = new_head(&h, b"code");
    let code_id = h
        .am
        .deploy_code(genesis, request, vec![0xde, 0xad], MachineType(2))
        .unwrap();

    let code_ref = RecordRef::new(genesis.record, code_id);
    let descr = h.am.get_code(code_ref).unwrap();
    assert_eq!(descr.code(), &[0xde, 0xad]);
    assert_eq!(descr.machine_type(), MachineType(2));
}

#[test]
fn children_iterate_newest_first_across_chunk_sizes() {
    // zero falls back to the default chunk size rather than looping on
    // empty fetches
    for chunk in [0usize, 1, 16] {
        let h = harness_with_chunk(chunk);
        let genesis = h.am.genesis_ref();
        let parent = new_head(&h, b"p");
        h.am.activate_object(genesis, parent, genesis, RecordRef::random(), false, vec![])
            .unwrap();

        let mut children = Vec::new();
        for i in 0..5u8 {
            let child = new_head(&h, &[b'c', i]);
            h.am.activate_object(genesis, child, parent, RecordRef::random(), false, vec![])
                .unwrap();
            children.push(child);
        }

        let mut iter = h.am.get_children(parent, None).unwrap();
        let mut seen = Vec::new();
        while iter.has_next() {
            seen.push(iter.next().unwrap());
        }
        children.reverse();
        assert_eq!(seen, children);

        assert!(!iter.has_next());
        assert!(iter.next().is_err());
    }
}

#[test]
fn children_respect_pulse_bound() {
    let h = harness();
    let genesis = h.am.genesis_ref();
    let parent = new_head(&h, b"bounded");
    h.am.activate_object(genesis, parent, genesis, RecordRef::random(), false, vec![])
        .unwrap();

    let early = new_head(&h, b"early");
    h.am.activate_object(genesis, early, parent, RecordRef::random(), false, vec![])
        .unwrap();

    advance_pulse(&h.db, 2);
    assert_eq!(h.pulses.current().unwrap().pulse_number, PulseNumber(2));

    let late = new_head(&h, b"late");
    h.am.activate_object(genesis, late, parent, RecordRef::random(), false, vec![])
        .unwrap();

    let mut iter = h.am.get_children(parent, Some(PulseNumber(2))).unwrap();
    let mut seen = Vec::new();
    while iter.has_next() {
        seen.push(iter.next().unwrap());
    }
    assert_eq!(seen, vec![late]);
}

#[test]
fn register_result_is_content_addressed() {
    let h = harness();
    let head = new_head(&h, b"res");
    let request = RecordRef::random();
    let first = h
        .am
        .register_result(head, request, vec![1, 2])
        .unwrap();
    let second = h
        .am
        .register_result(head, request, vec![1, 2])
        .unwrap();
    assert_eq!(first, second);
}
