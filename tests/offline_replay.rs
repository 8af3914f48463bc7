//! Durability of the pending queue: writes issued while offline survive a
//! process restart and drain exactly once per slot after reconnect.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver};

use tether::sync::{Engine, SyncStatus};
use tether::vault::put_json;
use tether::{
    AuthSnapshot, Collection, Config, MemoryStore, MemoryVault, Millis, NodeEvent, PartitionPath,
    RecordBody, RecordKey, ScopeId, Space, WriteAck,
};

/// One app session: an engine over shared storage and backend handles.
struct Session {
    engine: Engine,
    events: Receiver<NodeEvent>,
    acks: Receiver<WriteAck>,
}

impl Session {
    fn start(store: &MemoryStore, vault: &MemoryVault) -> Self {
        let (event_tx, events) = unbounded();
        let (ack_tx, acks) = unbounded();
        let engine = Engine::new(
            Arc::new(store.clone()),
            Arc::new(vault.clone()),
            Config::default(),
            event_tx,
            ack_tx,
        );
        Session {
            engine,
            events,
            acks,
        }
    }

    /// Deliver queued adapter traffic until nothing is left.
    fn pump(&mut self) {
        loop {
            let mut progress = false;
            while let Ok(event) = self.events.try_recv() {
                self.engine.handle_node_event(event);
                progress = true;
            }
            while let Ok(ack) = self.acks.try_recv() {
                self.engine.handle_ack(ack);
                progress = true;
            }
            if !progress {
                break;
            }
        }
    }

    fn open_public(&mut self) -> ScopeId {
        self.engine
            .switch(None, &Space::Public, &AuthSnapshot::Anonymous)
            .expect("switch to public")
            .scope
            .expect("public resolves")
    }
}

fn expense(category: &str, amount: f64) -> RecordBody {
    RecordBody::Expense {
        category: category.into(),
        amount,
        note: None,
    }
}

fn key(raw: &str) -> RecordKey {
    RecordKey::parse(raw).expect("valid key")
}

#[test]
fn offline_write_survives_restart_and_drains_on_reconnect() {
    let store = MemoryStore::unreachable();
    let vault = MemoryVault::new();

    {
        let mut session = Session::start(&store, &vault);
        let scope = session.open_public();
        session
            .engine
            .write(&scope, Some(key("e1")), expense("Food", 12.5))
            .expect("offline write queues");
        assert_eq!(session.engine.pending_count(&scope).unwrap(), 1);
        assert_eq!(
            session.engine.status(&scope).unwrap(),
            SyncStatus::Offline { pending: 1 }
        );
        // Durable before any network attempt.
        assert!(vault
            .keys()
            .unwrap()
            .iter()
            .any(|k| k.starts_with("outbox/")));
    }

    // Simulated restart: fresh engine, same storage, backend still down.
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 1);
    let visible = session
        .engine
        .record(&scope, Collection::Expenses, &key("e1"))
        .unwrap()
        .expect("queued write renders after restart");
    match visible.body {
        RecordBody::Expense { amount, .. } => assert_eq!(amount, 12.5),
        other => panic!("unexpected body {other:?}"),
    }

    store.set_reconnectable(true).unwrap();
    session.engine.tick();
    session.pump();

    assert_eq!(session.engine.pending_count(&scope).unwrap(), 0);
    assert_eq!(session.engine.status(&scope).unwrap(), SyncStatus::Synced);
    let path = PartitionPath::shared("public").collection(Collection::Expenses);
    let contents = store.contents(&path).unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].0, key("e1"));
    // Nothing pending means no durable queue entry either.
    assert!(!vault
        .keys()
        .unwrap()
        .iter()
        .any(|k| k.starts_with("outbox/")));
}

#[test]
fn flush_issues_at_most_one_write_per_pending_slot() {
    let store = MemoryStore::new();
    store.hold_acks().unwrap();
    let vault = MemoryVault::new();
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();

    session
        .engine
        .write(&scope, Some(key("a")), expense("Food", 1.0))
        .unwrap();
    session
        .engine
        .write(&scope, Some(key("b")), expense("Travel", 2.0))
        .unwrap();
    assert_eq!(store.write_count().unwrap(), 2);

    // Unacked slots are re-sent once per flush, never more.
    session.engine.flush_all();
    assert_eq!(store.write_count().unwrap(), 4);
    session.engine.flush_all();
    assert_eq!(store.write_count().unwrap(), 6);
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 2);

    store.release_acks().unwrap();
    session.pump();
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 0);

    // Settled slots are not re-sent by further flushes.
    session.engine.flush_all();
    assert_eq!(store.write_count().unwrap(), 6);
}

#[test]
fn malformed_persisted_queue_degrades_to_empty() {
    let store = MemoryStore::new();
    let vault = MemoryVault::new();
    put_json(&vault, "outbox/spaces/public", &"not a queue snapshot", Millis(1)).unwrap();

    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 0);

    // The slot is fully usable afterwards.
    session
        .engine
        .write(&scope, Some(key("e2")), expense("Food", 3.0))
        .unwrap();
    session.pump();
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 0);
}

#[test]
fn supersede_keeps_one_durable_slot_per_key() {
    let store = MemoryStore::unreachable();
    let vault = MemoryVault::new();
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();

    session
        .engine
        .write(&scope, Some(key("e1")), expense("Food", 1.0))
        .unwrap();
    session
        .engine
        .write(&scope, Some(key("e1")), expense("Food", 2.0))
        .unwrap();
    assert_eq!(session.engine.pending_count(&scope).unwrap(), 1);

    // Restart sees only the latest intent.
    let mut reloaded = Session::start(&store, &vault);
    let scope = reloaded.open_public();
    assert_eq!(reloaded.engine.pending_count(&scope).unwrap(), 1);
    let visible = reloaded
        .engine
        .record(&scope, Collection::Expenses, &key("e1"))
        .unwrap()
        .expect("latest intent renders");
    match visible.body {
        RecordBody::Expense { amount, .. } => assert_eq!(amount, 2.0),
        other => panic!("unexpected body {other:?}"),
    }
}
