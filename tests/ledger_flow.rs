//! Scope-keyed ledger: clamped arithmetic, durability, and cross-tab
//! observation without write echo.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver};
use proptest::prelude::*;

use tether::sync::ledger::{apply_drop, apply_increment};
use tether::sync::Engine;
use tether::vault::VaultEntry;
use tether::{
    AuthSnapshot, Config, DropLimits, MemoryStore, MemoryVault, NodeEvent, ScopeId, Space, Vault,
    WriteAck,
};

struct Session {
    engine: Engine,
    #[allow(dead_code)]
    events: Receiver<NodeEvent>,
    #[allow(dead_code)]
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

    fn open_public(&mut self) -> ScopeId {
        self.engine
            .switch(None, &Space::Public, &AuthSnapshot::Anonymous)
            .expect("switch to public")
            .scope
            .expect("public resolves")
    }
}

#[test]
fn ledger_arithmetic_is_clamped_and_durable() {
    let store = MemoryStore::new();
    let vault = MemoryVault::new();
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();

    assert_eq!(session.engine.ledger_increment(&scope, 20.0).unwrap(), 20);
    assert_eq!(
        session
            .engine
            .ledger_decrement(&scope, 5.0, DropLimits::default())
            .unwrap(),
        15
    );
    // Over-drawing stops at zero.
    assert_eq!(
        session
            .engine
            .ledger_decrement(&scope, 50.0, DropLimits::default())
            .unwrap(),
        0
    );
    assert_eq!(session.engine.ledger_increment(&scope, 15.0).unwrap(), 15);
    // A negative increment saturates at zero too.
    assert_eq!(session.engine.ledger_increment(&scope, -50.0).unwrap(), 0);
    assert_eq!(session.engine.ledger_increment(&scope, 15.0).unwrap(), 15);

    // The value survives a restart.
    let mut reloaded = Session::start(&store, &vault);
    let scope = reloaded.open_public();
    assert_eq!(reloaded.engine.ledger_value(&scope).unwrap(), 15);
}

#[test]
fn decrement_honors_floor_and_max_drop() {
    let store = MemoryStore::new();
    let vault = MemoryVault::new();
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();

    session.engine.ledger_set(&scope, 50).unwrap();
    let limits = DropLimits {
        floor: 0,
        max_drop: Some(6),
    };
    // Asked for 100, allowed 6.
    assert_eq!(
        session.engine.ledger_decrement(&scope, 100.0, limits).unwrap(),
        44
    );

    let floored = DropLimits {
        floor: 40,
        max_drop: None,
    };
    assert_eq!(
        session.engine.ledger_decrement(&scope, 100.0, floored).unwrap(),
        40
    );
}

#[test]
fn ensure_minimum_never_lowers() {
    let store = MemoryStore::new();
    let vault = MemoryVault::new();
    let mut session = Session::start(&store, &vault);
    let scope = session.open_public();

    session.engine.ledger_set(&scope, 10).unwrap();
    assert_eq!(session.engine.ledger_ensure_minimum(&scope, 5).unwrap(), 10);
    assert_eq!(session.engine.ledger_ensure_minimum(&scope, 25).unwrap(), 25);
}

#[test]
fn cross_tab_observation_applies_without_echo() {
    let store = MemoryStore::new();
    let vault = MemoryVault::new();

    let mut tab_a = Session::start(&store, &vault);
    let scope_a = tab_a.open_public();
    tab_a.engine.ledger_set(&scope_a, 30).unwrap();

    // Tab B opens after the first write and loads the persisted value.
    let mut tab_b = Session::start(&store, &vault);
    let scope_b = tab_b.open_public();
    assert_eq!(tab_b.engine.ledger_value(&scope_b).unwrap(), 30);
    let sub = tab_b.engine.subscribe_ledger(&scope_b).unwrap();
    assert_eq!(sub.try_recv().unwrap(), 30);

    // A writes again; B hears about it through a storage notification.
    tab_a.engine.ledger_set(&scope_a, 42).unwrap();
    let entry = vault
        .get("ledger/spaces/public")
        .unwrap()
        .expect("ledger persisted");
    let raw_before = serde_json::to_string(&entry).unwrap();

    tab_b
        .engine
        .handle_external_ledger_change(&scope_b, &raw_before);
    assert_eq!(tab_b.engine.ledger_value(&scope_b).unwrap(), 42);
    assert_eq!(sub.try_recv().unwrap(), 42);

    // Observation never writes back, so the stored entry is untouched.
    let entry_after: VaultEntry = vault
        .get("ledger/spaces/public")
        .unwrap()
        .expect("ledger persisted");
    assert_eq!(serde_json::to_string(&entry_after).unwrap(), raw_before);
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn drop_result_is_bounded(
        current in 0u64..1_000_000,
        delta in 0.5f64..1_000_000.0,
        floor in 0u64..1_000,
        cap in proptest::option::of(0u64..1_000),
    ) {
        let limits = DropLimits { floor, max_drop: cap };
        let result = apply_drop(current, delta, limits);
        prop_assert!(result >= floor);
        prop_assert!(result <= current.max(floor));
        if let Some(cap) = cap && result < current {
            prop_assert!(current - result <= cap);
        }
    }

    #[test]
    fn uncapped_drop_matches_the_formula(
        current in 0u64..1_000_000,
        delta in 0.5f64..1_000_000.0,
    ) {
        let result = apply_drop(current, delta, DropLimits::default());
        let units = delta.round() as u64;
        prop_assert_eq!(result, current.saturating_sub(units));
    }

    #[test]
    fn increment_then_equal_drop_returns_to_start(
        current in 0u64..1_000_000,
        delta in 0.5f64..1_000.0,
    ) {
        let raised = apply_increment(current, delta).expect("positive delta changes the value");
        let lowered = apply_drop(raised, delta, DropLimits::default());
        prop_assert_eq!(lowered, current);
    }
}
