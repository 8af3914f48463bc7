//! Runtime thread around the engine.
//!
//! One thread owns the [`Engine`] and processes commands, adapter events,
//! acks, connectivity transitions, and the reconnect timer sequentially.
//! This is the serialization point for all state mutation; callers talk
//! to it through a cloneable [`SyncHandle`].

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Sender};

use crate::config::Config;
use crate::core::record::{Collection, Record, RecordBody};
use crate::core::scope::{AuthSnapshot, ScopeId, Space};
use crate::core::{GuestId, RecordKey};
use crate::error::Error;
use crate::remote::NodeStore;
use crate::vault::Vault;

use super::broadcast::Subscription;
use super::engine::{Engine, EngineError, SwitchOutcome};
use super::ledger::DropLimits;
use super::view::{SyncStatus, ViewEvent};

/// One request to the engine thread, with its reply channel.
pub enum Command {
    EnsureGuest {
        respond: Sender<Result<GuestId, Error>>,
    },
    Switch {
        from: Option<ScopeId>,
        space: Space,
        auth: AuthSnapshot,
        respond: Sender<Result<SwitchOutcome, Error>>,
    },
    CloseScope {
        scope: ScopeId,
        respond: Sender<bool>,
    },
    Write {
        scope: ScopeId,
        key: Option<RecordKey>,
        body: RecordBody,
        respond: Sender<Result<RecordKey, Error>>,
    },
    Delete {
        scope: ScopeId,
        collection: Collection,
        key: RecordKey,
        respond: Sender<Result<(), Error>>,
    },
    Record {
        scope: ScopeId,
        collection: Collection,
        key: RecordKey,
        respond: Sender<Result<Option<Record>, Error>>,
    },
    Records {
        scope: ScopeId,
        collection: Collection,
        respond: Sender<Result<Vec<(RecordKey, Record)>, Error>>,
    },
    Status {
        scope: ScopeId,
        respond: Sender<Result<SyncStatus, Error>>,
    },
    SubscribeView {
        scope: ScopeId,
        respond: Sender<Result<Subscription<ViewEvent>, Error>>,
    },
    LedgerValue {
        scope: ScopeId,
        respond: Sender<Result<u64, Error>>,
    },
    SubscribeLedger {
        scope: ScopeId,
        respond: Sender<Result<Subscription<u64>, Error>>,
    },
    LedgerIncrement {
        scope: ScopeId,
        delta: f64,
        respond: Sender<Result<u64, Error>>,
    },
    LedgerDecrement {
        scope: ScopeId,
        delta: f64,
        limits: DropLimits,
        respond: Sender<Result<u64, Error>>,
    },
    LedgerSet {
        scope: ScopeId,
        value: u64,
        respond: Sender<Result<u64, Error>>,
    },
    LedgerEnsureMinimum {
        scope: ScopeId,
        value: u64,
        respond: Sender<Result<u64, Error>>,
    },
    /// Another tab/process persisted a ledger change; no reply.
    LedgerChanged { scope: ScopeId, raw: String },
    /// Force a queue replay now; no reply.
    Flush,
    Shutdown,
}

fn stopped() -> Error {
    EngineError::Runtime {
        reason: "engine thread stopped".into(),
    }
    .into()
}

/// Client side of the engine thread. Cheap to clone; every method is a
/// synchronous request/reply over the command channel.
#[derive(Clone)]
pub struct SyncHandle {
    commands: Sender<Command>,
}

impl SyncHandle {
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T, Error> {
        let (respond, reply) = bounded(1);
        self.commands.send(make(respond)).map_err(|_| stopped())?;
        reply.recv().map_err(|_| stopped())
    }

    pub fn ensure_guest(&self) -> Result<GuestId, Error> {
        self.request(|respond| Command::EnsureGuest { respond })?
    }

    pub fn switch(
        &self,
        from: Option<ScopeId>,
        space: Space,
        auth: AuthSnapshot,
    ) -> Result<SwitchOutcome, Error> {
        self.request(|respond| Command::Switch {
            from,
            space,
            auth,
            respond,
        })?
    }

    pub fn close_scope(&self, scope: ScopeId) -> Result<bool, Error> {
        self.request(|respond| Command::CloseScope { scope, respond })
    }

    pub fn write(
        &self,
        scope: ScopeId,
        key: Option<RecordKey>,
        body: RecordBody,
    ) -> Result<RecordKey, Error> {
        self.request(|respond| Command::Write {
            scope,
            key,
            body,
            respond,
        })?
    }

    pub fn delete(
        &self,
        scope: ScopeId,
        collection: Collection,
        key: RecordKey,
    ) -> Result<(), Error> {
        self.request(|respond| Command::Delete {
            scope,
            collection,
            key,
            respond,
        })?
    }

    pub fn record(
        &self,
        scope: ScopeId,
        collection: Collection,
        key: RecordKey,
    ) -> Result<Option<Record>, Error> {
        self.request(|respond| Command::Record {
            scope,
            collection,
            key,
            respond,
        })?
    }

    pub fn records(
        &self,
        scope: ScopeId,
        collection: Collection,
    ) -> Result<Vec<(RecordKey, Record)>, Error> {
        self.request(|respond| Command::Records {
            scope,
            collection,
            respond,
        })?
    }

    pub fn status(&self, scope: ScopeId) -> Result<SyncStatus, Error> {
        self.request(|respond| Command::Status { scope, respond })?
    }

    pub fn subscribe_view(&self, scope: ScopeId) -> Result<Subscription<ViewEvent>, Error> {
        self.request(|respond| Command::SubscribeView { scope, respond })?
    }

    pub fn ledger_value(&self, scope: ScopeId) -> Result<u64, Error> {
        self.request(|respond| Command::LedgerValue { scope, respond })?
    }

    pub fn subscribe_ledger(&self, scope: ScopeId) -> Result<Subscription<u64>, Error> {
        self.request(|respond| Command::SubscribeLedger { scope, respond })?
    }

    pub fn ledger_increment(&self, scope: ScopeId, delta: f64) -> Result<u64, Error> {
        self.request(|respond| Command::LedgerIncrement {
            scope,
            delta,
            respond,
        })?
    }

    pub fn ledger_decrement(
        &self,
        scope: ScopeId,
        delta: f64,
        limits: DropLimits,
    ) -> Result<u64, Error> {
        self.request(|respond| Command::LedgerDecrement {
            scope,
            delta,
            limits,
            respond,
        })?
    }

    pub fn ledger_set(&self, scope: ScopeId, value: u64) -> Result<u64, Error> {
        self.request(|respond| Command::LedgerSet {
            scope,
            value,
            respond,
        })?
    }

    pub fn ledger_ensure_minimum(&self, scope: ScopeId, value: u64) -> Result<u64, Error> {
        self.request(|respond| Command::LedgerEnsureMinimum {
            scope,
            value,
            respond,
        })?
    }

    /// Feed in a ledger change observed from another tab's storage.
    pub fn notify_ledger_changed(&self, scope: ScopeId, raw: String) -> Result<(), Error> {
        self.commands
            .send(Command::LedgerChanged { scope, raw })
            .map_err(|_| stopped())
    }

    /// Ask for an immediate queue replay instead of waiting for the timer.
    pub fn flush(&self) -> Result<(), Error> {
        self.commands.send(Command::Flush).map_err(|_| stopped())
    }
}

/// Owns the engine thread. Dropping it shuts the thread down.
pub struct SyncRuntime {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Wire up the channels, register for connectivity, and start the
    /// engine thread.
    pub fn start(
        store: Arc<dyn NodeStore>,
        vault: Arc<dyn Vault>,
        config: Config,
    ) -> Result<Self, Error> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (ack_tx, ack_rx) = unbounded();
        let (connectivity_tx, connectivity_rx) = unbounded();
        store.watch_connectivity(connectivity_tx)?;

        let interval = Duration::from_millis(config.reconnect_interval_ms.max(1));
        let mut engine = Engine::new(store, vault, config, event_tx, ack_tx);

        let thread = std::thread::Builder::new()
            .name("tether-engine".into())
            .spawn(move || {
                let ticker = crossbeam::channel::tick(interval);
                loop {
                    crossbeam::select! {
                        recv(command_rx) -> msg => {
                            match msg {
                                Ok(Command::Shutdown) | Err(_) => break,
                                Ok(command) => dispatch(&mut engine, command),
                            }
                        }
                        recv(event_rx) -> msg => {
                            if let Ok(event) = msg {
                                engine.handle_node_event(event);
                            }
                        }
                        recv(ack_rx) -> msg => {
                            if let Ok(ack) = msg {
                                engine.handle_ack(ack);
                            }
                        }
                        recv(connectivity_rx) -> msg => {
                            if let Ok(connectivity) = msg {
                                engine.handle_connectivity(connectivity);
                            }
                        }
                        recv(ticker) -> _ => {
                            engine.tick();
                        }
                    }
                }
                tracing::debug!("engine thread stopped");
            })
            .map_err(|err| EngineError::Runtime {
                reason: format!("spawn failed: {err}"),
            })?;

        Ok(SyncRuntime {
            commands: command_tx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            commands: self.commands.clone(),
        }
    }

    /// Stop the engine thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(Command::Shutdown);
            let _ = thread.join();
        }
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(engine: &mut Engine, command: Command) {
    match command {
        Command::EnsureGuest { respond } => {
            let _ = respond.send(engine.ensure_guest());
        }
        Command::Switch {
            from,
            space,
            auth,
            respond,
        } => {
            let _ = respond.send(engine.switch(from.as_ref(), &space, &auth));
        }
        Command::CloseScope { scope, respond } => {
            let _ = respond.send(engine.close_scope(&scope));
        }
        Command::Write {
            scope,
            key,
            body,
            respond,
        } => {
            let _ = respond.send(engine.write(&scope, key, body));
        }
        Command::Delete {
            scope,
            collection,
            key,
            respond,
        } => {
            let _ = respond.send(engine.delete(&scope, collection, &key));
        }
        Command::Record {
            scope,
            collection,
            key,
            respond,
        } => {
            let _ = respond.send(engine.record(&scope, collection, &key));
        }
        Command::Records {
            scope,
            collection,
            respond,
        } => {
            let _ = respond.send(engine.records(&scope, collection));
        }
        Command::Status { scope, respond } => {
            let _ = respond.send(engine.status(&scope));
        }
        Command::SubscribeView { scope, respond } => {
            let _ = respond.send(engine.subscribe_view(&scope));
        }
        Command::LedgerValue { scope, respond } => {
            let _ = respond.send(engine.ledger_value(&scope));
        }
        Command::SubscribeLedger { scope, respond } => {
            let _ = respond.send(engine.subscribe_ledger(&scope));
        }
        Command::LedgerIncrement {
            scope,
            delta,
            respond,
        } => {
            let _ = respond.send(engine.ledger_increment(&scope, delta));
        }
        Command::LedgerDecrement {
            scope,
            delta,
            limits,
            respond,
        } => {
            let _ = respond.send(engine.ledger_decrement(&scope, delta, limits));
        }
        Command::LedgerSet {
            scope,
            value,
            respond,
        } => {
            let _ = respond.send(engine.ledger_set(&scope, value));
        }
        Command::LedgerEnsureMinimum {
            scope,
            value,
            respond,
        } => {
            let _ = respond.send(engine.ledger_ensure_minimum(&scope, value));
        }
        Command::LedgerChanged { scope, raw } => {
            engine.handle_external_ledger_change(&scope, &raw);
        }
        Command::Flush => {
            engine.flush_all();
        }
        Command::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::remote::MemoryStore;
    use crate::vault::MemoryVault;

    fn expense(amount: f64) -> RecordBody {
        RecordBody::Expense {
            category: "Transport".into(),
            amount,
            note: None,
        }
    }

    fn wait_for_synced(sub: &Subscription<ViewEvent>) {
        for _ in 0..50 {
            match sub.recv_timeout(Duration::from_secs(2)) {
                Ok(ViewEvent::Status(SyncStatus::Synced)) => return,
                Ok(_) => continue,
                Err(err) => panic!("no status event: {err}"),
            }
        }
        panic!("never reached synced");
    }

    #[test]
    fn round_trips_a_write_through_the_thread() {
        let store = MemoryStore::new();
        let runtime = SyncRuntime::start(
            Arc::new(store),
            Arc::new(MemoryVault::new()),
            Config::default(),
        )
        .unwrap();
        let handle = runtime.handle();

        let outcome = handle
            .switch(None, Space::Public, AuthSnapshot::Anonymous)
            .unwrap();
        let scope = outcome.scope.unwrap();
        let sub = handle.subscribe_view(scope.clone()).unwrap();
        // Drain the seeded status so the wait below sees the post-write one.
        assert_eq!(
            sub.recv_timeout(Duration::from_secs(2)).unwrap(),
            ViewEvent::Status(SyncStatus::Synced)
        );

        let key = handle.write(scope.clone(), None, expense(3.5)).unwrap();
        wait_for_synced(&sub);

        let record = handle
            .record(scope.clone(), Collection::Expenses, key)
            .unwrap()
            .unwrap();
        match record.body {
            RecordBody::Expense { amount, .. } => assert_eq!(amount, 3.5),
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(handle.status(scope).unwrap(), SyncStatus::Synced);
        runtime.shutdown();
    }

    #[test]
    fn ledger_commands_round_trip() {
        let runtime = SyncRuntime::start(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryVault::new()),
            Config::default(),
        )
        .unwrap();
        let handle = runtime.handle();
        let scope = handle
            .switch(None, Space::Public, AuthSnapshot::Anonymous)
            .unwrap()
            .scope
            .unwrap();

        assert_eq!(handle.ledger_increment(scope.clone(), 20.0).unwrap(), 20);
        assert_eq!(
            handle
                .ledger_decrement(scope.clone(), 5.0, DropLimits::default())
                .unwrap(),
            15
        );
        assert_eq!(handle.ledger_ensure_minimum(scope.clone(), 40).unwrap(), 40);
        assert_eq!(handle.ledger_value(scope).unwrap(), 40);
    }

    #[test]
    fn handle_reports_stopped_runtime() {
        let runtime = SyncRuntime::start(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryVault::new()),
            Config::default(),
        )
        .unwrap();
        let handle = runtime.handle();
        runtime.shutdown();

        let err = handle
            .switch(None, Space::Public, AuthSnapshot::Anonymous)
            .unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::Runtime { .. })));
    }
}
