//! Fan-out of view and ledger changes to local subscribers.
//!
//! Each subscriber gets its own bounded channel. A subscriber that stops
//! draining is dropped with a recorded reason rather than blocking the
//! engine; live data can always be re-seeded by subscribing again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    SubscriberLagged,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("broadcaster lock poisoned")]
    LockPoisoned,
}

impl BroadcastError {
    pub fn transience(&self) -> crate::error::Transience {
        crate::error::Transience::Permanent
    }

    pub fn effect(&self) -> crate::error::Effect {
        crate::error::Effect::None
    }
}

/// Receiving end of one subscription. Dropping it unsubscribes implicitly:
/// the broadcaster prunes the dead channel on its next publish.
pub struct Subscription<T> {
    receiver: Receiver<T>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl<T> Subscription<T> {
    pub fn recv(&self) -> Result<T, crossbeam::channel::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<T, crossbeam::channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn iter_pending(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.try_iter()
    }

    /// Why this subscription was dropped by the broadcaster, if it was.
    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().ok().and_then(|guard| *guard)
    }
}

pub struct Broadcaster<T> {
    inner: Arc<Mutex<BroadcasterState<T>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BroadcasterState<T> {
    max_subscribers: usize,
    capacity: usize,
    next_subscriber_id: u64,
    subscribers: BTreeMap<u64, SubscriberState<T>>,
}

struct SubscriberState<T> {
    sender: Sender<T>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl<T> SubscriberState<T> {
    fn set_drop_reason(&self, reason: DropReason) {
        if let Ok(mut guard) = self.drop_reason.lock()
            && guard.is_none()
        {
            *guard = Some(reason);
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    pub fn new(max_subscribers: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BroadcasterState {
                max_subscribers,
                capacity: capacity.max(1),
                next_subscriber_id: 1,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// Register a subscriber. `seed` is delivered before any later publish,
    /// so new subscribers observe the current state first.
    pub fn subscribe(&self, seed: Option<T>) -> Result<Subscription<T>, BroadcastError> {
        let mut state = self.lock_state()?;
        if state.subscribers.len() >= state.max_subscribers {
            return Err(BroadcastError::SubscriberLimitReached {
                max_subscribers: state.max_subscribers,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(state.capacity);
        if let Some(seed) = seed {
            let _ = sender.try_send(seed);
        }
        let drop_reason = Arc::new(Mutex::new(None));
        let id = state.next_subscriber_id;
        state.next_subscriber_id = state.next_subscriber_id.saturating_add(1);
        state.subscribers.insert(
            id,
            SubscriberState {
                sender,
                drop_reason: Arc::clone(&drop_reason),
            },
        );

        Ok(Subscription {
            receiver,
            drop_reason,
        })
    }

    pub fn publish(&self, value: T) -> Result<(), BroadcastError> {
        let mut state = self.lock_state()?;
        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            match subscriber.sender.try_send(value.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    subscriber.set_drop_reason(DropReason::SubscriberLagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => {
                    dropped.push(*id);
                }
            }
        }
        for id in dropped {
            state.subscribers.remove(&id);
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> Result<usize, BroadcastError> {
        Ok(self.lock_state()?.subscribers.len())
    }

    fn lock_state(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BroadcasterState<T>>, BroadcastError> {
        self.inner.lock().map_err(|_| BroadcastError::LockPoisoned)
    }
}
