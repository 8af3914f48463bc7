//! Scoped numeric ledger: one non-negative integer per scope.
//!
//! Backs points/balance style features. The value is persisted to the
//! vault on every change and fanned out to local subscribers; a change
//! observed from another tab is folded in without re-persisting, so two
//! tabs never ping-pong writes at each other.

use crate::core::scope::ScopeId;
use crate::core::time::Millis;
use crate::limits::SyncLimits;
use crate::vault::{get_json, put_json, Vault, VaultError};

use super::broadcast::{BroadcastError, Broadcaster, Subscription};

/// Limits for one clamped decrement.
///
/// `max_drop` caps how much a single call may remove; `floor` is the
/// lowest value the call may leave behind. The two compose: the drop is
/// capped first, then the result is floored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DropLimits {
    pub floor: u64,
    /// `None` means the full requested delta may be dropped.
    pub max_drop: Option<u64>,
}

impl Default for DropLimits {
    fn default() -> Self {
        Self {
            floor: 0,
            max_drop: None,
        }
    }
}

/// Round a requested delta to whole ledger units.
///
/// Fractional deltas round to the nearest unit. `None` means the delta is
/// a no-op: zero, rounds to zero, or not finite.
fn round_units(delta: f64) -> Option<u64> {
    if !delta.is_finite() {
        return None;
    }
    let units = delta.abs().round();
    if units == 0.0 {
        return None;
    }
    Some(units as u64)
}

/// Pure increment step. `None` means nothing changes.
///
/// A negative delta moves the value down, saturating at zero; the ledger
/// never goes negative.
pub fn apply_increment(current: u64, delta: f64) -> Option<u64> {
    let units = round_units(delta)?;
    Some(if delta > 0.0 {
        current.saturating_add(units)
    } else {
        current.saturating_sub(units)
    })
}

/// Pure clamped-drop step: `max(floor, current - min(|delta|, max_drop))`.
pub fn apply_drop(current: u64, delta: f64, limits: DropLimits) -> u64 {
    let Some(requested) = round_units(delta) else {
        return current;
    };
    let applied = requested.min(limits.max_drop.unwrap_or(requested));
    current.saturating_sub(applied).max(limits.floor)
}

pub struct Ledger {
    scope: ScopeId,
    value: u64,
    broadcaster: Broadcaster<u64>,
}

impl Ledger {
    fn vault_key(scope: &ScopeId) -> String {
        format!("ledger/{scope}")
    }

    /// Load the persisted value for `scope`; a missing or unreadable entry
    /// degrades to zero with a warning.
    pub fn load_or_default(vault: &dyn Vault, scope: ScopeId, limits: &SyncLimits) -> Self {
        let value = match get_json::<u64>(vault, &Self::vault_key(&scope)) {
            Ok(Some(value)) => value,
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(scope = %scope, error = %err, "ledger value unreadable, starting at zero");
                0
            }
        };
        Self {
            scope,
            value,
            broadcaster: Broadcaster::new(
                limits.max_value_subscribers,
                limits.subscriber_queue_events,
            ),
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Add `delta` units. Non-finite and zero deltas are no-ops.
    pub fn increment(
        &mut self,
        vault: &dyn Vault,
        delta: f64,
        wall: Millis,
    ) -> Result<u64, VaultError> {
        match apply_increment(self.value, delta) {
            Some(next) => self.commit(vault, next, wall),
            None => Ok(self.value),
        }
    }

    /// Remove up to `delta` units, clamped by `limits`.
    pub fn decrement(
        &mut self,
        vault: &dyn Vault,
        delta: f64,
        limits: DropLimits,
        wall: Millis,
    ) -> Result<u64, VaultError> {
        let next = apply_drop(self.value, delta, limits);
        self.commit(vault, next, wall)
    }

    pub fn set(&mut self, vault: &dyn Vault, value: u64, wall: Millis) -> Result<u64, VaultError> {
        self.commit(vault, value, wall)
    }

    /// Raise the value to at least `value`; never lowers it.
    pub fn ensure_minimum(
        &mut self,
        vault: &dyn Vault,
        value: u64,
        wall: Millis,
    ) -> Result<u64, VaultError> {
        self.commit(vault, self.value.max(value), wall)
    }

    /// Fold in a value another tab persisted. Notifies local subscribers
    /// but does not write back, so observation never echoes.
    pub fn observe_external(&mut self, value: u64) {
        if value == self.value {
            return;
        }
        self.value = value;
        self.notify(value);
    }

    /// Subscribe to value changes; the current value arrives first.
    pub fn subscribe(&self) -> Result<Subscription<u64>, BroadcastError> {
        self.broadcaster.subscribe(Some(self.value))
    }

    fn commit(&mut self, vault: &dyn Vault, next: u64, wall: Millis) -> Result<u64, VaultError> {
        if next == self.value {
            return Ok(self.value);
        }
        // Persist before notifying; a failed write leaves the value as-is.
        put_json(vault, &Self::vault_key(&self.scope), &next, wall)?;
        self.value = next;
        self.notify(next);
        Ok(next)
    }

    fn notify(&self, value: u64) {
        if let Err(err) = self.broadcaster.publish(value) {
            tracing::warn!(scope = %self.scope, error = %err, "ledger subscribers unreachable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::PartitionPath;
    use crate::vault::MemoryVault;

    fn scope() -> ScopeId {
        ScopeId::from_partition(&PartitionPath::shared("public"))
    }

    fn ledger(vault: &MemoryVault) -> Ledger {
        Ledger::load_or_default(vault, scope(), &SyncLimits::default())
    }

    #[test]
    fn decrements_clamp_at_the_default_floor() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        ledger.set(&vault, 20, Millis(1)).unwrap();

        assert_eq!(
            ledger
                .decrement(&vault, 5.0, DropLimits::default(), Millis(2))
                .unwrap(),
            15
        );
        assert_eq!(
            ledger
                .decrement(&vault, 40.0, DropLimits::default(), Millis(3))
                .unwrap(),
            0
        );
    }

    #[test]
    fn bounded_drop_respects_max_drop_before_floor() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        ledger.set(&vault, 50, Millis(1)).unwrap();

        let result = ledger
            .decrement(
                &vault,
                20.0,
                DropLimits {
                    floor: 10,
                    max_drop: Some(6),
                },
                Millis(2),
            )
            .unwrap();
        assert_eq!(result, 44);
    }

    #[test]
    fn non_finite_and_zero_deltas_change_nothing() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        ledger.set(&vault, 7, Millis(1)).unwrap();
        let sub = ledger.subscribe().unwrap();
        assert_eq!(sub.try_recv().unwrap(), 7);

        for delta in [0.0, 0.2, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            ledger.increment(&vault, delta, Millis(2)).unwrap();
        }
        assert_eq!(ledger.value(), 7);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn fractional_deltas_round_to_whole_units() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        assert_eq!(ledger.increment(&vault, 12.5, Millis(1)).unwrap(), 13);
        assert_eq!(
            ledger
                .decrement(&vault, 2.4, DropLimits::default(), Millis(2))
                .unwrap(),
            11
        );
    }

    #[test]
    fn value_survives_reload() {
        let vault = MemoryVault::new();
        {
            let mut ledger = ledger(&vault);
            ledger.increment(&vault, 42.0, Millis(1)).unwrap();
        }
        let reloaded = ledger(&vault);
        assert_eq!(reloaded.value(), 42);
    }

    #[test]
    fn unreadable_value_degrades_to_zero() {
        let vault = MemoryVault::new();
        put_json(&vault, &Ledger::vault_key(&scope()), &"forty-two", Millis(1)).unwrap();
        assert_eq!(ledger(&vault).value(), 0);
    }

    #[test]
    fn external_observation_notifies_without_persisting() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        let sub = ledger.subscribe().unwrap();
        assert_eq!(sub.try_recv().unwrap(), 0);

        ledger.observe_external(99);
        assert_eq!(sub.try_recv().unwrap(), 99);
        assert_eq!(ledger.value(), 99);
        // Nothing was written back.
        assert!(vault.keys().unwrap().is_empty());
    }

    #[test]
    fn ensure_minimum_never_lowers() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        ledger.set(&vault, 30, Millis(1)).unwrap();

        assert_eq!(ledger.ensure_minimum(&vault, 10, Millis(2)).unwrap(), 30);
        assert_eq!(ledger.ensure_minimum(&vault, 55, Millis(3)).unwrap(), 55);
    }

    #[test]
    fn subscribers_see_each_committed_change() {
        let vault = MemoryVault::new();
        let mut ledger = ledger(&vault);
        let sub = ledger.subscribe().unwrap();
        assert_eq!(sub.try_recv().unwrap(), 0);

        ledger.increment(&vault, 3.0, Millis(1)).unwrap();
        ledger
            .decrement(&vault, 1.0, DropLimits::default(), Millis(2))
            .unwrap();

        assert_eq!(sub.try_recv().unwrap(), 3);
        assert_eq!(sub.try_recv().unwrap(), 2);
    }
}
