//! Subscription registry.
//!
//! Tracks which subscribers want which variables and the polling period
//! last acknowledged to the controller, and turns interest changes into
//! the minimal set of `Subscribe` commands.
//!
//! # Period Rule
//!
//! For an index with subscribers, the period is `1000 / max(frequency)`
//! over subscribers declaring a frequency. The fastest subscriber wins;
//! periods are never averaged. With no declared frequency, or no
//! subscriber at all, the period is 0.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::identifiers::{SubscriberId, VariableIndex};
use crate::protocol::Command;

use super::widget::Subscriber;

// ============================================================================
// SubscriptionEntry
// ============================================================================

/// Interest in one index.
///
/// Created lazily on first subscribe and never removed: an entry whose
/// subscriber set empties stays idle until its period is reset to 0.
#[derive(Default)]
pub struct SubscriptionEntry {
    /// Interested subscribers.
    subscribers: FxHashMap<SubscriberId, Arc<dyn Subscriber>>,
    /// Period last announced to the controller, in milliseconds.
    period_ms: u16,
}

impl SubscriptionEntry {
    /// Returns the acknowledged period.
    #[inline]
    #[must_use]
    pub fn period_ms(&self) -> u16 {
        self.period_ms
    }

    /// Returns the number of subscribers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if no subscriber is interested.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Computes the period implied by the current subscriber set.
    #[must_use]
    pub fn wanted_period_ms(&self) -> u16 {
        let max_frequency = self
            .subscribers
            .values()
            .map(|s| s.frequency())
            .filter(|f| f.is_finite() && *f > 0.0)
            .fold(0.0_f64, f64::max);

        period_for_frequency(max_frequency)
    }
}

/// Converts a frequency in Hz into a polling period in milliseconds.
///
/// Non-positive frequencies mean best effort (0). Positive frequencies
/// never round down to 0, which would read as an unsubscribe.
#[must_use]
pub fn period_for_frequency(frequency: f64) -> u16 {
    if frequency <= 0.0 || !frequency.is_finite() {
        return 0;
    }
    let period = (1000.0 / frequency).trunc();
    period.clamp(1.0, f64::from(u16::MAX)) as u16
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Per-index subscriber sets and acknowledged periods.
///
/// Entries are ordered by index so delta commands come out in index order.
pub struct SubscriptionRegistry {
    entries: BTreeMap<VariableIndex, SubscriptionEntry>,
    last_remote_index: VariableIndex,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    ///
    /// Indexes above `last_remote_index` never generate wire traffic.
    #[must_use]
    pub fn new(last_remote_index: VariableIndex) -> Self {
        Self {
            entries: BTreeMap::new(),
            last_remote_index,
        }
    }

    /// Adds a subscriber to an index.
    pub fn subscribe(&mut self, index: VariableIndex, subscriber: Arc<dyn Subscriber>) {
        self.entries
            .entry(index)
            .or_default()
            .subscribers
            .insert(subscriber.id(), subscriber);
    }

    /// Removes a subscriber from an index. The entry itself stays.
    pub fn unsubscribe(&mut self, index: VariableIndex, id: SubscriberId) {
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.subscribers.remove(&id);
        }
    }

    /// Returns the subscribers of an index.
    #[must_use]
    pub fn subscribers(&self, index: VariableIndex) -> Vec<Arc<dyn Subscriber>> {
        self.entries
            .get(&index)
            .map(|e| e.subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Finds a subscriber by id across all indexes.
    #[must_use]
    pub fn find(&self, id: SubscriberId) -> Option<Arc<dyn Subscriber>> {
        self.entries
            .values()
            .find_map(|e| e.subscribers.get(&id).cloned())
    }

    /// Returns the entry of an index, if one was ever created.
    #[inline]
    #[must_use]
    pub fn entry(&self, index: VariableIndex) -> Option<&SubscriptionEntry> {
        self.entries.get(&index)
    }

    /// Returns the acknowledged period of an index (0 if none).
    #[inline]
    #[must_use]
    pub fn period_ms(&self, index: VariableIndex) -> u16 {
        self.entries.get(&index).map_or(0, |e| e.period_ms)
    }

    /// Returns the remote/local boundary.
    #[inline]
    #[must_use]
    pub fn last_remote_index(&self) -> VariableIndex {
        self.last_remote_index
    }

    /// Returns `true` if the index lives on the controller.
    #[inline]
    #[must_use]
    pub fn is_remote(&self, index: VariableIndex) -> bool {
        index <= self.last_remote_index
    }

    /// Forgets every acknowledged period.
    ///
    /// The next [`recompute_deltas`](Self::recompute_deltas) then announces
    /// every active subscription again.
    pub fn reset_periods(&mut self) {
        for entry in self.entries.values_mut() {
            entry.period_ms = 0;
        }
    }

    /// Computes the subscribe/unsubscribe commands needed to match interest.
    ///
    /// Acknowledged periods are updated for every changed index, local
    /// ones included, but only remote indexes produce commands. Calling
    /// this twice without an interest change yields nothing the second time.
    pub fn recompute_deltas(&mut self) -> Vec<Command> {
        let mut delta = Vec::new();

        for (&index, entry) in &mut self.entries {
            let wanted = entry.wanted_period_ms();
            if wanted == entry.period_ms {
                continue;
            }

            entry.period_ms = wanted;
            if index <= self.last_remote_index {
                delta.push(Command::subscribe(index, wanted));
            }
        }

        if !delta.is_empty() {
            debug!(count = delta.len(), "Subscription delta computed");
        }

        delta
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::HmiValue;
    use crate::session::widget::Effects;

    struct Probe {
        id: SubscriberId,
        frequency: f64,
    }

    impl Probe {
        fn new(frequency: f64) -> Arc<dyn Subscriber> {
            Arc::new(Self {
                id: SubscriberId::next(),
                frequency,
            })
        }
    }

    impl Subscriber for Probe {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn frequency(&self) -> f64 {
            self.frequency
        }

        fn new_hmi_value(
            &self,
            _index: VariableIndex,
            _value: &HmiValue,
            _old: Option<&HmiValue>,
            _effects: &mut Effects,
        ) {
        }
    }

    fn idx(raw: u32) -> VariableIndex {
        VariableIndex::new(raw)
    }

    #[test]
    fn test_max_frequency_wins() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        for f in [5.0, 2.0, 10.0] {
            registry.subscribe(idx(1), Probe::new(f));
        }

        let delta = registry.recompute_deltas();
        assert_eq!(delta, vec![Command::subscribe(idx(1), 100)]);
        assert_eq!(registry.period_ms(idx(1)), 100);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        registry.subscribe(idx(4), Probe::new(1.0));
        registry.subscribe(idx(2), Probe::new(4.0));

        let first = registry.recompute_deltas();
        assert_eq!(
            first,
            vec![Command::subscribe(idx(2), 250), Command::subscribe(idx(4), 1000)]
        );
        assert!(registry.recompute_deltas().is_empty());
    }

    #[test]
    fn test_no_declared_frequency_is_best_effort() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        registry.subscribe(idx(1), Probe::new(0.0));

        assert!(registry.recompute_deltas().is_empty());
        assert_eq!(registry.period_ms(idx(1)), 0);
    }

    #[test]
    fn test_empty_set_unsubscribes() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let probe = Probe::new(2.0);
        registry.subscribe(idx(3), Arc::clone(&probe));
        registry.recompute_deltas();

        registry.unsubscribe(idx(3), probe.id());
        assert_eq!(registry.recompute_deltas(), vec![Command::subscribe(idx(3), 0)]);
        assert!(registry.entry(idx(3)).is_some_and(SubscriptionEntry::is_empty));
    }

    #[test]
    fn test_local_indexes_stay_off_the_wire() {
        let mut registry = SubscriptionRegistry::new(idx(10));
        registry.subscribe(idx(11), Probe::new(5.0));

        assert!(registry.recompute_deltas().is_empty());
        assert_eq!(registry.period_ms(idx(11)), 200);
        assert!(!registry.is_remote(idx(11)));
    }

    #[test]
    fn test_reset_periods_replays_everything() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        registry.subscribe(idx(1), Probe::new(1.0));
        registry.recompute_deltas();

        registry.reset_periods();
        assert_eq!(registry.recompute_deltas(), vec![Command::subscribe(idx(1), 1000)]);
    }

    #[test]
    fn test_resubscribing_same_handle_is_a_set() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let probe = Probe::new(1.0);
        registry.subscribe(idx(1), Arc::clone(&probe));
        registry.subscribe(idx(1), Arc::clone(&probe));
        assert_eq!(registry.subscribers(idx(1)).len(), 1);
        assert!(registry.find(probe.id()).is_some());
    }

    #[test]
    fn test_period_for_frequency_bounds() {
        assert_eq!(period_for_frequency(0.0), 0);
        assert_eq!(period_for_frequency(-1.0), 0);
        assert_eq!(period_for_frequency(3.0), 333);
        assert_eq!(period_for_frequency(5000.0), 1);
        assert_eq!(period_for_frequency(0.001), u16::MAX);
    }
}
