//! Value cache and render-batching dispatcher.
//!
//! Decoded updates are never delivered synchronously. They are staged and
//! delivered on the next render tick, at most once per index:
//!
//! ```text
//! frame ──► stage(i, v1) ─┐
//! frame ──► stage(i, v2) ─┼─► pending {i: v3} ──tick──► flush ──► cache[i] = v3
//! local ──► stage(i, v3) ─┘                                  └──► subscribers(i)
//! ```
//!
//! The tick guard coalesces requests: any number of [`Dispatcher::request_tick`]
//! calls between two ticks arm exactly one tick.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::VariableIndex;
use crate::protocol::HmiValue;

use super::registry::SubscriptionRegistry;
use super::widget::Effects;

// ============================================================================
// ValueCache
// ============================================================================

/// Last confirmed value per index.
///
/// Only the dispatcher writes here, and only on flush. Outgoing set
/// commands never touch the cache.
#[derive(Debug, Default, Clone)]
pub struct ValueCache {
    values: FxHashMap<VariableIndex, HmiValue>,
}

impl ValueCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value of an index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: VariableIndex) -> Option<&HmiValue> {
        self.values.get(&index)
    }

    /// Stores a value, returning the previous one.
    pub fn insert(&mut self, index: VariableIndex, value: HmiValue) -> Option<HmiValue> {
        self.values.insert(index, value)
    }

    /// Returns the number of cached indexes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every cached value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Pending update buffer plus the render tick guard.
#[derive(Debug, Default)]
pub struct Dispatcher {
    /// Latest staged value per index.
    pending: FxHashMap<VariableIndex, HmiValue>,
    /// First-arrival order of staged indexes.
    order: Vec<VariableIndex>,
    /// A tick is armed and has not started yet.
    tick_requested: bool,
}

impl Dispatcher {
    /// Creates an idle dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an update for the next flush and arms a tick.
    ///
    /// A later stage of the same index replaces the earlier value.
    pub fn stage(&mut self, index: VariableIndex, value: HmiValue) {
        if self.pending.insert(index, value).is_none() {
            self.order.push(index);
        }
        self.request_tick();
    }

    /// Arms a tick. Returns `true` if this call armed it.
    pub fn request_tick(&mut self) -> bool {
        let armed = !self.tick_requested;
        self.tick_requested = true;
        armed
    }

    /// Returns `true` if a tick is armed.
    #[inline]
    #[must_use]
    pub fn is_tick_requested(&self) -> bool {
        self.tick_requested
    }

    /// Clears the guard at the start of a tick.
    ///
    /// Returns whether a tick was actually requested.
    pub fn begin_tick(&mut self) -> bool {
        std::mem::replace(&mut self.tick_requested, false)
    }

    /// Returns `true` if updates are staged.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.order.is_empty()
    }

    /// Returns the staged value of an index.
    #[inline]
    #[must_use]
    pub fn pending(&self, index: VariableIndex) -> Option<&HmiValue> {
        self.pending.get(&index)
    }

    /// Delivers every staged update.
    ///
    /// For each index, the cache is updated and each current subscriber
    /// is called once with the new and previous value. Returns the number
    /// of indexes delivered.
    pub fn flush(
        &mut self,
        cache: &mut ValueCache,
        registry: &SubscriptionRegistry,
        effects: &mut Effects,
    ) -> usize {
        let order = std::mem::take(&mut self.order);
        let mut delivered = 0;

        for index in order {
            let Some(value) = self.pending.remove(&index) else {
                continue;
            };
            let old = cache.insert(index, value.clone());

            for subscriber in registry.subscribers(index) {
                subscriber.new_hmi_value(index, &value, old.as_ref(), effects);
            }
            delivered += 1;
        }

        if delivered > 0 {
            trace!(count = delivered, "Flushed staged updates");
        }

        delivered
    }
}

// ============================================================================
// Tests
// ============================================================================
