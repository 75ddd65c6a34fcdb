//! Widget capability traits and deferred effects.
//!
//! The rendering layer is external. It participates through two small
//! capabilities:
//!
//! | Trait | Role | Called by |
//! |-------|------|-----------|
//! | [`Subscriber`] | Receives value updates, declares a frequency | Dispatcher flush |
//! | [`PageWidget`] | Attaches/detaches interest when its page is entered/left | Navigator |
//!
//! Callbacks never touch session state directly. They push [`Effect`]s
//! into an [`Effects`] queue which the session drains after the callback
//! returns, so a subscriber can trigger writes or page switches without
//! re-entering the dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::identifiers::{SubscriberId, VariableIndex};
use crate::protocol::HmiValue;

use super::dispatcher::ValueCache;
use super::expression::eval_operation;
use super::navigation::PageTarget;
use super::registry::SubscriptionRegistry;

// ============================================================================
// Capability Traits
// ============================================================================

/// Something interested in variable updates.
pub trait Subscriber: Send + Sync {
    /// Stable handle identifying this subscriber in subscription sets.
    fn id(&self) -> SubscriberId;

    /// Requested update frequency in Hz, 0 for best effort.
    fn frequency(&self) -> f64 {
        0.0
    }

    /// Called once per flush for each updated index this subscriber follows.
    fn new_hmi_value(
        &self,
        index: VariableIndex,
        value: &HmiValue,
        old: Option<&HmiValue>,
        effects: &mut Effects,
    );

    /// Called once on the tick after [`Effects::request_animation`].
    fn animate(&self, _effects: &mut Effects) {}
}

/// Something belonging to a page.
pub trait PageWidget: Send + Sync {
    /// Registers interest, shifting relative indexes by `offset` when
    /// `relativeness` is set.
    fn sub(
        &self,
        registry: &mut SubscriptionRegistry,
        offset: i64,
        relativeness: bool,
        container_id: &str,
    );

    /// Withdraws every interest registered by the last [`sub`](Self::sub).
    fn unsub(&self, registry: &mut SubscriptionRegistry);

    /// Runs page-entry default assignments.
    fn assign(&self, _cache: &ValueCache, _effects: &mut Effects) {}
}

// ============================================================================
// Effects
// ============================================================================

/// Deferred side effect requested by a widget callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a value (remote set or local apply depending on the index).
    ApplyValue {
        /// Target index.
        index: VariableIndex,
        /// New value.
        value: HmiValue,
    },

    /// Navigate. `None` re-enters the current page.
    SwitchPage {
        /// Destination.
        target: Option<PageTarget>,
        /// Use the cross-fade sequence.
        fade: bool,
    },

    /// Run a subscriber's animation on the next tick.
    Animate(SubscriberId),

    /// Tell the rendering layer which language number is active.
    Language(usize),
}

/// Queue of effects collected during one callback round.
#[derive(Debug, Default)]
pub struct Effects {
    queue: Vec<Effect>,
}

impl Effects {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a value write.
    pub fn apply_value(&mut self, index: VariableIndex, value: HmiValue) {
        self.queue.push(Effect::ApplyValue { index, value });
    }

    /// Requests an immediate page switch.
    pub fn switch_page(&mut self, target: Option<PageTarget>) {
        self.queue.push(Effect::SwitchPage {
            target,
            fade: false,
        });
    }

    /// Requests a fading page switch.
    pub fn fading_switch(&mut self, target: PageTarget) {
        self.queue.push(Effect::SwitchPage {
            target: Some(target),
            fade: true,
        });
    }

    /// Requests an animation callback on the next tick.
    pub fn request_animation(&mut self, id: SubscriberId) {
        self.queue.push(Effect::Animate(id));
    }

    /// Announces the active language number.
    pub fn language(&mut self, number: usize) {
        self.queue.push(Effect::Language(number));
    }

    /// Returns `true` if nothing was requested.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the queued effects without draining them.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Effect] {
        &self.queue
    }

    /// Takes every queued effect, in request order.
    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.queue)
    }
}

// ============================================================================
// BoundWidget
// ============================================================================

/// An index a widget follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBinding {
    /// Index as declared for the page's default sub-index.
    pub index: VariableIndex,
    /// Shift by the page offset when the page is entered relatively.
    pub relative: bool,
}

impl IndexBinding {
    /// Creates an absolute binding.
    #[inline]
    #[must_use]
    pub fn absolute(index: VariableIndex) -> Self {
        Self {
            index,
            relative: false,
        }
    }

    /// Creates a page-relative binding.
    #[inline]
    #[must_use]
    pub fn relative(index: VariableIndex) -> Self {
        Self {
            index,
            relative: true,
        }
    }

    /// Resolves the binding for a page entry.
    #[must_use]
    pub fn resolve(self, offset: i64, relativeness: bool) -> Option<VariableIndex> {
        if self.relative && relativeness {
            self.index.offset_by(offset)
        } else {
            Some(self.index)
        }
    }
}

#[derive(Debug, Default)]
struct BoundState {
    resolved: Vec<VariableIndex>,
    offset: i64,
    relativeness: bool,
    container_id: String,
}

/// Generic [`PageWidget`] subscribing a [`Subscriber`] to a list of bindings.
///
/// Page-entry assignments are `(binding, expression)` pairs evaluated
/// against the cache, see [`eval_operation`].
pub struct BoundWidget {
    subscriber: Arc<dyn Subscriber>,
    bindings: Vec<IndexBinding>,
    assignments: Vec<(IndexBinding, String)>,
    state: Mutex<BoundState>,
}

impl BoundWidget {
    /// Creates a widget following `bindings`.
    #[must_use]
    pub fn new(subscriber: Arc<dyn Subscriber>, bindings: Vec<IndexBinding>) -> Self {
        Self {
            subscriber,
            bindings,
            assignments: Vec::new(),
            state: Mutex::new(BoundState::default()),
        }
    }

    /// Adds a page-entry assignment.
    #[must_use]
    pub fn with_assignment(mut self, binding: IndexBinding, expression: impl Into<String>) -> Self {
        self.assignments.push((binding, expression.into()));
        self
    }

    /// Returns the wrapped subscriber.
    #[inline]
    #[must_use]
    pub fn subscriber(&self) -> &Arc<dyn Subscriber> {
        &self.subscriber
    }

    /// Returns the indexes currently subscribed.
    #[must_use]
    pub fn resolved_indexes(&self) -> Vec<VariableIndex> {
        self.state.lock().resolved.clone()
    }

    /// Returns the container id of the last entry.
    #[must_use]
    pub fn container_id(&self) -> String {
        self.state.lock().container_id.clone()
    }
}

impl PageWidget for BoundWidget {
    fn sub(
        &self,
        registry: &mut SubscriptionRegistry,
        offset: i64,
        relativeness: bool,
        container_id: &str,
    ) {
        let mut state = self.state.lock();
        state.resolved.clear();

        for binding in &self.bindings {
            let Some(index) = binding.resolve(offset, relativeness) else {
                trace!(index = %binding.index, offset, "Binding shifted out of range");
                continue;
            };
            registry.subscribe(index, Arc::clone(&self.subscriber));
            state.resolved.push(index);
        }

        state.offset = offset;
        state.relativeness = relativeness;
        state.container_id = container_id.to_string();
    }

    fn unsub(&self, registry: &mut SubscriptionRegistry) {
        let mut state = self.state.lock();
        let id = self.subscriber.id();
        for index in state.resolved.drain(..) {
            registry.unsubscribe(index, id);
        }
    }

    fn assign(&self, cache: &ValueCache, effects: &mut Effects) {
        let (offset, relativeness) = {
            let state = self.state.lock();
            (state.offset, state.relativeness)
        };

        for (binding, expression) in &self.assignments {
            let Some(index) = binding.resolve(offset, relativeness) else {
                continue;
            };
            if let Some(value) = eval_operation(cache.get(index), expression) {
                effects.apply_value(index, value);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(SubscriberId);

    impl Subscriber for Probe {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn frequency(&self) -> f64 {
            2.0
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

    fn widget() -> BoundWidget {
        BoundWidget::new(
            Arc::new(Probe(SubscriberId::next())),
            vec![IndexBinding::absolute(idx(5)), IndexBinding::relative(idx(20))],
        )
    }

    #[test]
    fn test_relative_bindings_follow_offset() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let w = widget();

        w.sub(&mut registry, 3, true, "Motor3");
        assert_eq!(w.resolved_indexes(), vec![idx(5), idx(23)]);
        assert_eq!(w.container_id(), "Motor3");
        assert_eq!(registry.subscribers(idx(23)).len(), 1);
    }

    #[test]
    fn test_relativeness_off_ignores_offset() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let w = widget();

        w.sub(&mut registry, 3, false, "Motor");
        assert_eq!(w.resolved_indexes(), vec![idx(5), idx(20)]);
    }

    #[test]
    fn test_unsub_withdraws_everything() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let w = widget();

        w.sub(&mut registry, 1, true, "Motor1");
        w.unsub(&mut registry);
        assert!(w.resolved_indexes().is_empty());
        assert!(registry.subscribers(idx(5)).is_empty());
        assert!(registry.subscribers(idx(21)).is_empty());
    }

    #[test]
    fn test_assign_evaluates_against_cache() {
        let mut registry = SubscriptionRegistry::new(idx(100));
        let mut cache = ValueCache::new();
        cache.insert(idx(22), HmiValue::Int(10));

        let w = widget()
            .with_assignment(IndexBinding::relative(idx(20)), "+5")
            .with_assignment(IndexBinding::absolute(idx(5)), "='on'")
            .with_assignment(IndexBinding::absolute(idx(6)), "+");
        w.sub(&mut registry, 2, true, "Motor2");

        let mut effects = Effects::new();
        w.assign(&cache, &mut effects);
        assert_eq!(
            effects.drain(),
            vec![
                Effect::ApplyValue {
                    index: idx(22),
                    value: HmiValue::Int(15)
                },
                Effect::ApplyValue {
                    index: idx(5),
                    value: HmiValue::from("on")
                },
            ]
        );
    }

    #[test]
    fn test_negative_offset_out_of_range_is_skipped() {
        assert_eq!(IndexBinding::relative(idx(2)).resolve(-5, true), None);
        assert_eq!(IndexBinding::absolute(idx(2)).resolve(-5, true), Some(idx(2)));
    }

    #[test]
    fn test_effects_queue_order() {
        let mut effects = Effects::new();
        effects.apply_value(idx(1), HmiValue::Int(1));
        effects.switch_page(None);
        effects.language(2);
        assert_eq!(effects.as_slice().len(), 3);
        let drained = effects.drain();
        assert_eq!(drained[2], Effect::Language(2));
        assert!(effects.is_empty());
    }
}
