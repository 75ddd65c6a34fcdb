//! HMI session: the single owner of all synchronization state.
//!
//! A [`Session`] lives as long as the HMI application. It is created once
//! from the static configuration, survives reconnects, and is only
//! discarded when the protocol contract breaks.
//!
//! # Event Sources
//!
//! ```text
//!  transport ──► on_open / on_frame / on_close ─┐
//!  render tick ─► tick ─────────────────────────┼─► Session ──► take_frame ──► transport
//!  user input ──► switch_page / set_value / ... ┘        │
//!                                                        └────► RenderSurface
//! ```
//!
//! Every entry point runs to completion; deferred work is expressed as a
//! tick request ([`Session::is_tick_requested`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Subscription sets and period deltas |
//! | `dispatcher` | Value cache and render batching |
//! | `widget` | Widget capabilities and deferred effects |
//! | `expression` | Assignment expression evaluator |
//! | `navigation` | Page state machine and jump history |
//! | `command` | Outbound writes and edit requests |
//! | `storage` | Persisted local values |
//! | `surface` | Rendering and editing collaborators |
//! | `watchers` | Built-in subscribers |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound writes and edit requests.
pub mod command;

/// Value cache and render-batching dispatcher.
pub mod dispatcher;

/// Assignment expressions.
pub mod expression;

/// Page navigation state machine.
pub mod navigation;

/// Subscription registry.
pub mod registry;

/// Persisted client-side values.
pub mod storage;

/// Rendering and editing collaborators.
pub mod surface;

/// Built-in subscribers.
pub mod watchers;

/// Widget capabilities and deferred effects.
pub mod widget;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{CommandChannel, EditCallback};
pub use dispatcher::{Dispatcher, ValueCache};
pub use expression::{Expression, eval_operation};
pub use navigation::{
    JumpHistory, NavState, Navigator, PageDescriptor, PageTarget, SubIndex, VisibilityChange,
};
pub use registry::SubscriptionRegistry;
pub use storage::{FileStore, MemoryStore, PersistentStore};
pub use surface::{EditSurface, NullSurface, RenderSurface};
pub use widget::{BoundWidget, Effect, Effects, IndexBinding, PageWidget, Subscriber};

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::HmiConfig;
use crate::error::Result;
use crate::identifiers::{SubscriberId, VariableIndex};
use crate::protocol::{HmiValue, decode_frame};
use crate::transport::{CloseDecision, ConnectionState, LinkState};

use navigation::SwitchContext;
use watchers::{CurrentPageWatcher, Heartbeat, LanguageWatcher, clamp_language};

// ============================================================================
// Constants
// ============================================================================

/// Page shown when the screensaver delay elapses.
pub const SCREENSAVER_PAGE: &str = "ScreenSaver";

// ============================================================================
// Types
// ============================================================================

/// Widgets per page name, page widget first, with their relativeness.
pub type PageWidgets = FxHashMap<String, Vec<(Arc<dyn PageWidget>, bool)>>;

// ============================================================================
// Session
// ============================================================================

/// Session context owning cache, registry, navigation and connection state.
pub struct Session {
    hash: Vec<u8>,
    cache: ValueCache,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    navigator: Navigator,
    channel: CommandChannel,
    connection: ConnectionState,
    animations: Vec<SubscriberId>,
    pending_language: Option<usize>,
    screensaver_delay: Option<Duration>,
}

impl Session {
    /// Creates a session and enters the default page.
    ///
    /// Persisted locals are loaded into the cache before anything else.
    /// The heartbeat is only registered for watchdog sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is inconsistent, or a storage error if persisted values cannot be read.
    pub fn new(
        config: HmiConfig,
        mut widgets: PageWidgets,
        store: Box<dyn PersistentStore>,
        watchdog: bool,
        reconnect_increment: Duration,
    ) -> Result<Self> {
        config.validate()?;

        let screensaver_delay = config.screensaver_delay();
        let HmiConfig {
            hash,
            last_remote_index,
            types,
            paths,
            nodes,
            pages,
            default_page,
            locals,
            current_page_index,
            heartbeat_index,
            persistent,
            languages,
            keypads,
            screensaver_delay_secs: _,
        } = config;

        let descriptors: Vec<_> = pages
            .into_iter()
            .map(|page| PageDescriptor {
                widgets: widgets.remove(&page.name).unwrap_or_default(),
                detachables: page.detachables.into_iter().collect(),
                name: page.name,
                index: page.index,
                class: page.class,
                bbox: page.bbox,
            })
            .collect();
        for name in widgets.keys() {
            warn!(page = %name, "Widgets supplied for an unknown page");
        }

        let mut navigator =
            Navigator::new(descriptors, nodes.into_iter().collect(), paths.into_iter().collect());
        if let Some(index) = locals.page_node {
            navigator = navigator.with_page_node_index(index);
        }
        if let Some(index) = current_page_index {
            navigator = navigator.with_current_page_index(index);
        }

        let channel = CommandChannel::new(hash.clone(), types, last_remote_index, store)
            .with_persistent(persistent.into_iter().collect())
            .with_keypads(keypads.into_iter().collect());

        let mut registry = SubscriptionRegistry::new(last_remote_index);
        if watchdog && let Some(index) = heartbeat_index {
            registry.subscribe(index, Arc::new(Heartbeat::new(index)));
        }
        if let Some(index) = current_page_index {
            registry.subscribe(index, Arc::new(CurrentPageWatcher::new()));
        }
        let language_count = languages.len();
        if let Some(index) = locals.lang {
            let watcher = LanguageWatcher::new(languages).with_outputs(locals.lang_code, locals.lang_name);
            registry.subscribe(index, Arc::new(watcher));
        }

        let mut session = Self {
            hash,
            cache: ValueCache::new(),
            registry,
            dispatcher: Dispatcher::new(),
            navigator,
            channel,
            connection: ConnectionState::new(reconnect_increment),
            animations: Vec::new(),
            pending_language: None,
            screensaver_delay,
        };

        session.seed_persisted()?;
        if let Some(index) = locals.lang {
            session.setup_language(index, language_count);
        }
        session.switch_page(Some(PageTarget::page(default_page)))?;

        Ok(session)
    }

    /// Loads persisted locals straight into the cache.
    fn seed_persisted(&mut self) -> Result<()> {
        let stored = self.channel.store().load()?;
        let seeds: Vec<_> = self
            .channel
            .persistent()
            .iter()
            .filter_map(|(index, name)| {
                stored
                    .get(name)
                    .map(|text| (*index, HmiValue::from_persisted(text)))
            })
            .collect();

        for (index, value) in seeds {
            debug!(index = %index, value = %value, "Seeded persisted value");
            self.cache.insert(index, value);
        }
        Ok(())
    }

    /// Clamps the stored language selection and stages it.
    ///
    /// The language watcher then publishes code and name on the first tick.
    fn setup_language(&mut self, index: VariableIndex, count: usize) {
        let number = clamp_language(self.cache.get(index).unwrap_or(&HmiValue::Int(0)), count);
        let clamped = HmiValue::Int(i64::try_from(number).unwrap_or(0));
        if self.cache.get(index) != Some(&clamped) {
            debug!(index = %index, number, "Language selection clamped");
        }
        self.channel
            .apply_local_value(index, clamped, &mut self.dispatcher);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the build fingerprint.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// Returns the value cache.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    /// Returns the subscription registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Returns the navigator.
    #[inline]
    #[must_use]
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    /// Returns `true` if the transport is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Returns the link state.
    #[inline]
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.connection.link()
    }

    /// Returns `true` if a render tick should be scheduled.
    #[inline]
    #[must_use]
    pub fn is_tick_requested(&self) -> bool {
        self.dispatcher.is_tick_requested()
    }

    /// Returns the configured screensaver delay.
    #[inline]
    #[must_use]
    pub fn screensaver_delay(&self) -> Option<Duration> {
        self.screensaver_delay
    }

    /// Returns `true` while an editor is open.
    #[inline]
    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.channel.is_editing()
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    /// Marks a connection attempt.
    pub fn on_connecting(&mut self) {
        self.connection.on_connecting();
    }

    /// Handles an opened transport.
    ///
    /// Every acknowledged period is forgotten and the current page's
    /// subscriptions are replayed in the next outbound frame.
    pub fn on_open(&mut self) {
        self.connection.on_open();
        self.registry.reset_periods();

        if self.navigator.is_switching() {
            let delta = self.registry.recompute_deltas();
            self.channel.queue_all(&delta);
        } else if let Err(e) = self.switch_page(None) {
            warn!(error = %e, "Failed to re-enter page on open");
        }
    }

    /// Handles a closed transport.
    pub fn on_close(&mut self, code: Option<u16>) -> CloseDecision {
        self.channel.clear_outbox();
        self.connection.on_close(code)
    }

    /// Flags the next close as a requested reconnect.
    pub fn force_reconnect(&mut self) {
        self.connection.force_reconnect();
    }

    /// Decodes an inbound frame and stages its values.
    ///
    /// Returns the number of values staged.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the frame breaks the layout contract.
    /// Nothing from a failing frame is staged. The session must then be
    /// discarded ([`Error::requires_reload`](crate::Error::requires_reload)).
    pub fn on_frame(&mut self, bytes: &[u8]) -> Result<usize> {
        let values = decode_frame(bytes, &self.hash, self.channel.types())?;
        let count = values.len();
        for (index, value) in values {
            self.dispatcher.stage(index, value);
        }
        Ok(count)
    }

    /// Takes the next outbound frame.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        self.channel.take_frame()
    }

    // ========================================================================
    // Render Tick
    // ========================================================================

    /// Runs one render tick.
    ///
    /// Staged values are flushed first, then navigation advances, then
    /// requested animations run. Returns `true` if another tick is needed.
    pub fn tick(&mut self, surface: &mut dyn RenderSurface) -> bool {
        self.dispatcher.begin_tick();

        let mut effects = Effects::new();
        self.dispatcher
            .flush(&mut self.cache, &self.registry, &mut effects);
        self.run_effects(effects);

        if let Some(number) = self.pending_language.take() {
            surface.set_language(number);
        }

        let mut effects = Effects::new();
        let connected = self.is_connected();
        let step = {
            let mut ctx = SwitchContext {
                registry: &mut self.registry,
                cache: &self.cache,
                effects: &mut effects,
                connected,
            };
            self.navigator.tick(surface, &mut ctx)
        };
        self.channel.queue_all(&step.delta);
        self.run_effects(effects);

        if step.settled {
            let mut effects = Effects::new();
            for id in std::mem::take(&mut self.animations) {
                if let Some(subscriber) = self.registry.find(id) {
                    subscriber.animate(&mut effects);
                }
            }
            self.run_effects(effects);
        } else {
            self.dispatcher.request_tick();
        }

        self.dispatcher.is_tick_requested()
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Applies effects until none is left, including those they produce.
    fn run_effects(&mut self, mut effects: Effects) {
        let mut queue: VecDeque<Effect> = effects.drain().into();

        while let Some(effect) = queue.pop_front() {
            let mut produced = Effects::new();
            match effect {
                Effect::ApplyValue { index, value } => {
                    let connected = self.is_connected();
                    if let Err(e) =
                        self.channel
                            .set_remote_value(index, value, connected, &mut self.dispatcher)
                    {
                        warn!(index = %index, error = %e, "Dropped value write");
                    }
                }
                Effect::SwitchPage {
                    target: Some(target),
                    fade: true,
                } => {
                    self.navigator.request_fade(target);
                    self.dispatcher.request_tick();
                }
                Effect::SwitchPage { target, .. } => {
                    if let Err(e) = self.switch_with(target, &mut produced) {
                        debug!(error = %e, "Switch requested by widget not applied");
                    }
                }
                Effect::Animate(id) => {
                    if !self.animations.contains(&id) {
                        self.animations.push(id);
                    }
                    self.dispatcher.request_tick();
                }
                Effect::Language(number) => {
                    self.pending_language = Some(number);
                    self.dispatcher.request_tick();
                }
            }
            queue.extend(produced.drain());
        }
    }

    /// Runs a switch, collecting its writes into `effects`.
    fn switch_with(&mut self, target: Option<PageTarget>, effects: &mut Effects) -> Result<()> {
        let connected = self.is_connected();
        let mut ctx = SwitchContext {
            registry: &mut self.registry,
            cache: &self.cache,
            effects,
            connected,
        };
        let delta = self.navigator.switch_page(target, &mut ctx)?;
        self.channel.queue_all(&delta);
        self.dispatcher.request_tick();
        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Switches page. `None` re-enters the current page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NavigationRejected`](crate::Error::NavigationRejected)
    /// if a switch is in flight or the page is unknown.
    pub fn switch_page(&mut self, target: Option<PageTarget>) -> Result<()> {
        let mut effects = Effects::new();
        self.switch_with(target, &mut effects)?;
        self.run_effects(effects);
        Ok(())
    }

    /// Requests a fading page switch, executed over the next ticks.
    pub fn fading_switch(&mut self, target: PageTarget) {
        self.navigator.request_fade(target);
        self.dispatcher.request_tick();
    }

    /// Goes back to the previous page in the jump history.
    ///
    /// Returns `false` when there is no previous page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NavigationRejected`](crate::Error::NavigationRejected)
    /// if a switch is in flight.
    pub fn jump_back(&mut self) -> Result<bool> {
        let mut effects = Effects::new();
        let connected = self.is_connected();
        let delta = {
            let mut ctx = SwitchContext {
                registry: &mut self.registry,
                cache: &self.cache,
                effects: &mut effects,
                connected,
            };
            self.navigator.jump_back(&mut ctx)?
        };

        let Some(delta) = delta else {
            return Ok(false);
        };
        self.channel.queue_all(&delta);
        self.dispatcher.request_tick();
        self.run_effects(effects);
        Ok(true)
    }

    /// Writes a value to a controller or local index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndex`](crate::Error::UnknownIndex) or
    /// [`Error::TypeMismatch`](crate::Error::TypeMismatch) for remote
    /// indexes that cannot carry the value.
    pub fn set_value(&mut self, index: VariableIndex, value: HmiValue) -> Result<()> {
        let connected = self.is_connected();
        self.channel
            .set_remote_value(index, value, connected, &mut self.dispatcher)
    }

    /// Evaluates an assignment expression against the cached value and writes the result.
    ///
    /// Returns `false` if the expression produced no value.
    ///
    /// # Errors
    ///
    /// As [`set_value`](Self::set_value).
    pub fn apply_expression(&mut self, index: VariableIndex, expression: &str) -> Result<bool> {
        match eval_operation(self.cache.get(index), expression) {
            Some(value) => {
                self.set_value(index, value)?;
                Ok(true)
            }
            None => {
                debug!(index = %index, expression, "Expression produced no value");
                Ok(false)
            }
        }
    }

    /// Opens an editor for a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEditor`](crate::Error::NoEditor) if no keypad is
    /// bound to the edit type.
    pub fn edit_value(
        &mut self,
        path: &str,
        value_type: &str,
        initial: Option<HmiValue>,
        callback: EditCallback,
        surface: &mut dyn EditSurface,
    ) -> Result<()> {
        self.channel
            .edit_value(path, value_type, initial, callback, surface)
    }

    /// Delivers the value confirmed in the open editor.
    ///
    /// Returns `false` if no editor was open.
    pub fn confirm_edit(&mut self, value: HmiValue) -> bool {
        let mut effects = Effects::new();
        let confirmed = self.channel.confirm_edit(value, &mut effects);
        self.run_effects(effects);
        confirmed
    }

    /// Closes the open editor without a value.
    pub fn cancel_edit(&mut self) -> bool {
        self.channel.cancel_edit()
    }

    /// Shows the screensaver page.
    ///
    /// # Errors
    ///
    /// As [`switch_page`](Self::switch_page).
    pub fn on_screensaver(&mut self) -> Result<()> {
        info!("Screensaver delay elapsed");
        self.switch_page(Some(PageTarget::page(SCREENSAVER_PAGE)))
    }
}

// ============================================================================
// Tests
// ============================================================================
