//! Page navigation state machine.
//!
//! One page is subscribed at a time. A switch happens on the data path
//! immediately (unsubscribe, subscribe, delta) while the visible swap is
//! deferred to the next render tick.
//!
//! # States
//!
//! ```text
//!            switch_page                       tick
//!   Idle ───────────────► Switching ─────────────────────► Idle
//!    │                                                      ▲
//!    │ request_fade           tick                  tick    │
//!    └────────────► FadeOut ────────► FadeIn ───────────────┘
//!                     ▲   request_fade │
//!                     └────(forced)────┘
//! ```
//!
//! A request arriving while a switch is in flight is rejected, never
//! queued. A fade request arriving while a fade is in progress is
//! coalesced: its target supersedes the previous one.
//!
//! # Sub-indexes
//!
//! Targets are written `"page"` or `"page@path"`. A path resolves to a
//! tree node's index only if the node class matches the page class;
//! otherwise the page default index is used.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::VariableIndex;
use crate::protocol::{Command, HmiValue};

use super::dispatcher::ValueCache;
use super::registry::SubscriptionRegistry;
use super::surface::RenderSurface;
use super::widget::{Effects, PageWidget};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of jump history entries.
pub const JUMP_HISTORY_CAPACITY: usize = 42;

// ============================================================================
// Static Tables
// ============================================================================

/// A tree node reachable by path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeInfo {
    /// Node index.
    pub index: u32,
    /// Node class, matched against page classes.
    pub class: String,
}

/// Static description of one page.
#[derive(Clone)]
pub struct PageDescriptor {
    /// Page name.
    pub name: String,
    /// Default sub-index, `None` for pages not parameterized by a node.
    pub index: Option<u32>,
    /// Node class this page can display.
    pub class: Option<String>,
    /// Viewport `[x, y, width, height]`.
    pub bbox: [f64; 4],
    /// Element ids attached only while this page is visible.
    pub detachables: BTreeSet<String>,
    /// Widgets with their relativeness, the page widget first.
    pub widgets: Vec<(Arc<dyn PageWidget>, bool)>,
}

impl PageDescriptor {
    /// Creates a page with no widget.
    #[must_use]
    pub fn new(name: impl Into<String>, bbox: [f64; 4]) -> Self {
        Self {
            name: name.into(),
            index: None,
            class: None,
            bbox,
            detachables: BTreeSet::new(),
            widgets: Vec::new(),
        }
    }

    /// Sets the default sub-index and node class.
    #[must_use]
    pub fn with_index(mut self, index: u32, class: impl Into<String>) -> Self {
        self.index = Some(index);
        self.class = Some(class.into());
        self
    }

    /// Adds an element attached while the page is visible.
    #[must_use]
    pub fn with_detachable(mut self, id: impl Into<String>) -> Self {
        self.detachables.insert(id.into());
        self
    }

    /// Appends a widget.
    #[must_use]
    pub fn with_widget(mut self, widget: Arc<dyn PageWidget>, relativeness: bool) -> Self {
        self.widgets.push((widget, relativeness));
        self
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("class", &self.class)
            .field("widgets", &self.widgets.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PageTarget
// ============================================================================

/// Sub-index of a navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubIndex {
    /// Explicit node index.
    Index(u32),
    /// Node path, resolved through the node table.
    Path(String),
}

/// Navigation destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    /// Page name.
    pub name: String,
    /// Optional sub-index.
    pub sub: Option<SubIndex>,
}

impl PageTarget {
    /// Targets a page at its default index.
    #[must_use]
    pub fn page(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub: None,
        }
    }

    /// Targets a page at an explicit index.
    #[must_use]
    pub fn with_index(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            sub: Some(SubIndex::Index(index)),
        }
    }

    /// Parses `"page"` or `"page@path"`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.split_once('@') {
            Some((name, path)) => Self {
                name: name.to_string(),
                sub: Some(SubIndex::Path(path.to_string())),
            },
            None => Self::page(text),
        }
    }
}

impl fmt::Display for PageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub {
            None => f.write_str(&self.name),
            Some(SubIndex::Index(i)) => write!(f, "{}#{i}", self.name),
            Some(SubIndex::Path(p)) => write!(f, "{}@{p}", self.name),
        }
    }
}

// ============================================================================
// JumpHistory
// ============================================================================

/// One visited page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Page name.
    pub page: String,
    /// Sub-index the page was entered with.
    pub index: Option<u32>,
}

/// Bounded history of visited pages, oldest first.
#[derive(Debug, Clone, Default)]
pub struct JumpHistory {
    entries: VecDeque<HistoryEntry>,
}

impl JumpHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(JUMP_HISTORY_CAPACITY),
        }
    }

    /// Records a visit.
    ///
    /// Returns `false` if the entry equals the most recent one. The oldest
    /// entry is evicted beyond capacity.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        if self.entries.back() == Some(&entry) {
            return false;
        }
        self.entries.push_back(entry);
        if self.entries.len() > JUMP_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        true
    }

    /// Removes the most recent entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Returns the most recent entry.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was visited.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

// ============================================================================
// VisibilityChange
// ============================================================================

/// Attach/detach set for one visible page swap.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    /// Newly visible page.
    pub page: String,
    /// Elements to attach.
    pub attach: Vec<String>,
    /// Elements to detach.
    pub detach: Vec<String>,
    /// New viewport.
    pub bbox: [f64; 4],
}

impl VisibilityChange {
    /// Computes the change from `old` to `new` as one set difference.
    #[must_use]
    pub fn between(old: Option<&PageDescriptor>, new: &PageDescriptor) -> Self {
        let (attach, detach) = match old {
            Some(old) => (
                new.detachables.difference(&old.detachables).cloned().collect(),
                old.detachables.difference(&new.detachables).cloned().collect(),
            ),
            None => (new.detachables.iter().cloned().collect(), Vec::new()),
        };

        Self {
            page: new.name.clone(),
            attach,
            detach,
            bbox: new.bbox,
        }
    }
}

// ============================================================================
// States
// ============================================================================

/// Observable navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// Nothing in flight.
    Idle,
    /// A request was accepted and its target is being resolved.
    SwitchRequested,
    /// Subscribed page changed, visible swap pending.
    Switching,
    /// Fade-out requested, switch not yet executed.
    FadeOut,
    /// Switch executed under fade, fade-in pending.
    FadeIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchPhase {
    Idle,
    Requested,
    Switching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadePhase {
    Off,
    Pending,
    InProgress,
    Forced,
}

/// Borrowed session state a switch operates on.
pub struct SwitchContext<'a> {
    /// Subscription registry.
    pub registry: &'a mut SubscriptionRegistry,
    /// Value cache, read by page-entry assignments.
    pub cache: &'a ValueCache,
    /// Collected writes.
    pub effects: &'a mut Effects,
    /// Whether deltas may be computed now.
    pub connected: bool,
}

/// Result of one navigation tick.
#[derive(Debug, Default)]
pub struct TickStep {
    /// Subscription commands produced by a switch executed in this tick.
    pub delta: Vec<Command>,
    /// `false` if the fade sequence needs another tick.
    pub settled: bool,
}

// ============================================================================
// Navigator
// ============================================================================

/// Owns pages, the subscribed/visible page pair and the jump history.
pub struct Navigator {
    pages: FxHashMap<String, PageDescriptor>,
    nodes: FxHashMap<String, NodeInfo>,
    paths: FxHashMap<u32, String>,
    page_node_index: Option<VariableIndex>,
    current_page_index: Option<VariableIndex>,
    history: JumpHistory,
    subscribed: Option<String>,
    subscribed_index: Option<u32>,
    visible: Option<String>,
    switch: SwitchPhase,
    fade: FadePhase,
    fade_target: Option<PageTarget>,
    jumps_need_update: bool,
}

impl Navigator {
    /// Creates a navigator over static page and node tables.
    #[must_use]
    pub fn new(
        pages: impl IntoIterator<Item = PageDescriptor>,
        nodes: FxHashMap<String, NodeInfo>,
        paths: FxHashMap<u32, String>,
    ) -> Self {
        Self {
            pages: pages.into_iter().map(|p| (p.name.clone(), p)).collect(),
            nodes,
            paths,
            page_node_index: None,
            current_page_index: None,
            history: JumpHistory::new(),
            subscribed: None,
            subscribed_index: None,
            visible: None,
            switch: SwitchPhase::Idle,
            fade: FadePhase::Off,
            fade_target: None,
            jumps_need_update: false,
        }
    }

    /// Sets the local index receiving the entered node path.
    #[must_use]
    pub fn with_page_node_index(mut self, index: VariableIndex) -> Self {
        self.page_node_index = Some(index);
        self
    }

    /// Sets the index receiving `"page"` or `"page@path"` on every switch.
    #[must_use]
    pub fn with_current_page_index(mut self, index: VariableIndex) -> Self {
        self.current_page_index = Some(index);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the observable state.
    #[must_use]
    pub fn state(&self) -> NavState {
        let fading = self.fade != FadePhase::Off;
        match self.switch {
            SwitchPhase::Requested => NavState::SwitchRequested,
            SwitchPhase::Switching if fading => NavState::FadeIn,
            SwitchPhase::Switching => NavState::Switching,
            SwitchPhase::Idle if fading => NavState::FadeOut,
            SwitchPhase::Idle => NavState::Idle,
        }
    }

    /// Returns the page whose widgets are subscribed.
    #[inline]
    #[must_use]
    pub fn current_page(&self) -> Option<&str> {
        self.subscribed.as_deref()
    }

    /// Returns the sub-index of the subscribed page.
    #[inline]
    #[must_use]
    pub fn current_index(&self) -> Option<u32> {
        self.subscribed_index
    }

    /// Returns the page currently shown.
    #[inline]
    #[must_use]
    pub fn visible_page(&self) -> Option<&str> {
        self.visible.as_deref()
    }

    /// Returns `true` if a subscribe/visible swap is pending.
    #[inline]
    #[must_use]
    pub fn is_switching(&self) -> bool {
        self.switch != SwitchPhase::Idle
    }

    /// Returns the jump history.
    #[inline]
    #[must_use]
    pub fn history(&self) -> &JumpHistory {
        &self.history
    }

    /// Returns `true` if a page is known by this name.
    #[inline]
    #[must_use]
    pub fn has_page(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    /// Returns a page descriptor.
    #[inline]
    #[must_use]
    pub fn page(&self, name: &str) -> Option<&PageDescriptor> {
        self.pages.get(name)
    }

    // ========================================================================
    // Switching
    // ========================================================================

    /// Switches the subscribed page.
    ///
    /// `None` re-enters the current page at its current sub-index. Returns
    /// the subscription delta, empty while disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NavigationRejected`] if a switch is already in
    /// flight or the page is unknown. Nothing changes in either case.
    pub fn switch_page(
        &mut self,
        target: Option<PageTarget>,
        ctx: &mut SwitchContext<'_>,
    ) -> Result<Vec<Command>> {
        let target = match target {
            Some(t) => t,
            None => match &self.subscribed {
                Some(name) => PageTarget {
                    name: name.clone(),
                    sub: self.subscribed_index.map(SubIndex::Index),
                },
                None => return Err(Error::unknown_page("")),
            },
        };

        if self.switch != SwitchPhase::Idle {
            warn!(page = %target, "Page switch rejected, another is in progress");
            return Err(Error::switch_in_flight(target.name));
        }
        self.switch = SwitchPhase::Requested;

        let Some(new_desc) = self.pages.get(&target.name) else {
            self.switch = SwitchPhase::Idle;
            warn!(page = %target, "Page switch rejected, unknown page");
            return Err(Error::unknown_page(target.name));
        };

        let page_index = self.resolve_index(new_desc, target.sub.as_ref());

        if let Some(old_desc) = self.subscribed.as_ref().and_then(|n| self.pages.get(n)) {
            for (widget, _) in &old_desc.widgets {
                widget.unsub(ctx.registry);
            }
        }

        let offset = match (page_index, new_desc.index) {
            (Some(i), base) => i64::from(i) - i64::from(base.unwrap_or(0)),
            (None, _) => 0,
        };
        let container_id = match page_index {
            Some(i) => format!("{}{i}", new_desc.name),
            None => new_desc.name.clone(),
        };

        for (widget, relativeness) in &new_desc.widgets {
            widget.sub(ctx.registry, offset, *relativeness, &container_id);
        }

        let delta = if ctx.connected {
            ctx.registry.recompute_deltas()
        } else {
            Vec::new()
        };

        let node_path = page_index.and_then(|i| self.paths.get(&i)).cloned();

        if let Some(index) = self.page_node_index {
            ctx.effects
                .apply_value(index, HmiValue::Str(node_path.clone().unwrap_or_default()));
        }

        self.history.push(HistoryEntry {
            page: new_desc.name.clone(),
            index: page_index,
        });
        self.jumps_need_update = true;

        if let Some(index) = self.current_page_index {
            let current = match (page_index, &node_path) {
                (Some(_), Some(path)) => format!("{}@{path}", new_desc.name),
                (Some(_), None) => format!("{}@", new_desc.name),
                (None, _) => new_desc.name.clone(),
            };
            ctx.effects.apply_value(index, HmiValue::Str(current));
        }

        if let Some((page_widget, _)) = new_desc.widgets.first() {
            page_widget.assign(ctx.cache, ctx.effects);
        }

        debug!(
            page = %new_desc.name,
            index = ?page_index,
            offset,
            delta = delta.len(),
            "Page switched"
        );

        self.subscribed = Some(new_desc.name.clone());
        self.subscribed_index = page_index;
        self.switch = SwitchPhase::Switching;

        Ok(delta)
    }

    /// Requests a fading switch, executed on the next tick.
    ///
    /// A request during a fade in progress is coalesced and supersedes the
    /// previous target.
    pub fn request_fade(&mut self, target: PageTarget) {
        self.fade = match self.fade {
            FadePhase::InProgress | FadePhase::Forced => FadePhase::Forced,
            FadePhase::Off | FadePhase::Pending => FadePhase::Pending,
        };
        debug!(page = %target, fade = ?self.fade, "Fading page switch requested");
        self.fade_target = Some(target);
    }

    /// Navigates to the previous history entry.
    ///
    /// Returns `Ok(None)` when there is nowhere to go back to.
    ///
    /// # Errors
    ///
    /// Propagates [`switch_page`](Self::switch_page) rejections, in which
    /// case the history is left as it was.
    pub fn jump_back(&mut self, ctx: &mut SwitchContext<'_>) -> Result<Option<Vec<Command>>> {
        if self.history.len() < 2 {
            return Ok(None);
        }
        let Some(current) = self.history.pop() else {
            return Ok(None);
        };
        let Some(previous) = self.history.last().cloned() else {
            self.history.push(current);
            return Ok(None);
        };

        let target = PageTarget {
            name: previous.page,
            sub: previous.index.map(SubIndex::Index),
        };
        match self.switch_page(Some(target), ctx) {
            Ok(delta) => Ok(Some(delta)),
            Err(e) => {
                self.history.push(current);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Render Tick
    // ========================================================================

    /// Advances the visible side of navigation by one render tick.
    pub fn tick(&mut self, surface: &mut dyn RenderSurface, ctx: &mut SwitchContext<'_>) -> TickStep {
        if matches!(self.fade, FadePhase::Pending | FadePhase::Forced) {
            if self.fade == FadePhase::Pending {
                surface.set_fade_out(true);
            }
            self.complete_visible_switch(surface);
            self.fade = FadePhase::InProgress;

            let mut step = TickStep::default();
            if let Some(target) = self.fade_target.take() {
                match self.switch_page(Some(target), ctx) {
                    Ok(delta) => step.delta = delta,
                    Err(e) => {
                        warn!(error = %e, "Fading page switch failed");
                        surface.set_fade_out(false);
                        self.fade = FadePhase::Off;
                    }
                }
            }
            return step;
        }

        self.complete_visible_switch(surface);
        if self.fade == FadePhase::InProgress {
            surface.set_fade_out(false);
            self.fade = FadePhase::Off;
        }

        if self.jumps_need_update {
            surface.update_jumps(&self.history);
            self.jumps_need_update = false;
        }

        TickStep {
            delta: Vec::new(),
            settled: true,
        }
    }

    /// Applies a pending visible swap and ends the switch.
    fn complete_visible_switch(&mut self, surface: &mut dyn RenderSurface) {
        if self.switch != SwitchPhase::Switching {
            return;
        }

        if self.subscribed != self.visible
            && let Some(new_desc) = self.subscribed.as_ref().and_then(|n| self.pages.get(n))
        {
            let old_desc = self.visible.as_ref().and_then(|n| self.pages.get(n));
            let change = VisibilityChange::between(old_desc, new_desc);
            surface.apply_visibility(&change);
            debug!(
                page = %change.page,
                attach = change.attach.len(),
                detach = change.detach.len(),
                "Visible page swapped"
            );
            self.visible = Some(change.page);
        }

        self.switch = SwitchPhase::Idle;
    }

    /// Resolves the sub-index a page is entered with.
    fn resolve_index(&self, desc: &PageDescriptor, sub: Option<&SubIndex>) -> Option<u32> {
        match sub {
            None => desc.index,
            Some(SubIndex::Index(i)) => Some(*i),
            Some(SubIndex::Path(path)) => match self.nodes.get(path) {
                Some(node) if desc.class.as_deref() == Some(node.class.as_str()) => Some(node.index),
                _ => desc.index,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
