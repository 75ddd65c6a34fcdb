//! Command channel: user writes and edit requests.
//!
//! Writes to controller indexes become `SetValue` records in the outbound
//! frame. They are fire-and-forget: the cache only changes when the
//! controller echoes the value back. Writes to local indexes are staged
//! like inbound updates and mirrored to persistent storage when the index
//! is marked persistent.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::VariableIndex;
use crate::protocol::{Command, FrameBuilder, HmiValue, TypeTable};

use super::dispatcher::Dispatcher;
use super::storage::PersistentStore;
use super::surface::EditSurface;
use super::widget::Effects;

// ============================================================================
// Constants
// ============================================================================

/// Edit types resolved from the initial value's shape.
const LOCAL_EDIT_TYPES: [&str; 2] = ["HMI_LOCAL", "PAGE_LOCAL"];

/// Edit type for numeric local values.
pub const EDIT_TYPE_REAL: &str = "HMI_REAL";

/// Edit type for text local values.
pub const EDIT_TYPE_STRING: &str = "HMI_STRING";

// ============================================================================
// Types
// ============================================================================

/// Receives the value confirmed in an editor.
pub type EditCallback = Box<dyn FnOnce(HmiValue, &mut Effects) + Send>;

/// Outbound write path and edit bookkeeping.
pub struct CommandChannel {
    hash: Vec<u8>,
    types: TypeTable,
    last_remote_index: VariableIndex,
    persistent: FxHashMap<VariableIndex, String>,
    store: Box<dyn PersistentStore>,
    keypads: FxHashMap<String, String>,
    frame: FrameBuilder,
    pending_edit: Option<EditCallback>,
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("last_remote_index", &self.last_remote_index)
            .field("persistent", &self.persistent.len())
            .field("keypads", &self.keypads.len())
            .field("editing", &self.pending_edit.is_some())
            .finish_non_exhaustive()
    }
}

impl CommandChannel {
    /// Creates a channel.
    #[must_use]
    pub fn new(
        hash: Vec<u8>,
        types: TypeTable,
        last_remote_index: VariableIndex,
        store: Box<dyn PersistentStore>,
    ) -> Self {
        let frame = FrameBuilder::new(&hash);
        Self {
            hash,
            types,
            last_remote_index,
            persistent: FxHashMap::default(),
            store,
            keypads: FxHashMap::default(),
            frame,
            pending_edit: None,
        }
    }

    /// Marks local indexes persistent under the given names.
    #[must_use]
    pub fn with_persistent(mut self, persistent: FxHashMap<VariableIndex, String>) -> Self {
        self.persistent = persistent;
        self
    }

    /// Binds keypad ids to edit types.
    #[must_use]
    pub fn with_keypads(mut self, keypads: FxHashMap<String, String>) -> Self {
        self.keypads = keypads;
        self
    }

    /// Returns the type table.
    #[inline]
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Returns the persistent store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn PersistentStore {
        self.store.as_ref()
    }

    /// Returns the persistent index table.
    #[inline]
    #[must_use]
    pub fn persistent(&self) -> &FxHashMap<VariableIndex, String> {
        &self.persistent
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Writes a value, remotely or locally depending on the index.
    ///
    /// Remote writes are dropped while disconnected. The cache is never
    /// updated here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndex`] if a remote index has no type and
    /// [`Error::TypeMismatch`] if the value does not fit the type.
    pub fn set_remote_value(
        &mut self,
        index: VariableIndex,
        value: HmiValue,
        connected: bool,
        dispatcher: &mut Dispatcher,
    ) -> Result<()> {
        if index > self.last_remote_index {
            self.apply_local_value(index, value, dispatcher);
            return Ok(());
        }

        let tag = self.types.get(index).ok_or_else(|| Error::unknown_index(index))?;
        if !connected {
            debug!(index = %index, "Write dropped, not connected");
            return Ok(());
        }

        self.frame.push(&Command::set_value(index, tag, value))?;
        Ok(())
    }

    /// Stages a local value and persists it if required.
    ///
    /// Storage failures are logged; the value is applied regardless.
    pub fn apply_local_value(
        &mut self,
        index: VariableIndex,
        value: HmiValue,
        dispatcher: &mut Dispatcher,
    ) {
        if let Some(name) = self.persistent.get(&index)
            && let Err(e) = self.store.store(name, &value.to_string())
        {
            warn!(index = %index, name = %name, error = %e, "Failed to persist value");
        }
        dispatcher.stage(index, value);
    }

    /// Queues an arbitrary command.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    pub fn queue(&mut self, command: &Command) -> Result<()> {
        self.frame.push(command)?;
        Ok(())
    }

    /// Queues several commands, logging and skipping those failing to encode.
    pub fn queue_all(&mut self, commands: &[Command]) {
        for command in commands {
            if let Err(e) = self.frame.push(command) {
                warn!(error = %e, "Dropped unencodable command");
            }
        }
    }

    /// Takes the pending outbound frame, if any record was queued.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        std::mem::replace(&mut self.frame, FrameBuilder::new(&self.hash)).finish()
    }

    /// Discards queued records.
    pub fn clear_outbox(&mut self) {
        self.frame = FrameBuilder::new(&self.hash);
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Opens the keypad bound to `value_type`.
    ///
    /// Local edit types resolve to [`EDIT_TYPE_REAL`] for numeric initial
    /// values and [`EDIT_TYPE_STRING`] otherwise. A previous pending edit
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEditor`] if no keypad is bound to the type.
    pub fn edit_value(
        &mut self,
        path: &str,
        value_type: &str,
        initial: Option<HmiValue>,
        callback: EditCallback,
        surface: &mut dyn EditSurface,
    ) -> Result<()> {
        let value_type = if LOCAL_EDIT_TYPES.contains(&value_type) {
            match &initial {
                Some(v) if v.is_numeric() => EDIT_TYPE_REAL,
                _ => EDIT_TYPE_STRING,
            }
        } else {
            value_type
        };

        let keypad = self
            .keypads
            .get(value_type)
            .ok_or_else(|| Error::no_editor(value_type))?;

        debug!(path, value_type, keypad = %keypad, "Edit started");
        self.pending_edit = Some(callback);
        surface.start_edit(keypad, path, value_type, initial.as_ref());
        Ok(())
    }

    /// Delivers a confirmed value to the pending edit callback.
    ///
    /// Returns `false` if no edit was pending.
    pub fn confirm_edit(&mut self, value: HmiValue, effects: &mut Effects) -> bool {
        match self.pending_edit.take() {
            Some(callback) => {
                callback(value, effects);
                true
            }
            None => false,
        }
    }

    /// Drops the pending edit. Returns `false` if none was pending.
    pub fn cancel_edit(&mut self) -> bool {
        self.pending_edit.take().is_some()
    }

    /// Returns `true` while an editor is open.
    #[inline]
    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.pending_edit.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::TypeTag;
    use crate::protocol::command::{OP_SET_VALUE, OP_SUBSCRIBE};
    use crate::session::storage::MemoryStore;
    use crate::session::widget::Effect;

    const HASH: [u8; 2] = [0xAA, 0xBB];

    fn idx(raw: u32) -> VariableIndex {
        VariableIndex::new(raw)
    }

    fn channel() -> CommandChannel {
        let types = [(idx(1), TypeTag::Int), (idx(2), TypeTag::String)]
            .into_iter()
            .collect();
        CommandChannel::new(HASH.to_vec(), types, idx(10), Box::new(MemoryStore::new()))
            .with_persistent([(idx(11), "lang".to_string())].into_iter().collect())
            .with_keypads(
                [
                    ("HMI_REAL".to_string(), "NumPad".to_string()),
                    ("HMI_STRING".to_string(), "Keyboard".to_string()),
                ]
                .into_iter()
                .collect(),
            )
    }

    fn noop() -> EditCallback {
        Box::new(|_: HmiValue, _: &mut Effects| {})
    }

    #[derive(Default)]
    struct Keypads(Vec<(String, String, String)>);

    impl EditSurface for Keypads {
        fn start_edit(&mut self, keypad: &str, path: &str, value_type: &str, _initial: Option<&HmiValue>) {
            self.0.push((keypad.into(), path.into(), value_type.into()));
        }
    }

    #[test]
    fn test_remote_write_is_encoded_not_cached() {
        let mut ch = channel();
        let mut dispatcher = Dispatcher::new();

        ch.set_remote_value(idx(1), HmiValue::Int(7), true, &mut dispatcher)
            .expect("set");
        assert!(!dispatcher.has_pending());

        let frame = ch.take_frame().expect("frame");
        assert_eq!(frame, vec![0xAA, 0xBB, OP_SET_VALUE, 1, 0, 0, 0, 7, 0]);
        assert!(ch.take_frame().is_none());
    }

    #[test]
    fn test_remote_write_dropped_when_disconnected() {
        let mut ch = channel();
        let mut dispatcher = Dispatcher::new();
        ch.set_remote_value(idx(1), HmiValue::Int(7), false, &mut dispatcher)
            .expect("set");
        assert!(ch.take_frame().is_none());
    }

    #[test]
    fn test_remote_write_type_errors() {
        let mut ch = channel();
        let mut dispatcher = Dispatcher::new();
        assert!(matches!(
            ch.set_remote_value(idx(3), HmiValue::Int(1), true, &mut dispatcher),
            Err(Error::UnknownIndex { .. })
        ));
        assert!(matches!(
            ch.set_remote_value(idx(1), HmiValue::from("x"), true, &mut dispatcher),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(ch.take_frame().is_none());
    }

    #[test]
    fn test_local_write_is_staged_and_persisted() {
        let mut ch = channel();
        let mut dispatcher = Dispatcher::new();

        ch.set_remote_value(idx(11), HmiValue::Int(2), false, &mut dispatcher)
            .expect("set");
        assert_eq!(dispatcher.pending(idx(11)), Some(&HmiValue::Int(2)));
        assert!(ch.take_frame().is_none());

        let stored = ch.store().load().expect("load");
        assert_eq!(stored.get("lang").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_queue_all_batches_records() {
        let mut ch = channel();
        ch.queue_all(&[Command::subscribe(idx(1), 100), Command::subscribe(idx(2), 0)]);
        let frame = ch.take_frame().expect("frame");
        assert_eq!(frame.len(), 2 + 7 + 7);
        assert_eq!(frame[2], OP_SUBSCRIBE);
    }

    #[test]
    fn test_edit_resolves_local_types() {
        let mut ch = channel();
        let mut keypads = Keypads::default();

        ch.edit_value("/X", "HMI_LOCAL", Some(HmiValue::Real(1.0)), noop(), &mut keypads)
            .expect("edit");
        ch.edit_value("/Y", "PAGE_LOCAL", Some(HmiValue::from("a")), noop(), &mut keypads)
            .expect("edit");

        assert_eq!(keypads.0[0], ("NumPad".into(), "/X".into(), "HMI_REAL".into()));
        assert_eq!(keypads.0[1], ("Keyboard".into(), "/Y".into(), "HMI_STRING".into()));
    }

    #[test]
    fn test_edit_without_keypad() {
        let mut ch = channel();
        let result = ch.edit_value("/Z", "HMI_BOOL", None, noop(), &mut Keypads::default());
        assert!(matches!(result, Err(Error::NoEditor { .. })));
        assert!(!ch.is_editing());
    }

    #[test]
    fn test_confirm_edit_runs_callback_once() {
        let mut ch = channel();
        ch.edit_value(
            "/X",
            "HMI_REAL",
            None,
            Box::new(|value: HmiValue, effects: &mut Effects| {
                effects.apply_value(VariableIndex::new(1), value);
            }),
            &mut Keypads::default(),
        )
        .expect("edit");
        assert!(ch.is_editing());

        let mut effects = Effects::new();
        assert!(ch.confirm_edit(HmiValue::Int(3), &mut effects));
        assert!(!ch.confirm_edit(HmiValue::Int(4), &mut effects));
        assert_eq!(
            effects.drain(),
            vec![Effect::ApplyValue {
                index: idx(1),
                value: HmiValue::Int(3)
            }]
        );
    }

    #[test]
    fn test_cancel_edit() {
        let mut ch = channel();
        assert!(!ch.cancel_edit());
        ch.edit_value("/X", "HMI_REAL", None, noop(), &mut Keypads::default())
            .expect("edit");
        assert!(ch.cancel_edit());
        assert!(!ch.is_editing());
    }
}
