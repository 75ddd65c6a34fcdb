//! Rendering and editing collaborators.
//!
//! Shapes, layout and text live outside this crate. The session only tells
//! the rendering layer what changed at the page level, and asks the
//! editing layer to open a keypad.

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::HmiValue;

use super::navigation::{JumpHistory, VisibilityChange};

// ============================================================================
// RenderSurface
// ============================================================================

/// Page-level rendering operations, applied on render ticks only.
pub trait RenderSurface: Send {
    /// Attaches and detaches page elements and fits the viewport, as one step.
    fn apply_visibility(&mut self, change: &VisibilityChange);

    /// Starts or ends the fade-out of the whole surface.
    fn set_fade_out(&mut self, faded: bool);

    /// Refreshes navigation widgets after the jump history changed.
    fn update_jumps(&mut self, _history: &JumpHistory) {}

    /// Switches displayed texts to a language number.
    fn set_language(&mut self, _number: usize) {}

    /// Shows a user-visible notice.
    fn notify(&mut self, message: &str);
}

/// Surface that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn apply_visibility(&mut self, _change: &VisibilityChange) {}

    fn set_fade_out(&mut self, _faded: bool) {}

    fn notify(&mut self, _message: &str) {}
}

// ============================================================================
// EditSurface
// ============================================================================

/// Opens value editors (keypads).
pub trait EditSurface: Send {
    /// Shows the keypad `keypad` editing `path`, prefilled with `initial`.
    ///
    /// The user's answer comes back through
    /// [`Session::confirm_edit`](super::Session::confirm_edit) or
    /// [`Session::cancel_edit`](super::Session::cancel_edit).
    fn start_edit(&mut self, keypad: &str, path: &str, value_type: &str, initial: Option<&HmiValue>);
}

impl EditSurface for NullSurface {
    fn start_edit(&mut self, _keypad: &str, _path: &str, _value_type: &str, _initial: Option<&HmiValue>) {}
}
