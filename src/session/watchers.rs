//! Built-in subscribers.
//!
//! | Watcher | Index | Frequency | Reaction |
//! |---------|-------|-----------|----------|
//! | [`Heartbeat`] | heartbeat | 1 Hz | Writes back value + 1 |
//! | [`CurrentPageWatcher`] | current page | 1 Hz | `!page` triggers a fading switch |
//! | [`LanguageWatcher`] | local `lang` | best effort | Selects language, re-enters page |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::identifiers::{SubscriberId, VariableIndex};
use crate::protocol::HmiValue;

use super::navigation::PageTarget;
use super::widget::{Effects, Subscriber};

// ============================================================================
// Heartbeat
// ============================================================================

/// Liveness probe for watchdog sessions.
///
/// The controller pushes the heartbeat every second and expects it back
/// incremented; a gap tells it the client is gone.
#[derive(Debug)]
pub struct Heartbeat {
    id: SubscriberId,
    index: VariableIndex,
}

impl Heartbeat {
    /// Creates a heartbeat echoing on `index`.
    #[must_use]
    pub fn new(index: VariableIndex) -> Self {
        Self {
            id: SubscriberId::next(),
            index,
        }
    }

    /// Returns the heartbeat index.
    #[inline]
    #[must_use]
    pub fn index(&self) -> VariableIndex {
        self.index
    }
}

impl Subscriber for Heartbeat {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn frequency(&self) -> f64 {
        1.0
    }

    fn new_hmi_value(
        &self,
        _index: VariableIndex,
        value: &HmiValue,
        _old: Option<&HmiValue>,
        effects: &mut Effects,
    ) {
        if let Some(v) = value.to_i64() {
            effects.apply_value(self.index, HmiValue::Int(v.wrapping_add(1)));
        }
    }
}

// ============================================================================
// CurrentPageWatcher
// ============================================================================

/// Lets the controller drive navigation.
///
/// The controller requests a switch by writing `"!page"` or `"!page@path"`
/// to the current page variable. Values without the prefix are the
/// client's own reports and are ignored.
#[derive(Debug)]
pub struct CurrentPageWatcher {
    id: SubscriberId,
}

impl CurrentPageWatcher {
    /// Creates a watcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SubscriberId::next(),
        }
    }
}

impl Default for CurrentPageWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for CurrentPageWatcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn frequency(&self) -> f64 {
        1.0
    }

    fn new_hmi_value(
        &self,
        _index: VariableIndex,
        value: &HmiValue,
        _old: Option<&HmiValue>,
        effects: &mut Effects,
    ) {
        if let Some(page) = value.as_str().and_then(|s| s.strip_prefix('!')) {
            effects.fading_switch(PageTarget::parse(page));
        }
    }
}

// ============================================================================
// LanguageWatcher
// ============================================================================

/// A selectable language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Language {
    /// Display name.
    pub name: String,
    /// Locale code, e.g. `en_US`.
    pub code: String,
}

/// Clamps a language selection into `[0, count - 1]`.
///
/// Non-numeric selections pick the first language.
#[must_use]
pub fn clamp_language(value: &HmiValue, count: usize) -> usize {
    let max = i64::try_from(count.saturating_sub(1)).unwrap_or(i64::MAX);
    value.to_i64().unwrap_or(0).clamp(0, max) as usize
}

/// Reacts to the local language selection.
#[derive(Debug)]
pub struct LanguageWatcher {
    id: SubscriberId,
    languages: Vec<Language>,
    code_index: Option<VariableIndex>,
    name_index: Option<VariableIndex>,
}

impl LanguageWatcher {
    /// Creates a watcher over the configured languages.
    #[must_use]
    pub fn new(languages: Vec<Language>) -> Self {
        Self {
            id: SubscriberId::next(),
            languages,
            code_index: None,
            name_index: None,
        }
    }

    /// Sets the locals receiving the selected code and name.
    #[must_use]
    pub fn with_outputs(mut self, code_index: Option<VariableIndex>, name_index: Option<VariableIndex>) -> Self {
        self.code_index = code_index;
        self.name_index = name_index;
        self
    }

    /// Returns the number of languages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Returns `true` if no language is configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl Subscriber for LanguageWatcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn new_hmi_value(
        &self,
        _index: VariableIndex,
        value: &HmiValue,
        _old: Option<&HmiValue>,
        effects: &mut Effects,
    ) {
        let number = clamp_language(value, self.languages.len());
        effects.language(number);

        if let Some(language) = self.languages.get(number) {
            if let Some(index) = self.code_index {
                effects.apply_value(index, HmiValue::Str(language.code.clone()));
            }
            if let Some(index) = self.name_index {
                effects.apply_value(index, HmiValue::Str(language.name.clone()));
            }
        }

        effects.switch_page(None);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::widget::Effect;

    fn idx(raw: u32) -> VariableIndex {
        VariableIndex::new(raw)
    }

    #[test]
    fn test_heartbeat_echoes_incremented() {
        let hb = Heartbeat::new(idx(0));
        let mut effects = Effects::new();
        hb.new_hmi_value(idx(0), &HmiValue::Int(41), None, &mut effects);

        assert_eq!(hb.frequency(), 1.0);
        assert_eq!(
            effects.drain(),
            vec![Effect::ApplyValue {
                index: idx(0),
                value: HmiValue::Int(42)
            }]
        );
    }

    #[test]
    fn test_current_page_requires_bang() {
        let watcher = CurrentPageWatcher::new();
        let mut effects = Effects::new();

        watcher.new_hmi_value(idx(3), &HmiValue::from("Home"), None, &mut effects);
        assert!(effects.is_empty());

        watcher.new_hmi_value(idx(3), &HmiValue::from("!Motor@/PUMP"), None, &mut effects);
        assert_eq!(
            effects.drain(),
            vec![Effect::SwitchPage {
                target: Some(PageTarget::parse("Motor@/PUMP")),
                fade: true
            }]
        );
    }

    #[test]
    fn test_clamp_language() {
        assert_eq!(clamp_language(&HmiValue::Int(-3), 3), 0);
        assert_eq!(clamp_language(&HmiValue::Int(7), 3), 2);
        assert_eq!(clamp_language(&HmiValue::from("1"), 3), 1);
        assert_eq!(clamp_language(&HmiValue::from("fr"), 3), 0);
        assert_eq!(clamp_language(&HmiValue::Int(2), 0), 0);
    }

    #[test]
    fn test_language_selection() {
        let watcher = LanguageWatcher::new(vec![
            Language {
                name: "English".into(),
                code: "en_US".into(),
            },
            Language {
                name: "Français".into(),
                code: "fr_FR".into(),
            },
        ])
        .with_outputs(Some(idx(101)), Some(idx(102)));

        let mut effects = Effects::new();
        watcher.new_hmi_value(idx(100), &HmiValue::Int(5), None, &mut effects);
        assert_eq!(
            effects.drain(),
            vec![
                Effect::Language(1),
                Effect::ApplyValue {
                    index: idx(101),
                    value: HmiValue::from("fr_FR")
                },
                Effect::ApplyValue {
                    index: idx(102),
                    value: HmiValue::from("Français")
                },
                Effect::SwitchPage {
                    target: None,
                    fade: false
                },
            ]
        );
    }
}
