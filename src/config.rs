//! Static HMI configuration.
//!
//! Tables generated alongside the controller program and supplied once at
//! startup. They never change during a session.
//!
//! # Example
//!
//! ```ignore
//! use hmi_link::HmiConfig;
//!
//! let config = HmiConfig::from_json(r#"{
//!     "hash": [1, 2, 3],
//!     "last_remote_index": 10,
//!     "types": { "0": "INT", "1": "STRING" },
//!     "pages": [{ "name": "Home", "bbox": [0, 0, 800, 600] }],
//!     "default_page": "Home"
//! }"#)?;
//! ```
//!
//! # Tables
//!
//! | Field | Content |
//! |-------|---------|
//! | `types` | Type tag by index |
//! | `paths` | Tree path by index |
//! | `nodes` | Index and class by tree path |
//! | `pages` | Page name, default index, class, viewport, detachables |
//! | `locals` | Named HMI-local indexes |
//! | `persistent` | Variable name by persisted local index |
//! | `languages` | Selectable languages |
//! | `keypads` | Keypad id by edit type |

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::identifiers::VariableIndex;
use crate::protocol::TypeTable;
use crate::session::navigation::NodeInfo;
use crate::session::watchers::Language;

// ============================================================================
// PageConfig
// ============================================================================

/// Static part of a page description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageConfig {
    /// Page name.
    pub name: String,
    /// Default sub-index for node-parameterized pages.
    #[serde(default)]
    pub index: Option<u32>,
    /// Node class the page displays.
    #[serde(default)]
    pub class: Option<String>,
    /// Viewport `[x, y, width, height]`.
    pub bbox: [f64; 4],
    /// Elements attached only while the page is visible.
    #[serde(default)]
    pub detachables: Vec<String>,
}

// ============================================================================
// LocalIndexes
// ============================================================================

/// HMI-local variables the session itself reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocalIndexes {
    /// Receives the tree path of the entered page.
    #[serde(default)]
    pub page_node: Option<VariableIndex>,
    /// Selected language number.
    #[serde(default)]
    pub lang: Option<VariableIndex>,
    /// Selected language code.
    #[serde(default)]
    pub lang_code: Option<VariableIndex>,
    /// Selected language name.
    #[serde(default)]
    pub lang_name: Option<VariableIndex>,
}

impl LocalIndexes {
    fn iter(&self) -> impl Iterator<Item = (&'static str, VariableIndex)> + '_ {
        [
            ("page_node", self.page_node),
            ("lang", self.lang),
            ("lang_code", self.lang_code),
            ("lang_name", self.lang_name),
        ]
        .into_iter()
        .filter_map(|(name, index)| index.map(|i| (name, i)))
    }
}

// ============================================================================
// HmiConfig
// ============================================================================

/// Static tables describing one generated HMI.
#[derive(Debug, Clone, Deserialize)]
pub struct HmiConfig {
    /// Build fingerprint prefixing every message.
    pub hash: Vec<u8>,
    /// Highest controller-resident index.
    pub last_remote_index: VariableIndex,
    /// Type tag by index.
    pub types: TypeTable,
    /// Tree path by index.
    #[serde(default)]
    pub paths: BTreeMap<u32, String>,
    /// Node by tree path.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeInfo>,
    /// Page descriptions.
    pub pages: Vec<PageConfig>,
    /// Page shown at startup.
    pub default_page: String,
    /// Named local indexes.
    #[serde(default)]
    pub locals: LocalIndexes,
    /// Per-client current page variable, written on every switch.
    #[serde(default)]
    pub current_page_index: Option<VariableIndex>,
    /// Heartbeat variable for watchdog sessions.
    #[serde(default)]
    pub heartbeat_index: Option<VariableIndex>,
    /// Variable name by persisted local index.
    #[serde(default)]
    pub persistent: BTreeMap<VariableIndex, String>,
    /// Selectable languages.
    #[serde(default)]
    pub languages: Vec<Language>,
    /// Keypad id by edit type.
    #[serde(default)]
    pub keypads: BTreeMap<String, String>,
    /// Idle delay before showing the `ScreenSaver` page.
    #[serde(default)]
    pub screensaver_delay_secs: Option<u64>,
}

impl HmiConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed JSON and [`Error::Config`] if
    /// the tables are inconsistent.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks the tables for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.hash.is_empty() {
            return Err(Error::config("hash must not be empty"));
        }

        let mut names = BTreeSet::new();
        for page in &self.pages {
            if !names.insert(page.name.as_str()) {
                return Err(Error::config(format!("duplicate page {:?}", page.name)));
            }
            if page.bbox[2] < 0.0 || page.bbox[3] < 0.0 {
                return Err(Error::config(format!("page {:?} has a negative size", page.name)));
            }
        }
        if !names.contains(self.default_page.as_str()) {
            return Err(Error::config(format!(
                "default page {:?} is not a page",
                self.default_page
            )));
        }

        for (name, index) in self.locals.iter() {
            if index <= self.last_remote_index {
                return Err(Error::config(format!(
                    "local {name} ({index}) is not above last remote index {}",
                    self.last_remote_index
                )));
            }
        }

        for (index, name) in &self.persistent {
            if *index <= self.last_remote_index {
                return Err(Error::config(format!(
                    "persistent {name} ({index}) is not a local index"
                )));
            }
        }

        for (what, index) in [
            ("current page", self.current_page_index),
            ("heartbeat", self.heartbeat_index),
        ] {
            if let Some(index) = index
                && index <= self.last_remote_index
                && self.types.get(index).is_none()
            {
                return Err(Error::config(format!("{what} index {index} has no type")));
            }
        }

        Ok(())
    }

    /// Returns the screensaver delay, if enabled.
    #[must_use]
    pub fn screensaver_delay(&self) -> Option<Duration> {
        self.screensaver_delay_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::TypeTag;

    const SAMPLE: &str = r#"{
        "hash": [1, 2, 3],
        "last_remote_index": 10,
        "types": { "0": "INT", "3": "STRING", "4": "HMI_NODE_IGNORED_BY_NOBODY" }
    }"#;

    fn sample() -> String {
        r#"{
            "hash": [1, 2, 3],
            "last_remote_index": 10,
            "types": { "0": "INT", "3": "STRING", "5": "REAL" },
            "paths": { "5": "/MOTOR1" },
            "nodes": { "/MOTOR1": { "index": 5, "class": "MOTOR" } },
            "pages": [
                { "name": "Home", "bbox": [0, 0, 800, 600], "detachables": ["clock"] },
                { "name": "Motor", "index": 5, "class": "MOTOR", "bbox": [800, 0, 800, 600] }
            ],
            "default_page": "Home",
            "locals": { "page_node": 11, "lang": 12, "lang_code": 13, "lang_name": 14 },
            "current_page_index": 3,
            "heartbeat_index": 0,
            "persistent": { "12": "lang" },
            "languages": [ { "name": "English", "code": "en_US" } ],
            "keypads": { "HMI_REAL": "NumPad" },
            "screensaver_delay_secs": 60
        }"#
        .to_string()
    }

    #[test]
    fn test_from_json_full() {
        let config = HmiConfig::from_json(&sample()).expect("config");
        assert_eq!(config.hash, vec![1, 2, 3]);
        assert_eq!(config.types.get(VariableIndex::new(3)), Some(TypeTag::String));
        assert_eq!(config.paths.get(&5).map(String::as_str), Some("/MOTOR1"));
        assert_eq!(config.nodes["/MOTOR1"].class, "MOTOR");
        assert_eq!(config.pages[1].index, Some(5));
        assert_eq!(config.locals.lang, Some(VariableIndex::new(12)));
        assert_eq!(config.persistent[&VariableIndex::new(12)], "lang");
        assert_eq!(config.screensaver_delay(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        assert!(matches!(HmiConfig::from_json(SAMPLE), Err(Error::Json(_))));
    }

    #[test]
    fn test_default_page_must_exist() {
        let text = sample().replace("\"default_page\": \"Home\"", "\"default_page\": \"Nope\"");
        assert!(matches!(HmiConfig::from_json(&text), Err(Error::Config { .. })));
    }

    #[test]
    fn test_locals_must_be_local() {
        let text = sample().replace("\"page_node\": 11", "\"page_node\": 7");
        assert!(matches!(HmiConfig::from_json(&text), Err(Error::Config { .. })));
    }

    #[test]
    fn test_persistent_must_be_local() {
        let text = sample().replace("\"12\": \"lang\"", "\"2\": \"lang\"");
        assert!(matches!(HmiConfig::from_json(&text), Err(Error::Config { .. })));
    }

    #[test]
    fn test_empty_hash_is_rejected() {
        let text = sample().replace("\"hash\": [1, 2, 3]", "\"hash\": []");
        assert!(matches!(HmiConfig::from_json(&text), Err(Error::Config { .. })));
    }

    #[test]
    fn test_duplicate_pages_are_rejected() {
        let text = sample().replace("\"name\": \"Motor\"", "\"name\": \"Home\"");
        assert!(matches!(HmiConfig::from_json(&text), Err(Error::Config { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("hmi.json");
        std::fs::write(&path, sample()).expect("write");
        assert!(HmiConfig::from_file(&path).is_ok());
        assert!(matches!(
            HmiConfig::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
