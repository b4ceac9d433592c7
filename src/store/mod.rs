//! Persisted display and keybinding records
//!
//! The core only depends on the two store traits; the UI may mutate the
//! underlying document directly and then send a coarse "store changed"
//! signal, after which the core reloads full snapshots.

mod json;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::display::DisplayId;
use crate::hotkey::ModifierState;

pub use json::JsonStore;

/// Desired state of one physical display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRecord {
    /// Stable hardware identifier, the natural key
    pub display_id: DisplayId,
    /// Name shown in the menu
    pub name: String,
    /// Whether the display should be powered
    pub enabled: bool,
}

impl DisplayRecord {
    pub fn new(display_id: DisplayId, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            display_id,
            name: name.into(),
            enabled,
        }
    }
}

/// What a keybinding is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeybindUsage {
    /// Disable the display currently under the pointer
    ActiveDisplay,
}

impl KeybindUsage {
    /// Every defined usage; the store is seeded with one binding per entry
    pub const ALL: [KeybindUsage; 1] = [KeybindUsage::ActiveDisplay];
}

impl std::fmt::Display for KeybindUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeybindUsage::ActiveDisplay => write!(f, "active_display"),
        }
    }
}

/// A recorded shortcut. A binding without a key code is unset and never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keybinding {
    pub usage: KeybindUsage,
    #[serde(default)]
    pub key_code: Option<u16>,
    /// Label of the main key as captured by the settings surface (e.g. "Space")
    #[serde(default)]
    pub main_key: Option<String>,
    #[serde(default)]
    pub modifiers: ModifierState,
}

impl Keybinding {
    /// An unset binding for `usage`
    pub fn unset(usage: KeybindUsage) -> Self {
        Self {
            usage,
            key_code: None,
            main_key: None,
            modifiers: ModifierState::default(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.key_code.is_some()
    }

    /// Exact match on key code and the full modifier state
    pub fn matches(&self, key_code: u16, modifiers: &ModifierState) -> bool {
        match self.key_code {
            Some(code) => code == key_code && self.modifiers == *modifiers,
            None => false,
        }
    }

    /// Forget the recorded shortcut
    pub fn clear(&mut self) {
        self.key_code = None;
        self.main_key = None;
        self.modifiers = ModifierState::default();
    }

    /// Human-readable form, e.g. "⌘⇧Space"
    pub fn label(&self) -> String {
        let mut label = self.modifiers.symbols();
        if let Some(key) = &self.main_key {
            label.push_str(key);
        }
        label
    }
}

/// Errors raised by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store document is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted mapping of display id to desired state
#[async_trait]
pub trait DisplayStore: Send + Sync {
    async fn get_display(&self, id: DisplayId) -> Result<Option<DisplayRecord>, StoreError>;
    async fn list_displays(&self) -> Result<Vec<DisplayRecord>, StoreError>;
    /// Insert or replace the record with the same `display_id`
    async fn put_display(&self, record: DisplayRecord) -> Result<(), StoreError>;
    async fn delete_all_displays(&self) -> Result<(), StoreError>;
}

/// Persisted mapping of usage to shortcut
#[async_trait]
pub trait KeybindStore: Send + Sync {
    async fn get_keybind(&self, usage: KeybindUsage) -> Result<Option<Keybinding>, StoreError>;
    async fn list_keybinds(&self) -> Result<Vec<Keybinding>, StoreError>;
    async fn put_keybind(&self, binding: Keybinding) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_space() -> Keybinding {
        Keybinding {
            usage: KeybindUsage::ActiveDisplay,
            key_code: Some(49),
            main_key: Some("Space".to_string()),
            modifiers: ModifierState {
                command: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_unset_binding_never_matches() {
        let binding = Keybinding::unset(KeybindUsage::ActiveDisplay);
        assert!(!binding.is_set());
        assert!(!binding.matches(0, &ModifierState::default()));
    }

    #[test]
    fn test_match_requires_exact_modifiers() {
        let binding = cmd_space();
        let cmd = ModifierState {
            command: true,
            ..Default::default()
        };
        let cmd_shift = ModifierState {
            command: true,
            shift: true,
            ..Default::default()
        };

        assert!(binding.matches(49, &cmd));
        assert!(!binding.matches(49, &cmd_shift));
        assert!(!binding.matches(50, &cmd));
    }

    #[test]
    fn test_label_and_clear() {
        let mut binding = cmd_space();
        assert_eq!(binding.label(), "⌘Space");

        binding.clear();
        assert!(!binding.is_set());
        assert_eq!(binding.label(), "");
    }

    #[test]
    fn test_keybinding_serialization() {
        let json = serde_json::to_string(&cmd_space()).unwrap();
        assert!(json.contains("active_display"));

        let parsed: Keybinding = serde_json::from_str(r#"{"usage":"active_display"}"#).unwrap();
        assert_eq!(parsed, Keybinding::unset(KeybindUsage::ActiveDisplay));
    }
}
