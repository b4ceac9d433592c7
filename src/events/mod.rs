//! Events broadcast to control-socket subscribers
//!
//! Emitted by the action executor, the topology watcher and the request
//! handlers whenever the display or keybinding state changes.

use serde::{Deserialize, Serialize};

use crate::display::DisplayId;
use crate::hotkey::{HotkeyAction, TapState};

/// Events emitted by the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// Displays were reconciled with the store
    DisplaysRefreshed {
        /// Number of known displays afterwards
        count: usize,
    },

    /// One display's desired state changed
    DisplayUpdated { display_id: DisplayId, enabled: bool },

    /// Every display was forced back on
    AllDisplaysReconnected {
        /// Number of known displays afterwards
        count: usize,
    },

    /// A hotkey action ran in the background and failed
    ActionFailed { action: HotkeyAction, message: String },

    /// Keybindings were reloaded from the store
    KeybindsReloaded {
        /// Number of bindings that can match
        active: usize,
    },

    /// Binding-capture mode was entered or left
    BindingsEnabledChanged { enabled: bool },

    /// The event tap changed state
    TapStateChanged { state: TapState },
}

impl std::fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEvent::DisplaysRefreshed { count } => write!(f, "DISPLAYS_REFRESHED ({})", count),
            DaemonEvent::DisplayUpdated {
                display_id,
                enabled,
            } => write!(f, "DISPLAY_UPDATED ({} -> {})", display_id, enabled),
            DaemonEvent::AllDisplaysReconnected { count } => {
                write!(f, "ALL_DISPLAYS_RECONNECTED ({})", count)
            }
            DaemonEvent::ActionFailed { action, message } => {
                write!(f, "ACTION_FAILED ({}: {})", action, message)
            }
            DaemonEvent::KeybindsReloaded { active } => write!(f, "KEYBINDS_RELOADED ({})", active),
            DaemonEvent::BindingsEnabledChanged { enabled } => {
                write!(f, "BINDINGS_ENABLED_CHANGED ({})", enabled)
            }
            DaemonEvent::TapStateChanged { state } => write!(f, "TAP_STATE_CHANGED ({})", state),
        }
    }
}
