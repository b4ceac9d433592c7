//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::display::{DisplayError, DisplayId};
use crate::events::DaemonEvent;
use crate::hotkey::TapState;
use crate::store::{DisplayRecord, KeybindUsage, Keybinding, StoreError};

/// Requests from the settings UI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Known displays, from the in-memory snapshot
    ListDisplays,

    /// Reconcile the store with attached hardware and re-apply saved state
    RefreshDisplays {
        #[serde(default)]
        clear_disconnected: bool,
    },

    SetDisplayEnabled { display_id: DisplayId, enabled: bool },

    ToggleDisplay { display_id: DisplayId },

    /// Force every display back on
    ConnectAll,

    ListKeybinds,

    SetKeybind { binding: Keybinding },

    ClearKeybind { usage: KeybindUsage },

    /// Gate keybinding matching, e.g. while the UI captures a new shortcut
    SetBindingsEnabled { enabled: bool },

    /// Another process wrote the store; reload everything
    StoreChanged,

    /// Subscribe to event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    Displays { displays: Vec<DisplayRecord> },

    Display { display: DisplayRecord },

    Keybinds { keybinds: Vec<Keybinding> },

    Keybind { binding: Keybinding },

    /// Request handled, nothing to report
    Ok,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<DisplayError> for Response {
    fn from(e: DisplayError) -> Self {
        Response::error(e.code(), e.to_string())
    }
}

impl From<StoreError> for Response {
    fn from(e: StoreError) -> Self {
        Response::error("store_error", e.to_string())
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: DaemonEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Event tap lifecycle state
    pub tap_state: TapState,

    /// Whether keybindings are currently matched
    pub bindings_enabled: bool,

    /// Number of displays in the current snapshot
    pub display_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tap_state: TapState::Uninitialized,
            bindings_enabled: true,
            display_count: 0,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetDisplayEnabled {
            display_id: 2,
            enabled: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_display_enabled"));
        assert!(json.contains("\"display_id\":2"));
    }

    #[test]
    fn test_refresh_defaults_to_keeping_records() {
        let req: Request = serde_json::from_str(r#"{"type":"refresh_displays"}"#).unwrap();
        assert_eq!(
            req,
            Request::RefreshDisplays {
                clear_disconnected: false
            }
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("uninitialized"));
    }

    #[test]
    fn test_display_error_maps_to_code() {
        let resp: Response = DisplayError::UnknownDisplay(7).into();
        match resp {
            Response::Error { code, message } => {
                assert_eq!(code, "unknown_display");
                assert!(message.contains('7'));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event {
            event: DaemonEvent::BindingsEnabledChanged { enabled: false },
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("bindings_enabled_changed"));

        let parsed: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, note);
    }
}
