//! Event interception engine
//!
//! Owns the per-callback state and makes the forward/swallow decision for
//! every keyboard event. The decision runs inline in the OS callback, so it
//! only touches the binding snapshot, an atomic flag and its own state.
//!
//! The engine is process-wide: it is installed once at startup and stays
//! alive until the process exits. Nothing tears it down.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{HotkeyAction, HotkeyDispatcher, ModifierState, PanicSequenceDetector};

/// Lifecycle of the event tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapState {
    /// No installation attempted yet
    Uninitialized,
    /// Tap installed and receiving events
    TapActive,
    /// Permission missing or installation failed; keybindings are disabled
    TapUnavailable,
}

impl TapState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TapState::TapActive,
            2 => TapState::TapUnavailable,
            _ => TapState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TapState::Uninitialized => 0,
            TapState::TapActive => 1,
            TapState::TapUnavailable => 2,
        }
    }
}

impl std::fmt::Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TapState::Uninitialized => write!(f, "Uninitialized"),
            TapState::TapActive => write!(f, "TapActive"),
            TapState::TapUnavailable => write!(f, "TapUnavailable"),
        }
    }
}

/// Kind of keyboard event delivered by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown { key_code: u16, is_repeat: bool },
    FlagsChanged,
    Other,
}

/// A keyboard event, already decoded from the OS representation
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub modifiers: ModifierState,
    pub timestamp: Instant,
}

/// What the tap should do with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Swallow,
}

/// State carried across callback invocations
///
/// Owned by the callback closure only; a fresh one is created every time a
/// tap is installed.
#[derive(Debug, Default)]
pub struct CallbackState {
    pub last_modifiers: ModifierState,
    pub panic: PanicSequenceDetector,
}

/// Per-event handler handed to an [`InputTap`]
pub type TapHandler = Box<dyn FnMut(&KeyEvent) -> Verdict + Send>;

/// Errors from event tap installation
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("failed to create event tap")]
    TapRegistrationFailed,

    #[error("interception engine is already initialized")]
    AlreadyInitialized,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// The OS facility that delivers every keyboard event system-wide
pub trait InputTap {
    fn install(&self, handler: TapHandler) -> Result<(), HotkeyError>;
}

/// Decide what to do with one event
///
/// Key-down (non-repeat) events are matched against the bindings.
/// Flags-changed events feed the panic detector and are always forwarded.
pub fn handle_event(state: &mut CallbackState, dispatcher: &HotkeyDispatcher, event: &KeyEvent) -> Verdict {
    match event.kind {
        KeyEventKind::KeyDown {
            key_code,
            is_repeat: false,
        } => {
            if dispatcher.match_and_fire(key_code, &event.modifiers) {
                Verdict::Swallow
            } else {
                Verdict::Forward
            }
        }
        KeyEventKind::FlagsChanged => {
            if state.panic.observe(&event.modifiers, event.timestamp) {
                warn!("panic sequence detected, reconnecting all displays");
                dispatcher.fire(HotkeyAction::ReconnectAll);
            }
            state.last_modifiers = event.modifiers;
            Verdict::Forward
        }
        KeyEventKind::KeyDown { is_repeat: true, .. } | KeyEventKind::Other => Verdict::Forward,
    }
}

/// Owner of the event tap and its lifecycle state
pub struct EventInterceptionEngine {
    dispatcher: Arc<HotkeyDispatcher>,
    state: AtomicU8,
}

static ENGINE: OnceLock<EventInterceptionEngine> = OnceLock::new();

impl EventInterceptionEngine {
    pub fn new(dispatcher: Arc<HotkeyDispatcher>) -> Self {
        Self {
            dispatcher,
            state: AtomicU8::new(TapState::Uninitialized.as_u8()),
        }
    }

    /// Register the process-wide engine; it is never dropped
    pub fn install_global(dispatcher: Arc<HotkeyDispatcher>) -> Result<&'static Self, HotkeyError> {
        ENGINE
            .set(Self::new(dispatcher))
            .map_err(|_| HotkeyError::AlreadyInitialized)?;
        ENGINE.get().ok_or(HotkeyError::AlreadyInitialized)
    }

    /// The process-wide engine, if one was installed
    pub fn global() -> Option<&'static Self> {
        ENGINE.get()
    }

    pub fn state(&self) -> TapState {
        TapState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn dispatcher(&self) -> &Arc<HotkeyDispatcher> {
        &self.dispatcher
    }

    /// Try to install the tap
    ///
    /// Missing permission or a failed installation degrade to
    /// [`TapState::TapUnavailable`]; the caller is never failed. A new attempt
    /// (e.g. after the user grants permission) may be made later.
    pub fn initialize(&self, tap: &dyn InputTap, has_permission: bool) -> TapState {
        if self.state() == TapState::TapActive {
            return TapState::TapActive;
        }

        let next = if !has_permission {
            warn!("input monitoring permission not granted, keybindings disabled");
            TapState::TapUnavailable
        } else {
            let dispatcher = Arc::clone(&self.dispatcher);
            let mut callback_state = CallbackState::default();
            let handler: TapHandler =
                Box::new(move |event: &KeyEvent| handle_event(&mut callback_state, &dispatcher, event));

            match tap.install(handler) {
                Ok(()) => {
                    info!("event tap installed");
                    TapState::TapActive
                }
                Err(e) => {
                    error!(error = %e, "event tap registration failed, keybindings disabled");
                    TapState::TapUnavailable
                }
            }
        };

        self.state.store(next.as_u8(), Ordering::Release);
        next
    }
}
