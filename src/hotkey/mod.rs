//! Hotkey module for global keyboard interception
//!
//! Uses a macOS CGEventTap to see every key event system-wide, swallow the
//! ones bound to an action, and watch modifier bursts for the panic gesture.

mod debounce;
mod dispatcher;
mod engine;
mod keys;
#[cfg(target_os = "macos")]
mod listener;
mod permission;

pub use debounce::PanicSequenceDetector;
pub use dispatcher::{HotkeyAction, HotkeyDispatcher};
pub use engine::{
    handle_event, CallbackState, EventInterceptionEngine, HotkeyError, InputTap, KeyEvent,
    KeyEventKind, TapHandler, TapState, Verdict,
};
pub use keys::{flags, ModifierState};
#[cfg(target_os = "macos")]
pub use listener::EventTapListener;
pub use permission::has_input_monitoring_permission;
