//! Panic-gesture detection: rapid Command-only presses
//!
//! Pure state machine over flags-changed events. It is driven from the event
//! tap callback, but knows nothing about it, so it can be tested with
//! synthetic timestamps.

use std::time::{Duration, Instant};

use super::ModifierState;

/// Maximum gap between two flags-changed events of one burst
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(400);

/// Qualifying presses needed to fire the gesture
pub const DEFAULT_PRESSES: u32 = 5;

/// Counts Command-only flags-changed events that arrive within the window
#[derive(Debug, Clone)]
pub struct PanicSequenceDetector {
    window: Duration,
    presses: u32,
    last_flags_change: Option<Instant>,
    consecutive: u32,
}

impl Default for PanicSequenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_PRESSES)
    }
}

impl PanicSequenceDetector {
    pub fn new(window: Duration, presses: u32) -> Self {
        Self {
            window,
            presses,
            last_flags_change: None,
            consecutive: 0,
        }
    }

    /// Current run of qualifying presses
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Feed one flags-changed event; returns `true` when the gesture fires
    ///
    /// A qualifying event (Command alone, within the window) extends the run.
    /// A gap at or beyond the window, or another chord modifier, resets it.
    /// Releases within the window leave the run untouched. The window anchor
    /// moves on every event, qualifying or not.
    pub fn observe(&mut self, modifiers: &ModifierState, at: Instant) -> bool {
        let within_window = match self.last_flags_change {
            None => true,
            Some(last) => at.saturating_duration_since(last) < self.window,
        };

        let mut fired = false;
        if within_window && modifiers.is_command_only() {
            self.consecutive += 1;
            if self.consecutive >= self.presses {
                fired = true;
                self.consecutive = 0;
            }
        } else if !within_window || modifiers.has_non_command_chord_modifier() {
            self.consecutive = 0;
        }

        self.last_flags_change = Some(at);
        fired
    }
}
