//! Modifier key definitions and state tracking
//!
//! Provides the device-independent modifier flag masks used by macOS key
//! events and a struct for the modifiers held during one event.

use serde::{Deserialize, Serialize};

/// Modifier key flag masks (the `CGEventFlags` / `NSEvent.ModifierFlags` bits)
pub mod flags {
    /// Caps Lock is engaged
    pub const CAPS_LOCK: u64 = 1 << 16;
    /// Shift key modifier flag
    pub const SHIFT: u64 = 1 << 17;
    /// Control key modifier flag
    pub const CONTROL: u64 = 1 << 18;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 1 << 19;
    /// Command key modifier flag
    pub const COMMAND: u64 = 1 << 20;
    /// Fn key modifier flag
    pub const FUNCTION: u64 = 1 << 23;
}

/// Tracks which modifier keys are held
///
/// Bits that macOS sets on its own for some keys (numeric pad, help) are not
/// modelled, so arrow keys compare the same as letter keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierState {
    /// Shift key is held
    pub shift: bool,
    /// Control key is held
    pub control: bool,
    /// Option/Alt key is held
    pub option: bool,
    /// Command key is held
    pub command: bool,
    /// Caps Lock is engaged
    pub caps_lock: bool,
    /// Fn key is held
    pub function: bool,
}

impl ModifierState {
    /// Create a new ModifierState from raw event flag bits
    pub fn from_bits(bits: u64) -> Self {
        Self {
            shift: bits & flags::SHIFT != 0,
            control: bits & flags::CONTROL != 0,
            option: bits & flags::OPTION != 0,
            command: bits & flags::COMMAND != 0,
            caps_lock: bits & flags::CAPS_LOCK != 0,
            function: bits & flags::FUNCTION != 0,
        }
    }

    /// Raw flag bits for this state
    pub fn bits(&self) -> u64 {
        [
            (self.shift, flags::SHIFT),
            (self.control, flags::CONTROL),
            (self.option, flags::OPTION),
            (self.command, flags::COMMAND),
            (self.caps_lock, flags::CAPS_LOCK),
            (self.function, flags::FUNCTION),
        ]
        .iter()
        .filter(|(held, _)| *held)
        .fold(0, |acc, (_, bit)| acc | bit)
    }

    /// Check if no modifier key is held
    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    /// Check if Command is held without Shift, Control or Option
    ///
    /// Caps Lock and Fn are ignored since they do not form chords.
    pub fn is_command_only(&self) -> bool {
        self.command && !self.has_non_command_chord_modifier()
    }

    /// Check if Shift, Control or Option is held
    pub fn has_non_command_chord_modifier(&self) -> bool {
        self.shift || self.control || self.option
    }

    /// Menu-style symbols for the held chord modifiers, e.g. "⌘⇧"
    pub fn symbols(&self) -> String {
        let mut out = String::new();
        if self.command {
            out.push('⌘');
        }
        if self.control {
            out.push('⌃');
        }
        if self.option {
            out.push('⌥');
        }
        if self.shift {
            out.push('⇧');
        }
        out
    }
}
