//! Global keyboard interception using macOS CGEventTap
//!
//! The tap runs on a dedicated thread with its own CFRunLoop and calls the
//! engine's handler inline for every key-down and flags-changed event.
//! The thread is never stopped; it lives until the process exits.

use std::cell::{Cell, RefCell};
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::{Duration, Instant};

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tracing::{debug, error, info, warn};

use super::engine::{HotkeyError, InputTap, KeyEvent, KeyEventKind, TapHandler, Verdict};
use super::keys::ModifierState;

/// [`InputTap`] backed by a session-level CGEventTap
#[derive(Debug, Default)]
pub struct EventTapListener;

impl EventTapListener {
    pub fn new() -> Self {
        Self
    }
}

impl InputTap for EventTapListener {
    /// Spawn the listener thread and wait until the tap is installed
    fn install(&self, handler: TapHandler) -> Result<(), HotkeyError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");
                run_event_loop(handler, ready_tx);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| HotkeyError::TapRegistrationFailed)?
    }
}

/// Convert a tap event into the engine's representation
fn decode(event_type: CGEventType, event: &CGEvent) -> Option<KeyEvent> {
    let kind = match event_type {
        CGEventType::KeyDown => KeyEventKind::KeyDown {
            key_code: event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16,
            is_repeat: event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0,
        },
        CGEventType::FlagsChanged => KeyEventKind::FlagsChanged,
        _ => return None,
    };

    Some(KeyEvent {
        kind,
        modifiers: ModifierState::from_bits(event.get_flags().bits()),
        timestamp: Instant::now(),
    })
}

/// Run the CFRunLoop with the event tap
fn run_event_loop(handler: TapHandler, ready: SyncSender<Result<(), HotkeyError>>) {
    let handler = RefCell::new(handler);
    let needs_reenable = Cell::new(false);

    // CGEventTap callback - must be fast and non-blocking
    let callback = |_proxy: core_graphics::event::CGEventTapProxy,
                    event_type: CGEventType,
                    event: &CGEvent|
     -> Option<CGEvent> {
        match event_type {
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled by the system, will re-enable");
                needs_reenable.set(true);
                return None;
            }
            _ => {}
        }

        let key_event = decode(event_type, event)?;

        // Fail open if the handler is somehow re-entered
        let verdict = match handler.try_borrow_mut() {
            Ok(mut handler) => (*handler)(&key_event),
            Err(_) => Verdict::Forward,
        };

        if verdict == Verdict::Swallow {
            debug!("swallowing bound key event");
            // Returning None passes the original event on, so neutralise it
            event.set_type(CGEventType::Null);
        }
        None
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![CGEventType::KeyDown, CGEventType::FlagsChanged],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Input Monitoring permission granted?");
            let _ = ready.send(Err(HotkeyError::TapRegistrationFailed));
            return;
        }
    };

    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            error!("failed to create run loop source for event tap");
            let _ = ready.send(Err(HotkeyError::TapRegistrationFailed));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();

    info!("event tap created and enabled");
    let _ = ready.send(Ok(()));

    loop {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }

        if needs_reenable.replace(false) {
            tap.enable();
            info!("event tap re-enabled");
        }
    }
}
