//! Keybinding matching and action hand-off
//!
//! Read from the event tap callback, written from the runtime. The binding
//! list is swapped as a whole snapshot so the callback never sees a partial
//! update and never waits on a lock. Actions go out through a bounded
//! channel with `try_send`, so a stalled consumer drops actions instead of
//! stalling system input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{KeybindStore, KeybindUsage, Keybinding, StoreError};

use super::ModifierState;

/// Work requested by the event tap, executed off the callback path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    /// Disable the display under the pointer
    DisableActiveDisplay,
    /// Force every attached display back on
    ReconnectAll,
}

impl From<KeybindUsage> for HotkeyAction {
    fn from(usage: KeybindUsage) -> Self {
        match usage {
            KeybindUsage::ActiveDisplay => HotkeyAction::DisableActiveDisplay,
        }
    }
}

impl std::fmt::Display for HotkeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeyAction::DisableActiveDisplay => write!(f, "DISABLE_ACTIVE_DISPLAY"),
            HotkeyAction::ReconnectAll => write!(f, "RECONNECT_ALL"),
        }
    }
}

/// Matches key-down events against the current bindings
pub struct HotkeyDispatcher {
    bindings: ArcSwap<Vec<Keybinding>>,
    bindings_enabled: AtomicBool,
    action_tx: mpsc::Sender<HotkeyAction>,
}

impl HotkeyDispatcher {
    pub fn new(action_tx: mpsc::Sender<HotkeyAction>) -> Self {
        Self {
            bindings: ArcSwap::from_pointee(Vec::new()),
            bindings_enabled: AtomicBool::new(true),
            action_tx,
        }
    }

    /// Fire the first binding that exactly matches; `true` means swallow
    ///
    /// Always `false` while bindings are disabled (shortcut recording).
    pub fn match_and_fire(&self, key_code: u16, modifiers: &ModifierState) -> bool {
        if !self.bindings_enabled() {
            return false;
        }

        let bindings = self.bindings.load();
        match bindings.iter().find(|b| b.matches(key_code, modifiers)) {
            Some(binding) => {
                self.fire(binding.usage.into());
                true
            }
            None => false,
        }
    }

    /// Queue an action without blocking
    pub fn fire(&self, action: HotkeyAction) {
        match self.action_tx.try_send(action) {
            Ok(()) => debug!(%action, "hotkey action queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%action, "hotkey action queue full, dropping action")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%action, "hotkey action queue closed")
            }
        }
    }

    pub fn bindings_enabled(&self) -> bool {
        self.bindings_enabled.load(Ordering::Acquire)
    }

    /// Gate used while the settings surface records a new shortcut
    pub fn set_bindings_enabled(&self, enabled: bool) {
        self.bindings_enabled.store(enabled, Ordering::Release);
    }

    /// Current binding snapshot
    pub fn bindings(&self) -> Arc<Vec<Keybinding>> {
        self.bindings.load_full()
    }

    /// Publish a new binding snapshot
    pub fn replace_bindings(&self, bindings: Vec<Keybinding>) {
        let active: Vec<Keybinding> = bindings.into_iter().filter(Keybinding::is_set).collect();
        debug!(active = active.len(), "keybindings replaced");
        self.bindings.store(Arc::new(active));
    }

    /// Reload the snapshot from the store ("store changed" signal)
    pub async fn reload(&self, store: &dyn KeybindStore) -> Result<usize, StoreError> {
        self.replace_bindings(store.list_keybinds().await?);
        Ok(self.bindings.load().len())
    }
}
