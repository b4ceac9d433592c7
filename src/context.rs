//! Shared services handed to the control socket and background tasks

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::display::{DisplayError, DisplayId, DisplayRegistry, ReconnectAllRecovery};
use crate::events::DaemonEvent;
use crate::hotkey::{EventInterceptionEngine, HotkeyDispatcher, TapState};
use crate::ipc::DaemonStatus;
use crate::store::{DisplayRecord, JsonStore, KeybindStore, KeybindUsage, Keybinding, StoreError};

/// Everything the daemon's application tasks operate on
pub struct AppContext {
    pub registry: Arc<DisplayRegistry>,
    pub recovery: Arc<ReconnectAllRecovery>,
    pub dispatcher: Arc<HotkeyDispatcher>,
    pub store: Arc<JsonStore>,
    engine: Option<&'static EventInterceptionEngine>,
    events: broadcast::Sender<DaemonEvent>,
    started_at: Instant,
}

impl AppContext {
    pub fn new(
        registry: Arc<DisplayRegistry>,
        recovery: Arc<ReconnectAllRecovery>,
        dispatcher: Arc<HotkeyDispatcher>,
        store: Arc<JsonStore>,
        events: broadcast::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            registry,
            recovery,
            dispatcher,
            store,
            engine: None,
            events,
            started_at: Instant::now(),
        }
    }

    /// Attach the process-wide interception engine for status reporting
    pub fn with_engine(mut self, engine: &'static EventInterceptionEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: DaemonEvent) {
        debug!(%event, "emitting event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn tap_state(&self) -> TapState {
        self.engine
            .map(EventInterceptionEngine::state)
            .unwrap_or(TapState::Uninitialized)
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tap_state: self.tap_state(),
            bindings_enabled: self.dispatcher.bindings_enabled(),
            display_count: self.registry.snapshot().len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    pub async fn refresh_displays(&self, clear_disconnected: bool) -> Result<Vec<DisplayRecord>, DisplayError> {
        let records = self.registry.refresh(clear_disconnected).await?;
        self.emit(DaemonEvent::DisplaysRefreshed {
            count: records.len(),
        });
        Ok(records)
    }

    pub async fn set_display_enabled(&self, id: DisplayId, enabled: bool) -> Result<DisplayRecord, DisplayError> {
        let record = self.registry.set_enabled(id, enabled).await?;
        self.emit_updated(&record);
        Ok(record)
    }

    pub async fn toggle_display(&self, id: DisplayId) -> Result<DisplayRecord, DisplayError> {
        let record = self.registry.toggle(id).await?;
        self.emit_updated(&record);
        Ok(record)
    }

    pub async fn disable_display_under_pointer(&self) -> Result<Option<DisplayRecord>, DisplayError> {
        let record = self.registry.disable_display_under_pointer().await?;
        if let Some(record) = &record {
            self.emit_updated(record);
        }
        Ok(record)
    }

    pub async fn connect_all(&self) -> Result<Vec<DisplayRecord>, DisplayError> {
        let records = self.recovery.connect_all().await?;
        self.emit(DaemonEvent::AllDisplaysReconnected {
            count: records.len(),
        });
        Ok(records)
    }

    /// React to the coarse "store changed" signal by reloading everything
    pub async fn store_changed(&self) -> Result<(), DisplayError> {
        self.store.reload().await?;
        self.registry.reload_snapshot().await?;
        self.reload_keybinds().await?;
        info!("store reloaded");
        Ok(())
    }

    pub async fn reload_keybinds(&self) -> Result<usize, StoreError> {
        let active = self.dispatcher.reload(self.store.as_ref()).await?;
        self.emit(DaemonEvent::KeybindsReloaded { active });
        Ok(active)
    }

    pub async fn set_keybind(&self, binding: Keybinding) -> Result<Keybinding, StoreError> {
        info!(usage = %binding.usage, label = %binding.label(), "keybinding updated");
        self.store.put_keybind(binding.clone()).await?;
        self.reload_keybinds().await?;
        Ok(binding)
    }

    pub async fn clear_keybind(&self, usage: KeybindUsage) -> Result<Keybinding, StoreError> {
        let mut binding = self
            .store
            .get_keybind(usage)
            .await?
            .unwrap_or_else(|| Keybinding::unset(usage));
        binding.clear();
        self.set_keybind(binding).await
    }

    pub async fn keybinds(&self) -> Result<Vec<Keybinding>, StoreError> {
        self.store.list_keybinds().await
    }

    pub fn set_bindings_enabled(&self, enabled: bool) {
        if self.dispatcher.bindings_enabled() != enabled {
            info!(enabled, "keybindings gate changed");
            self.dispatcher.set_bindings_enabled(enabled);
            self.emit(DaemonEvent::BindingsEnabledChanged { enabled });
        }
    }

    fn emit_updated(&self, record: &DisplayRecord) {
        self.emit(DaemonEvent::DisplayUpdated {
            display_id: record.display_id,
            enabled: record.enabled,
        });
    }
}
