//! Reconciliation of attached displays with the persisted store
//!
//! The store holds *desired* state. After any mutation the registry re-applies
//! it to hardware, so divergence never outlives one refresh pass.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::store::{DisplayRecord, DisplayStore};

use super::{AttachedDisplay, DisplayChange, DisplayConfigTransactor, DisplayError, DisplayHardware, DisplayId};

/// Authoritative view of known displays
pub struct DisplayRegistry {
    hardware: Arc<dyn DisplayHardware>,
    transactor: Arc<DisplayConfigTransactor>,
    store: Arc<dyn DisplayStore>,
    snapshot: ArcSwap<Vec<DisplayRecord>>,
}

impl DisplayRegistry {
    pub fn new(
        hardware: Arc<dyn DisplayHardware>,
        transactor: Arc<DisplayConfigTransactor>,
        store: Arc<dyn DisplayStore>,
    ) -> Self {
        Self {
            hardware,
            transactor,
            store,
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Last published list of records; never partially updated
    pub fn snapshot(&self) -> Arc<Vec<DisplayRecord>> {
        self.snapshot.load_full()
    }

    /// Merge currently attached displays into the store
    ///
    /// Newly seen displays default to enabled; known ones keep their persisted
    /// flag (and pick up a refreshed name). With `clear_disconnected`, the store
    /// is wiped first so only attached displays remain.
    pub async fn reconcile(&self, clear_disconnected: bool) -> Result<Vec<DisplayRecord>, DisplayError> {
        let attached = self.enumerate_attached().await?;

        if clear_disconnected {
            info!("clearing disconnected displays");
            self.store.delete_all_displays().await?;
        }

        for AttachedDisplay { id, name } in attached {
            let record = match self.store.get_display(id).await? {
                Some(existing) => DisplayRecord { name, ..existing },
                None => {
                    info!(display_id = id, name = %name, "new display");
                    DisplayRecord::new(id, name, true)
                }
            };
            self.store.put_display(record).await?;
        }

        self.reload_snapshot().await
    }

    /// Push every persisted enabled flag to hardware
    ///
    /// Best effort: each record gets its own transaction and a failure is
    /// logged without stopping the rest. Returns how many were applied.
    pub async fn apply_persisted_state(&self) -> Result<usize, DisplayError> {
        let records = self.store.list_displays().await?;
        let transactor = Arc::clone(&self.transactor);

        let applied = tokio::task::spawn_blocking(move || {
            let mut applied = 0;
            for record in &records {
                match transactor.apply(&[DisplayChange::new(record.display_id, record.enabled)]) {
                    Ok(()) => applied += 1,
                    Err(e) => warn!(
                        display_id = record.display_id,
                        enabled = record.enabled,
                        error = %e,
                        "failed to apply persisted display state"
                    ),
                }
            }
            applied
        })
        .await?;

        debug!(applied, "persisted display state applied");
        Ok(applied)
    }

    /// Reconcile, then apply persisted state
    ///
    /// Run at startup, on "display added" topology changes, and on demand.
    pub async fn refresh(&self, clear_disconnected: bool) -> Result<Vec<DisplayRecord>, DisplayError> {
        let records = self.reconcile(clear_disconnected).await?;
        self.apply_persisted_state().await?;
        Ok(records)
    }

    /// Persist and apply an explicit enable/disable request
    pub async fn set_enabled(&self, id: DisplayId, enabled: bool) -> Result<DisplayRecord, DisplayError> {
        let existing = self
            .store
            .get_display(id)
            .await?
            .ok_or(DisplayError::UnknownDisplay(id))?;
        self.persist_and_apply(DisplayRecord { enabled, ..existing }).await
    }

    /// Flip the persisted flag of one display and apply it
    pub async fn toggle(&self, id: DisplayId) -> Result<DisplayRecord, DisplayError> {
        let existing = self
            .store
            .get_display(id)
            .await?
            .ok_or(DisplayError::UnknownDisplay(id))?;
        let enabled = !existing.enabled;
        self.persist_and_apply(DisplayRecord { enabled, ..existing }).await
    }

    /// Disable whichever known display the pointer is on
    ///
    /// Returns `None` when the pointer is on no display or an unknown one.
    pub async fn disable_display_under_pointer(&self) -> Result<Option<DisplayRecord>, DisplayError> {
        let hardware = Arc::clone(&self.hardware);
        let Some(id) = tokio::task::spawn_blocking(move || hardware.display_under_pointer()).await? else {
            debug!("pointer is not on any display");
            return Ok(None);
        };

        let Some(existing) = self.store.get_display(id).await? else {
            debug!(display_id = id, "display under pointer has no record");
            return Ok(None);
        };

        self.persist_and_apply(DisplayRecord {
            enabled: false,
            ..existing
        })
        .await
        .map(Some)
    }

    /// Publish a fresh snapshot from the store
    pub async fn reload_snapshot(&self) -> Result<Vec<DisplayRecord>, DisplayError> {
        let mut records = self.store.list_displays().await?;
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.display_id.cmp(&b.display_id)));
        self.snapshot.store(Arc::new(records.clone()));
        Ok(records)
    }

    pub(crate) fn hardware(&self) -> &Arc<dyn DisplayHardware> {
        &self.hardware
    }

    pub(crate) fn transactor(&self) -> &Arc<DisplayConfigTransactor> {
        &self.transactor
    }

    pub(crate) fn store(&self) -> &Arc<dyn DisplayStore> {
        &self.store
    }

    pub(crate) async fn enumerate_attached(&self) -> Result<Vec<AttachedDisplay>, DisplayError> {
        let hardware = Arc::clone(&self.hardware);
        tokio::task::spawn_blocking(move || hardware.enumerate_attached())
            .await?
            .map_err(DisplayError::EnumerationFailed)
    }

    async fn persist_and_apply(&self, record: DisplayRecord) -> Result<DisplayRecord, DisplayError> {
        self.store.put_display(record.clone()).await?;
        self.reload_snapshot().await?;

        let transactor = Arc::clone(&self.transactor);
        let change = DisplayChange::new(record.display_id, record.enabled);
        tokio::task::spawn_blocking(move || transactor.apply(&[change])).await??;

        info!(display_id = record.display_id, enabled = record.enabled, "display updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::mock::FakeHardware;
    use crate::store::JsonStore;

    fn registry(hw: &Arc<FakeHardware>, store: &Arc<JsonStore>) -> DisplayRegistry {
        let hardware: Arc<dyn DisplayHardware> = hw.clone();
        let transactor = Arc::new(DisplayConfigTransactor::new(Arc::clone(&hardware)));
        DisplayRegistry::new(hardware, transactor, store.clone())
    }

    #[tokio::test]
    async fn test_reconcile_adds_new_displays_enabled() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in"), (2, "DELL")]));
        let store = Arc::new(JsonStore::in_memory());
        let registry = registry(&hw, &store);

        let records = registry.reconcile(false).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.enabled));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_persisted_flag() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in"), (2, "DELL")]));
        let store = Arc::new(JsonStore::in_memory());
        store.put_display(DisplayRecord::new(2, "DELL", false)).await.unwrap();
        let registry = registry(&hw, &store);

        registry.reconcile(false).await.unwrap();
        registry.reconcile(false).await.unwrap();

        assert_eq!(
            store.get_display(2).await.unwrap(),
            Some(DisplayRecord::new(2, "DELL", false))
        );
    }

    #[tokio::test]
    async fn test_reconcile_clear_disconnected() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in")]));
        let store = Arc::new(JsonStore::in_memory());
        store.put_display(DisplayRecord::new(9, "Gone", true)).await.unwrap();
        let registry = registry(&hw, &store);

        let kept = registry.reconcile(false).await.unwrap();
        assert_eq!(kept.len(), 2);

        let cleared = registry.reconcile(true).await.unwrap();
        assert_eq!(cleared, vec![DisplayRecord::new(1, "Built-in", true)]);
    }

    #[tokio::test]
    async fn test_reconcile_propagates_enumeration_failure() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in")]));
        hw.fail_enumerate(1000);
        let store = Arc::new(JsonStore::in_memory());

        let err = registry(&hw, &store).reconcile(true).await.unwrap_err();
        assert!(matches!(err, DisplayError::EnumerationFailed(1000)));
    }

    #[tokio::test]
    async fn test_apply_persisted_state_is_best_effort() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B"), (3, "C")]));
        let store = Arc::new(JsonStore::in_memory());
        for id in 1..=3 {
            store.put_display(DisplayRecord::new(id, "x", false)).await.unwrap();
        }
        hw.fail_set_enabled_for(2, -1);

        let applied = registry(&hw, &store).apply_persisted_state().await.unwrap();

        assert_eq!(applied, 2);
        assert_eq!(hw.is_enabled(1), Some(false));
        assert_eq!(hw.is_enabled(2), Some(true));
        assert_eq!(hw.is_enabled(3), Some(false));
    }

    #[tokio::test]
    async fn test_refresh_converges_hardware_to_store() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        let store = Arc::new(JsonStore::in_memory());
        store.put_display(DisplayRecord::new(2, "B", false)).await.unwrap();

        registry(&hw, &store).refresh(false).await.unwrap();

        assert_eq!(hw.is_enabled(1), Some(true));
        assert_eq!(hw.is_enabled(2), Some(false));
    }

    #[tokio::test]
    async fn test_double_toggle_restores_original() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        let store = Arc::new(JsonStore::in_memory());
        let registry = registry(&hw, &store);
        registry.reconcile(false).await.unwrap();

        let first = registry.toggle(2).await.unwrap();
        assert!(!first.enabled);
        assert_eq!(hw.is_enabled(2), Some(false));

        let second = registry.toggle(2).await.unwrap();
        assert!(second.enabled);
        assert_eq!(hw.is_enabled(2), Some(true));
        assert_eq!(store.get_display(2).await.unwrap().map(|r| r.enabled), Some(true));
    }

    #[tokio::test]
    async fn test_set_enabled_propagates_hardware_error() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A")]));
        let store = Arc::new(JsonStore::in_memory());
        let registry = registry(&hw, &store);
        registry.reconcile(false).await.unwrap();
        hw.fail_commit(1004);

        let err = registry.set_enabled(1, false).await.unwrap_err();
        assert!(matches!(err, DisplayError::CommitFailed(1004)));
        // desired state is kept so the next refresh retries it
        assert_eq!(store.get_display(1).await.unwrap().map(|r| r.enabled), Some(false));
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_display() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A")]));
        let store = Arc::new(JsonStore::in_memory());

        let err = registry(&hw, &store).set_enabled(5, false).await.unwrap_err();
        assert!(matches!(err, DisplayError::UnknownDisplay(5)));
    }

    #[tokio::test]
    async fn test_disable_display_under_pointer() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        let store = Arc::new(JsonStore::in_memory());
        let registry = registry(&hw, &store);
        registry.reconcile(false).await.unwrap();

        hw.set_pointer(None);
        assert_eq!(registry.disable_display_under_pointer().await.unwrap(), None);

        hw.set_pointer(Some(2));
        let disabled = registry.disable_display_under_pointer().await.unwrap();
        assert_eq!(disabled, Some(DisplayRecord::new(2, "B", false)));
        assert_eq!(hw.is_enabled(2), Some(false));
    }
}
