//! Escape hatch: power every display back on
//!
//! Used by the panic gesture and the "connect all" button when a bad
//! configuration has left the user without a usable screen. It deliberately
//! ignores the store when choosing which displays to enable.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::store::{DisplayRecord, DisplayStore};

use super::{DisplayChange, DisplayError, DisplayId, DisplayRegistry};

pub struct ReconnectAllRecovery {
    registry: Arc<DisplayRegistry>,
}

impl ReconnectAllRecovery {
    pub fn new(registry: Arc<DisplayRegistry>) -> Self {
        Self { registry }
    }

    /// Enable every physically attached display, then mark every record enabled
    ///
    /// The store is updated even when the hardware batch fails, so the desired
    /// state is "all on" and the next refresh re-applies it. The hardware error
    /// is still returned to the caller.
    pub async fn connect_all(&self) -> Result<Vec<DisplayRecord>, DisplayError> {
        let hardware = Arc::clone(self.registry.hardware());
        let ids = tokio::task::spawn_blocking(move || hardware.enumerate_all())
            .await?
            .map_err(DisplayError::EnumerationFailed)?;

        info!(count = ids.len(), "reconnecting all displays");

        let changes: Vec<DisplayChange> = ids.iter().map(|id| DisplayChange::new(*id, true)).collect();
        let transactor = Arc::clone(self.registry.transactor());
        let hardware_result = tokio::task::spawn_blocking(move || transactor.apply(&changes)).await?;
        if let Err(e) = &hardware_result {
            error!(error = %e, "failed to re-enable displays");
        }

        let store = self.registry.store();
        for record in store.list_displays().await? {
            if !record.enabled {
                store.put_display(DisplayRecord { enabled: true, ..record }).await?;
            }
        }

        // Every enumerated display gets a record, even one that stayed off
        let mut names: HashMap<DisplayId, String> = match self.registry.enumerate_attached().await {
            Ok(attached) => attached.into_iter().map(|d| (d.id, d.name)).collect(),
            Err(e) => {
                warn!(error = %e, "could not list active displays, using hardware names");
                HashMap::new()
            }
        };
        for id in ids {
            if store.get_display(id).await?.is_some() {
                continue;
            }
            let name = match names.remove(&id) {
                Some(name) => name,
                None => {
                    let hardware = Arc::clone(self.registry.hardware());
                    tokio::task::spawn_blocking(move || hardware.display_name(id)).await?
                }
            };
            info!(display_id = id, name = %name, "recording reconnected display");
            store.put_display(DisplayRecord::new(id, name, true)).await?;
        }

        let records = self.registry.reload_snapshot().await?;
        hardware_result?;
        Ok(records)
    }
}
