//! All-or-nothing display reconfiguration
//!
//! Wraps the begin/apply/commit-or-cancel protocol. The span from begin to
//! commit/cancel is held under a mutex because the OS configuration handle is
//! not reentrant; this is the only serialization point for hardware changes.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{DisplayError, DisplayHardware, DisplayId};

/// One requested enable/disable change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayChange {
    pub display_id: DisplayId,
    pub enabled: bool,
}

impl DisplayChange {
    pub fn new(display_id: DisplayId, enabled: bool) -> Self {
        Self {
            display_id,
            enabled,
        }
    }
}

/// Applies batches of [`DisplayChange`] atomically
pub struct DisplayConfigTransactor {
    hardware: Arc<dyn DisplayHardware>,
    span: Mutex<()>,
}

impl DisplayConfigTransactor {
    pub fn new(hardware: Arc<dyn DisplayHardware>) -> Self {
        Self {
            hardware,
            span: Mutex::new(()),
        }
    }

    /// Apply every change in one transaction
    ///
    /// Blocks for the duration of the hardware reconfiguration; call from a
    /// blocking context. On any failure the transaction is cancelled and no
    /// change takes effect.
    pub fn apply(&self, changes: &[DisplayChange]) -> Result<(), DisplayError> {
        if changes.is_empty() {
            return Ok(());
        }

        let _span = self.span.lock();

        let mut config = self
            .hardware
            .begin_config()
            .map_err(DisplayError::TransactionBeginFailed)?;

        for change in changes {
            debug!(
                display_id = change.display_id,
                enabled = change.enabled,
                "staging display change"
            );
            if let Err(code) = config.set_enabled(change.display_id, change.enabled) {
                warn!(display_id = change.display_id, code, "display change rejected, cancelling");
                config.cancel();
                return Err(DisplayError::ApplyFailed {
                    display_id: change.display_id,
                    code,
                });
            }
        }

        if let Err(code) = config.commit() {
            warn!(code, "display configuration commit failed, cancelling");
            config.cancel();
            return Err(DisplayError::CommitFailed(code));
        }

        info!(changes = changes.len(), "display configuration committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::mock::FakeHardware;

    fn transactor(hw: &Arc<FakeHardware>) -> DisplayConfigTransactor {
        DisplayConfigTransactor::new(hw.clone())
    }

    #[test]
    fn test_apply_commits_all_changes() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        transactor(&hw)
            .apply(&[DisplayChange::new(1, false), DisplayChange::new(2, false)])
            .unwrap();

        assert_eq!(hw.is_enabled(1), Some(false));
        assert_eq!(hw.is_enabled(2), Some(false));
        assert_eq!(hw.commits(), 1);
    }

    #[test]
    fn test_failed_change_cancels_whole_batch() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        hw.set_enabled_now(1, false);
        hw.fail_set_enabled_for(2, -1);

        let err = transactor(&hw)
            .apply(&[DisplayChange::new(1, true), DisplayChange::new(2, false)])
            .unwrap_err();

        assert!(matches!(
            err,
            DisplayError::ApplyFailed {
                display_id: 2,
                code: -1
            }
        ));
        assert_eq!(hw.is_enabled(1), Some(false));
        assert_eq!(hw.is_enabled(2), Some(true));
        assert_eq!(hw.cancels(), 1);
    }

    #[test]
    fn test_begin_failure_is_reported() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A")]));
        hw.fail_begin(1001);

        let err = transactor(&hw)
            .apply(&[DisplayChange::new(1, false)])
            .unwrap_err();
        assert!(matches!(err, DisplayError::TransactionBeginFailed(1001)));
        assert_eq!(hw.is_enabled(1), Some(true));
    }

    #[test]
    fn test_commit_failure_cancels() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A")]));
        hw.fail_commit(1004);

        let err = transactor(&hw)
            .apply(&[DisplayChange::new(1, false)])
            .unwrap_err();
        assert!(matches!(err, DisplayError::CommitFailed(1004)));
        assert_eq!(hw.is_enabled(1), Some(true));
        assert_eq!(hw.cancels(), 1);
    }

    #[test]
    fn test_empty_batch_does_not_open_transaction() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A")]));
        transactor(&hw).apply(&[]).unwrap();
        assert_eq!(hw.begins(), 0);
    }

    #[test]
    fn test_concurrent_transactions_are_serialized() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "A"), (2, "B")]));
        hw.set_commit_delay(std::time::Duration::from_millis(5));
        let transactor = Arc::new(transactor(&hw));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let transactor = Arc::clone(&transactor);
                std::thread::spawn(move || {
                    transactor
                        .apply(&[DisplayChange::new(1 + (i % 2), i % 3 == 0)])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(hw.commits(), 8);
        assert_eq!(hw.max_open_transactions(), 1);
    }
}
