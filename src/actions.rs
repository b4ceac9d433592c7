//! Background execution of hotkey actions and topology refreshes
//!
//! The event tap callback only enqueues [`HotkeyAction`]s. They are run here,
//! one at a time and in arrival order, so a slow display reconfiguration never
//! stalls keyboard input.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::display::DisplayId;
use crate::events::DaemonEvent;
use crate::hotkey::HotkeyAction;

/// Consumes fired hotkey actions until the channel closes
pub struct ActionExecutor {
    ctx: Arc<AppContext>,
}

impl ActionExecutor {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, mut action_rx: mpsc::Receiver<HotkeyAction>) {
        info!("action executor started");

        while let Some(action) = action_rx.recv().await {
            self.execute(action).await;
        }

        info!("action channel closed, executor exiting");
    }

    /// Run one action; failures are logged and broadcast, never propagated
    pub async fn execute(&self, action: HotkeyAction) {
        info!(%action, "running hotkey action");

        let result = match action {
            HotkeyAction::DisableActiveDisplay => {
                match self.ctx.disable_display_under_pointer().await {
                    Ok(Some(record)) => {
                        info!(display_id = record.display_id, name = %record.name, "display disabled");
                        Ok(())
                    }
                    Ok(None) => {
                        debug!("pointer is not over a known display");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            HotkeyAction::ReconnectAll => self.ctx.connect_all().await.map(|records| {
                info!(count = records.len(), "all displays reconnected");
            }),
        };

        if let Err(e) = result {
            warn!(%action, error = %e, "hotkey action failed");
            self.ctx.emit(DaemonEvent::ActionFailed {
                action,
                message: e.to_string(),
            });
        }
    }
}

/// Refresh the registry whenever a display is attached
///
/// Notifications arriving while a refresh runs are folded into the next one.
pub async fn run_topology_refresh(ctx: Arc<AppContext>, mut added_rx: mpsc::UnboundedReceiver<DisplayId>) {
    while let Some(display_id) = added_rx.recv().await {
        let mut coalesced = 0usize;
        while added_rx.try_recv().is_ok() {
            coalesced += 1;
        }
        info!(display_id, coalesced, "display attached, refreshing");

        if let Err(e) = ctx.refresh_displays(false).await {
            warn!(error = %e, "display refresh after topology change failed");
        }
    }

    debug!("topology watcher closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::display::mock::FakeHardware;

    #[tokio::test]
    async fn test_disable_display_under_pointer() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in"), (2, "External")]));
        let (ctx, _) = test_context(&hw);
        ctx.refresh_displays(false).await.unwrap();
        hw.set_pointer(Some(2));

        ActionExecutor::new(Arc::clone(&ctx))
            .execute(HotkeyAction::DisableActiveDisplay)
            .await;

        assert_eq!(hw.is_enabled(2), Some(false));
        assert_eq!(hw.is_enabled(1), Some(true));
    }

    #[tokio::test]
    async fn test_pointer_off_screen_is_noop() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in")]));
        let (ctx, _) = test_context(&hw);
        ctx.refresh_displays(false).await.unwrap();
        hw.set_pointer(None);
        let commits = hw.commits();

        ActionExecutor::new(Arc::clone(&ctx))
            .execute(HotkeyAction::DisableActiveDisplay)
            .await;

        assert_eq!(hw.commits(), commits);
        assert_eq!(hw.is_enabled(1), Some(true));
    }

    #[tokio::test]
    async fn test_failure_is_broadcast() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in")]));
        let (ctx, _) = test_context(&hw);
        ctx.refresh_displays(false).await.unwrap();
        let mut events = ctx.subscribe();
        hw.fail_enumerate(-1);

        ActionExecutor::new(Arc::clone(&ctx))
            .execute(HotkeyAction::ReconnectAll)
            .await;

        match events.recv().await.unwrap() {
            DaemonEvent::ActionFailed { action, .. } => assert_eq!(action, HotkeyAction::ReconnectAll),
            other => panic!("unexpected event {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_drains_queue_in_order() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in"), (2, "External")]));
        let (ctx, _) = test_context(&hw);
        ctx.refresh_displays(false).await.unwrap();
        hw.set_pointer(Some(2));

        let (tx, rx) = mpsc::channel(4);
        tx.send(HotkeyAction::DisableActiveDisplay).await.unwrap();
        tx.send(HotkeyAction::ReconnectAll).await.unwrap();
        drop(tx);

        ActionExecutor::new(Arc::clone(&ctx)).run(rx).await;

        assert_eq!(hw.is_enabled(2), Some(true));
        assert!(ctx.registry.snapshot().iter().all(|r| r.enabled));
    }

    #[tokio::test]
    async fn test_topology_refresh_picks_up_new_display() {
        let hw = Arc::new(FakeHardware::with_displays(&[(1, "Built-in")]));
        let (ctx, _) = test_context(&hw);
        ctx.refresh_displays(false).await.unwrap();

        hw.attach(3, "Projector");
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(3).unwrap();
        tx.send(3).unwrap();
        drop(tx);

        run_topology_refresh(Arc::clone(&ctx), rx).await;

        let ids: Vec<_> = ctx.registry.snapshot().iter().map(|r| r.display_id).collect();
        assert!(ids.contains(&3));
    }
}
