//! displayswitchd: background daemon for the DisplaySwitch menu bar app
//!
//! Runs as a LaunchAgent and provides:
//! - Enabling and disabling displays, with the desired state persisted
//! - Global keybindings via CGEventTap, including the panic gesture
//! - IPC server for the settings UI

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    daemon::run().await
}

#[cfg(target_os = "macos")]
mod daemon {
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use tokio::sync::{broadcast, mpsc};
    use tracing::{error, info, warn};

    use displayswitch::actions::{run_topology_refresh, ActionExecutor};
    use displayswitch::config::Config;
    use displayswitch::context::AppContext;
    use displayswitch::display::macos::{watch_topology, MacDisplayHardware};
    use displayswitch::display::{
        DisplayConfigTransactor, DisplayHardware, DisplayRegistry, ReconnectAllRecovery,
    };
    use displayswitch::events::DaemonEvent;
    use displayswitch::hotkey::{
        has_input_monitoring_permission, EventInterceptionEngine, EventTapListener, HotkeyDispatcher,
    };
    use displayswitch::ipc::Server;
    use displayswitch::lifecycle::ShutdownSignal;
    use displayswitch::store::JsonStore;

    pub async fn run() -> Result<()> {
        info!(version = env!("CARGO_PKG_VERSION"), "displayswitchd starting");

        let config = Config::load()?;
        config.ensure_dirs()?;
        info!(?config.store_path, ?config.socket_path, "configuration loaded");

        let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

        let store = Arc::new(JsonStore::open(&config.store_path).await?);

        let hardware: Arc<dyn DisplayHardware> = Arc::new(MacDisplayHardware::new());
        let transactor = Arc::new(DisplayConfigTransactor::new(Arc::clone(&hardware)));
        let registry = Arc::new(DisplayRegistry::new(hardware, transactor, store.clone()));
        let recovery = Arc::new(ReconnectAllRecovery::new(Arc::clone(&registry)));

        // Event tap -> action executor
        let (action_tx, action_rx) = mpsc::channel(32);
        let dispatcher = Arc::new(HotkeyDispatcher::new(action_tx));
        // Daemon -> subscribed IPC clients
        let (event_tx, _) = broadcast::channel(64);

        let engine = EventInterceptionEngine::install_global(Arc::clone(&dispatcher))?;
        let ctx = Arc::new(
            AppContext::new(registry, recovery, dispatcher, store, event_tx).with_engine(engine),
        );

        if let Err(e) = ctx.reload_keybinds().await {
            error!(error = %e, "failed to load keybindings");
        }

        let tap_state = engine.initialize(&EventTapListener::new(), has_input_monitoring_permission(true));
        ctx.emit(DaemonEvent::TapStateChanged { state: tap_state });

        if let Err(e) = ctx.refresh_displays(false).await {
            error!(error = %e, "initial display refresh failed");
        }

        let topology_rx = match watch_topology() {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(error = %e, "display hot-plug refresh disabled");
                None
            }
        };

        let server = Server::new(&config.socket_path, Arc::clone(&ctx))?;
        let executor = ActionExecutor::new(Arc::clone(&ctx));

        info!("daemon initialized, entering main loop");

        tokio::select! {
            _ = executor.run(action_rx) => {
                info!("action executor exited");
            }

            _ = async {
                match topology_rx {
                    Some(rx) => run_topology_refresh(Arc::clone(&ctx), rx).await,
                    None => std::future::pending().await,
                }
            } => {
                info!("topology watcher exited");
            }

            result = server.run() => {
                if let Err(e) = result {
                    error!(?e, "IPC server error");
                }
            }

            _ = shutdown.wait() => {
                info!("shutdown signal received");
            }
        }

        info!("shutting down...");
        server.shutdown().await;
        info!("displayswitchd stopped");

        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
mod daemon {
    use anyhow::Result;

    pub async fn run() -> Result<()> {
        anyhow::bail!("displayswitchd only runs on macOS")
    }
}
