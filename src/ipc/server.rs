//! Unix domain socket server for IPC
//!
//! Provides request-response communication for the settings UI and push
//! notifications of daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::context::AppContext;

use super::protocol::{Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    ctx: Arc<AppContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the control socket, replacing a stale one
    pub fn new(socket_path: &Path, ctx: Arc<AppContext>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            ctx,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = Arc::clone(&self.ctx);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, ctx: Arc<AppContext>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

        let result: Result<()> = async {
            while let Some(msg_buf) = read_frame(&mut reader).await? {
                let request: Request = match serde_json::from_slice(&msg_buf) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "malformed request");
                        let response = Response::error("bad_request", e.to_string());
                        write_frame(&mut *writer.lock().await, &response).await?;
                        continue;
                    }
                };

                debug!(?request, "received request");

                let (response, subscribe) = Self::process_request(request, &ctx).await;

                // Subscribe before replying so no event after the ack is missed
                if subscribe && forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(tokio::spawn(forward_events(
                        ctx.subscribe(),
                        Arc::clone(&writer),
                    )));
                }

                write_frame(&mut *writer.lock().await, &response).await?;
            }
            debug!("client disconnected");
            Ok(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        result
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    pub(crate) async fn process_request(request: Request, ctx: &AppContext) -> (Response, bool) {
        let response = match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(ctx.status()),

            Request::ListDisplays => Response::Displays {
                displays: (*ctx.registry.snapshot()).clone(),
            },

            Request::RefreshDisplays { clear_disconnected } => {
                match ctx.refresh_displays(clear_disconnected).await {
                    Ok(displays) => Response::Displays { displays },
                    Err(e) => e.into(),
                }
            }

            Request::SetDisplayEnabled {
                display_id,
                enabled,
            } => match ctx.set_display_enabled(display_id, enabled).await {
                Ok(display) => Response::Display { display },
                Err(e) => e.into(),
            },

            Request::ToggleDisplay { display_id } => match ctx.toggle_display(display_id).await {
                Ok(display) => Response::Display { display },
                Err(e) => e.into(),
            },

            Request::ConnectAll => match ctx.connect_all().await {
                Ok(displays) => Response::Displays { displays },
                Err(e) => e.into(),
            },

            Request::ListKeybinds => match ctx.keybinds().await {
                Ok(keybinds) => Response::Keybinds { keybinds },
                Err(e) => e.into(),
            },

            Request::SetKeybind { binding } => match ctx.set_keybind(binding).await {
                Ok(binding) => Response::Keybind { binding },
                Err(e) => e.into(),
            },

            Request::ClearKeybind { usage } => match ctx.clear_keybind(usage).await {
                Ok(binding) => Response::Keybind { binding },
                Err(e) => e.into(),
            },

            Request::SetBindingsEnabled { enabled } => {
                ctx.set_bindings_enabled(enabled);
                Response::Ok
            }

            Request::StoreChanged => match ctx.store_changed().await {
                Ok(()) => Response::Ok,
                Err(e) => e.into(),
            },

            Request::Subscribe => return (Response::Subscribed, true),
        };

        if let Response::Error { code, message } = &response {
            warn!(%code, %message, "request failed");
        }
        (response, false)
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Push daemon events to one subscribed client until it goes away
async fn forward_events(
    mut events: broadcast::Receiver<crate::events::DaemonEvent>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let notification = Notification::Event { event };
                if let Err(e) = write_frame(&mut *writer.lock().await, &notification).await {
                    debug!(?e, "subscriber went away");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Read one length-prefixed frame; `None` on clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({len} bytes)");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
