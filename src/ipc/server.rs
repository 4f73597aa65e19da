//! Unix domain socket server for status IPC
//!
//! Request-response for status queries, plus push notifications of state
//! events to subscribed clients. Observational only: no request reaches the
//! activation engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::StateEvent;

use super::protocol::{DaemonStatus, Notification, Phase, Request, Response};

/// Upper bound on a single request body.
const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// IPC server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Source of state events forwarded to subscribed clients
    event_tx: broadcast::Sender<StateEvent>,
}

/// Shared server-side view of the daemon
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Bind the socket and prepare the server
    pub fn new(socket_path: &Path, event_tx: broadcast::Sender<StateEvent>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            event_tx,
        })
    }

    /// Update the activation phase shown in status responses
    pub async fn set_phase(&self, phase: Phase) {
        let mut state = self.state.write().await;
        if state.status.phase != phase {
            debug!(?phase, "IPC server: phase updated");
            state.status.phase = phase;
        }
    }

    /// Update the recognition-session flag shown in status responses
    pub async fn set_listening(&self, listening: bool) {
        let mut state = self.state.write().await;
        state.status.listening = listening;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let event_rx = self.event_tx.subscribe();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, event_rx) => {
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
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        mut event_rx: broadcast::Receiver<StateEvent>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;
            debug!(?request, "received request");

            match request {
                Request::Ping => {
                    Self::send_message(&mut stream, &Response::Pong).await?;
                }
                Request::GetStatus => {
                    let snapshot = {
                        let mut state = state.write().await;
                        state.status.uptime_secs = state.start_time.elapsed().as_secs();
                        state.status.clone()
                    };
                    Self::send_message(&mut stream, &Response::Status(snapshot)).await?;
                }
                Request::Subscribe => {
                    Self::send_message(&mut stream, &Response::Subscribed).await?;
                    debug!("client subscribed to notifications");
                    // The connection becomes push-only from here on.
                    return Self::push_events(stream, &mut event_rx).await;
                }
            }
        }
    }

    /// Forward state events to a subscribed client until it goes away
    async fn push_events(
        mut stream: UnixStream,
        event_rx: &mut broadcast::Receiver<StateEvent>,
    ) -> Result<()> {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let note = Notification::StateEvent(event);
                    if Self::send_message(&mut stream, &note).await.is_err() {
                        debug!("subscriber disconnected");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn request(stream: &mut UnixStream, request: &Request) -> Response {
        Server::send_message(stream, request).await.unwrap();

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut msg_buf = vec![0u8; len];
        stream.read_exact(&mut msg_buf).await.unwrap();
        serde_json::from_slice(&msg_buf).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status_roundtrip() {
        let dir = std::env::temp_dir().join(format!("beckon-ipc-{}", std::process::id()));
        let socket_path = dir.join("test.sock");
        let (event_tx, _) = broadcast::channel(8);

        let server = Server::new(&socket_path, event_tx).unwrap();
        server.set_phase(Phase::Idle).await;
        server.set_listening(true).await;

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();

        assert!(matches!(
            request(&mut stream, &Request::Ping).await,
            Response::Pong
        ));

        match request(&mut stream, &Request::GetStatus).await {
            Response::Status(status) => {
                assert_eq!(status.phase, Phase::Idle);
                assert!(status.listening);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let _ = std::fs::remove_file(&socket_path);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dir = std::env::temp_dir().join(format!("beckon-ipc-sub-{}", std::process::id()));
        let socket_path = dir.join("test.sock");
        let (event_tx, _) = broadcast::channel(8);

        let server = Server::new(&socket_path, event_tx.clone()).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        assert!(matches!(
            request(&mut stream, &Request::Subscribe).await,
            Response::Subscribed
        ));

        event_tx.send(StateEvent::CommandWindowOpened).unwrap();

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut msg_buf = vec![0u8; len];
        stream.read_exact(&mut msg_buf).await.unwrap();
        let note: Notification = serde_json::from_slice(&msg_buf).unwrap();
        assert!(matches!(
            note,
            Notification::StateEvent(StateEvent::CommandWindowOpened)
        ));

        let _ = std::fs::remove_file(&socket_path);
    }
}
