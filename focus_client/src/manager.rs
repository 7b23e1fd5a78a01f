use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::files::{FileSource, LocalFiles};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::state::{ConnectionState, Status};
use crate::ws_actor::{self, Shared};
use focus_protocol::encode_upload;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

struct CloseOnDrop<'a> {
    shared: &'a Shared,
    session: u64,
}

impl CloseOnDrop<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.shared.closed(self.session);
    }
}

struct Session {
    id: u64,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the single upload-and-monitor connection and the state published
/// to every consumer.
///
/// At most one connection exists at a time: a new [`connect_and_send_file`]
/// closes the previous one and waits for it to go away before dialing.
///
/// [`connect_and_send_file`]: ConnectionManager::connect_and_send_file
pub struct ConnectionManager {
    shared: Arc<Shared>,
    files: Arc<dyn FileSource>,
    active: Option<Session>,
    retiring: Vec<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_parts(config, Arc::new(LocalFiles), Arc::new(TracingNotifier))
    }

    pub fn with_parts(
        config: ClientConfig,
        files: Arc<dyn FileSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(ConnectionState::new(config.endpoint), notifier)),
            files,
            active: None,
            retiring: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn endpoint(&self) -> String {
        self.shared.state.borrow().endpoint.clone()
    }

    /// Takes effect on the next connect. The address is not validated here;
    /// a bad one surfaces as a connect failure.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        self.shared.update_any(|state| state.endpoint = endpoint);
    }

    /// Opens a fresh connection, sends the whole file as one base64 text
    /// frame and returns. Incoming metrics keep being applied by a background
    /// task until the connection closes.
    ///
    /// Failures are published as [`Status::Error`] plus a notice, and also
    /// returned. There are no retries.
    pub async fn connect_and_send_file(&mut self, file: impl AsRef<Path>) -> Result<(), ClientError> {
        let file = file.as_ref();

        self.retire_active();
        self.wait_retired().await;

        let session = self.shared.begin_session();
        self.shared.update(session, |state| {
            state.status = Status::Connecting;
            state.upload_in_flight = true;
        });
        // Until the session task owns the socket, a dropped future is this
        // connection's close event.
        let guard = CloseOnDrop {
            shared: &self.shared,
            session,
        };

        let endpoint = self.endpoint();
        tracing::info!(session, %endpoint, "connecting");
        let mut socket = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
            Ok((socket, _)) => socket,
            Err(source) => {
                tracing::warn!(session, %endpoint, error = %source, "connect failed");
                guard.disarm();
                self.shared.update(session, ConnectionState::fail);
                self.shared.notify(session, Notice::ConnectFailed);
                return Err(ClientError::Connect { endpoint, source });
            }
        };

        tracing::info!(session, "websocket connection opened; sending file");
        self.shared
            .update(session, |state| state.status = Status::Connected);

        let result = match self.files.read_all(file) {
            Ok(bytes) => {
                let payload = encode_upload(&bytes);
                match ws_actor::send_upload(&mut socket, payload).await {
                    Ok(()) => {
                        tracing::info!(session, bytes = bytes.len(), "file sent; waiting for scores");
                        Ok(())
                    }
                    Err(e) => {
                        // The socket is unusable; the guard reports its close.
                        self.shared.transport_failed(session, &e);
                        drop(guard);
                        return Err(ClientError::Send(e));
                    }
                }
            }
            Err(source) => {
                // The connection stays open on purpose; only disconnect() or
                // the peer closes it.
                tracing::warn!(session, path = %file.display(), error = %source, "failed to read file");
                self.shared.update(session, ConnectionState::fail);
                self.shared.notify(session, Notice::ReadFailed);
                Err(ClientError::ReadFile {
                    path: file.to_path_buf(),
                    source,
                })
            }
        };

        guard.disarm();
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(ws_actor::run(
            Arc::clone(&self.shared),
            session,
            socket,
            close_rx,
        ));
        self.active = Some(Session {
            id: session,
            close_tx,
            task,
        });

        result
    }

    /// Closes the connection if there is one and resets the published state
    /// right away, without waiting for the close handshake.
    pub fn disconnect(&mut self) {
        self.retire_active();
        self.shared.update_any(ConnectionState::reset);
    }

    fn retire_active(&mut self) {
        self.shared.retire_session();
        if let Some(session) = self.active.take() {
            tracing::info!(session = session.id, "closing websocket connection");
            let _ = session.close_tx.send(());
            self.retiring.push(session.task);
        }
    }

    async fn wait_retired(&mut self) {
        for task in self.retiring.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session task ended abnormally");
            }
        }
    }
}
