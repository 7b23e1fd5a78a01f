use crate::notify::{Notice, Notifier};
use crate::state::ConnectionState;
use focus_protocol::InboundMessage;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::{self, Message};

pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long a closing session waits for the peer's close frame before dropping the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// State shared between the manager and its session task.
///
/// Every session gets a generation number; writes from a session that is no
/// longer current are discarded.
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ConnectionState>,
    generation: AtomicU64,
    notifier: Arc<dyn Notifier>,
}

impl Shared {
    pub(crate) fn new(state: ConnectionState, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            generation: AtomicU64::new(0),
            notifier,
        }
    }

    pub(crate) fn begin_session(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn retire_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, session: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == session
    }

    /// Applies `f` if `session` is still current. The generation check runs
    /// under the channel's write lock so a concurrent retire always wins.
    pub(crate) fn update(&self, session: u64, f: impl FnOnce(&mut ConnectionState)) {
        self.state.send_if_modified(|state| {
            if !self.is_current(session) {
                return false;
            }
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub(crate) fn update_any(&self, f: impl FnOnce(&mut ConnectionState)) {
        self.state.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub(crate) fn notify(&self, session: u64, notice: Notice) {
        if self.is_current(session) {
            self.notifier.notify(notice);
        }
    }

    pub(crate) fn transport_failed(&self, session: u64, err: &tungstenite::Error) {
        tracing::warn!(session, error = %err, "websocket transport error");
        self.update(session, ConnectionState::fail);
        self.notify(session, Notice::TransportFailed);
    }

    pub(crate) fn closed(&self, session: u64) {
        tracing::info!(session, "websocket connection closed");
        self.update(session, ConnectionState::closed);
    }
}

/// Receive loop for one open connection. Runs until the socket closes,
/// errors, or the manager asks it to close.
pub(crate) async fn run(
    shared: Arc<Shared>,
    session: u64,
    mut socket: WsStream,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            // A dropped sender means the manager is gone; close either way.
            _ = &mut close_rx => {
                finish_close(session, &mut socket).await;
                break;
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_text(&shared, session, text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(session, ?frame, "peer sent close frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(tungstenite::Error::ConnectionClosed))
                    | Some(Err(tungstenite::Error::AlreadyClosed))
                    | None => break,
                    Some(Err(e)) => {
                        shared.transport_failed(session, &e);
                        break;
                    }
                }
            }
        }
    }

    shared.closed(session);
}

fn handle_text(shared: &Shared, session: u64, text: &str) {
    let msg = match InboundMessage::decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(session, error = %e, "dropping unparseable message");
            return;
        }
    };

    if let Some(err) = &msg.error {
        tracing::warn!(session, error = %err, "server reported error");
        shared.notify(session, Notice::Server(err.clone()));
        return;
    }

    if let Some((start, end)) = msg.window() {
        tracing::debug!(session, start, end, focus_score = ?msg.focus_score, "processed window");
    }
    if let Some(spectrum) = &msg.spectrum {
        if !spectrum.is_consistent() {
            tracing::warn!(
                session,
                frequencies = spectrum.frequencies.len(),
                power_density = spectrum.power_density.len(),
                "spectrum sequences differ in length"
            );
        }
    }

    shared.update(session, |state| state.apply(&msg));
}

async fn finish_close(session: u64, socket: &mut WsStream) {
    // Sending the close frame can stall too when the peer stopped reading.
    let finished = tokio::time::timeout(CLOSE_GRACE, async {
        if let Err(e) = socket.close(None).await {
            tracing::debug!(session, error = %e, "close frame not sent");
            return;
        }
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await;
    if finished.is_err() {
        tracing::debug!(session, "peer did not finish close handshake; dropping socket");
    }
}

pub(crate) async fn send_upload(socket: &mut WsStream, payload: String) -> Result<(), tungstenite::Error> {
    socket.send(Message::Text(payload.into())).await
}
