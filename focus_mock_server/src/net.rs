use crate::script::{Responder, ScriptStep};
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::protocol::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ClientConnected { socket_addr: SocketAddr },
    UploadReceived { socket_addr: SocketAddr, payload: String },
    ClientDisconnected { socket_addr: SocketAddr },
}

/// Connection counters, updated before the handshake starts and before the
/// socket is dropped, so `peak` is exact from the client's point of view.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    live: AtomicUsize,
    peak: AtomicUsize,
    accepted: AtomicUsize,
}

impl ConnectionStats {
    fn opened(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

struct ClientCtx {
    socket_addr: SocketAddr,
    responder: Responder,
    events: Sender<ServerEvent>,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<AtomicBool>,
}

pub struct MockServer {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    listen_addr: SocketAddr,
    stats: Arc<ConnectionStats>,
}

impl MockServer {
    pub fn spawn_with_addr(
        addr: &str,
        responder: Responder,
        events: Sender<ServerEvent>,
    ) -> Result<Self, String> {
        let listener =
            TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws local_addr failed: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws set_nonblocking failed: {e}"))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ConnectionStats::default());

        let shutdown_for_thread = Arc::clone(&shutdown);
        let stats_for_thread = Arc::clone(&stats);
        let join_handle = thread::spawn(move || {
            run_server(listener, responder, events, stats_for_thread, shutdown_for_thread)
        });

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
            listen_addr,
            stats,
        })
    }

    /// Loopback server on an ephemeral port that plays `steps` to every client.
    pub fn scripted(steps: Vec<ScriptStep>, events: Sender<ServerEvent>) -> Result<Self, String> {
        Self::spawn_with_addr("127.0.0.1:0", Arc::new(move |_| steps.clone()), events)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.listen_addr)
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    responder: Responder,
    events: Sender<ServerEvent>,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<AtomicBool>,
) {
    let mut clients: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, socket_addr)) => {
                let ctx = ClientCtx {
                    socket_addr,
                    responder: Arc::clone(&responder),
                    events: events.clone(),
                    stats: Arc::clone(&stats),
                    shutdown: Arc::clone(&shutdown),
                };
                clients.push(thread::spawn(move || handle_client(stream, ctx)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                eprintln!("ws accept failed: {e}");
                thread::sleep(Duration::from_millis(10));
            }
        }
        clients.retain(|h| !h.is_finished());
    }

    for h in clients {
        let _ = h.join();
    }
}

fn handle_client(stream: TcpStream, ctx: ClientCtx) {
    let ClientCtx {
        socket_addr,
        responder,
        events,
        stats,
        shutdown,
    } = ctx;

    stats.opened();
    let _ = events.send(ServerEvent::ClientConnected { socket_addr });
    let disconnected = || {
        stats.closed();
        let _ = events.send(ServerEvent::ClientDisconnected { socket_addr });
    };

    let _ = stream.set_nonblocking(false);
    let _ = stream.set_nodelay(true);
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("ws handshake failed: {e}");
            disconnected();
            return;
        }
    };
    // Timeouts keep the loop polling the script and the shutdown flag.
    let _ = ws.get_ref().set_read_timeout(Some(Duration::from_millis(20)));
    let _ = ws.get_ref().set_write_timeout(Some(Duration::from_millis(500)));

    let mut script: VecDeque<ScriptStep> = VecDeque::new();
    let mut uploaded = false;
    let mut resume_at: Option<Instant> = None;

    'conn: while !shutdown.load(Ordering::Relaxed) {
        while let Some(step) = script.front() {
            match step {
                ScriptStep::Pause(d) => {
                    let until = *resume_at.get_or_insert_with(|| Instant::now() + *d);
                    if Instant::now() < until {
                        break;
                    }
                    resume_at = None;
                }
                ScriptStep::Send(text) => {
                    if ws.send(Message::Text(text.clone().into())).is_err() {
                        break 'conn;
                    }
                }
                ScriptStep::Close => {
                    let _ = ws.close(None);
                }
                ScriptStep::Hangup => {
                    disconnected();
                    // Dropping `ws` closes the TCP stream with no close frame.
                    return;
                }
            }
            script.pop_front();
        }

        match ws.read() {
            Ok(Message::Text(text)) if !uploaded => {
                uploaded = true;
                script = responder(text.as_str()).into();
                let _ = events.send(ServerEvent::UploadReceived {
                    socket_addr,
                    payload: text.as_str().to_owned(),
                });
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => break,
        }
    }

    if shutdown.load(Ordering::Relaxed) {
        let _ = ws.close(None);
        let _ = ws.flush();
    }
    disconnected();
}
