use std::fmt;
use tokio::sync::mpsc;

/// A user-visible failure, shown the moment it is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ConnectFailed,
    ReadFailed,
    TransportFailed,
    /// Text of an `error` field sent by the server.
    Server(String),
}

impl Notice {
    pub fn title(&self) -> &'static str {
        "Error"
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::ConnectFailed => "Failed to connect to server",
            Notice::ReadFailed => "Failed to read file",
            Notice::TransportFailed => "WebSocket connection failed",
            Notice::Server(msg) => msg,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: the notice only ends up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        tracing::warn!(title = notice.title(), message = notice.message(), "notice");
    }
}

impl Notifier for mpsc::UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        let _ = self.send(notice);
    }
}
