mod config;
mod error;
mod files;
mod manager;
mod notify;
mod state;
mod ws_actor;

pub use crate::config::{ClientConfig, DEFAULT_ENDPOINT, ENDPOINT_ENV};
pub use crate::error::ClientError;
pub use crate::files::{FileSource, LocalFiles};
pub use crate::manager::ConnectionManager;
pub use crate::notify::{Notice, Notifier, TracingNotifier};
pub use crate::state::{BandPowers, ConnectionState, Status};
pub use focus_protocol::{InboundMessage, Spectrum};
