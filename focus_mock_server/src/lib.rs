//! Scripted WebSocket peer that stands in for the metrics backend.

mod net;
mod script;

pub use crate::net::{ConnectionStats, MockServer, ServerEvent};
pub use crate::script::{window_script, Responder, ScriptStep};

pub const EVENTS_CAP: usize = 256;
