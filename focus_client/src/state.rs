use focus_protocol::{InboundMessage, Spectrum};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Error => "error",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct BandPowers {
    pub theta: Option<f64>,
    pub beta: Option<f64>,
}

impl BandPowers {
    pub fn is_empty(&self) -> bool {
        self.theta.is_none() && self.beta.is_none()
    }
}

/// Everything a consumer can observe about the upload-and-monitor session.
///
/// Written only by [`crate::ConnectionManager`]; consumers get clones through a
/// `watch` channel.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ConnectionState {
    pub status: Status,
    pub endpoint: String,
    pub focus_score: Option<f64>,
    pub band_powers: BandPowers,
    pub spectrum: Option<Spectrum>,
    /// Last `end_second` acknowledged by the server.
    pub stream_position: u64,
    pub upload_in_flight: bool,
}

impl ConnectionState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Overwrites every slot the message carries. `error` is not looked at here.
    pub fn apply(&mut self, msg: &InboundMessage) {
        if let Some(score) = msg.focus_score {
            self.focus_score = Some(score);
        }
        if let Some(theta) = msg.theta_power {
            self.band_powers.theta = Some(theta);
        }
        if let Some(beta) = msg.beta_power {
            self.band_powers.beta = Some(beta);
        }
        if let Some(spectrum) = &msg.spectrum {
            self.spectrum = Some(spectrum.clone());
        }
        if let Some((_, end)) = msg.window() {
            // Server value is authoritative, even when it goes backwards.
            if end.is_finite() && end >= 0.0 {
                self.stream_position = end as u64;
            }
        }
    }

    /// Back to the initial values, keeping the configured endpoint.
    pub fn reset(&mut self) {
        let endpoint = std::mem::take(&mut self.endpoint);
        *self = Self::new(endpoint);
    }

    pub(crate) fn fail(&mut self) {
        self.status = Status::Error;
        self.upload_in_flight = false;
    }

    pub(crate) fn closed(&mut self) {
        self.status = Status::Disconnected;
        self.upload_in_flight = false;
    }
}
