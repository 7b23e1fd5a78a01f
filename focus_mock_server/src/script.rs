use focus_protocol::{decode_upload, InboundMessage};
use std::sync::Arc;
use std::time::Duration;

/// What the server does after it receives a client's upload frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Send one text frame verbatim.
    Send(String),
    Pause(Duration),
    /// Start a clean close handshake.
    Close,
    /// Drop the TCP stream without a close frame.
    Hangup,
}

/// Builds the script for a connection from the (base64) upload it sent.
pub type Responder = Arc<dyn Fn(&str) -> Vec<ScriptStep> + Send + Sync>;

/// One `{start_second, end_second}` progress frame per full second of CSV
/// rows in the upload. An undecodable upload gets a server error frame.
pub fn window_script(upload: &str, sample_rate: u32, interval: Duration) -> Vec<ScriptStep> {
    let bytes = match decode_upload(upload) {
        Ok(bytes) => bytes,
        Err(_) => {
            let msg = InboundMessage {
                error: Some("upload is not valid base64".to_string()),
                ..InboundMessage::default()
            };
            return vec![ScriptStep::Send(msg.to_json())];
        }
    };

    let rows = String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();
    let seconds = rows / sample_rate.max(1) as usize;

    let mut steps = Vec::with_capacity(seconds * 2);
    for second in 0..seconds {
        if !interval.is_zero() {
            steps.push(ScriptStep::Pause(interval));
        }
        let msg = InboundMessage {
            start_second: Some(second as f64),
            end_second: Some((second + 1) as f64),
            ..InboundMessage::default()
        };
        steps.push(ScriptStep::Send(msg.to_json()));
    }
    steps
}
