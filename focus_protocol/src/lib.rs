use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Frequency-vs-power-density curve for one processed window.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub power_density: Vec<f64>,
}

impl Spectrum {
    pub fn is_consistent(&self) -> bool {
        self.frequencies.len() == self.power_density.len()
    }
}

/// One server -> client frame. Every field may be absent.
///
/// Decoding is per-field lenient: a field holding the wrong JSON type is
/// treated as missing without rejecting the rest of the frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InboundMessage {
    #[serde(default, deserialize_with = "truthy_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub focus_score: Option<f64>,
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub theta_power: Option<f64>,
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub beta_power: Option<f64>,
    #[serde(default, deserialize_with = "spectrum", skip_serializing_if = "Option::is_none")]
    pub spectrum: Option<Spectrum>,
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub start_second: Option<f64>,
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub end_second: Option<f64>,
}

impl InboundMessage {
    /// Parses one text frame. Anything other than a JSON object is an error.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("expected a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// The `(start_second, end_second)` window, only when both bounds are present.
    pub fn window(&self) -> Option<(f64, f64)> {
        Some((self.start_second?, self.end_second?))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Encodes the raw file bytes as the single upload frame.
pub fn encode_upload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_upload(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.trim())
}

fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

fn spectrum<'de, D>(deserializer: D) -> Result<Option<Spectrum>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn truthy_error<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    })
}
