use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display};

use crate::ws::WsError;

/// Category of server-pushed payload, named by its top-level key in an update frame.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UpdateClass {
    /// Device status snapshot under `"status"`
    Status,
    /// Single meter reading under `"data"`
    Data,
    /// Raw device log line under `"log"`
    Log,
}

impl UpdateClass {
    /// Top-level key carrying this class in an update frame.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Data => "data",
            Self::Log => "log",
        }
    }
}

/// Device status snapshot.
///
/// Firmware versions and hardware variants report different subsets of these fields
/// (a device without ethernet has no `ethIP`), so each one is optional.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Free heap memory in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_heap: Option<u64>,
    /// Total heap memory in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap: Option<u64>,
    /// Free filesystem space in bytes
    #[serde(rename = "freeFSSize", skip_serializing_if = "Option::is_none")]
    pub free_fs_size: Option<u64>,
    /// Total filesystem size in bytes
    #[serde(rename = "fsSize", skip_serializing_if = "Option::is_none")]
    pub fs_size: Option<u64>,
    /// Device uptime as reported by the firmware
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    /// SSID of the configured wifi network
    #[serde(rename = "wifiSSID", skip_serializing_if = "Option::is_none")]
    pub wifi_ssid: Option<String>,
    /// Firmware wifi status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_status: Option<i64>,
    /// Address assigned on the wifi interface
    #[serde(rename = "wifiIP", skip_serializing_if = "Option::is_none")]
    pub wifi_ip: Option<String>,
    /// Firmware ethernet status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_status: Option<i64>,
    /// Address assigned on the ethernet interface
    #[serde(rename = "ethIP", skip_serializing_if = "Option::is_none")]
    pub eth_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ota_in_progress: Option<bool>,
    /// Firmware update progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ota_progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_product_key: Option<bool>,
}

/// A single meter reading.
///
/// The set of fields depends on the meter attached to the device, so the reading is
/// kept as an open record with typed accessors.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DataPoint {
    pub fields: Map<String, Value>,
}

impl DataPoint {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric field value, accepting numbers and numeric strings.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.as_str()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse an inbound update frame into its top-level record.
///
/// Frames must be JSON objects; anything else is reported as an error so the
/// caller can drop it.
pub fn parse_update(text: &str) -> crate::Result<Map<String, Value>> {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed).map_err(WsError::MalformedFrame)? {
        Value::Object(record) => Ok(record),
        other => Err(WsError::UnexpectedFrame(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))
        .into()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
