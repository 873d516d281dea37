use bon::Builder;
use serde::{Deserialize, Serialize};

/// Local copy of the server-side streaming configuration for this connection.
///
/// The device keeps no state across reconnects, so the whole snapshot is re-sent on
/// every open and every change.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Stream device status snapshots
    #[builder(default)]
    pub status_update: bool,
    /// Stream meter readings
    #[builder(default)]
    pub data_update: bool,
    /// Stream device log lines
    #[builder(default)]
    pub log: bool,
}

/// Outbound config resync frame: `{"connection": {...}}`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSync {
    pub connection: ConnectionConfig,
}

impl From<ConnectionConfig> for ConfigSync {
    fn from(connection: ConnectionConfig) -> Self {
        Self { connection }
    }
}
