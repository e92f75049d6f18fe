// JSON envelope pushed to WebSocket subscribers

use serde::{Deserialize, Serialize};

use super::DataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    SystemMetrics,
    DeviceMetrics,
    GroupMetrics,
}

/// `{type, id?, data, source, timestamp}`; `id` is omitted for system-wide messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: T,
    pub source: DataSource,
    /// Epoch millis.
    pub timestamp: u64,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(
        kind: EnvelopeKind,
        id: Option<String>,
        data: T,
        source: DataSource,
        timestamp: u64,
    ) -> Self {
        Self {
            kind,
            id,
            data,
            source,
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
