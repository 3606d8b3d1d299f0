// ── Hub connection configuration ──
//
// Describes *how* to reach one pilight daemon. Immutable for the
// lifetime of a `HubClient`; the bridge binary builds one per
// configured instance and hands it in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Connection settings for a single pilight daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
    /// Optional human-readable label used in logs.
    pub name: Option<String>,

    /// Daemon hostname or IP address.
    pub host: String,

    /// Daemon WebSocket port.
    pub port: u16,

    /// Minimum spacing between outbound messages, in milliseconds.
    /// The daemon silently drops messages that arrive too fast.
    #[serde(default = "default_message_interval_ms")]
    pub message_interval_ms: u64,

    /// Seconds to wait before reconnecting after an unexpected close.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

fn default_message_interval_ms() -> u64 {
    100
}

fn default_retry_interval_secs() -> u64 {
    10
}

impl HubConfig {
    /// Label for log messages; `"Default"` when unnamed.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("Default")
    }

    /// The `ws://host:port` URL of the daemon.
    pub fn socket_url(&self) -> Result<Url, Error> {
        Url::parse(&format!("ws://{}:{}", self.host, self.port))
            .map_err(|e| Error::Address(e.to_string()))
    }

    pub fn message_interval(&self) -> Duration {
        Duration::from_millis(self.message_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: Option<&str>) -> HubConfig {
        HubConfig {
            name: name.map(String::from),
            host: "10.0.0.12".into(),
            port: 5001,
            message_interval_ms: default_message_interval_ms(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }

    #[test]
    fn socket_url_from_host_and_port() {
        let url = config(None).socket_url().unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.12:5001/");
    }

    #[test]
    fn label_falls_back_to_default() {
        assert_eq!(config(None).label(), "Default");
        assert_eq!(config(Some("Attic")).label(), "Attic");
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let parsed: HubConfig =
            serde_json::from_str(r#"{"name":null,"host":"localhost","port":5001}"#).unwrap();
        assert_eq!(parsed.message_interval(), Duration::from_millis(100));
        assert_eq!(parsed.retry_interval(), Duration::from_secs(10));
    }
}
