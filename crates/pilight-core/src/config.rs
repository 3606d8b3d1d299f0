// ── Bridge configuration ──
//
// The set of pilight daemons one bridge process connects to. Pure
// data; loading from disk/env lives in the binary.

use pilight_api::HubConfig;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Configuration for all hub instances of one bridge process.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub instances: Vec<HubConfig>,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.instances.is_empty() {
            return Err(CoreError::Config {
                message: "no pilight instances configured".into(),
            });
        }
        for hub in &self.instances {
            if hub.host.trim().is_empty() {
                return Err(CoreError::Config {
                    message: format!("instance '{}' has an empty host", hub.label()),
                });
            }
            if hub.port == 0 {
                return Err(CoreError::Config {
                    message: format!("instance '{}' has port 0", hub.label()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(host: &str, port: u16) -> HubConfig {
        HubConfig {
            name: None,
            host: host.into(),
            port,
            message_interval_ms: 100,
            retry_interval_secs: 10,
        }
    }

    #[test]
    fn empty_config_is_rejected() {
        let config = BridgeConfig::default();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn valid_instances_pass() {
        let config = BridgeConfig {
            instances: vec![instance("10.0.0.12", 5001), instance("attic.local", 5001)],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_host_and_zero_port_are_rejected() {
        let config = BridgeConfig {
            instances: vec![instance("  ", 5001)],
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            instances: vec![instance("10.0.0.12", 0)],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let raw = r#"
            [[instances]]
            name = "Living room"
            host = "10.0.0.12"
            port = 5001
            message_interval_ms = 250
        "#;
        let config: BridgeConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.instances[0].label(), "Living room");
        assert_eq!(config.instances[0].message_interval_ms, 250);
        // Omitted retry interval takes its default.
        assert_eq!(config.instances[0].retry_interval_secs, 10);
    }
}
