//! Wire model for the pilight daemon protocol.
//!
//! Outbound messages are JSON objects keyed by an `action` field.
//! Inbound frames carry no explicit discriminant; [`classify`] inspects
//! their structure once at the boundary and produces a tagged
//! [`Message`] so the rest of the crate never repeats field checks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Outbound ─────────────────────────────────────────────────────────

/// On/off state of a device, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Parse the `state` string carried by broadcasts and snapshots.
    /// Anything other than `"on"` is treated as off.
    pub fn from_wire(raw: &str) -> Self {
        if raw == "on" { Self::On } else { Self::Off }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Property values attached to a control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlValues {
    pub dimlevel: u8,
}

/// The `code` object of a control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCode {
    pub device: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PowerState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<ControlValues>,
}

impl ControlCode {
    pub fn power(device: impl Into<String>, state: PowerState) -> Self {
        Self {
            device: device.into(),
            state: Some(state),
            values: None,
        }
    }

    pub fn dimlevel(device: impl Into<String>, dimlevel: u8) -> Self {
        Self {
            device: device.into(),
            state: None,
            values: Some(ControlValues { dimlevel }),
        }
    }
}

/// A message sent to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "control")]
    Control { code: ControlCode },

    #[serde(rename = "request config")]
    RequestConfig,

    #[serde(rename = "request values")]
    RequestValues,
}

// ── Inbound ──────────────────────────────────────────────────────────

/// One device entry of the config snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub dimlevel: Option<u8>,

    #[serde(default)]
    pub protocol: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// GUI metadata for one device.
#[derive(Debug, Clone, Deserialize)]
pub struct GuiEntry {
    pub name: String,

    #[serde(default)]
    pub group: Vec<String>,
}

/// Device and GUI registries inside the config snapshot.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigRegistry {
    #[serde(default)]
    pub devices: HashMap<String, DeviceEntry>,

    #[serde(default)]
    pub gui: HashMap<String, GuiEntry>,
}

/// The full device/GUI registry, emitted once after connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSnapshot {
    pub config: ConfigRegistry,
}

/// Values carried by a state broadcast.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateValues {
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub dimlevel: Option<u8>,

    #[serde(default)]
    pub timestamp: Option<f64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A state-change broadcast affecting a set of devices at once.
#[derive(Debug, Clone, Deserialize)]
pub struct StateUpdate {
    #[serde(rename = "type")]
    pub update_type: Value,

    pub devices: Vec<String>,

    pub values: UpdateValues,
}

impl StateUpdate {
    pub fn names(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d == device_id)
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum Message {
    /// `{"message": "config", ...}` — full device/GUI registry.
    Config(ConfigSnapshot),
    /// `{"message": "values", ...}` — full current-values registry.
    /// Kept raw; nothing downstream consumes it beyond classification.
    Values(Value),
    /// `{"origin": "update", ...}` — state broadcast.
    Update(StateUpdate),
}

/// Classify a text frame by structural inspection.
///
/// Returns `None` for unparseable JSON and unrecognized shapes; both
/// are logged at debug level and must be dropped by the caller, never
/// propagated.
pub fn classify(text: &str) -> Option<Message> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "dropping unparseable frame");
            return None;
        }
    };

    if value.get("message").and_then(Value::as_str) == Some("config") {
        return match serde_json::from_value::<ConfigSnapshot>(value) {
            Ok(snapshot) => Some(Message::Config(snapshot)),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed config snapshot");
                None
            }
        };
    }

    if value.get("message").and_then(Value::as_str) == Some("values") {
        return Some(Message::Values(value));
    }

    let looks_like_update = value.get("origin").and_then(Value::as_str) == Some("update")
        && value.get("type").is_some()
        && value.get("devices").is_some()
        && value.get("values").is_some();
    if looks_like_update {
        return match serde_json::from_value::<StateUpdate>(value) {
            Ok(update) => Some(Message::Update(update)),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed state broadcast");
                None
            }
        };
    }

    tracing::debug!("dropping frame with unrecognized shape");
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn serialize_power_control() {
        let request = Request::Control {
            code: ControlCode::power("12", PowerState::On),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"action": "control", "code": {"device": "12", "state": "on"}})
        );
    }

    #[test]
    fn serialize_dimlevel_control() {
        let request = Request::Control {
            code: ControlCode::dimlevel("lamp", 7),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"action": "control", "code": {"device": "lamp", "values": {"dimlevel": 7}}})
        );
    }

    #[test]
    fn serialize_queries() {
        assert_eq!(
            serde_json::to_value(Request::RequestConfig).unwrap(),
            json!({"action": "request config"})
        );
        assert_eq!(
            serde_json::to_value(Request::RequestValues).unwrap(),
            json!({"action": "request values"})
        );
    }

    #[test]
    fn classify_config_snapshot() {
        let raw = json!({
            "message": "config",
            "config": {
                "devices": {
                    "12": { "state": "off", "protocol": ["kaku_switch"], "id": [{"unit": 0}] }
                },
                "gui": {
                    "12": { "name": "Lamp", "group": ["Living"] }
                }
            }
        });

        let Some(Message::Config(snapshot)) = classify(&raw.to_string()) else {
            panic!("expected a config snapshot");
        };
        let device = &snapshot.config.devices["12"];
        assert_eq!(device.state.as_deref(), Some("off"));
        assert_eq!(device.protocol, vec!["kaku_switch"]);
        assert_eq!(snapshot.config.gui["12"].name, "Lamp");
        assert_eq!(snapshot.config.gui["12"].group, vec!["Living"]);
    }

    #[test]
    fn classify_values_snapshot() {
        let raw = json!({"message": "values", "values": []});
        assert!(matches!(
            classify(&raw.to_string()),
            Some(Message::Values(_))
        ));
    }

    #[test]
    fn classify_state_broadcast() {
        let raw = json!({
            "origin": "update",
            "type": 1,
            "devices": ["12", "13"],
            "values": { "state": "on", "timestamp": 1_700_000_000 }
        });

        let Some(Message::Update(update)) = classify(&raw.to_string()) else {
            panic!("expected a state broadcast");
        };
        assert!(update.names("12"));
        assert!(update.names("13"));
        assert!(!update.names("14"));
        assert_eq!(update.values.state.as_deref(), Some("on"));
    }

    #[test]
    fn classify_drops_garbage() {
        assert!(classify("not json").is_none());
        assert!(classify("{\"hello\": \"world\"}").is_none());
        // An update missing its `values` field is not an update.
        assert!(
            classify(&json!({"origin": "update", "type": 1, "devices": []}).to_string()).is_none()
        );
    }

    #[test]
    fn power_state_from_wire() {
        assert!(PowerState::from_wire("on").is_on());
        assert!(!PowerState::from_wire("off").is_on());
        assert!(!PowerState::from_wire("dimmed?").is_on());
        assert_eq!(PowerState::from(true).to_string(), "on");
    }
}
