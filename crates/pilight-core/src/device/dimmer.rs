//! Multi-level dimmer support.
//!
//! Dim levels are stored on the protocol's 16-step scale (0–15) and
//! presented externally as 1–100% brightness. An off dimmer always
//! reports brightness 0, whatever level it remembers.

use pilight_api::{ControlCode, Request};

use crate::error::CoreError;

use super::{DeviceController, DeviceKind};

/// Protocols whose devices accept a `dimlevel` value.
pub(crate) const SUPPORTED_PROTOCOLS: &[&str] = &["kaku_dimmer"];

/// Top of the internal dim scale.
pub(crate) const MAX_LEVEL: u8 = 15;

pub(crate) fn is_supported_protocol(protocol: &str) -> bool {
    SUPPORTED_PROTOCOLS.contains(&protocol)
}

/// Internal 0–15 level to 1–100% brightness.
pub(crate) fn level_to_brightness(level: u8) -> u8 {
    let fraction = (f64::from(level.min(MAX_LEVEL)) + 1.0) / 16.0;
    (fraction * 100.0).round() as u8
}

/// 0–100% brightness back to the internal 0–15 level. Brightness 0
/// maps to level 0.
pub(crate) fn brightness_to_level(value: u8) -> u8 {
    if value == 0 {
        return 0;
    }
    let steps = f64::from(value.min(100)) / (100.0 / 16.0);
    (steps.ceil() as u8).saturating_sub(1).min(MAX_LEVEL)
}

impl DeviceController {
    /// Externally visible brightness: always 0 while off.
    pub fn brightness(&self) -> u8 {
        let state = self.state();
        if state.on {
            level_to_brightness(state.level)
        } else {
            0
        }
    }

    /// Request a brightness change on a dimmer.
    ///
    /// `None` means "no brightness change intended" (some host layers
    /// send a false-y sentinel for this) and is ignored. A value equal
    /// to the confirmed level is a no-op success.
    pub async fn set_brightness(&self, value: Option<u8>) -> Result<(), CoreError> {
        if self.kind() != DeviceKind::Dimmer {
            return Err(CoreError::NotDimmable {
                id: self.id().to_string(),
            });
        }

        let Some(value) = value else {
            tracing::debug!(device = %self.name(), "brightness sentinel ignored");
            return Ok(());
        };

        if !self.shared.client.is_connected() {
            return Err(CoreError::HubDisconnected);
        }

        let level = brightness_to_level(value);
        if self.state().level == level {
            tracing::debug!(device = %self.name(), level, "already at requested dim level");
            return Ok(());
        }

        tracing::debug!(device = %self.name(), brightness = value, level, "changing dim level");
        let request = Request::Control {
            code: ControlCode::dimlevel(self.id().to_string(), level),
        };
        self.begin_command(request).await
    }
}
