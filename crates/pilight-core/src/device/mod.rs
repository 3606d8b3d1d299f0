//! Per-device controllers.
//!
//! A [`DeviceController`] owns the last *confirmed* state of one
//! device. Local state changes only when the hub broadcasts it —
//! there is no optimistic echo — so reads always reflect what the hub
//! last reported.

pub mod dimmer;
pub mod switch;

use std::sync::{Arc, Mutex};

use pilight_api::{ControlCode, HubClient, PowerState, Request};
use pilight_api::protocol::UpdateValues;
use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::retry::{self, PendingSlot, RetryPolicy};

// ── Types ────────────────────────────────────────────────────────────

/// Kind of controllable device, derived from its protocol list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeviceKind {
    Switch,
    Dimmer,
}

/// Map a protocol list to a controller kind.
///
/// Devices whose protocols are all unsupported are skipped at
/// discovery time.
pub fn kind_for_protocols(protocols: &[String]) -> Option<DeviceKind> {
    if protocols.iter().any(|p| switch::is_supported_protocol(p)) {
        return Some(DeviceKind::Switch);
    }
    if protocols.iter().any(|p| dimmer::is_supported_protocol(p)) {
        return Some(DeviceKind::Dimmer);
    }
    None
}

/// Last confirmed state of one device.
///
/// `level` is the 16-step internal dim level; it is meaningless (and
/// stays 0) for switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub on: bool,
    pub level: u8,
}

/// Descriptor handed to discovery listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
}

/// Change notification for the host-adapter layer, emitted whenever a
/// broadcast touches the device.
#[derive(Debug, Clone)]
pub struct DeviceChange {
    pub id: String,
    pub name: String,
    pub on: bool,
    /// Externally visible brightness; `None` for switches. Always 0
    /// while the device is off, regardless of the stored level.
    pub brightness: Option<u8>,
}

// ── DeviceController ─────────────────────────────────────────────────

/// Controller for one device. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct DeviceController {
    shared: Arc<DeviceShared>,
}

struct DeviceShared {
    id: String,
    name: String,
    kind: DeviceKind,
    client: HubClient,
    policy: RetryPolicy,
    state: Mutex<DeviceState>,
    pending: PendingSlot,
    changes: broadcast::Sender<Arc<DeviceChange>>,
}

impl DeviceController {
    pub(crate) fn new(
        id: String,
        name: String,
        kind: DeviceKind,
        initial: DeviceState,
        client: HubClient,
        policy: RetryPolicy,
        changes: broadcast::Sender<Arc<DeviceChange>>,
    ) -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                id,
                name,
                kind,
                client,
                policy,
                state: Mutex::new(initial),
                pending: PendingSlot::default(),
                changes,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> DeviceKind {
        self.shared.kind
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.shared.id.clone(),
            name: self.shared.name.clone(),
            kind: self.shared.kind,
        }
    }

    /// Last confirmed state. Never blocks, never touches the network.
    pub fn state(&self) -> DeviceState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn is_on(&self) -> bool {
        self.state().on
    }

    /// Request a power state change.
    ///
    /// No-op success when the desired state matches the confirmed one.
    /// Otherwise the command is sent immediately and re-sent in the
    /// background until a broadcast confirms the hub is processing;
    /// only the first send's outcome is surfaced here.
    pub async fn set_power(&self, on: bool) -> Result<(), CoreError> {
        if !self.shared.client.is_connected() {
            return Err(CoreError::HubDisconnected);
        }

        if self.state().on == on {
            tracing::debug!(device = %self.shared.name, state = %PowerState::from(on), "already at requested state");
            return Ok(());
        }

        tracing::debug!(device = %self.shared.name, state = %PowerState::from(on), "changing state");
        let request = Request::Control {
            code: ControlCode::power(self.shared.id.clone(), on.into()),
        };
        self.begin_command(request).await
    }

    /// Arm the retry cycle (superseding any previous one) and issue
    /// the first send.
    async fn begin_command(&self, request: Request) -> Result<(), CoreError> {
        let token = self.shared.pending.supersede();
        retry::spawn_retry(
            self.shared.client.clone(),
            self.shared.name.clone(),
            request.clone(),
            self.shared.policy,
            token,
        );

        let ticket = self.shared.client.send(&request);
        ticket.wait().await?;
        Ok(())
    }

    /// Apply the values of a broadcast naming this device.
    ///
    /// The hub is authoritative: state is taken as-is. Receipt of any
    /// broadcast for the device stops the pending retry cycle, and
    /// observers are notified.
    pub(crate) fn apply_update(&self, values: &UpdateValues) {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(raw) = values.state.as_deref() {
                state.on = PowerState::from_wire(raw).is_on();
            }
            if self.shared.kind == DeviceKind::Dimmer {
                // Broadcasts without a dimlevel keep the stored level.
                if let Some(level) = values.dimlevel {
                    state.level = level.min(dimmer::MAX_LEVEL);
                }
            }
        }

        self.shared.pending.clear();
        tracing::debug!(device = %self.shared.name, state = ?self.state(), "applied broadcast");
        self.notify();
    }

    /// Reset to a known state at discovery/restore time.
    pub(crate) fn configure(&self, initial: DeviceState) {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = initial;
        self.notify();
    }

    /// Stop any pending retry cycle. Called on hub shutdown and
    /// device removal.
    pub(crate) fn teardown(&self) {
        self.shared.pending.clear();
    }

    fn notify(&self) {
        let state = self.state();
        let brightness = match self.shared.kind {
            DeviceKind::Switch => None,
            DeviceKind::Dimmer => Some(if state.on {
                dimmer::level_to_brightness(state.level)
            } else {
                0
            }),
        };
        let _ = self.shared.changes.send(Arc::new(DeviceChange {
            id: self.shared.id.clone(),
            name: self.shared.name.clone(),
            on: state.on,
            brightness,
        }));
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        // A stale retry task must not outlive the device it belongs to.
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_protocol_list() {
        let switch = vec!["kaku_switch".to_string()];
        let dimmer = vec!["kaku_dimmer".to_string()];
        let weather = vec!["openweathermap".to_string()];

        assert_eq!(kind_for_protocols(&switch), Some(DeviceKind::Switch));
        assert_eq!(kind_for_protocols(&dimmer), Some(DeviceKind::Dimmer));
        assert_eq!(kind_for_protocols(&weather), None);
        assert_eq!(kind_for_protocols(&[]), None);
    }

    #[test]
    fn mixed_protocol_list_prefers_switch() {
        let both = vec!["kaku_switch".to_string(), "kaku_dimmer".to_string()];
        assert_eq!(kind_for_protocols(&both), Some(DeviceKind::Switch));
    }
}
