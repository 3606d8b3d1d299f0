// ── Hub abstraction ──
//
// Full lifecycle management for one pilight daemon connection.
// Wraps a HubClient, runs device discovery on config snapshots,
// and dispatches state broadcasts to the devices they name.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pilight_api::protocol::{ConfigSnapshot, GuiEntry, StateUpdate};
use pilight_api::{HubClient, HubConfig, HubEvent, PowerState};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::device::{
    DeviceChange, DeviceController, DeviceInfo, DeviceState, dimmer, kind_for_protocols,
};
use crate::error::CoreError;
use crate::retry::RetryPolicy;

const CHANGE_CHANNEL_SIZE: usize = 256;
const SNAPSHOT_CHANNEL_SIZE: usize = 16;

/// One pilight daemon and the devices discovered on it.
///
/// Cheaply cloneable. Hubs are fully independent of one another; a
/// bridge process simply holds one `Hub` per configured instance.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    client: HubClient,
    policy: RetryPolicy,
    devices: DashMap<String, DeviceController>,
    changes: broadcast::Sender<Arc<DeviceChange>>,
    snapshots: broadcast::Sender<Arc<ConfigSnapshot>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Hub {
    /// Create a hub with the default retry tuning. Does not connect;
    /// call [`connect`](Self::connect).
    pub fn new(config: HubConfig) -> Self {
        Self::with_retry_policy(config, RetryPolicy::default())
    }

    pub fn with_retry_policy(config: HubConfig, policy: RetryPolicy) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(HubInner {
                client: HubClient::new(config),
                policy,
                devices: DashMap::new(),
                changes,
                snapshots,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        self.inner.client.config().label()
    }

    /// Access the underlying transport client.
    pub fn client(&self) -> &HubClient {
        &self.inner.client
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start the transport and the event pump. Returns immediately;
    /// discovery happens when the first config snapshot arrives.
    pub fn connect(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        // Subscribe before the transport starts so the first config
        // snapshot cannot slip past the pump.
        let rx = self.inner.client.subscribe();
        tokio::spawn(event_pump(Arc::clone(&self.inner), rx));
        self.inner.client.connect();
    }

    /// Stop retry cycles, flush pending sends, and close the
    /// connection for good.
    pub async fn shutdown(&self) {
        info!(hub = %self.label(), "shutting down");
        self.inner.cancel.cancel();
        for entry in self.inner.devices.iter() {
            entry.value().teardown();
        }
        self.inner.client.close().await;
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.inner.client.connection_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.client.is_connected()
    }

    /// Subscribe to device change notifications.
    pub fn changes(&self) -> broadcast::Receiver<Arc<DeviceChange>> {
        self.inner.changes.subscribe()
    }

    /// Subscribe to parsed config snapshots.
    pub fn config_snapshots(&self) -> broadcast::Receiver<Arc<ConfigSnapshot>> {
        self.inner.snapshots.subscribe()
    }

    // ── Device access ────────────────────────────────────────────

    pub fn device(&self, id: &str) -> Option<DeviceController> {
        self.inner.devices.get(id).map(|entry| entry.value().clone())
    }

    pub fn require_device(&self, id: &str) -> Result<DeviceController, CoreError> {
        self.device(id).ok_or_else(|| CoreError::DeviceNotFound {
            id: id.to_string(),
        })
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = self
            .inner
            .devices
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Remove a device and stop its pending retry cycle.
    pub fn remove_device(&self, id: &str) -> bool {
        match self.inner.devices.remove(id) {
            Some((_, device)) => {
                device.teardown();
                true
            }
            None => false,
        }
    }
}

// ── Event pump ───────────────────────────────────────────────────────

async fn event_pump(inner: Arc<HubInner>, mut rx: broadcast::Receiver<Arc<HubEvent>>) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => handle_event(&inner, &event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        hub = %inner.client.config().label(),
                        missed,
                        "event stream lagged; requesting a fresh snapshot"
                    );
                    drop(inner.client.request_config());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    debug!(hub = %inner.client.config().label(), "event pump exiting");
}

fn handle_event(inner: &Arc<HubInner>, event: &HubEvent) {
    match event {
        HubEvent::Connected => info!(hub = %inner.client.config().label(), "hub connected"),
        HubEvent::Disconnected => {
            info!(hub = %inner.client.config().label(), "hub disconnected");
        }
        HubEvent::Config(snapshot) => {
            discover(inner, snapshot);
            let _ = inner.snapshots.send(Arc::new(snapshot.clone()));
        }
        HubEvent::Update(update) => dispatch(inner, update),
        HubEvent::Values(_) => trace!("values snapshot ignored"),
    }
}

/// Register or refresh devices from a config snapshot.
fn discover(inner: &Arc<HubInner>, snapshot: &ConfigSnapshot) {
    info!(
        hub = %inner.client.config().label(),
        devices = snapshot.config.devices.len(),
        "discovering devices"
    );

    for (id, entry) in &snapshot.config.devices {
        let Some(kind) = kind_for_protocols(&entry.protocol) else {
            debug!(device = %id, protocols = ?entry.protocol, "unsupported protocols, skipping");
            continue;
        };

        let initial = DeviceState {
            on: entry
                .state
                .as_deref()
                .map(PowerState::from_wire)
                .is_some_and(PowerState::is_on),
            level: entry.dimlevel.unwrap_or(0).min(dimmer::MAX_LEVEL),
        };

        match inner.devices.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                debug!(device = %id, "restoring known device");
                occupied.get().configure(initial);
            }
            Entry::Vacant(vacant) => {
                let name = display_name(id, snapshot.config.gui.get(id));
                info!(device = %id, name = %name, kind = %kind, "discovered device");
                vacant.insert(DeviceController::new(
                    id.clone(),
                    name,
                    kind,
                    initial,
                    inner.client.clone(),
                    inner.policy,
                    inner.changes.clone(),
                ));
            }
        }
    }
}

/// Route a broadcast to every registered device it names. Devices not
/// named are never touched.
fn dispatch(inner: &Arc<HubInner>, update: &StateUpdate) {
    for id in &update.devices {
        if let Some(device) = inner.devices.get(id) {
            device.apply_update(&update.values);
        }
    }
}

/// GUI name plus first group, e.g. `"Lamp (Living)"`; falls back to
/// the raw device id when the snapshot carries no GUI entry.
fn display_name(id: &str, gui: Option<&GuiEntry>) -> String {
    match gui {
        Some(entry) => match entry.group.first() {
            Some(group) => format!("{} ({group})", entry.name),
            None => entry.name.clone(),
        },
        None => id.to_string(),
    }
}
