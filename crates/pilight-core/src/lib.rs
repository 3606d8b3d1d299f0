// pilight-core: Device state and delivery assurance between pilight-api
// and consumers (bridge binary, host adapters).

pub mod config;
pub mod device;
pub mod error;
pub mod hub;
pub mod retry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::BridgeConfig;
pub use device::{DeviceChange, DeviceController, DeviceInfo, DeviceKind, DeviceState};
pub use error::CoreError;
pub use hub::Hub;
pub use retry::RetryPolicy;

// Re-export the transport config so consumers rarely need pilight-api
// directly.
pub use pilight_api::HubConfig;
