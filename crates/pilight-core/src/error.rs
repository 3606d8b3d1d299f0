// ── Core error types ──
//
// User-facing errors from pilight-core. Transport-layer errors are
// translated into domain-appropriate variants at this boundary;
// consumers never see raw WebSocket failures.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("hub is not connected")]
    HubDisconnected,

    #[error("device not found: {id}")]
    DeviceNotFound { id: String },

    #[error("device {id} does not support brightness")]
    NotDimmable { id: String },

    /// The connection dropped before the command reached the wire.
    #[error("connection lost while sending")]
    ConnectionLost,

    #[error("send failed: {reason}")]
    SendFailed { reason: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl From<pilight_api::Error> for CoreError {
    fn from(err: pilight_api::Error) -> Self {
        match err {
            pilight_api::Error::NotConnected => Self::HubDisconnected,
            pilight_api::Error::ConnectionLost => Self::ConnectionLost,
            other => Self::SendFailed {
                reason: other.to_string(),
            },
        }
    }
}
