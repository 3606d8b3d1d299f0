use thiserror::Error;

/// Unified error type for the pilight API crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hub address: {0}")]
    Address(String),

    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    #[error("WebSocket stream error: {0}")]
    Socket(String),

    #[error("not connected to the hub")]
    NotConnected,

    #[error("message write failed: {0}")]
    Send(String),

    /// The send queue was reset before the message reached the wire.
    /// Callers should treat this exactly like a dropped connection.
    #[error("connection lost before the message was sent")]
    ConnectionLost,
}
