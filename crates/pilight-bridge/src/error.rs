//! Bridge process errors with exit codes for shell use.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no configuration found at {}", path.display())]
    NoConfig { path: PathBuf },

    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] pilight_core::CoreError),
}

impl BridgeError {
    /// sysexits-style codes: 78 for config problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::Load(_) | Self::Invalid(_) => 78,
        }
    }
}
