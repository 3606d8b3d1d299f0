//! Configuration loading: TOML file plus `PILIGHT_`-prefixed
//! environment overrides, merged through figment.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use pilight_core::BridgeConfig;

use crate::error::BridgeError;

/// Resolve the config file path via XDG / platform conventions.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("org", "pilight", "pilight-bridge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("pilight-bridge");
            p.push("config.toml");
            p
        })
}

/// Load and validate the bridge configuration.
///
/// An explicitly passed path must exist; the default path may be
/// absent, in which case instances can still come from the
/// environment.
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig, BridgeError> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(BridgeError::NoConfig { path: p.into() });
            }
            p.to_path_buf()
        }
        None => default_config_path(),
    };

    let config: BridgeConfig = Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("PILIGHT_").split("__"))
        .extract()?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn loads_instances_from_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
                [[instances]]
                name = "Living room"
                host = "10.0.0.12"
                port = 5001

                [[instances]]
                host = "attic.local"
                port = 5001
                message_interval_ms = 250
            "#
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.instances[0].label(), "Living room");
        assert_eq!(config.instances[1].label(), "Default");
        assert_eq!(config.instances[1].message_interval_ms, 250);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/bridge.toml"))).unwrap_err();
        assert!(matches!(err, BridgeError::NoConfig { .. }));
    }

    #[test]
    fn invalid_instances_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
                [[instances]]
                host = ""
                port = 5001
            "#
        )
        .unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, BridgeError::Invalid(_)));
    }
}
