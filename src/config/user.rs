//! User configuration loading.
//!
//! User config location: $XDG_CONFIG_HOME/taskbridge/taskbridge.toml
//! Fallback: the platform config directory (`~/.config` on Linux)

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::SupervisorConfig;
use crate::error::RpcError;

/// Errors from loading a config file.
///
/// A missing file is not an error; it yields `Ok(None)`.
#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type UserConfigResult<T> = Result<T, UserConfigError>;

impl From<UserConfigError> for RpcError {
    fn from(err: UserConfigError) -> Self {
        RpcError::Config(err.to_string())
    }
}

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/taskbridge/taskbridge.toml
/// 2. Otherwise: <platform config dir>/taskbridge/taskbridge.toml
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg_config) if !xdg_config.is_empty() => PathBuf::from(xdg_config),
        _ => dirs::config_dir()?,
    };
    Some(base.join("taskbridge").join("taskbridge.toml"))
}

/// Load the user configuration file, if there is one.
pub fn load_user_config() -> UserConfigResult<Option<SupervisorConfig>> {
    match user_config_path() {
        Some(path) => load_config_file(&path),
        None => Ok(None),
    }
}

/// Load a config file. A missing file yields `Ok(None)`.
pub fn load_config_file(path: &Path) -> UserConfigResult<Option<SupervisorConfig>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(UserConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config = toml::from_str(&contents).map_err(|source| UserConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        target: "taskbridge::config",
        "Loaded config from {}",
        path.display()
    );
    Ok(Some(config))
}
