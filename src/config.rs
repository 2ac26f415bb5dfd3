//! Supervisor configuration.
//!
//! Settings come from, in increasing priority:
//! 1. Built-in defaults
//! 2. The user config file (`$XDG_CONFIG_HOME/taskbridge/taskbridge.toml`)
//! 3. Command-line flags applied by the binary

pub mod settings;
pub mod user;

pub use settings::{ExecutionMode, SupervisorConfig};
pub use user::{UserConfigError, UserConfigResult, load_config_file, load_user_config, user_config_path};
