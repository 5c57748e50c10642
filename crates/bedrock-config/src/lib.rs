pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, GatewayConfig, LogLevel, LoggingConfig, ServerConfig,
    SessionConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// Bridge configuration directory (~/.bedrock-bridge)
pub fn bridge_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".bedrock-bridge"))
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    bridge_dir().map(|dir| dir.join("config.json"))
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
