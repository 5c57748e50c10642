use serde::{Deserialize, Serialize};

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Look up a value by dotted key, e.g. `server.port`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["server", "host"] => Some(self.server.host.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),
            ["gateway", "session_header"] => Some(self.gateway.session_header.clone()),
            ["gateway", "domain_header"] => Some(self.gateway.domain_header.clone()),
            ["gateway", "open_delay_ms"] => Some(self.gateway.open_delay_ms.to_string()),
            ["gateway", "world_name"] => Some(self.gateway.world_name.clone()),
            ["session", "command_timeout_secs"] => {
                Some(self.session.command_timeout_secs.to_string())
            }
            ["session", "subscribe_timeout_secs"] => {
                Some(self.session.subscribe_timeout_secs.to_string())
            }
            ["session", "roster_poll_interval_ms"] => {
                Some(self.session.roster_poll_interval_ms.to_string())
            }
            ["logging", "level"] => Some(self.logging.level.as_str().to_string()),
            _ => None,
        }
    }

    /// Set a value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["server", "host"] => {
                self.server.host = value.to_string();
            }
            ["server", "port"] => {
                self.server.port = parse_number(value)?;
            }
            ["gateway", "session_header"] => {
                self.gateway.session_header = value.to_lowercase();
            }
            ["gateway", "domain_header"] => {
                self.gateway.domain_header = value.to_lowercase();
            }
            ["gateway", "open_delay_ms"] => {
                self.gateway.open_delay_ms = parse_number(value)?;
            }
            ["gateway", "world_name"] => {
                self.gateway.world_name = value.to_string();
            }
            ["session", "command_timeout_secs"] => {
                self.session.command_timeout_secs = parse_number(value)?;
            }
            ["session", "subscribe_timeout_secs"] => {
                self.session.subscribe_timeout_secs = parse_number(value)?;
            }
            ["session", "roster_poll_interval_ms"] => {
                self.session.roster_poll_interval_ms = parse_number(value)?;
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }

    /// Socket address the listener binds
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid number: {}", value)))
}

/// Listener address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 19132,
        }
    }
}

/// Handshake and world presentation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Header carrying the tunnel session token
    pub session_header: String,
    /// Header carrying the public domain
    pub domain_header: String,
    /// Delay before the `open` event, in milliseconds
    pub open_delay_ms: u64,
    pub world_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_header: "x-proxvc-session".to_string(),
            domain_header: "x-proxvc-domain".to_string(),
            open_delay_ms: 10,
            world_name: "Bedrock World".to_string(),
        }
    }
}

/// Per-session timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub command_timeout_secs: u64,
    pub subscribe_timeout_secs: u64,
    pub roster_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            subscribe_timeout_secs: 2,
            roster_poll_interval_ms: 1000,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 19132);
        assert_eq!(config.bind_address(), "0.0.0.0:19132");
        assert_eq!(config.session.command_timeout_secs, 10);
        assert_eq!(config.gateway.world_name, "Bedrock World");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"port": 20000}, "logging": {"level": "debug"}}"#)
                .unwrap();
        assert_eq!(config.server.port, 20000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = Config::default();
        config.set_value("server.port", "25565").unwrap();
        config.set_value("gateway.session_header", "X-Session").unwrap();
        config.set_value("logging.level", "WARNING").unwrap();

        assert_eq!(config.get_value("server.port").as_deref(), Some("25565"));
        assert_eq!(config.gateway.session_header, "x-session");
        assert_eq!(config.get_value("logging.level").as_deref(), Some("warn"));

        assert!(matches!(
            config.set_value("server.port", "high"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.set_value("gateway.max_worlds", "3"),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert_eq!(config.get_value("nope"), None);
    }
}
