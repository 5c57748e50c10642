use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// 配置管理器
///
/// Owns the configuration file and its parsed contents
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// 加载配置文件，不存在时写入默认配置
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            Self::read(path).await?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 从默认位置加载配置
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    /// Default path (~/.bedrock-bridge/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// 创建一个新的配置管理器（用于测试）
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 获取配置的共享引用
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Copy of the current configuration
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 保存配置到文件
    pub async fn save(&self) -> ConfigResult<()> {
        let config = self.config.read().await;
        let content = serde_json::to_string_pretty(&*config)?;
        drop(config);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// 重新加载配置
    ///
    /// The current config is kept if the new one is invalid.
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let new_config = Self::read(&self.path).await?;
        *self.config.write().await = new_config;

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// Apply a change in memory, validate it, then persist
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write().await;
        let mut updated = config.clone();
        f(&mut updated);
        Self::validate(&updated)?;
        *config = updated;
        drop(config);
        self.save().await
    }

    async fn read(path: &Path) -> ConfigResult<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        let config: Config = serde_json::from_str(&content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if config.session.command_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Session command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if config.session.subscribe_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Session subscribe_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if config.session.roster_poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Session roster_poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if config.gateway.session_header.is_empty() || config.gateway.domain_header.is_empty() {
            return Err(ConfigError::Validation(
                "Gateway header names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}
