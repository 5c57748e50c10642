use std::time::Duration;

use anyhow::Context;
use bedrock_config::{Config, ConfigManager};
use bedrock_gateway::{Gateway, GatewayConfig, SessionConfig};
use clap::Parser;
use tracing::{debug, info};

mod events;
mod logging;

use events::register_logging;
use logging::init_logging;

#[derive(Parser, Debug, Clone)]
#[command(name = "bedrock-server")]
#[command(about = "WebSocket bridge for Bedrock worlds")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "BEDROCK_DEBUG", default_value = "false")]
    debug: bool,

    /// Listen port (overrides config)
    #[arg(long, env = "BEDROCK_PORT")]
    port: Option<u16>,

    /// Listen host (overrides config)
    #[arg(long, env = "BEDROCK_HOST")]
    host: Option<String>,

    /// Log level (overrides config)
    #[arg(long, env = "BEDROCK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Config file path
    #[arg(long, env = "BEDROCK_CONFIG", default_value = "~/.bedrock-bridge/config.json")]
    config: String,

    /// Override any config value, e.g. `--set session.command_timeout_secs=5`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl Cli {
    /// Fold CLI overrides into the loaded config
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        for entry in &self.overrides {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Override '{}' is not KEY=VALUE", entry))?;
            config.set_value(key.trim(), value.trim())?;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.parse()?;
        } else if self.debug {
            config.logging.level = bedrock_config::LogLevel::Debug;
        }
        ConfigManager::validate(config)?;
        Ok(())
    }
}

fn gateway_config(config: &Config) -> GatewayConfig {
    GatewayConfig {
        bind: config.bind_address(),
        session_header: config.gateway.session_header.clone(),
        domain_header: config.gateway.domain_header.clone(),
        open_delay: Duration::from_millis(config.gateway.open_delay_ms),
        session: SessionConfig {
            world_name: config.gateway.world_name.clone(),
            command_timeout: Duration::from_secs(config.session.command_timeout_secs),
            subscribe_timeout: Duration::from_secs(config.session.subscribe_timeout_secs),
            roster_poll_interval: Duration::from_millis(config.session.roster_poll_interval_ms),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = bedrock_config::expand_tilde(&cli.config)
        .unwrap_or_else(|| std::path::PathBuf::from(&cli.config));

    let config_manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let mut config = config_manager.snapshot().await;
    cli.apply(&mut config)?;

    init_logging(config.logging.level.as_str())?;
    info!("Config loaded from {:?}", config_path);

    let gateway_config = gateway_config(&config);
    debug!("Gateway configuration: {:?}", gateway_config);

    let gateway = Gateway::new(gateway_config);
    register_logging(gateway.hub());

    info!("Starting Bedrock bridge on {}", config.bind_address());
    tokio::select! {
        result = gateway.run() => {
            result.context("Gateway stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
