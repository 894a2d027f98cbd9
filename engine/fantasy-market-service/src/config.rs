//! Service configuration management

use anyhow::{Context, Result};
use auction_engine::MarketConfig;
use config::{Config, Environment, File};
use league_store::StoreConfig;
use market_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Prefix for environment overrides, e.g. `FANTASY_MARKET__SERVICE__PORT=8081`
pub const ENV_PREFIX: &str = "FANTASY_MARKET";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service-level configuration
    pub service: ServiceSettings,

    /// League store backend
    pub store: StoreConfig,

    /// Auction and sale durations
    pub market: MarketConfig,

    /// Market rotation
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Address the HTTP gateway binds to
    pub host: String,

    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics
    pub enabled: bool,

    /// Metrics export port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, port: 9090 }
    }
}

impl ServiceConfig {
    pub fn gateway_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.service.host, self.service.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.service.host, self.service.port))
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.service.shutdown_timeout_secs)
    }
}

/// Load configuration from an optional TOML file, `.env` and environment variables
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    dotenv::dotenv().ok();

    let mut builder = Config::builder();
    match path {
        Some(path) => {
            tracing::debug!("Loading configuration from file: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }
        None => {
            builder = builder.add_source(File::with_name("fantasy-market").required(false));
        }
    }
    builder = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));

    // The conventional DATABASE_URL applies unless the prefixed variable is set
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if std::env::var(format!("{ENV_PREFIX}__STORE__DATABASE__URL")).is_err() {
            builder = builder.set_override("store.database.url", url)?;
        }
    }

    let config: ServiceConfig = builder
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.service.port == 0 {
        return Err(anyhow::anyhow!("Invalid gateway port: {}", config.service.port));
    }

    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    config.gateway_addr()?;
    config.store.validate().context("Invalid store configuration")?;
    config.market.validate().map_err(|e| anyhow::anyhow!("Invalid market configuration: {}", e))?;
    config.scheduler.validate().context("Invalid scheduler configuration")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_store::StoreBackend;
    use market_scheduler::SweepAction;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.scheduler.market_size, 8);
        assert_eq!(config.gateway_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_market_size_rejected() {
        let mut config = ServiceConfig::default();
        config.scheduler.market_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = ServiceConfig::default();
        config.service.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_toml(
            r#"
            [service]
            port = 9000

            [store]
            backend = "memory"

            [scheduler]
            market_size = 5
            sweep_action = "refresh_only"

            [logging]
            format = "json"
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.service.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.scheduler.market_size, 5);
        assert_eq!(config.scheduler.sweep_action, SweepAction::RefreshOnly);
        assert_eq!(config.scheduler.sweep_interval_secs, 24 * 60 * 60);
        assert_eq!(config.market, MarketConfig::default());
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/fantasy-market.toml"))).is_err());
    }
}
